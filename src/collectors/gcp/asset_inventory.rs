//! Cloud Asset Inventory: IAM bindings, service accounts and the resource hierarchy.

use anyhow::Result;
use log::info;

use crate::collectors::driver::CollectionDriver;
use crate::collectors::gcp::{resource_short_id, resource_tier};
use crate::collectors::{settle, track};
use crate::models::RequestDescriptor;

pub const MODULE: &str = "asset_inventory";

pub const ALL_CONFIGS: &str = "all_configs";

pub const SUPPORTED_CONFIGS: &[&str] = &["gcp_map", "rb_map", "sa_info", "sa_key_info", ALL_CONFIGS];

pub fn check_configs(configs: &[String]) -> bool {
    configs.iter().all(|config| SUPPORTED_CONFIGS.contains(&config.as_str()))
}

fn selected(configs: &[String], name: &str) -> bool {
    configs.iter().any(|config| config == name || config == ALL_CONFIGS)
}

fn assets(resource_id: &str, content_type: &str) -> RequestDescriptor {
    RequestDescriptor::list("assets")
        .param("parent", resource_id)
        .param("contentType", content_type)
        .inner("assets")
}

pub fn role_bindings_descriptor(resource_id: &str) -> RequestDescriptor {
    assets(resource_id, "IAM_POLICY").documented(format!("role_bindings_{}", resource_short_id(resource_id)))
}

pub fn service_accounts_descriptor(resource_id: &str) -> RequestDescriptor {
    assets(resource_id, "RESOURCE")
        .param("assetTypes", "iam.googleapis.com/ServiceAccount")
        .documented(format!("service_accounts_{}", resource_short_id(resource_id)))
}

pub fn service_account_keys_descriptor(resource_id: &str) -> RequestDescriptor {
    assets(resource_id, "RESOURCE")
        .param("assetTypes", "iam.googleapis.com/ServiceAccountKey")
        .documented(format!("service_accounts_keys_{}", resource_short_id(resource_id)))
}

/// Resources of `tier` (`organizations`, `folders`, `projects`) under `resource_id`
pub fn hierarchy_descriptor(tier: &str, resource_id: &str) -> RequestDescriptor {
    let singular = tier.strip_suffix('s').unwrap_or(tier);
    let mut chars = singular.chars();
    let asset_kind = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    assets(resource_id, "RESOURCE")
        .param("assetTypes", format!("cloudresourcemanager.googleapis.com/{}", asset_kind))
        .documented(format!("resource_hierarchy_{}_{}", tier, resource_short_id(resource_id)))
}

/// Tiers mapped below a resource; projects have no hierarchy to map
pub fn hierarchy_tiers(resource_id: &str) -> &'static [&'static str] {
    match resource_tier(resource_id) {
        "organizations" => &["organizations", "folders", "projects"],
        "folders" => &["folders", "projects"],
        _ => &[],
    }
}

/// Every descriptor a configuration selection needs for `resource_id`
pub fn config_descriptors(resource_id: &str, configs: &[String]) -> Vec<RequestDescriptor> {
    let mut descriptors = Vec::new();
    if selected(configs, "rb_map") {
        descriptors.push(role_bindings_descriptor(resource_id));
    }
    if selected(configs, "sa_info") {
        descriptors.push(service_accounts_descriptor(resource_id));
    }
    if selected(configs, "sa_key_info") {
        descriptors.push(service_account_keys_descriptor(resource_id));
    }
    if selected(configs, "gcp_map") {
        for tier in hierarchy_tiers(resource_id) {
            descriptors.push(hierarchy_descriptor(tier, resource_id));
        }
    }
    descriptors
}

pub struct AssetInventory {
    driver: CollectionDriver,
}

impl AssetInventory {
    pub fn new(driver: CollectionDriver) -> Self {
        Self { driver }
    }

    /// Collect the selected configurations of every resource
    pub fn collect_configs(&self, resource_ids: &[String], configs: &[String]) -> Result<()> {
        let mut failures = Vec::new();
        for resource_id in resource_ids {
            info!("Collecting configurations from [{}]", resource_id);
            for descriptor in config_descriptors(resource_id, configs) {
                track(self.driver.execute(&descriptor), &mut failures);
            }
        }
        settle(MODULE, failures)
    }

    pub fn close(&self) {
        self.driver.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;

    use crate::test_utils::fakes::{CountingCredentials, RecordingSink, ScriptedClient};
    use crate::test_utils::fast_limits;

    fn configs(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_check_configs() {
        assert!(check_configs(&configs(&["rb_map", "gcp_map"])));
        assert!(!check_configs(&configs(&["firewalls"])));
    }

    #[test]
    fn test_descriptor_shapes() {
        let rb = role_bindings_descriptor("projects/case-123");
        assert_eq!(rb.params["contentType"], "IAM_POLICY");
        assert!(!rb.params.contains_key("assetTypes"));
        assert_eq!(rb.function_item(), "assets_role_bindings_case-123");

        let keys = service_account_keys_descriptor("folders/42");
        assert_eq!(keys.params["assetTypes"], "iam.googleapis.com/ServiceAccountKey");
        assert_eq!(keys.function_item(), "assets_service_accounts_keys_42");

        let map = hierarchy_descriptor("organizations", "organizations/77");
        assert_eq!(map.params["assetTypes"], "cloudresourcemanager.googleapis.com/Organization");
        assert_eq!(map.function_item(), "assets_resource_hierarchy_organizations_77");
        assert_eq!(
            hierarchy_descriptor("projects", "folders/42").params["assetTypes"],
            "cloudresourcemanager.googleapis.com/Project"
        );
    }

    #[test]
    fn test_all_configs_per_tier() {
        let all = configs(&["all_configs"]);
        assert_eq!(config_descriptors("organizations/77", &all).len(), 6);
        assert_eq!(config_descriptors("folders/42", &all).len(), 5);
        assert_eq!(config_descriptors("projects/p", &all).len(), 3);
        assert_eq!(config_descriptors("projects/p", &configs(&["sa_info"])).len(), 1);
    }

    #[test]
    fn test_collect_configs() {
        let client = ScriptedClient::pages(vec![
            json!({"assets": [{"name": "//iam.googleapis.com/projects/p/serviceAccounts/a"}]}),
            json!({"assets": [{"name": "//iam.googleapis.com/projects/q/serviceAccounts/b"}]}),
        ]);
        let sink = Arc::new(RecordingSink::new());
        let driver = CollectionDriver::new(
            MODULE,
            Box::new(client.clone()),
            Arc::new(CountingCredentials::new("collector@case.iam.gserviceaccount.com")),
            sink.clone(),
        )
        .with_limits(fast_limits());
        let inventory = AssetInventory::new(driver);

        inventory
            .collect_configs(&configs(&["projects/p", "projects/q"]), &configs(&["sa_info"]))
            .unwrap();

        let items: Vec<String> = sink
            .deliveries()
            .into_iter()
            .map(|(_, destination)| destination.function_item)
            .collect();
        assert_eq!(items, vec!["assets_service_accounts_p", "assets_service_accounts_q"]);
        assert_eq!(client.calls()[1].3["parent"], "projects/q");
    }
}
