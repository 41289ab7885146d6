//! Google Cloud Platform collectors: historical logs and asset inventory.

pub mod asset_inventory;
pub mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use log::info;

use crate::cloud::client::ClientFactory;
use crate::cloud::credentials::Credentials;
use crate::collectors::{build_driver, split_list, DriverLimits};
use crate::utils::output::OutputSink;

pub use asset_inventory::AssetInventory;
pub use logging::{LogManagement, LogSelection};

/// Full resource names (`projects/p1`, `folders/42`, `organizations/7`) from CLI ids.
///
/// At most one organization may be given.
pub fn resource_ids(projects: Option<&str>, folders: Option<&str>, organization: Option<&str>) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    for project in projects.map(split_list).unwrap_or_default() {
        ids.push(format!("projects/{}", project));
    }
    for folder in folders.map(split_list).unwrap_or_default() {
        ids.push(format!("folders/{}", folder));
    }
    let organizations = organization.map(split_list).unwrap_or_default();
    if organizations.len() > 1 {
        bail!("specify only a single Organization ID");
    }
    for org in organizations {
        ids.push(format!("organizations/{}", org));
    }
    Ok(ids)
}

/// `projects`, `folders` or `organizations`
pub fn resource_tier(resource_id: &str) -> &str {
    resource_id.split('/').next().unwrap_or(resource_id)
}

/// Id without its tier prefix
pub fn resource_short_id(resource_id: &str) -> &str {
    resource_id.rsplit('/').next().unwrap_or(resource_id)
}

/// What a `gcp` run collects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GcpRequest {
    Logs {
        resource_ids: Vec<String>,
        selection: LogSelection,
    },
    /// Log names available under each resource
    Preview { resource_ids: Vec<String> },
    Configurations {
        resource_ids: Vec<String>,
        configs: Vec<String>,
    },
}

pub struct GcpServices {
    pub sink: Arc<dyn OutputSink>,
    pub credentials: Arc<dyn Credentials>,
    pub logging: Box<dyn ClientFactory>,
    pub assets: Box<dyn ClientFactory>,
    /// File the log preview is appended to
    pub preview_tracker: PathBuf,
    pub limits: DriverLimits,
}

pub fn run(services: GcpServices, request: &GcpRequest) -> Result<()> {
    match request {
        GcpRequest::Logs { resource_ids, selection } => {
            let management = LogManagement::new(build_driver(
                logging::MODULE,
                services.logging.as_ref(),
                &services.credentials,
                &services.sink,
                &services.limits,
            )?);
            let result = management.collect_logs(resource_ids, selection);
            management.close();
            result
        }
        GcpRequest::Preview { resource_ids } => {
            let management = LogManagement::new(build_driver(
                logging::MODULE,
                services.logging.as_ref(),
                &services.credentials,
                &services.sink,
                &services.limits,
            )?);
            let result = management.collect_preview(resource_ids, &services.preview_tracker);
            management.close();
            if result.is_ok() {
                info!("Log preview written to {}", services.preview_tracker.display());
            }
            result
        }
        GcpRequest::Configurations { resource_ids, configs } => {
            let inventory = AssetInventory::new(build_driver(
                asset_inventory::MODULE,
                services.assets.as_ref(),
                &services.credentials,
                &services.sink,
                &services.limits,
            )?);
            let result = inventory.collect_configs(resource_ids, configs);
            inventory.close();
            result
        }
    }
}
