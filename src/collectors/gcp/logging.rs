//! Cloud Logging: historical log entries and log name previews.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use log::info;
use serde_json::{json, Value};

use crate::collectors::driver::CollectionDriver;
use crate::collectors::gcp::{resource_short_id, resource_tier};
use crate::collectors::{settle, track};
use crate::constants::LOG_ENTRIES_PAGE_SIZE;
use crate::models::RequestDescriptor;

pub const MODULE: &str = "log_collection";

pub const ALL_LOGS: &str = "all_logs";

pub const SUPPORTED_LOGS: &[&str] = &[
    "admin_activity",
    "data_access",
    "policy_denied",
    "access_transparency",
    "system_event",
    "vpc_flow",
    "gce_data",
    "dns",
    "fw_rules",
    "load_balancer",
    "k8s",
    "cloud_sql",
    ALL_LOGS,
];

/// Short log names and the log name fragments they stand for
pub const LOG_MAPPING: &[(&str, &[&str])] = &[
    ("admin_activity", &["%2Factivity"]),
    ("data_access", &["%2Fdata_access"]),
    ("policy_denied", &["%2Fpolicy"]),
    ("system_event", &["%2Fsystem_event"]),
    ("access_transparency", &["%2Faccess_transparency"]),
    ("vpc_flow", &["%2Fvpc_flows"]),
    ("dns", &["%2Fdns_queries"]),
    ("fw_rules", &["%2Ffirewall"]),
    ("k8s", &["kube", "gke"]),
    ("gce_data", &["logs/GCE", "logs/OSConfig"]),
    ("load_balancer", &["logs/requests"]),
    (
        "cloud_sql",
        &[
            "%2Fmysql.err",
            "%2Fmysql-slow.log",
            "%2Fmysql-general.log",
            "%2Freplication-setup.log",
            "%2Freplication-status.log",
            "%2Fmysql-upgrade.log",
            "%2Fpostgres.log",
            "%2Fpostgres-audit.log",
            "%2Fsqlserver.err",
            "%2Fsqlagent.out",
            "%2Foperationdetails.log",
            "%2Fpostgres-upgrade.log",
        ],
    ),
];

/// Resource types added to the filter for some selections
const RESOURCE_TYPES: &[(&str, &[&str])] = &[
    ("load_balancer", &["http_load_balancer"]),
    ("gce_data", &["gce"]),
    ("k8s", &["k8s", "gke"]),
    ("cloud_sql", &["cloudsql"]),
];

pub fn check_logs(logs: &[String]) -> bool {
    logs.iter().all(|log| SUPPORTED_LOGS.contains(&log.as_str()))
}

pub fn log_names(short_name: &str) -> Option<&'static [&'static str]> {
    LOG_MAPPING
        .iter()
        .find(|(name, _)| *name == short_name)
        .map(|(_, names)| *names)
}

fn quoted_alternatives<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    names
        .into_iter()
        .map(|name| format!("\"{}\"", name))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// The log name part of an entries filter.
///
/// Mapped logs become one `logName : (...)` clause plus resource type
/// clauses where a selection needs them; custom logs are OR-ed on.
pub fn build_log_filter(selection: &[String], custom: &[String]) -> Result<String> {
    let mut filter = if selection.iter().any(|log| log == ALL_LOGS) {
        "logName : *".to_string()
    } else if !selection.is_empty() {
        let mut names = Vec::new();
        for log in selection {
            match log_names(log) {
                Some(mapped) => names.extend(mapped.iter().copied()),
                None => bail!("specified logs should be one of: {:?}", SUPPORTED_LOGS),
            }
        }
        let mut filter = format!("logName : ({})", quoted_alternatives(names));
        for (log, types) in RESOURCE_TYPES {
            if selection.iter().any(|selected| selected.as_str() == *log) {
                for resource_type in types.iter() {
                    filter.push_str(&format!(" OR resource.type : (\"{}\")", resource_type));
                }
            }
        }
        filter
    } else if !custom.is_empty() {
        return Ok(format!(
            "logName : ({})",
            quoted_alternatives(custom.iter().map(String::as_str))
        ));
    } else {
        bail!("specify at least one of --logs or --custom-logs");
    };

    for log in custom {
        filter.push_str(&format!(" OR logName : (\"{}\")", log));
    }
    Ok(filter)
}

/// Complete entries filter bounded by the collection window
pub fn entries_filter(log_filter: &str, start_time: &str, end_time: &str) -> String {
    format!(
        "timestamp >= \"{}\" AND timestamp <= \"{}\" AND ({})",
        start_time, end_time, log_filter
    )
}

/// `entries.list` for one resource; the page token travels in the body
pub fn entries_descriptor(resource_id: &str, filter: &str) -> RequestDescriptor {
    RequestDescriptor::list("entries")
        .param(
            "body",
            json!({
                "resourceNames": [resource_id],
                "orderBy": "timestamp desc",
                "pageSize": LOG_ENTRIES_PAGE_SIZE,
                "filter": filter,
            }),
        )
        .inner("entries")
        .wrapped()
        .documented(resource_short_id(resource_id))
}

/// `logs.list` under a project, folder or organization
pub fn preview_descriptor(resource_id: &str) -> RequestDescriptor {
    RequestDescriptor::list("logs")
        .base(&[resource_tier(resource_id)])
        .param("parent", resource_id)
        .inner("logNames")
        .returning()
}

/// Short names whose log name fragments appear in `log_name`
pub fn short_names(log_name: &str) -> Vec<&'static str> {
    LOG_MAPPING
        .iter()
        .filter(|(_, names)| names.iter().any(|name| log_name.contains(name)))
        .map(|(short, _)| *short)
        .collect()
}

/// Selection of historical logs to collect
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSelection {
    pub logs: Vec<String>,
    pub custom_logs: Vec<String>,
    pub start_time: String,
    pub end_time: String,
}

pub struct LogManagement {
    driver: CollectionDriver,
}

impl LogManagement {
    pub fn new(driver: CollectionDriver) -> Self {
        Self { driver }
    }

    /// Historical entries of every resource; one failing resource does not stop the rest
    pub fn collect_logs(&self, resource_ids: &[String], selection: &LogSelection) -> Result<()> {
        let log_filter = build_log_filter(&selection.logs, &selection.custom_logs)?;
        let filter = entries_filter(&log_filter, &selection.start_time, &selection.end_time);

        let mut failures = Vec::new();
        for resource_id in resource_ids {
            info!("Collecting logs from [{}]", resource_id);
            track(
                self.driver.execute(&entries_descriptor(resource_id, &filter)),
                &mut failures,
            );
        }
        settle(MODULE, failures)
    }

    /// Append the log names available under each resource to `tracker`
    pub fn collect_preview(&self, resource_ids: &[String], tracker: &Path) -> Result<()> {
        if let Some(parent) = tracker.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let new_tracker = !tracker.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(tracker)
            .with_context(|| format!("Failed to open log preview file {}", tracker.display()))?;
        if new_tracker {
            writeln!(file, "timestamp,resource,log_preview")?;
        }

        for resource_id in resource_ids {
            info!("Collecting preview of available logs for resource [{}] ...", resource_id);
            let log_names: Vec<String> = self
                .driver
                .execute(&preview_descriptor(resource_id))
                .into_returned()?
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();

            writeln!(
                file,
                "{},{},{}",
                Utc::now().format("%m/%d/%Y %H:%M:%SZ"),
                resource_id,
                serde_json::to_string(&log_names)?
            )?;
            for log_name in &log_names {
                let short = short_names(log_name);
                let short = if short.is_empty() { "-".to_string() } else { short.join(";") };
                writeln!(file, "  {},{}", log_name, short)?;
            }
            info!("Log preview of {} gathered: {} log names", resource_id, log_names.len());
        }
        Ok(())
    }

    pub fn close(&self) {
        self.driver.close();
    }
}
