//! Admin SDK Reports API activity logs.

use log::info;

use crate::collectors::batch::{BatchIterator, BatchOptions, BatchReport};
use crate::collectors::driver::CollectionDriver;
use crate::models::RequestDescriptor;

pub const MODULE: &str = "log_events";

/// Applications the Reports API keeps activity for
pub const ALL_APPLICATIONS: &[&str] = &[
    "access_transparency",
    "admin",
    "calendar",
    "chat",
    "drive",
    "gcp",
    "gplus",
    "groups",
    "groups_enterprise",
    "jamboard",
    "login",
    "meet",
    "mobile",
    "rules",
    "saml",
    "token",
    "user_accounts",
    "context_aware_access",
    "chrome",
    "data_studio",
    "keep",
];

pub fn check_apps(apps: &[String]) -> bool {
    apps.iter().all(|app| ALL_APPLICATIONS.contains(&app.as_str()))
}

pub fn all_applications() -> Vec<String> {
    ALL_APPLICATIONS.iter().map(|app| app.to_string()).collect()
}

/// Optional RFC3339 bounds of the activity window
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityWindow {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

/// `activities.list` for `user_key`; the application is set per batch item
pub fn activities_template(user_key: &str, window: &ActivityWindow) -> RequestDescriptor {
    let mut descriptor = RequestDescriptor::list("activities")
        .param("userKey", user_key)
        .inner("items");
    if let Some(start) = &window.start_time {
        descriptor = descriptor.param("startTime", start.as_str());
    }
    if let Some(end) = &window.end_time {
        descriptor = descriptor.param("endTime", end.as_str());
    }
    descriptor
}

pub struct LogEvents {
    batch: BatchIterator,
}

impl LogEvents {
    pub fn new(driver: CollectionDriver) -> Self {
        Self {
            batch: BatchIterator::new(driver),
        }
    }

    /// Activity across the whole organization, one artifact set per application
    pub fn collect_all_users(&mut self, applications: &[String], window: &ActivityWindow) -> BatchReport {
        info!("Beginning log collection for activity across the organization ...");
        let template = activities_template("all", window);
        self.batch
            .execute_for_each(&template, applications, &BatchOptions::inject("applicationName"))
    }

    /// Activity of each user, artifacts named `{application}_{user}`
    pub fn collect_for_users(
        &mut self,
        applications: &[String],
        users: &[String],
        window: &ActivityWindow,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        for user in users {
            info!("Collecting log events of {} application(s) for user {} ...", applications.len(), user);
            let template = activities_template(user, window);
            let options = BatchOptions::inject("applicationName").qualified(user);
            report.merge(self.batch.execute_for_each(&template, applications, &options));
        }
        report
    }

    pub fn close(&self) {
        self.batch.close();
    }
}
