//! Google Workspace collectors: Admin Directory, activity logs and Gmail.
//!
//! Directory and Reports calls act as the super admin. Gmail calls are
//! delegated from the service account to each mailbox owner.

pub mod admin_directory;
pub mod cache;
pub mod gmail;
pub mod log_events;

use std::sync::Arc;

use anyhow::{bail, Result};
use log::info;

use crate::cloud::client::ClientFactory;
use crate::cloud::credentials::Credentials;
use crate::collectors::{build_driver, split_list, DriverLimits};
use crate::utils::output::OutputSink;

pub use admin_directory::{AdminDirectory, DirectoryAction};
pub use cache::SubjectCache;
pub use gmail::{Gmail, GmailAction, GmailRequest};
pub use log_events::{ActivityWindow, LogEvents};

/// Users or groups named on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subjects {
    /// Every active user / every group of the tenant
    All,
    Only(Vec<String>),
}

impl Subjects {
    /// `all_keyword` selects everything; other values are a lower-cased list
    pub fn parse(value: &str, all_keyword: &str) -> Self {
        if value == all_keyword {
            Subjects::All
        } else {
            Subjects::Only(split_list(value).into_iter().map(|s| s.to_lowercase()).collect())
        }
    }

    pub fn none() -> Self {
        Subjects::Only(Vec::new())
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Subjects::All)
    }

    fn listed(&self) -> Vec<String> {
        match self {
            Subjects::All => Vec::new(),
            Subjects::Only(items) => items.clone(),
        }
    }
}

/// What a `gw` run collects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceRequest {
    AdminDirectory {
        action: DirectoryAction,
        users: Subjects,
        groups: Subjects,
    },
    Logs {
        applications: Vec<String>,
        users: Subjects,
        window: ActivityWindow,
    },
    Gmail {
        request: GmailRequest,
        users: Subjects,
    },
    /// Directory, organization-wide logs and Gmail settings
    All,
}

impl WorkspaceRequest {
    fn needs_all_users(&self) -> bool {
        match self {
            WorkspaceRequest::All => true,
            WorkspaceRequest::AdminDirectory { action, users, .. } => {
                *action == DirectoryAction::All || (action.needs_users() && users.is_all())
            }
            WorkspaceRequest::Logs { users, .. } | WorkspaceRequest::Gmail { users, .. } => users.is_all(),
        }
    }

    fn needs_all_groups(&self) -> bool {
        match self {
            WorkspaceRequest::All => true,
            WorkspaceRequest::AdminDirectory { action, groups, .. } => {
                *action == DirectoryAction::All || (action.needs_groups() && groups.is_all())
            }
            _ => false,
        }
    }

    fn needs_mailboxes(&self) -> bool {
        matches!(self, WorkspaceRequest::All | WorkspaceRequest::Gmail { .. })
    }

    fn listed_users(&self) -> Vec<String> {
        match self {
            WorkspaceRequest::AdminDirectory { users, .. }
            | WorkspaceRequest::Logs { users, .. }
            | WorkspaceRequest::Gmail { users, .. } => users.listed(),
            WorkspaceRequest::All => Vec::new(),
        }
    }

    fn listed_groups(&self) -> Vec<String> {
        match self {
            WorkspaceRequest::AdminDirectory { groups, .. } => groups.listed(),
            _ => Vec::new(),
        }
    }
}

/// Clients, identities and storage a `gw` run works with.
pub struct WorkspaceServices {
    pub sink: Arc<dyn OutputSink>,
    /// The service account itself; Gmail delegates from it
    pub service_account: Arc<dyn Credentials>,
    /// The service account acting as the super admin
    pub super_admin: Arc<dyn Credentials>,
    pub directory: Box<dyn ClientFactory>,
    pub reports: Box<dyn ClientFactory>,
    pub gmail: Box<dyn ClientFactory>,
    pub cache: SubjectCache,
    pub limits: DriverLimits,
}

/// Run a Workspace collection.
///
/// Admin SDK access is checked first. When a request needs every user or
/// group, the lists come from the cache (or the directory with
/// `override_cache`). Failures of individual collections are reported after
/// the remaining ones ran.
pub fn run(services: WorkspaceServices, request: &WorkspaceRequest, override_cache: bool) -> Result<()> {
    let WorkspaceServices {
        sink,
        service_account,
        super_admin,
        directory: directory_factory,
        reports: reports_factory,
        gmail: gmail_factory,
        cache,
        limits,
    } = services;

    let mut directory = AdminDirectory::new(build_driver(
        admin_directory::MODULE,
        directory_factory.as_ref(),
        &super_admin,
        &sink,
        &limits,
    )?);
    directory.check_access()?;

    let all_users = request.needs_all_users();
    let mut users = request.listed_users();
    let mut groups = request.listed_groups();
    if all_users {
        users = directory.active_users(&cache, override_cache, request.needs_mailboxes())?;
        if users.is_empty() {
            bail!("could not retrieve users to work with");
        }
    }
    if request.needs_all_groups() {
        groups = directory.groups(&cache, override_cache)?;
    }

    let mut failures: Vec<String> = Vec::new();

    let directory_action = match request {
        WorkspaceRequest::AdminDirectory { action, .. } => Some(*action),
        WorkspaceRequest::All => Some(DirectoryAction::All),
        _ => None,
    };
    if let Some(action) = directory_action {
        info!("Starting to collect configurations from Admin Directory");
        if let Err(e) = directory.collect(action, &users, &groups) {
            failures.push(format!("{:#}", e));
        }
    }

    let log_selection = match request {
        WorkspaceRequest::Logs {
            applications, window, ..
        } => Some((applications.clone(), window.clone())),
        WorkspaceRequest::All => Some((log_events::all_applications(), ActivityWindow::default())),
        _ => None,
    };
    if let Some((applications, window)) = log_selection {
        info!("Starting to collect logs from Google Log Events");
        let mut events = LogEvents::new(build_driver(
            log_events::MODULE,
            reports_factory.as_ref(),
            &super_admin,
            &sink,
            &limits,
        )?);
        let report = if all_users {
            events.collect_all_users(&applications, &window)
        } else {
            events.collect_for_users(&applications, &users, &window)
        };
        info!("Log events: {} collections, {} failed", report.processed(), report.failed.len());
        events.close();
    }

    let gmail_request = match request {
        WorkspaceRequest::Gmail { request, .. } => Some(request.clone()),
        WorkspaceRequest::All => Some(GmailRequest::new(GmailAction::All)),
        _ => None,
    };
    if let Some(gmail_request) = gmail_request {
        let mailbox_users = Gmail::relevant_users(&directory, &cache, &users, override_cache)?;
        info!("Starting to collect configurations/data from Gmail");
        let driver = build_driver(gmail::MODULE, gmail_factory.as_ref(), &service_account, &sink, &limits)?;
        let mut gmail = Gmail::new(driver, gmail_factory);
        match gmail.collect(&gmail_request, &mailbox_users) {
            Ok(report) => info!("Gmail: {} collections, {} failed", report.processed(), report.failed.len()),
            Err(e) => failures.push(format!("{:#}", e)),
        }
        gmail.close();
    }

    directory.close();

    if failures.is_empty() {
        Ok(())
    } else {
        bail!("{}", failures.join("\n"))
    }
}
