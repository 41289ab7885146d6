//! Global constants for the cirrus collector.
//!
//! This module centralizes all hardcoded values to improve maintainability
//! and make configuration changes easier.

// Collection driver limits
/// Pages accumulated in memory before a partial dump is flushed
pub const MAX_PAGES: usize = 50;

/// Attempts made for a single page before the operation fails
pub const MAX_RETRY: usize = 3;

/// Base delay between retries; attempt N sleeps N times this value
pub const RETRY_BASE_DELAY_SECS: u64 = 5;

/// Largest base retry delay a config file may ask for
pub const MAX_RETRY_DELAY_SECS: u64 = 300;

/// Record count milestone for progress output
pub const MAX_EVENTS: usize = 50_000;

// Pagination field names
/// Continuation token field in Google API responses
pub const NEXT_PAGE_TOKEN_FIELD: &str = "nextPageToken";

/// Continuation token request parameter
pub const PAGE_TOKEN_PARAM: &str = "pageToken";

/// Envelope field carrying the request body for wrapped (POST) calls
pub const BODY_PARAM: &str = "body";

// Default locations
pub const DEFAULT_OUTPUT_FOLDER: &str = "output";
pub const DEFAULT_LOG_FILE: &str = "google_collectors.log";
pub const DEFAULT_CACHE_FOLDER: &str = "cache";
pub const DEFAULT_TOKEN_ENV_VAR: &str = "CIRRUS_ACCESS_TOKEN";

/// Running-log separator written at the start of every run
pub const LOG_SEPARATOR: &str = "-----------------------------------------------------------";

// Error classification
/// Message Google APIs use for missing entities, whatever the status
pub const NOT_FOUND_MARKERS: &[&str] = &["Requested entity was not found"];

/// Message fragments for APIs that were never enabled on the project
pub const SERVICE_DISABLED_MARKERS: &[&str] = &[
    "SERVICE_DISABLED",
    "has not been used in project",
    "service not enabled",
    "it is disabled",
];

// Google Workspace
pub const MY_CUSTOMER: &str = "my_customer";

/// `lastLoginTime` reported for accounts that never signed in
pub const NO_LOGIN_TIME: &str = "1970-01-01T00:00:00.000Z";

/// CLI value selecting every active user
pub const ALL_USERS_KEYWORD: &str = "all_users";
pub const ALL_GROUPS_KEYWORD: &str = "all_groups";
/// CLI value selecting every Reports application / every supported GCP log
pub const ALL_LOGS_KEYWORD: &str = "all_logs";

/// Time format accepted for `--start-time` / `--end-time`
pub const RFC3339_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub const ACTIVE_USERS_CACHE_FILE: &str = "active_users.tmp";
pub const GROUPS_CACHE_FILE: &str = "groups.tmp";
pub const MAILBOX_USERS_CACHE_FILE: &str = "gmail_users.tmp";

/// Log preview tracker file name inside the output folder
pub const LOG_PREVIEW_FILE: &str = "log_preview";

/// Page size requested for historical GCP log entries
pub const LOG_ENTRIES_PAGE_SIZE: u64 = 500;

/// Workspace OAuth scopes requested by the `gw` collectors
pub const WORKSPACE_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/admin.directory.user.readonly",
    "https://www.googleapis.com/auth/admin.directory.domain.readonly",
    "https://www.googleapis.com/auth/admin.directory.user.security",
    "https://www.googleapis.com/auth/admin.directory.device.chromeos.readonly",
    "https://www.googleapis.com/auth/admin.directory.customer.readonly",
    "https://www.googleapis.com/auth/admin.directory.group.readonly",
    "https://www.googleapis.com/auth/admin.directory.device.mobile.readonly",
    "https://www.googleapis.com/auth/admin.directory.orgunit.readonly",
    "https://www.googleapis.com/auth/admin.directory.rolemanagement.readonly",
    "https://www.googleapis.com/auth/admin.reports.audit.readonly",
    "https://www.googleapis.com/auth/admin.reports.usage.readonly",
    "https://www.googleapis.com/auth/gmail.readonly",
];

/// Scope used by the `gcp` collectors
pub const CLOUD_PLATFORM_SCOPES: &[&str] = &["https://www.googleapis.com/auth/cloud-platform.read-only"];

/// Timeout for a single HTTP request issued by the REST client
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;
