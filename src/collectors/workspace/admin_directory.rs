//! Admin SDK Directory API: users, groups, devices and tenant configuration.

use anyhow::{bail, Result};
use clap::ValueEnum;
use log::info;
use serde_json::Value;

use crate::collectors::batch::{BatchIterator, BatchOptions};
use crate::collectors::driver::CollectionDriver;
use crate::collectors::workspace::cache::SubjectCache;
use crate::collectors::{settle, track};
use crate::constants::{
    ACTIVE_USERS_CACHE_FILE, GROUPS_CACHE_FILE, MAILBOX_USERS_CACHE_FILE, MY_CUSTOMER, NO_LOGIN_TIME,
};
use crate::models::RequestDescriptor;

pub const MODULE: &str = "admin_directory";

/// Directory listings that can be collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum DirectoryAction {
    All,
    Users,
    DeletedUsers,
    Domains,
    Asps,
    Chromeosdevices,
    Customers,
    Groups,
    Members,
    Mobiledevices,
    Orgunits,
    Roles,
    #[value(name = "roleAssignments")]
    RoleAssignments,
    Tokens,
}

impl DirectoryAction {
    /// Every concrete action, in collection order
    pub const EVERY: [DirectoryAction; 13] = [
        DirectoryAction::Users,
        DirectoryAction::DeletedUsers,
        DirectoryAction::Domains,
        DirectoryAction::Asps,
        DirectoryAction::Chromeosdevices,
        DirectoryAction::Customers,
        DirectoryAction::Groups,
        DirectoryAction::Members,
        DirectoryAction::Mobiledevices,
        DirectoryAction::Orgunits,
        DirectoryAction::Roles,
        DirectoryAction::RoleAssignments,
        DirectoryAction::Tokens,
    ];

    pub fn expand(self) -> Vec<DirectoryAction> {
        match self {
            DirectoryAction::All => Self::EVERY.to_vec(),
            action => vec![action],
        }
    }

    /// Runs once per user
    pub fn needs_users(self) -> bool {
        matches!(self, DirectoryAction::All | DirectoryAction::Asps | DirectoryAction::Tokens)
    }

    /// Runs once per group
    pub fn needs_groups(self) -> bool {
        matches!(self, DirectoryAction::All | DirectoryAction::Members)
    }
}

/// How an action is issued against the Directory API.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectoryCall {
    Single(RequestDescriptor),
    /// Template run per user, with `userKey` set to the user
    ForEachUser(RequestDescriptor),
    /// Template run per group, with `groupKey` set to the group
    ForEachGroup(RequestDescriptor),
}

fn customer_list(function: &str, inner: &str) -> RequestDescriptor {
    RequestDescriptor::list(function).param("customer", MY_CUSTOMER).inner(inner)
}

fn customer_id_list(function: &str, inner: &str) -> RequestDescriptor {
    RequestDescriptor::list(function).param("customerId", MY_CUSTOMER).inner(inner)
}

/// The customer record of the tenant; also used to probe access
pub fn customer_descriptor() -> RequestDescriptor {
    RequestDescriptor::get("customers").param("customerKey", MY_CUSTOMER)
}

pub fn directory_call(action: DirectoryAction) -> Option<DirectoryCall> {
    let call = match action {
        DirectoryAction::All => return None,
        DirectoryAction::Users => DirectoryCall::Single(customer_list("users", "users")),
        DirectoryAction::DeletedUsers => DirectoryCall::Single(
            customer_list("users", "users")
                .param("showDeleted", true)
                .documented("deleted"),
        ),
        DirectoryAction::Domains => DirectoryCall::Single(customer_list("domains", "domains")),
        DirectoryAction::Asps => {
            DirectoryCall::ForEachUser(RequestDescriptor::list("asps").inner("items").with_envelope())
        }
        DirectoryAction::Chromeosdevices => {
            DirectoryCall::Single(customer_id_list("chromeosdevices", "chromeosdevices"))
        }
        DirectoryAction::Customers => DirectoryCall::Single(customer_descriptor()),
        DirectoryAction::Groups => DirectoryCall::Single(customer_list("groups", "groups")),
        DirectoryAction::Members => DirectoryCall::ForEachGroup(
            RequestDescriptor::list("members")
                .param("includeDerivedMembership", true)
                .inner("members")
                .with_envelope(),
        ),
        DirectoryAction::Mobiledevices => DirectoryCall::Single(customer_id_list("mobiledevices", "mobiledevices")),
        DirectoryAction::Orgunits => DirectoryCall::Single(customer_id_list("orgunits", "organizationUnits")),
        DirectoryAction::Roles => DirectoryCall::Single(customer_list("roles", "items")),
        DirectoryAction::RoleAssignments => DirectoryCall::Single(customer_list("roleAssignments", "items")),
        DirectoryAction::Tokens => {
            DirectoryCall::ForEachUser(RequestDescriptor::list("tokens").inner("items").with_envelope())
        }
    };
    Some(call)
}

fn has_logged_in(user: &Value) -> bool {
    user.get("lastLoginTime")
        .and_then(Value::as_str)
        .map_or(false, |time| time != NO_LOGIN_TIME)
}

fn lowered(record: &Value, field: &str) -> Option<String> {
    record.get(field).and_then(Value::as_str).map(str::to_lowercase)
}

/// Lower-cased addresses of users that signed in at least once
pub fn active_emails(users: &[Value]) -> Vec<String> {
    users
        .iter()
        .filter(|user| has_logged_in(user))
        .filter_map(|user| lowered(user, "primaryEmail"))
        .collect()
}

/// Active users that also have a mailbox set up
pub fn mailbox_emails(users: &[Value]) -> Vec<String> {
    users
        .iter()
        .filter(|user| has_logged_in(user))
        .filter(|user| user.get("isMailboxSetup").and_then(Value::as_bool).unwrap_or(false))
        .filter_map(|user| lowered(user, "primaryEmail"))
        .collect()
}

/// Directory collector acting as the super admin.
pub struct AdminDirectory {
    batch: BatchIterator,
}

impl AdminDirectory {
    pub fn new(driver: CollectionDriver) -> Self {
        Self {
            batch: BatchIterator::new(driver),
        }
    }

    /// One un-retried read of the customer record
    pub fn check_access(&self) -> Result<()> {
        let probe = self.batch.driver().probe(&customer_descriptor());
        if !probe.success {
            bail!(
                "Admin SDK access check failed: {}",
                probe.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }
        Ok(())
    }

    fn raw_active_users(&self) -> Result<Vec<Value>> {
        let descriptor = customer_list("users", "users")
            .param("query", "isSuspended=false")
            .param("maxResults", 500)
            .returning();
        Ok(self.batch.execute(&descriptor).into_returned()?)
    }

    /// Non-suspended users that logged in at least once.
    ///
    /// Served from the cache unless `override_cache` is set; with
    /// `mailbox_setup` the mailbox-enabled cache is refreshed too.
    pub fn active_users(&self, cache: &SubjectCache, override_cache: bool, mailbox_setup: bool) -> Result<Vec<String>> {
        if !override_cache {
            if let Some(users) = cache.load(ACTIVE_USERS_CACHE_FILE)? {
                info!("Users loaded from temp file");
                return Ok(users);
            }
        } else if cache.exists(ACTIVE_USERS_CACHE_FILE) {
            info!("Overriding cache");
        }

        info!("Creating temp file with all active users (non-suspended + have logged in)");
        let records = self.raw_active_users()?;
        let users = active_emails(&records);
        if mailbox_setup {
            self.store_mailbox_users(cache, &records)?;
        }
        cache.store(ACTIVE_USERS_CACHE_FILE, &users)?;
        Ok(users)
    }

    pub fn groups(&self, cache: &SubjectCache, override_cache: bool) -> Result<Vec<String>> {
        if !override_cache {
            if let Some(groups) = cache.load(GROUPS_CACHE_FILE)? {
                info!("Loaded {} groups from temp file", groups.len());
                return Ok(groups);
            }
        } else if cache.exists(GROUPS_CACHE_FILE) {
            info!("Overriding cache");
        }

        info!("Creating temp file with all the groups");
        let records = self
            .batch
            .execute(&customer_list("groups", "groups").returning())
            .into_returned()?;
        let groups: Vec<String> = records.iter().filter_map(|group| lowered(group, "email")).collect();
        cache.store(GROUPS_CACHE_FILE, &groups)?;
        info!(
            "Working with {} groups. First group is: {}",
            groups.len(),
            groups.first().map(String::as_str).unwrap_or("None")
        );
        Ok(groups)
    }

    /// Fetch the users with a mailbox and refresh their cache
    pub fn mailbox_enabled_users(&self, cache: &SubjectCache) -> Result<Vec<String>> {
        let records = self.raw_active_users()?;
        self.store_mailbox_users(cache, &records)
    }

    fn store_mailbox_users(&self, cache: &SubjectCache, records: &[Value]) -> Result<Vec<String>> {
        info!("Gathering all active users with mailbox enabled.");
        let users = mailbox_emails(records);
        if !users.is_empty() {
            cache.store(MAILBOX_USERS_CACHE_FILE, &users)?;
        }
        info!("Collected {} active users with mailbox enabled.", users.len());
        Ok(users)
    }

    /// Collect `action` (every action for `All`).
    ///
    /// Per-user and per-group actions run over `users` / `groups`. A failed
    /// action does not stop the others; the failures are reported together.
    pub fn collect(&mut self, action: DirectoryAction, users: &[String], groups: &[String]) -> Result<()> {
        let mut failures = Vec::new();
        for action in action.expand() {
            let Some(call) = directory_call(action) else {
                continue;
            };
            match call {
                DirectoryCall::Single(descriptor) => track(self.batch.execute(&descriptor), &mut failures),
                DirectoryCall::ForEachUser(template) => {
                    self.batch
                        .execute_for_each(&template, users, &BatchOptions::inject("userKey"));
                }
                DirectoryCall::ForEachGroup(template) => {
                    self.batch
                        .execute_for_each(&template, groups, &BatchOptions::inject("groupKey"));
                }
            }
        }
        settle(MODULE, failures)
    }

    pub fn close(&self) {
        self.batch.close();
    }
}
