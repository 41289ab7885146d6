//! Gmail API mailbox settings and content, collected as each user.

use std::collections::HashSet;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use log::info;

use crate::cloud::client::ClientFactory;
use crate::collectors::batch::{BatchIterator, BatchOptions, BatchReport};
use crate::collectors::driver::CollectionDriver;
use crate::collectors::workspace::admin_directory::AdminDirectory;
use crate::collectors::workspace::cache::SubjectCache;
use crate::constants::MAILBOX_USERS_CACHE_FILE;
use crate::models::RequestDescriptor;

pub const MODULE: &str = "gmail";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum GmailAction {
    All,
    Threads,
    Thread,
    Messages,
    Message,
    MessageHistory,
    SendAs,
    Delegates,
    AutoForwarding,
    ForwardingAddresses,
    Imap,
    Pop,
    Labels,
    GetAttachment,
}

impl GmailAction {
    /// Mailbox settings collected by `all`
    pub const SETTINGS: [GmailAction; 6] = [
        GmailAction::SendAs,
        GmailAction::Delegates,
        GmailAction::AutoForwarding,
        GmailAction::ForwardingAddresses,
        GmailAction::Imap,
        GmailAction::Pop,
    ];

    pub fn expand(self) -> Vec<GmailAction> {
        match self {
            GmailAction::All => Self::SETTINGS.to_vec(),
            action => vec![action],
        }
    }
}

/// A Gmail collection and the arguments its action needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GmailRequest {
    pub action: GmailAction,
    /// Search query for `threads` / `messages`
    pub query: String,
    pub include_spam_trash: bool,
    /// Thread, message or history id
    pub id: Option<String>,
    pub message_id: Option<String>,
    pub attachment_id: Option<String>,
}

impl GmailRequest {
    pub fn new(action: GmailAction) -> Self {
        Self {
            action,
            query: String::new(),
            include_spam_trash: true,
            id: None,
            message_id: None,
            attachment_id: None,
        }
    }
}

/// A per-user template and the suffix added to its artifact names
#[derive(Debug, Clone, PartialEq)]
pub struct GmailCall {
    pub template: RequestDescriptor,
    pub qualifier: Option<String>,
}

impl GmailCall {
    fn plain(template: RequestDescriptor) -> Self {
        Self {
            template,
            qualifier: None,
        }
    }

    fn qualified(template: RequestDescriptor, qualifier: &str) -> Self {
        Self {
            template,
            qualifier: Some(qualifier.to_string()),
        }
    }
}

fn required<'a>(value: &'a Option<String>, flag: &str, action: GmailAction) -> Result<&'a str> {
    match value.as_deref() {
        Some(value) if !value.is_empty() => Ok(value),
        _ => bail!("--{} is required for gmail {:?}", flag, action),
    }
}

fn mailbox(function: &str) -> RequestDescriptor {
    RequestDescriptor::list(function)
        .base(&["users"])
        .param("userId", "me")
        .with_envelope()
}

fn mailbox_item(function: &str, id: &str) -> RequestDescriptor {
    RequestDescriptor::get(function)
        .base(&["users"])
        .param("userId", "me")
        .param("id", id)
        .with_envelope()
}

fn settings(function: &str) -> RequestDescriptor {
    RequestDescriptor::list(function)
        .base(&["users", "settings"])
        .param("userId", "me")
        .with_envelope()
}

fn settings_getter(function: &str) -> RequestDescriptor {
    RequestDescriptor::invoke(function)
        .base(&["users", "settings"])
        .param("userId", "me")
        .with_envelope()
}

fn search(function: &str, request: &GmailRequest) -> RequestDescriptor {
    mailbox(function)
        .param("includeSpamTrash", request.include_spam_trash)
        .param("q", request.query.as_str())
        .inner(function)
}

fn single(action: GmailAction, request: &GmailRequest) -> Result<GmailCall> {
    let call = match action {
        GmailAction::All => bail!("gmail all has to be expanded before use"),
        GmailAction::Threads => GmailCall::plain(search("threads", request)),
        GmailAction::Messages => GmailCall::plain(search("messages", request)),
        GmailAction::Thread | GmailAction::Message => {
            let function = if action == GmailAction::Thread { "threads" } else { "messages" };
            let id = required(&request.id, "id", action)?;
            GmailCall::qualified(mailbox_item(function, id), id)
        }
        GmailAction::MessageHistory => {
            let id = required(&request.id, "id", action)?;
            let history_id: u64 = id
                .parse()
                .with_context(|| format!("message history id must be numeric, got {}", id))?;
            let template = mailbox("history")
                .param("startHistoryId", history_id.saturating_sub(1))
                .inner("history");
            GmailCall::qualified(template, id)
        }
        GmailAction::SendAs => GmailCall::plain(settings("sendAs").inner("sendAs")),
        GmailAction::Delegates => GmailCall::plain(settings("delegates").inner("delegates")),
        GmailAction::ForwardingAddresses => {
            GmailCall::plain(settings("forwardingAddresses").inner("forwardingAddresses"))
        }
        GmailAction::AutoForwarding => GmailCall::plain(settings_getter("getAutoForwarding")),
        GmailAction::Imap => GmailCall::plain(settings_getter("getImap")),
        GmailAction::Pop => GmailCall::plain(settings_getter("getPop")),
        GmailAction::Labels => GmailCall::plain(mailbox("labels").inner("labels")),
        GmailAction::GetAttachment => {
            let message_id = required(&request.message_id, "message-id", action)?;
            let attachment_id = required(&request.attachment_id, "attachment-id", action)?;
            let template = RequestDescriptor::get("attachments")
                .base(&["users", "messages"])
                .param("userId", "me")
                .param("messageId", message_id)
                .param("id", attachment_id)
                .with_envelope();
            GmailCall::qualified(template, &format!("{}_attachment", message_id))
        }
    };
    Ok(call)
}

/// Per-user calls for a request, `all` expanded
pub fn gmail_calls(request: &GmailRequest) -> Result<Vec<GmailCall>> {
    request
        .action
        .expand()
        .into_iter()
        .map(|action| single(action, request))
        .collect()
}

/// Requested users that have a mailbox, in request order without duplicates
pub fn intersect_users(requested: &[String], mailbox_users: &[String]) -> Vec<String> {
    let enabled: HashSet<&str> = mailbox_users.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    requested
        .iter()
        .filter(|user| enabled.contains(user.as_str()))
        .filter(|user| seen.insert(user.as_str()))
        .cloned()
        .collect()
}

/// Gmail collector; every call is made as the mailbox owner.
pub struct Gmail {
    batch: BatchIterator,
}

impl Gmail {
    /// `driver` carries the service account credentials to delegate from;
    /// `factory` builds a client for each delegated user
    pub fn new(driver: CollectionDriver, factory: Box<dyn ClientFactory>) -> Self {
        Self {
            batch: BatchIterator::new(driver).with_factory(factory),
        }
    }

    /// Users of `requested` with a mailbox, from cache or the directory
    pub fn relevant_users(
        directory: &AdminDirectory,
        cache: &SubjectCache,
        requested: &[String],
        override_cache: bool,
    ) -> Result<Vec<String>> {
        info!("Getting relevant gmail users");
        let cached = if override_cache {
            info!("Overriding cache file");
            None
        } else {
            cache.load(MAILBOX_USERS_CACHE_FILE)?
        };
        let mailbox_users = match cached {
            Some(users) => users,
            None => {
                info!("No cache file found, getting mailbox settings for all users");
                directory.mailbox_enabled_users(cache)?
            }
        };

        let relevant = intersect_users(requested, &mailbox_users);
        info!(
            "Got {} total users, retrieved {} gmail users, {} after comparison.",
            requested.len(),
            mailbox_users.len(),
            relevant.len()
        );
        Ok(relevant)
    }

    pub fn collect(&mut self, request: &GmailRequest, users: &[String]) -> Result<BatchReport> {
        let calls = gmail_calls(request)?;
        let mut report = BatchReport::default();
        for call in calls {
            let mut options = BatchOptions::default().delegated().keyed("user");
            if let Some(qualifier) = &call.qualifier {
                options = options.qualified(qualifier);
            }
            report.merge(self.batch.execute_for_each(&call.template, users, &options));
        }
        Ok(report)
    }

    /// Delegated credentials derived so far
    pub fn cached_delegates(&self) -> usize {
        self.batch.cached_delegates()
    }

    pub fn close(&self) {
        self.batch.close();
    }
}
