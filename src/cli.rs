use std::path::PathBuf;

use anyhow::{bail, Result};
use chrono::NaiveDateTime;
use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::collectors::gcp::{self, asset_inventory, logging, GcpRequest, LogSelection};
use crate::collectors::split_list;
use crate::collectors::workspace::gmail::gmail_calls;
use crate::collectors::workspace::log_events::{all_applications, check_apps, ALL_APPLICATIONS};
use crate::collectors::workspace::{ActivityWindow, DirectoryAction, GmailAction, GmailRequest, Subjects, WorkspaceRequest};
use crate::constants::{ALL_GROUPS_KEYWORD, ALL_LOGS_KEYWORD, ALL_USERS_KEYWORD, RFC3339_FORMAT};

/// Command-line arguments for the cirrus collector.
///
/// `gw` collects from Google Workspace / Cloud Identity, `gcp` from Google
/// Cloud Platform. Both write JSON artifacts and a running log.
#[derive(Parser, Debug)]
#[clap(name = "cirrus", about = "Google Workspace and Google Cloud Platform forensic collector")]
pub struct Args {
    /// Verbose logging
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Path to configuration YAML file
    #[clap(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Google Workspace and Cloud Identity collection
    Gw(GwArgs),

    /// Google Cloud Platform collection
    Gcp(GcpArgs),

    /// Create a default configuration file
    InitConfig {
        /// Path to output configuration file
        #[clap(default_value = "config.yaml")]
        path: PathBuf,
    },
}

/// Accept only `%Y-%m-%dT%H:%M:%SZ` timestamps
pub fn parse_time(value: &str) -> Result<String, String> {
    NaiveDateTime::parse_from_str(value, RFC3339_FORMAT)
        .map(|_| value.to_string())
        .map_err(|_| format!("Time fields should match RFC3339 date format: {}", RFC3339_FORMAT))
}

#[derive(ClapArgs, Debug)]
pub struct GwArgs {
    /// Path to the service account JSON key file
    #[clap(long)]
    pub key_file: PathBuf,

    /// Super admin email the service account acts as
    #[clap(long)]
    pub super_admin: String,

    /// Output folder (default: "output")
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Running log file path
    #[clap(long)]
    pub log_file: Option<PathBuf>,

    /// Refresh the cached user and group lists
    #[clap(long)]
    pub override_cache: bool,

    #[clap(subcommand)]
    pub module: GwModule,
}

#[derive(Subcommand, Debug)]
pub enum GwModule {
    /// Administrator information about domains, users, groups, etc.
    #[clap(name = "admin_directory")]
    AdminDirectory(DirectoryArgs),

    /// Logs generated from application and user activity
    Logs(ActivityArgs),

    /// User mailbox configurations and data
    Gmail(GmailArgs),

    /// Everything not considered on-demand
    All,
}

#[derive(ClapArgs, Debug)]
pub struct DirectoryArgs {
    #[clap(value_enum)]
    pub action: DirectoryAction,

    /// Comma separated users for asps / tokens ("all_users" for every user)
    #[clap(long)]
    pub users: Option<String>,

    /// Comma separated groups for members ("all_groups" for every group)
    #[clap(long)]
    pub groups: Option<String>,
}

#[derive(ClapArgs, Debug)]
pub struct ActivityArgs {
    /// Comma separated applications ("all_logs" for every application)
    #[clap(long)]
    pub logs: String,

    /// Comma separated users ("all_users" for every user)
    #[clap(long)]
    pub users: String,

    #[clap(long, value_parser = parse_time)]
    pub start_time: Option<String>,

    #[clap(long, value_parser = parse_time)]
    pub end_time: Option<String>,
}

#[derive(ClapArgs, Debug)]
pub struct GmailArgs {
    #[clap(value_enum)]
    pub action: GmailAction,

    /// Comma separated users ("all_users" for every mailbox)
    #[clap(long)]
    pub users: String,

    /// Search query for threads / messages
    #[clap(long)]
    pub query: Option<String>,

    /// Leave trash and spam out of threads / messages searches
    #[clap(long)]
    pub exclude_trash_spam: bool,

    /// Thread, message or history id
    #[clap(long)]
    pub id: Option<String>,

    #[clap(long)]
    pub message_id: Option<String>,

    #[clap(long)]
    pub attachment_id: Option<String>,
}

impl GwArgs {
    /// Validated collection request
    pub fn request(&self) -> Result<WorkspaceRequest> {
        match &self.module {
            GwModule::AdminDirectory(args) => args.request(),
            GwModule::Logs(args) => args.request(),
            GwModule::Gmail(args) => args.request(),
            GwModule::All => Ok(WorkspaceRequest::All),
        }
    }
}

impl DirectoryArgs {
    fn request(&self) -> Result<WorkspaceRequest> {
        let users = match (&self.users, self.action) {
            (Some(users), _) => Subjects::parse(users, ALL_USERS_KEYWORD),
            (None, DirectoryAction::Asps | DirectoryAction::Tokens) => {
                bail!("--users is required for {:?}", self.action)
            }
            (None, _) => Subjects::none(),
        };
        let groups = match (&self.groups, self.action) {
            (Some(groups), _) => Subjects::parse(groups, ALL_GROUPS_KEYWORD),
            (None, DirectoryAction::Members) => bail!("--groups is required for Members"),
            (None, _) => Subjects::none(),
        };
        Ok(WorkspaceRequest::AdminDirectory {
            action: self.action,
            users,
            groups,
        })
    }
}

impl ActivityArgs {
    fn request(&self) -> Result<WorkspaceRequest> {
        let applications = if self.logs == ALL_LOGS_KEYWORD {
            all_applications()
        } else {
            let apps = split_list(&self.logs);
            if apps.is_empty() || !check_apps(&apps) {
                bail!("specified logs should be one of: {:?}", ALL_APPLICATIONS);
            }
            apps
        };
        Ok(WorkspaceRequest::Logs {
            applications,
            users: Subjects::parse(&self.users, ALL_USERS_KEYWORD),
            window: ActivityWindow {
                start_time: self.start_time.clone(),
                end_time: self.end_time.clone(),
            },
        })
    }
}

impl GmailArgs {
    fn request(&self) -> Result<WorkspaceRequest> {
        let mut request = GmailRequest::new(self.action);
        request.query = self.query.clone().unwrap_or_default();
        request.include_spam_trash = !self.exclude_trash_spam;
        request.id = self.id.clone();
        request.message_id = self.message_id.clone();
        request.attachment_id = self.attachment_id.clone();
        // rejects missing ids before any call is made
        gmail_calls(&request)?;
        Ok(WorkspaceRequest::Gmail {
            request,
            users: Subjects::parse(&self.users, ALL_USERS_KEYWORD),
        })
    }
}

#[derive(ClapArgs, Debug)]
pub struct GcpArgs {
    /// Path to the service account JSON key file
    #[clap(long)]
    pub key_file: PathBuf,

    /// Output folder (default: "output")
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Running log file path
    #[clap(long)]
    pub log_file: Option<PathBuf>,

    #[clap(subcommand)]
    pub module: GcpModule,
}

#[derive(Subcommand, Debug)]
pub enum GcpModule {
    /// Collect historical GCP logging data
    Logs(GcpLogsArgs),

    /// Collect current GCP configuration data
    Configurations(ConfigurationsArgs),
}

/// Comma separated ids per resource tier
#[derive(ClapArgs, Debug, Default)]
pub struct ResourceArgs {
    #[clap(long)]
    pub project_id: Option<String>,

    #[clap(long)]
    pub folder_id: Option<String>,

    /// A single organization id
    #[clap(long)]
    pub organization_id: Option<String>,
}

impl ResourceArgs {
    fn tiers(&self) -> usize {
        [&self.project_id, &self.folder_id, &self.organization_id]
            .iter()
            .filter(|tier| tier.is_some())
            .count()
    }

    fn resource_ids(&self) -> Result<Vec<String>> {
        if self.tiers() == 0 {
            bail!(
                "specify at least one resource type with the corresponding resource ID(s): \
                 [--project-id ID1,ID2...] [--folder-id ID1,ID2...] [--organization-id ID]"
            );
        }
        gcp::resource_ids(
            self.project_id.as_deref(),
            self.folder_id.as_deref(),
            self.organization_id.as_deref(),
        )
    }
}

#[derive(ClapArgs, Debug)]
pub struct GcpLogsArgs {
    /// Comma separated supported logs ("all_logs" for every supported log)
    #[clap(long)]
    pub logs: Option<String>,

    /// Comma separated custom log names
    #[clap(long)]
    pub custom_logs: Option<String>,

    #[clap(flatten)]
    pub resources: ResourceArgs,

    #[clap(long, value_parser = parse_time)]
    pub start_time: Option<String>,

    #[clap(long, value_parser = parse_time)]
    pub end_time: Option<String>,

    /// List the logs available under the resources instead of collecting
    #[clap(long)]
    pub preview: bool,
}

#[derive(ClapArgs, Debug)]
pub struct ConfigurationsArgs {
    /// Comma separated configurations
    #[clap(long)]
    pub configs: String,

    #[clap(flatten)]
    pub resources: ResourceArgs,
}

impl GcpArgs {
    /// Validated collection request
    pub fn request(&self) -> Result<GcpRequest> {
        match &self.module {
            GcpModule::Logs(args) => args.request(),
            GcpModule::Configurations(args) => args.request(),
        }
    }
}

impl GcpLogsArgs {
    fn request(&self) -> Result<GcpRequest> {
        let resource_ids = self.resources.resource_ids()?;
        if self.preview {
            return Ok(GcpRequest::Preview { resource_ids });
        }
        if self.logs.is_none() && self.custom_logs.is_none() {
            bail!("specify at least one action: [--logs LOG1,LOG2..] or [--custom-logs CL1,CL2..] or [--preview]");
        }
        let (start_time, end_time) = match (&self.start_time, &self.end_time) {
            (Some(start), Some(end)) => (start.clone(), end.clone()),
            _ => bail!("specify start and end timestamps: [--start-time YYYY-MM-DDTHH:MM:SSZ] [--end-time YYYY-MM-DDTHH:MM:SSZ]"),
        };
        let logs = self.logs.as_deref().map(split_list).unwrap_or_default();
        if !logging::check_logs(&logs) {
            bail!("specified logs should be one of: {:?}", logging::SUPPORTED_LOGS);
        }
        Ok(GcpRequest::Logs {
            resource_ids,
            selection: LogSelection {
                logs,
                custom_logs: self.custom_logs.as_deref().map(split_list).unwrap_or_default(),
                start_time,
                end_time,
            },
        })
    }
}

impl ConfigurationsArgs {
    fn request(&self) -> Result<GcpRequest> {
        if self.resources.tiers() > 1 {
            bail!("specify one resource tier at a time: [--project-id ID1,ID2.. | --folder-id ID1,ID2.. | --organization-id ID]");
        }
        let configs = split_list(&self.configs);
        if configs.is_empty() || !asset_inventory::check_configs(&configs) {
            bail!("specified configs should be one of: {:?}", asset_inventory::SUPPORTED_CONFIGS);
        }
        if self.resources.project_id.is_some()
            && configs
                .iter()
                .any(|config| config == "gcp_map" || config == asset_inventory::ALL_CONFIGS)
        {
            bail!("resource hierarchy mapping only available when given access at the folder or org level");
        }
        Ok(GcpRequest::Configurations {
            resource_ids: self.resources.resource_ids()?,
            configs,
        })
    }
}
