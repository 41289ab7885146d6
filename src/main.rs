use std::env;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use log::{error, info, warn, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use cirrus_collector::cli::{Args, Commands, GcpArgs, GwArgs};
use cirrus_collector::cloud::{
    ClientFactory, Credentials, DiscoveryCache, EnvTokenSource, RestClientFactory, ServiceAccountCredentials,
    ServiceAccountKey, ServiceEndpoint, TokenSource,
};
use cirrus_collector::collectors::gcp::{self, GcpRequest, GcpServices};
use cirrus_collector::collectors::workspace::{self, SubjectCache, WorkspaceRequest, WorkspaceServices};
use cirrus_collector::config::{load_or_create_config, CollectorConfig};
use cirrus_collector::constants::{CLOUD_PLATFORM_SCOPES, LOG_PREVIEW_FILE, WORKSPACE_SCOPES};
use cirrus_collector::security::{safe_error_message, scrub_credentials};
use cirrus_collector::utils::output::{FileSink, OutputSink};
use cirrus_collector::utils::summary::write_run_summary;

fn main() {
    let args = Args::parse();

    if let Err(e) = initialize_logging(args.verbose) {
        eprintln!("{:#}", e);
    }

    if let Err(e) = run(args) {
        error!("{}", safe_error_message("Collection failed", &format!("{:#}", e)));
        process::exit(1);
    }
}

/// Initialize logging with the specified verbosity level
fn initialize_logging(verbose: bool) -> Result<()> {
    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    TermLogger::init(log_level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto)
        .context("Failed to initialize logger")?;
    Ok(())
}

fn run(args: Args) -> Result<()> {
    match &args.command {
        Commands::InitConfig { path } => {
            info!("Creating default configuration file at {}", path.display());
            CollectorConfig::create_default_config_file(path)?;
            info!("Configuration created successfully");
            Ok(())
        }
        Commands::Gw(gw) => {
            // invalid arguments never create output
            let request = gw.request()?;
            let config = load_config(args.config.as_deref(), gw.output.as_deref(), gw.log_file.as_deref())?;
            with_sink(&config, |sink| collect_workspace(gw, &request, &config, sink))
        }
        Commands::Gcp(gcp_args) => {
            let request = gcp_args.request()?;
            let config = load_config(
                args.config.as_deref(),
                gcp_args.output.as_deref(),
                gcp_args.log_file.as_deref(),
            )?;
            with_sink(&config, |sink| collect_gcp(gcp_args, &request, &config, sink))
        }
    }
}

fn load_config(path: Option<&Path>, output: Option<&Path>, log_file: Option<&Path>) -> Result<CollectorConfig> {
    Ok(load_or_create_config(path)?.with_overrides(output, log_file))
}

/// Open the output sink, run `job` against it and close the run in the running log.
///
/// The run summary is written whether or not the job failed, so artifacts
/// from a failed run are still accounted for.
fn with_sink<F>(config: &CollectorConfig, job: F) -> Result<()>
where
    F: FnOnce(Arc<dyn OutputSink>) -> Result<()>,
{
    let command_line = scrub_credentials(&env::args().collect::<Vec<_>>().join(" "));
    let sink = Arc::new(FileSink::new(&config.output_folder, &config.log_file, &command_line)?);
    let started = Utc::now();
    info!("Writing artifacts to {}", sink.folder().display());

    let result = job(Arc::clone(&sink) as Arc<dyn OutputSink>);

    match write_run_summary(&sink, started) {
        Ok(path) => info!("Run summary written to {}", path.display()),
        Err(e) => warn!("{}", safe_error_message("Failed to write run summary", &e)),
    }

    match result {
        Ok(()) => {
            let minutes = (Utc::now() - started).num_seconds() as f64 / 60.0;
            sink.append_note(&format!("Finished in {:.2} minutes", minutes))?;
            info!("Finished in {:.2} minutes", minutes);
            Ok(())
        }
        Err(e) => {
            let message = scrub_credentials(&format!("ERROR => {:#}", e));
            if let Err(log_error) = sink.append_note(&message) {
                warn!("{}", safe_error_message("Failed to write to the running log", &log_error));
            }
            Err(e)
        }
    }
}

fn rest_factory(
    endpoint: ServiceEndpoint,
    tokens: &Arc<dyn TokenSource>,
    discovery: &Arc<DiscoveryCache>,
) -> Box<dyn ClientFactory> {
    Box::new(RestClientFactory::new(endpoint, Arc::clone(tokens), Arc::clone(discovery)))
}

fn token_source(config: &CollectorConfig) -> Arc<dyn TokenSource> {
    Arc::new(EnvTokenSource::new(&config.token_env_var))
}

fn collect_workspace(
    gw: &GwArgs,
    request: &WorkspaceRequest,
    config: &CollectorConfig,
    sink: Arc<dyn OutputSink>,
) -> Result<()> {
    let key = ServiceAccountKey::load(&gw.key_file)?;
    let service_account: Arc<dyn Credentials> = Arc::new(ServiceAccountCredentials::new(key, WORKSPACE_SCOPES));
    let super_admin = service_account.derive_scoped(&gw.super_admin)?;
    info!("Collecting Google Workspace data as {}", super_admin.identity());

    let tokens = token_source(config);
    let discovery = Arc::new(DiscoveryCache::new());
    let services = WorkspaceServices {
        sink,
        service_account,
        super_admin,
        directory: rest_factory(ServiceEndpoint::admin_directory(), &tokens, &discovery),
        reports: rest_factory(ServiceEndpoint::admin_reports(), &tokens, &discovery),
        gmail: rest_factory(ServiceEndpoint::gmail(), &tokens, &discovery),
        cache: SubjectCache::new(&config.cache_folder),
        limits: config.driver_limits(),
    };
    workspace::run(services, request, gw.override_cache)
}

fn collect_gcp(gcp_args: &GcpArgs, request: &GcpRequest, config: &CollectorConfig, sink: Arc<dyn OutputSink>) -> Result<()> {
    let key = ServiceAccountKey::load(&gcp_args.key_file)?;
    let credentials: Arc<dyn Credentials> = Arc::new(ServiceAccountCredentials::new(key, CLOUD_PLATFORM_SCOPES));
    info!("Collecting Google Cloud Platform data as {}", credentials.identity());

    let tokens = token_source(config);
    let discovery = Arc::new(DiscoveryCache::new());
    let preview_tracker: PathBuf = config.output_folder.join(LOG_PREVIEW_FILE);
    let services = GcpServices {
        sink,
        credentials,
        logging: rest_factory(ServiceEndpoint::logging(), &tokens, &discovery),
        assets: rest_factory(ServiceEndpoint::cloud_asset(), &tokens, &discovery),
        preview_tracker,
        limits: config.driver_limits(),
    };
    gcp::run(services, request)
}
