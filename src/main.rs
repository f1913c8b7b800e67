#![warn(clippy::all, rust_2018_idioms)]

use anyhow::{bail, Context, Result};
use clap::Parser;
use orgcrawler::app::config::CrawlerConfig;
use orgcrawler::app::crawler::{Crawler, CrawlerOptions};
use orgcrawler::app::credentials::{get_master_account_id, Providers};
use orgcrawler::app::error::CrawlerError;
use orgcrawler::app::format::{format_responses, OutputFormat};
use orgcrawler::app::org::cache::FileCacheStore;
use orgcrawler::app::org::Org;
use orgcrawler::app::payload::{load_payload_file, PayloadDescriptor, PayloadRegistry};
use orgcrawler::app::regions::{parse_region_list, regions_for_service};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;

const LONG_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_COMMIT"), ")");

const DEFAULT_FILTER: &str = "orgcrawler=info,aws_config=warn,aws_sigv4=warn,aws_smithy_runtime=warn,aws_smithy_runtime_api=warn,aws_smithy_http=warn,hyper=warn";

/// Run a payload in every account and region of an AWS organization.
///
/// PAYLOAD is the dotted name of a built-in payload (see --list-payloads), or
/// the name of a definition in --payload-file. PAYLOAD_ARG values are passed
/// to the payload.
///
/// Examples:
///
///   orgcrawler -r OrgMasterRole s3.list_buckets
///   orgcrawler -r OrgMasterRole --account-role S3Admin s3.list_buckets
///   orgcrawler -r OrgMasterRole --service iam iam.get_account_aliases
///   orgcrawler -r OrgMasterRole --accounts app-test,app-prod --regions us-east-1,us-west-2 sts.get_caller_identity
///   orgcrawler -r OrgMasterRole -f my_payloads.yaml prod_aliases
#[derive(Parser, Debug)]
#[command(name = "orgcrawler", version, long_version = LONG_VERSION, verbatim_doc_comment)]
struct Cli {
    /// Payload to run
    #[arg(required_unless_present = "list_payloads")]
    payload: Option<String>,

    /// Arguments passed to the payload
    payload_arg: Vec<String>,

    /// IAM role to assume for accessing the organization master account
    #[arg(short = 'r', long, env = "ORGCRAWLER_MASTER_ROLE")]
    master_role: Option<String>,

    /// IAM role to assume in child accounts [default: --master-role]
    #[arg(short = 'a', long)]
    account_role: Option<String>,

    /// Comma separated accounts to crawl, by id, name or alias [default: all]
    #[arg(long, value_delimiter = ',')]
    accounts: Option<Vec<String>>,

    /// Comma separated regions to crawl [default: all]
    #[arg(long)]
    regions: Option<String>,

    /// Service used to select the region list; global services run once per account
    #[arg(long, conflicts_with = "regions")]
    service: Option<String>,

    /// YAML file with payload definitions
    #[arg(short = 'f', long)]
    payload_file: Option<PathBuf>,

    /// Output format [default: json]
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Maximum number of concurrent API calls
    #[arg(long)]
    concurrency: Option<usize>,

    /// Ignore the organization cache and reload it
    #[arg(long)]
    refresh: bool,

    /// Configuration file [default: platform config dir]/config.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// List the built-in payloads and exit
    #[arg(long)]
    list_payloads: bool,
}

fn init_logging() -> Option<PathBuf> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(DEFAULT_FILTER))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(LevelFilter::WARN);

    let log_file = directories::ProjectDirs::from("com", "", "orgcrawler").and_then(|proj_dirs| {
        let log_dir = proj_dirs.data_dir().join("logs");
        std::fs::create_dir_all(&log_dir).ok()?;
        let log_path = log_dir.join("orgcrawler.log");
        let file = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&log_path)
            .ok()?;

        // Owner read/write only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = file.metadata() {
                let mut perms = metadata.permissions();
                perms.set_mode(0o600);
                if let Err(e) = std::fs::set_permissions(&log_path, perms) {
                    eprintln!("[SECURITY] Failed to set log file permissions: {}", e);
                }
            }
        }
        Some((log_path, file))
    });

    let (log_path, file_layer) = match log_file {
        Some((path, file)) => (
            Some(path),
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false),
            ),
        ),
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer);

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return None;
    }

    // Bridge log crate events to tracing; must run after the subscriber is set
    if let Err(e) = tracing_log::LogTracer::init() {
        tracing::debug!("log-to-tracing bridge not installed: {}", e);
    }

    if let Some(path) = &log_path {
        tracing::info!("Logging initialized to: {:?}", path);
    }
    log_path
}

async fn run(cli: Cli) -> Result<()> {
    let registry = PayloadRegistry::builtin();
    if cli.list_payloads {
        for name in registry.names() {
            println!("{}", name);
        }
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => CrawlerConfig::load_from_file(path)?,
        None => CrawlerConfig::load()?,
    };
    let Some(master_role) = cli.master_role.clone().or_else(|| config.master_role.clone()) else {
        bail!("a master role is required (--master-role or master_role in config.toml)");
    };
    let payload_name = cli.payload.clone().context("PAYLOAD is required")?;

    let descriptor = match &cli.payload_file {
        Some(path) => load_payload_file(path, &payload_name)?,
        None => PayloadDescriptor::by_reference(&payload_name),
    };
    let payload = registry.resolve(&descriptor)?;

    let concurrency = cli.concurrency.unwrap_or_else(|| config.concurrency()).max(1);
    let format = cli.format.unwrap_or_else(|| config.output());

    let providers = Providers::aws().await;
    let master_account_id = get_master_account_id(&providers, &master_role)
        .await?
        .context("Could not determine the organization master account")?;
    tracing::info!("Organization master account: {}", master_account_id);

    let cache_store = match &config.cache_dir {
        Some(dir) => FileCacheStore::new(dir),
        None => FileCacheStore::default_location()?,
    }
    .with_ttl(config.cache_ttl());

    let mut org = Org::new(&master_account_id, &master_role, providers, Arc::new(cache_store))
        .with_concurrency(concurrency);
    if cli.refresh {
        org.refresh().await?;
    } else {
        org.load().await?;
    }

    let regions = if let Some(service) = &cli.service {
        regions_for_service(service)
    } else if let Some(regions) = &cli.regions {
        parse_region_list(regions)
    } else if let Some(service) = payload.service() {
        regions_for_service(service)
    } else {
        Vec::new()
    };

    let options = CrawlerOptions {
        accounts: cli.accounts.clone(),
        regions: Some(regions),
        account_access_role: cli.account_role.clone().or_else(|| config.account_role.clone()),
        concurrency: Some(concurrency),
    };
    let mut crawler = Crawler::new(org, options).await?;
    crawler.load_account_credentials().await?;

    let execution = crawler.execute(payload, &cli.payload_arg).await?;
    println!("{}", format.render(&format_responses(&execution))?);
    Ok(())
}

/// Process exit status for a failed run: 2 when access was denied, 1 otherwise
fn exit_code(error: &anyhow::Error) -> u8 {
    let fatal = error
        .downcast_ref::<CrawlerError>()
        .is_some_and(CrawlerError::is_fatal);
    if fatal {
        2
    } else {
        1
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();
    tracing::info!("orgcrawler {} starting", LONG_VERSION);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!("Run failed: {:?}", e);
            eprintln!("orgcrawler: {:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_for_access_denied() {
        let denied = anyhow::Error::new(CrawlerError::AccessDenied {
            account_id: "123456789012".to_string(),
            role_name: "OrgMasterRole".to_string(),
        });
        assert_eq!(exit_code(&denied), 2);

        // Context added on the way up keeps the exit status
        assert_eq!(exit_code(&denied.context("loading organization")), 2);
    }

    #[test]
    fn test_exit_code_for_other_errors() {
        let assume_role = anyhow::Error::new(CrawlerError::AssumeRole {
            account_id: "123456789012".to_string(),
            role_name: "OrgMasterRole".to_string(),
            message: "RegionDisabledException: STS is not activated".to_string(),
        });
        assert_eq!(exit_code(&assume_role), 1);
        assert_eq!(exit_code(&anyhow::anyhow!("a master role is required")), 1);
    }

    #[test]
    fn test_cli_parses_account_list() {
        let cli = Cli::try_parse_from([
            "orgcrawler",
            "-r",
            "OrgMasterRole",
            "--accounts",
            "app-test,app-prod",
            "s3.list_buckets",
        ])
        .unwrap();
        assert_eq!(
            cli.accounts,
            Some(vec!["app-test".to_string(), "app-prod".to_string()])
        );
        assert_eq!(cli.payload.as_deref(), Some("s3.list_buckets"));
    }
}
