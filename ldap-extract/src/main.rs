use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use extractors::{DirectoryExtractor, LdapConnector, OutputOptions};
use shared_types::{ExtractionError, OutputFormat, RunSummary};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;

mod config;

use config::SearchOverrides;

#[derive(Parser, Debug)]
#[command(
    name = "ldap-extract",
    version,
    about = "Extract entries from an LDAP / Active Directory server into a JSON file"
)]
struct Cli {
    /// Config file with one section per domain (.ini or .toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Domain section to use; optional when the config has only one
    #[arg(short, long)]
    domain: Option<String>,

    /// LDAP search filter
    #[arg(short, long, value_name = "FILTER")]
    search: Option<String>,

    /// Output file [default: <timestamp>-<domain>_ad.<ext>]
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Output file type: json or jsonl
    #[arg(short = 't', long = "file-type", default_value = "json")]
    file_type: OutputFormat,

    /// Comma separated attributes to fetch (default: all)
    #[arg(long, value_delimiter = ',')]
    attributes: Vec<String>,

    /// Stamp each record with the extraction time
    #[arg(long)]
    extract_time: bool,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Raise the log level when RUST_LOG is unset (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    let guard = init_tracing(cli.log_file.as_deref(), cli.verbose);

    match run(cli).await {
        Ok(summary) => {
            println!(
                "Wrote {} records to {}",
                summary.records,
                summary.output.display()
            );
        }
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "Extraction failed");
            eprintln!("Error: {err:#}");
            drop(guard);
            std::process::exit(exit_code(&err));
        }
    }
}

async fn run(cli: Cli) -> Result<RunSummary> {
    let config_path = cli.config.unwrap_or_else(config::get_config_path);

    let domains = config::load_domains(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    let (domain, raw) = config::select_domain(domains, cli.domain.as_deref())?;

    let overrides = SearchOverrides {
        filter: cli.search,
        attributes: cli.attributes,
    };
    let extractor_config = raw
        .into_extractor_config(&overrides)
        .with_context(|| format!("Invalid configuration for domain '{}'", domain))?;

    tracing::debug!(config = ?extractor_config, "Loaded configuration");

    let output = cli.output.unwrap_or_else(|| {
        extractors::output::default_output_path(&domain, cli.file_type, chrono::Utc::now())
    });

    tracing::info!(
        domain = %domain,
        server = %extractor_config.connection.server,
        base_dn = %extractor_config.search.base_dn,
        output = %output.display(),
        "Starting extraction"
    );

    let options = OutputOptions {
        path: output,
        format: cli.file_type,
        stamp_extract_time: cli.extract_time,
    };

    let summary = DirectoryExtractor::new(&extractor_config, LdapConnector)
        .run(&options)
        .await?;

    Ok(summary)
}

fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<ExtractionError>())
        .map(ExtractionError::exit_code)
        .unwrap_or(1)
}

fn init_tracing(log_file: Option<&Path>, verbose: u8) -> Option<WorkerGuard> {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    if let Some(log_path) = log_file {
        let file_appender = tracing_appender::rolling::never(
            log_path.parent().unwrap_or(Path::new(".")),
            log_path
                .file_name()
                .unwrap_or(std::ffi::OsStr::new("ldap-extract.log")),
        );
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(non_blocking),
            )
            .init();

        Some(guard)
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        None
    }
}
