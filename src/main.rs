//! Log Triage - command line interface
//!
//! Scans a log file for known errors using a catalog of error mappings and
//! prints the matches with their interpretations.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log_triage::config::{resolve_config, Config};
use log_triage::engine::validate_catalog;
use log_triage::{report, CatalogSource, TriageEngine, TriageError, TriageRequest};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "log-triage")]
#[command(version, about = "Scan log files for known errors")]
struct Cli {
    /// Path to a YAML config file (default: ~/.log-triage/config.yaml)
    #[arg(long, global = true, env = "LOG_TRIAGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a log file against the error mappings
    Scan {
        /// Path to the log file to analyze
        #[arg(short, long)]
        logfile: PathBuf,

        /// Maximum number of errors to display (default: show all)
        #[arg(short = 'e', long = "errors", allow_negative_numbers = true)]
        max_errors: Option<i64>,

        /// Custom error mappings (.xlsx, .xls, .csv, .tsv, .yaml, .json)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Match patterns regardless of case
        #[arg(short = 'i', long)]
        case_insensitive: bool,

        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that an error mappings file loads
    Validate {
        /// Error mappings file to validate
        #[arg(long)]
        catalog: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let log_path = get_log_file_path();
    init_logging(&log_path)?;

    tracing::info!("Starting Log Triage v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Log file: {}", log_path.display());

    let mut config = resolve_config(cli.config.as_deref()).context("Failed to load configuration")?;

    let outcome = match cli.command {
        Commands::Scan {
            logfile,
            max_errors,
            catalog,
            case_insensitive,
            json,
        } => {
            config.settings.case_insensitive |= case_insensitive;
            let max_errors = max_errors.or(config.settings.max_errors);
            run_scan(&config, &logfile, max_errors, catalog.as_deref(), json).await
        }
        Commands::Validate { catalog } => run_validate(&config, &catalog).await,
    };

    match outcome {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            tracing::error!("{:#}", e);
            match e.downcast_ref::<TriageError>() {
                Some(triage_error) => {
                    eprintln!("{}", serde_json::to_string_pretty(&triage_error.to_response())?)
                }
                None => eprintln!("Error: {:#}", e),
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Initialize logging to stderr and to the dated log file
fn init_logging(log_path: &Path) -> Result<()> {
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_writer(Mutex::new(log_file)).with_ansi(false))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    Ok(())
}

/// Get the log file path in user's home directory or temp directory
fn get_log_file_path() -> PathBuf {
    let log_dir = if let Some(home) = dirs::home_dir() {
        home.join(".log-triage")
    } else {
        std::env::temp_dir().join("log-triage")
    };

    // Create directory if it doesn't exist
    fs::create_dir_all(&log_dir).ok();

    let date = chrono::Local::now().format("%Y-%m-%d");
    log_dir.join(format!("triage-{}.log", date))
}

async fn run_scan(
    config: &Config,
    logfile: &Path,
    max_errors: Option<i64>,
    catalog: Option<&Path>,
    json: bool,
) -> Result<()> {
    let custom = catalog.map(CatalogSource::from_path).transpose()?;
    let engine = TriageEngine::from_config_with(config, custom.as_ref())?;

    let file = tokio::fs::File::open(logfile)
        .await
        .map_err(TriageError::from)?;
    let size = file.metadata().await.map_err(TriageError::from)?.len();
    tracing::info!("Scanning log file: {} ({} bytes)", logfile.display(), size);

    let log_filename = logfile
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| logfile.display().to_string());

    let mut request = TriageRequest::new(tokio::io::BufReader::new(file), log_filename);
    if let Some(max) = max_errors {
        request = request.with_max_errors(max);
    }

    let response = tokio::select! {
        result = engine.triage_async(request) => result?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nOperation cancelled by user.");
            std::process::exit(1);
        }
    };

    if json {
        println!("{}", report::render_json(&response).context("Failed to serialize response")?);
    } else {
        print!("{}", report::render_text(&response));
        println!("\nScan complete. Total errors found: {}", response.total_errors);
    }

    Ok(())
}

async fn run_validate(config: &Config, catalog: &Path) -> Result<()> {
    let validation = validate_catalog(&CatalogSource::from_path(catalog)?, config.match_options());

    println!("{}", report::render_json(&validation).context("Failed to serialize validation")?);

    if validation.valid {
        Ok(())
    } else {
        Err(TriageError::CatalogLoad(
            validation.error.unwrap_or_else(|| "invalid catalog".to_string()),
        )
        .into())
    }
}
