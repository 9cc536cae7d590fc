//! Flux Sync CLI - Command-line interface for Synheart Sync
//!
//! Commands:
//! - backfill: Sync resources over a window from a record fixture
//! - changes: Sync resources from the change feed since the saved token
//! - resources: List resource names and the record kinds behind them
//! - doctor: Diagnose configuration and token store

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use synheart_sync::pipeline::resource_kinds;
use synheart_sync::token::FileTokenStore;
use synheart_sync::uploader::JsonLinesUploader;
use synheart_sync::{
    BackfillRequest, ChangeTokenStore, IncrementalRequest, MemorySource, Resource, StatusEvent,
    StatusSink, SyncConfig, SyncError, SyncOrchestrator, SyncReport, TimeWindow, PRODUCER_NAME,
    SYNC_VERSION,
};

/// Flux Sync - On-device health record sync engine
#[derive(Parser)]
#[command(name = "flux-sync")]
#[command(author = "Synheart AI Inc")]
#[command(version = SYNC_VERSION)]
#[command(about = "Normalize and sync health records", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync resources over an explicit window
    Backfill {
        /// Record fixture (JSON)
        #[arg(short, long)]
        fixture: PathBuf,

        /// Account the payloads belong to
        #[arg(long)]
        account: String,

        /// Window start (RFC 3339)
        #[arg(long)]
        start: DateTime<Utc>,

        /// Window end, exclusive (RFC 3339)
        #[arg(long)]
        end: DateTime<Utc>,

        /// Resources to sync (comma separated); all when omitted
        #[arg(long, value_delimiter = ',')]
        resources: Vec<Resource>,
    },

    /// Sync resources changed since the saved change token
    Changes {
        /// Record fixture (JSON)
        #[arg(short, long)]
        fixture: PathBuf,

        /// Account the payloads belong to
        #[arg(long)]
        account: String,

        /// Resources to sync (comma separated); all when omitted
        #[arg(long, value_delimiter = ',')]
        resources: Vec<Resource>,

        /// Hold back records ending at or after this instant (RFC 3339)
        #[arg(long)]
        cutoff: Option<DateTime<Utc>>,
    },

    /// List resources and their record kinds
    Resources {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and token store
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), SyncCliError> {
    let config = SyncConfig::load_from(cli.config.as_deref())?;

    match cli.command {
        Commands::Backfill {
            fixture,
            account,
            start,
            end,
            resources,
        } => {
            let request = BackfillRequest {
                account_id: account,
                window: TimeWindow::new(start, end),
                resources: requested_or_all(resources),
            };
            let orchestrator = build_orchestrator(&config, &fixture)?;
            let report = block_on(orchestrator.backfill(&request))??;
            print_report(&report)
        }

        Commands::Changes {
            fixture,
            account,
            resources,
            cutoff,
        } => {
            let request = IncrementalRequest {
                account_id: account,
                resources: requested_or_all(resources),
                cutoff,
            };
            let orchestrator = build_orchestrator(&config, &fixture)?;
            let report = block_on(orchestrator.sync_changes(&request))??;
            print_report(&report)
        }

        Commands::Resources { json } => cmd_resources(json),

        Commands::Doctor { json } => cmd_doctor(&config, json),
    }
}

fn requested_or_all(resources: Vec<Resource>) -> Vec<Resource> {
    if resources.is_empty() {
        Resource::ALL
            .into_iter()
            .filter(|resource| !resource.is_sub_resource())
            .collect()
    } else {
        resources
    }
}

fn block_on<F: std::future::Future>(future: F) -> Result<F::Output, SyncCliError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    Ok(runtime.block_on(future))
}

fn build_orchestrator(config: &SyncConfig, fixture: &Path) -> Result<SyncOrchestrator, SyncCliError> {
    let json = fs::read_to_string(fixture)?;
    let source = Arc::new(MemorySource::from_fixture_json(&json)?);
    let tokens = Arc::new(FileTokenStore::new(config.change_token_path.clone()));

    Ok(SyncOrchestrator::new(
        source,
        Arc::new(JsonLinesUploader::stdout()),
        Arc::new(ConsoleStatusSink::new()),
        tokens,
        config,
    )?)
}

fn print_report(report: &SyncReport) -> Result<(), SyncCliError> {
    eprintln!("{}", serde_json::to_string(report)?);
    Ok(())
}

/// Status events on stderr: text on a terminal, JSON lines otherwise
struct ConsoleStatusSink {
    interactive: bool,
}

impl ConsoleStatusSink {
    fn new() -> Self {
        Self {
            interactive: atty::is(atty::Stream::Stderr),
        }
    }
}

impl StatusSink for ConsoleStatusSink {
    fn report(&self, event: StatusEvent) {
        if self.interactive {
            eprintln!("{:<24} {}", event.resource, event.status);
        } else if let Ok(line) = serde_json::to_string(&event) {
            eprintln!("{}", line);
        }
    }
}

fn shape(resource: Resource) -> &'static str {
    match resource.remapped() {
        Resource::Profile
        | Resource::Body
        | Resource::Workout
        | Resource::Activity
        | Resource::Sleep => "summary",
        _ => "time_series",
    }
}

#[derive(serde::Serialize)]
struct ResourceInfo {
    name: &'static str,
    shape: &'static str,
    record_kinds: Vec<&'static str>,
    alias_of: Option<&'static str>,
}

fn cmd_resources(json: bool) -> Result<(), SyncCliError> {
    let infos: Vec<ResourceInfo> = Resource::ALL
        .into_iter()
        .map(|resource| ResourceInfo {
            name: resource.as_str(),
            shape: shape(resource),
            record_kinds: resource_kinds(resource).iter().map(|k| k.as_str()).collect(),
            alias_of: resource
                .is_sub_resource()
                .then(|| resource.remapped().as_str()),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
    } else {
        for info in &infos {
            let alias = info
                .alias_of
                .map(|parent| format!(" (alias of {})", parent))
                .unwrap_or_default();
            println!(
                "{:<24} {:<12} {}{}",
                info.name,
                info.shape,
                info.record_kinds.join(", "),
                alias
            );
        }
    }

    Ok(())
}

fn cmd_doctor(config: &SyncConfig, json: bool) -> Result<(), SyncCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "sync_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Sync version {}", SYNC_VERSION),
    });

    checks.push(match config.time_zone() {
        Ok(tz) => DoctorCheck {
            name: "time_zone".to_string(),
            status: CheckStatus::Ok,
            message: format!("Activity days bucketed in {}", tz.name()),
        },
        Err(e) => DoctorCheck {
            name: "time_zone".to_string(),
            status: CheckStatus::Error,
            message: e.to_string(),
        },
    });

    let store = FileTokenStore::new(config.change_token_path.clone());
    checks.push(match store.load() {
        Ok(Some(token)) => DoctorCheck {
            name: "change_token".to_string(),
            status: CheckStatus::Ok,
            message: format!("Token {} at {}", token, store.path().display()),
        },
        Ok(None) => DoctorCheck {
            name: "change_token".to_string(),
            status: CheckStatus::Warning,
            message: format!(
                "No token at {}; run backfill before changes",
                store.path().display()
            ),
        },
        Err(e) => DoctorCheck {
            name: "change_token".to_string(),
            status: CheckStatus::Error,
            message: format!("Cannot read {}: {}", store.path().display(), e),
        },
    });

    checks.push(DoctorCheck {
        name: "status_delay".to_string(),
        status: CheckStatus::Ok,
        message: format!("{} ms after each status event", config.status_delay_ms),
    });

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: SYNC_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Flux Sync Doctor Report");
        println!("=======================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(SyncCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum SyncCliError {
    Sync(SyncError),
    Io(io::Error),
    Json(serde_json::Error),
    DoctorFailed,
}

impl From<SyncError> for SyncCliError {
    fn from(e: SyncError) -> Self {
        SyncCliError::Sync(e)
    }
}

impl From<io::Error> for SyncCliError {
    fn from(e: io::Error) -> Self {
        SyncCliError::Io(e)
    }
}

impl From<serde_json::Error> for SyncCliError {
    fn from(e: serde_json::Error) -> Self {
        SyncCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(code: &str, message: String, hint: Option<&str>) -> Self {
        CliError {
            code: code.to_string(),
            message,
            hint: hint.map(str::to_string),
        }
    }
}

impl From<SyncCliError> for CliError {
    fn from(e: SyncCliError) -> Self {
        match e {
            SyncCliError::Sync(e) => {
                let message = e.to_string();
                match e {
                    SyncError::MissingChangeToken => CliError::new(
                        "MISSING_CHANGE_TOKEN",
                        message,
                        Some("Run `flux-sync backfill` first to establish a change token"),
                    ),
                    SyncError::InvalidResourceState(_) => {
                        CliError::new("INVALID_RESOURCE_STATE", message, None)
                    }
                    SyncError::InvalidTimezone(_) => CliError::new(
                        "INVALID_TIMEZONE",
                        message,
                        Some("Use an IANA zone name such as America/New_York"),
                    ),
                    SyncError::Config(_) => CliError::new(
                        "CONFIG_ERROR",
                        message,
                        Some("Check the config file and SYNHEART_SYNC_* variables"),
                    ),
                    SyncError::Json(_) | SyncError::Validation(_) => CliError::new(
                        "FIXTURE_ERROR",
                        message,
                        Some("Ensure the fixture holds {\"granted\": [...], \"records\": [...]}"),
                    ),
                    e if e.is_retryable() => CliError::new(
                        "UPSTREAM_FAILURE",
                        message,
                        Some("Retry the sync; the change token was not advanced"),
                    ),
                    _ => CliError::new("SYNC_ERROR", message, None),
                }
            }
            SyncCliError::Io(e) => CliError::new(
                "IO_ERROR",
                e.to_string(),
                Some("Check file paths and permissions"),
            ),
            SyncCliError::Json(e) => CliError::new("JSON_ERROR", e.to_string(), None),
            SyncCliError::DoctorFailed => CliError::new(
                "DOCTOR_FAILED",
                "One or more checks failed".to_string(),
                Some("Review the failed checks above"),
            ),
        }
    }
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
