use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gcp_cpi_client::gcp::http::format_api_error;
use gcp_cpi_client::{Config, GoogleClient};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Diagnostics for the GCP cloud provider client
#[derive(Parser, Debug)]
#[command(name = "gcp-cpi-client", version, about, long_about = None)]
struct Args {
    /// Configuration file (JSON, or YAML with a .yml/.yaml extension)
    #[arg(short, long)]
    config: PathBuf,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the effective configuration (key material redacted)
    ShowConfig,
    /// Build the client and make one call to each API
    Check,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();
    let file = open_log_file(&log_path)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("gcp-cpi-client started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

/// Open the log file for appending, creating its directory first
fn open_log_file(log_path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }

    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("gcp-cpi-client").join("gcp-cpi-client.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".gcp-cpi-client").join("gcp-cpi-client.log");
    }
    PathBuf::from("gcp-cpi-client.log")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level)?;

    let config = Config::load(&args.config)?;

    match args.command {
        Command::ShowConfig => show_config(&config),
        Command::Check => check(config).await,
    }
}

fn show_config(config: &Config) -> Result<()> {
    println!("project:                   {}", config.project);
    println!(
        "credentials:               {}",
        if config.has_json_key() {
            "inline service account key"
        } else {
            "default credentials"
        }
    );
    println!("default_zone:              {}", config.default_zone);
    println!("default_root_disk_size_gb: {}", config.default_root_disk_size_gb);
    println!("default_root_disk_type:    {}", config.default_root_disk_type);
    Ok(())
}

async fn check(config: Config) -> Result<()> {
    let span = tracing::info_span!("check", project = %config.project);
    let client = GoogleClient::new(config, span).await?;

    match client.compute_service().get_project(client.project()).await {
        Ok(project) => println!(
            "compute: ok (project {})",
            project.get("name").and_then(|v| v.as_str()).unwrap_or("-")
        ),
        Err(e) => {
            tracing::error!("Compute check failed: {:#}", e);
            println!("compute: {}", format_api_error(&e));
        }
    }

    match client.storage_service().list_buckets(client.project()).await {
        Ok(buckets) => println!("storage: ok ({} buckets)", buckets.len()),
        Err(e) => {
            tracing::error!("Storage check failed: {:#}", e);
            println!("storage: {}", format_api_error(&e));
        }
    }

    Ok(())
}
