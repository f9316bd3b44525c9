//! Nearby CLI - geohash proximity search service.

use anyhow::Result;
use clap::{Parser, Subcommand};
use nearby_core::config::LogFormat;
use nearby_core::Config;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit codes for CLI operations.
///
/// Following Unix conventions:
/// - 0: Success
/// - 1-127: Application errors
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// Configuration error (invalid config file, bad limits)
    ConfigError = 1,
    /// Storage error (change log journal, record store)
    StorageError = 4,
    /// Health check failure
    HealthCheckError = 6,
    /// General runtime error
    RuntimeError = 10,
}

impl ExitCode {
    /// Map an error to an exit code, preferring typed core errors over the message.
    fn from_error(error: &anyhow::Error) -> Self {
        for cause in error.chain() {
            if let Some(core) = cause.downcast_ref::<nearby_core::Error>() {
                return match core {
                    nearby_core::Error::Config(_) => ExitCode::ConfigError,
                    nearby_core::Error::ChangeLog(_)
                    | nearby_core::Error::RecordStore(_)
                    | nearby_core::Error::Io(_) => ExitCode::StorageError,
                    _ => ExitCode::RuntimeError,
                };
            }
        }

        let error_str = error.to_string().to_lowercase();
        if error_str.contains("config") || error_str.contains("toml") {
            ExitCode::ConfigError
        } else if error_str.contains("journal") || error_str.contains("storage") {
            ExitCode::StorageError
        } else if error_str.contains("health") {
            ExitCode::HealthCheckError
        } else {
            ExitCode::RuntimeError
        }
    }
}

mod commands;
mod server;

#[derive(Parser)]
#[command(name = "nearby")]
#[command(about = "Geohash proximity search service", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the search service and its index sync loop
    Serve {
        /// Override the HTTP port
        #[arg(long)]
        port: Option<u16>,

        /// Start without the background index sync loop
        #[arg(long)]
        no_sync: bool,
    },

    /// Show status and health
    Status {
        /// Service base URL
        #[arg(long, default_value = "http://localhost:8080")]
        url: String,

        /// Port the metrics endpoint listens on
        #[arg(long, default_value_t = 9090)]
        metrics_port: u16,
    },

    /// Trigger one index sync batch on a running service
    Sync {
        /// Service base URL
        #[arg(long, default_value = "http://localhost:8080")]
        url: String,

        /// Maximum number of change events to apply
        #[arg(long)]
        max_events: Option<usize>,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() {
    let exit_code = run_cli().await;
    std::process::exit(exit_code as i32);
}

/// Parse arguments, install logging, run the command and pick an exit code.
async fn run_cli() -> ExitCode {
    let cli = Cli::parse();

    // Config is optional here; logging still needs to come up when it is broken
    let file_config = cli
        .config
        .as_ref()
        .and_then(|path| std::fs::read_to_string(path).ok())
        .and_then(|content| Config::from_toml(&content).ok());

    let log_format = file_config
        .as_ref()
        .map(|config| config.monitoring.log_format)
        .unwrap_or(LogFormat::Json);

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match cli.verbose {
            0 => EnvFilter::new(
                file_config
                    .as_ref()
                    .map(|config| config.monitoring.log_level.as_str())
                    .unwrap_or("info"),
            ),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    match log_format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .init();
        }
    }

    match execute_command(cli).await {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::from_error(&e)
        }
    }
}

/// Execute the CLI command.
async fn execute_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve { port, no_sync } => {
            let config = load_config(&cli.config)?;
            commands::serve::run(config, port, no_sync).await?;
        }

        Commands::Status { url, metrics_port } => {
            commands::status::run(&url, metrics_port).await?;
        }

        Commands::Sync { url, max_events } => {
            commands::sync::run(&url, max_events).await?;
        }

        Commands::Validate => {
            let config = load_config(&cli.config)?;
            config.validate()?;
            println!("Configuration is valid");
        }
    }

    Ok(())
}

/// Load the config file, falling back to defaults when no path was given
/// and `config.toml` is absent.
fn load_config(path: &Option<PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Ok(Config::from_file(path)?),
        None => {
            let default_path = PathBuf::from("config.toml");
            if default_path.exists() {
                Ok(Config::from_file(&default_path)?)
            } else {
                tracing::info!("No config.toml found, using defaults");
                Ok(Config::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_serve_flags() {
        let cli = Cli::parse_from(["nearby", "serve", "--port", "9000", "--no-sync"]);
        match cli.command {
            Commands::Serve { port, no_sync } => {
                assert_eq!(port, Some(9000));
                assert!(no_sync);
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["nearby", "validate", "-c", "nearby.toml", "-vv"]);
        assert_eq!(cli.config, Some(PathBuf::from("nearby.toml")));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_exit_code_from_core_errors() {
        let config_err = anyhow::Error::from(nearby_core::Error::Config("bad".into()));
        assert_eq!(ExitCode::from_error(&config_err), ExitCode::ConfigError);

        let journal_err = anyhow::Error::from(nearby_core::Error::ChangeLog(
            nearby_core::ChangeLogError::WriteFailed("disk full".into()),
        ));
        assert_eq!(ExitCode::from_error(&journal_err), ExitCode::StorageError);

        let other = anyhow::anyhow!("health endpoint returned 503");
        assert_eq!(ExitCode::from_error(&other), ExitCode::HealthCheckError);
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = std::env::temp_dir().join(format!("nearby-cli-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("nearby.toml");
        std::fs::write(&path, "[server]\nport = 8181\n").unwrap();

        let config = load_config(&Some(path)).unwrap();
        assert_eq!(config.server.port, 8181);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
