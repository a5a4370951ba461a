//! Service bootstrap
//!
//! Command-line arguments, logging setup and configuration loading for the
//! `canhubd` binary.

use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::{BrokerError, Result};
use common::logging::{self, LogConfig};

pub const SERVICE_NAME: &str = "canhubd";

/// Command-line arguments for canhubd
#[derive(Parser, Debug, Clone)]
#[command(
    name = "canhubd",
    version = env!("CARGO_PKG_VERSION"),
    about = "CAN network broker",
    long_about = None
)]
pub struct Args {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short = 'c', long, env = "CANHUB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    pub log_level: String,

    /// Directory for rolling log files
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Write log files as JSON
    #[arg(long)]
    pub log_json: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Validation mode - only validate configuration without starting service
    #[arg(long)]
    pub validate: bool,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    pub print_config: bool,
}

impl Args {
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            service_name: SERVICE_NAME.to_string(),
            log_dir: self.log_dir.clone(),
            level: self.log_level.clone(),
            enable_json: self.log_json,
            ansi: !self.no_color,
        }
    }
}

/// Initialize logging from command-line arguments
pub fn initialize_logging(args: &Args) -> Result<()> {
    logging::init_with_config(args.log_config())
        .map_err(|e| BrokerError::config(format!("Failed to initialize logging: {}", e)))?;
    info!("{} v{} starting", SERVICE_NAME, env!("CARGO_PKG_VERSION"));
    Ok(())
}

/// Load and validate the configuration named on the command line
pub fn load_configuration(args: &Args) -> Result<ServerConfig> {
    let config = ServerConfig::load(args.config.as_deref())?;
    match &args.config {
        Some(path) => info!("Configuration loaded from {}", path.display()),
        None => info!("No configuration file given, using defaults"),
    }
    Ok(config)
}

/// Effective configuration rendered as YAML
pub fn render_configuration(config: &ServerConfig) -> Result<String> {
    serde_yaml::to_string(config)
        .map_err(|e| BrokerError::config(format!("Failed to render configuration: {}", e)))
}
