//! canctl - command-line client for canhubd
//!
//! Sends frames to a channel, dumps channel traffic and reads or changes
//! channel settings.

mod frames;
mod settings;
mod target;

use anyhow::Result;
use clap::{Parser, Subcommand};
use common::logging::LogConfig;

use crate::frames::{DumpArgs, SendArgs};
use crate::settings::SettingsArgs;

#[derive(Parser)]
#[command(name = "canctl")]
#[command(about = "Command-line client for canhubd")]
#[command(long_about = "Command-line client for canhubd

Commands:
  send        Transmit one frame on a channel
  dump        Print frames seen on a channel
  settings    Show or change channel settings

Examples:
  canctl send 123 11 22 33                     # standard id 0x123, three bytes
  canctl --tcp 127.0.0.1:55661 dump -f 100:7F0   # ids 0x100-0x10F only
  canctl settings 1 --set '{\"bitrateNominal\":250000}'")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Channel local socket
    #[arg(short = 's', long, global = true, conflicts_with = "tcp")]
    socket: Option<std::path::PathBuf>,

    /// Channel TCP address
    #[arg(short = 't', long, global = true)]
    tcp: Option<std::net::SocketAddr>,
}

#[derive(Subcommand)]
enum Commands {
    /// Transmit one frame on a channel
    Send(SendArgs),

    /// Print frames seen on a channel
    Dump(DumpArgs),

    /// Show or change channel settings
    Settings(SettingsArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let level = if cli.verbose { "debug" } else { "warn" };
    common::logging::init_with_config(LogConfig {
        service_name: "canctl".to_string(),
        level: level.to_string(),
        ansi: !cli.no_color,
        ..Default::default()
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    let target = target::Target::from_options(cli.socket, cli.tcp);
    match cli.command {
        Commands::Send(args) => frames::send(&target, args).await,
        Commands::Dump(args) => frames::dump(&target, args).await,
        Commands::Settings(args) => settings::run(args).await,
    }
}
