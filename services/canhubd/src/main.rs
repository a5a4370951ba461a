//! canhubd entry point

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use canhubd::bootstrap::{self, Args};
use canhubd::Server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    bootstrap::initialize_logging(&args)?;

    let config = match bootstrap::load_configuration(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return Err(e).context("configuration rejected");
        },
    };

    if args.print_config {
        print!("{}", bootstrap::render_configuration(&config)?);
        return Ok(());
    }

    if args.validate {
        info!("Validation completed successfully");
        return Ok(());
    }

    let server = Server::start(config)
        .await
        .context("failed to start server")?;
    if let Some(addr) = server.settings_addr() {
        info!("Settings available at ws://{}/<channel>", addr);
    }

    common::shutdown::wait_for_shutdown().await;
    info!("Shutdown signal received");
    server.shutdown().await;
    info!("canhubd stopped");
    Ok(())
}
