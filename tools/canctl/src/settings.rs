//! Settings command
//!
//! Talks to the settings WebSocket of canhubd: prints the current document of
//! a channel, or sends a partial document and prints the result.

use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use colored::*;
use futures::{SinkExt, Stream, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use canhubd::config::ServerConfig;
use canhubd::SettingsDocument;

const REPLY_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Args)]
pub struct SettingsArgs {
    /// Channel number
    channel: u8,

    /// Settings service address
    #[arg(short = 'a', long)]
    address: Option<SocketAddr>,

    /// Partial JSON document to apply, e.g. '{"enabled":false}'
    #[arg(long)]
    set: Option<String>,

    /// Print raw JSON
    #[arg(long)]
    json: bool,
}

pub async fn run(args: SettingsArgs) -> Result<()> {
    let address = args.address.unwrap_or_else(|| {
        let defaults = ServerConfig::default();
        SocketAddr::new(defaults.host_address, defaults.settings_port)
    });
    let url = format!("ws://{}/{}", address, args.channel);
    let (mut ws, _) = connect_async(url.as_str())
        .await
        .with_context(|| format!("cannot open {url}"))?;

    let mut document = next_document(&mut ws).await?;

    if let Some(update) = &args.set {
        let request = SettingsDocument::from_json(update).context("invalid settings document")?;
        ws.send(Message::Text(request.to_json()?)).await?;
        document = next_document(&mut ws).await?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&document)?);
    } else {
        print_document(&document);
    }
    let _ = ws.close(None).await;
    Ok(())
}

async fn next_document<S>(ws: &mut S) -> Result<SettingsDocument>
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let message = timeout(REPLY_TIMEOUT, ws.next())
            .await
            .map_err(|_| anyhow!("no settings received"))?;
        match message {
            Some(Ok(Message::Text(text))) => return Ok(SettingsDocument::from_json(&text)?),
            Some(Ok(Message::Close(_))) | None => bail!("settings connection closed"),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

fn flag(enabled: Option<bool>, supported: Option<bool>) -> ColoredString {
    match (enabled, supported) {
        (_, Some(false)) => "unsupported".dimmed(),
        (Some(true), _) => "on".green(),
        _ => "off".normal(),
    }
}

fn print_document(doc: &SettingsDocument) {
    let channel = doc.channel.map_or_else(|| "?".to_string(), |c| c.to_string());
    println!(
        "{} {} {}",
        "Channel".bold(),
        channel.as_str().bold(),
        doc.name.as_deref().unwrap_or_default()
    );

    let enabled = if doc.enabled == Some(true) {
        "enabled".green()
    } else {
        "disabled".red()
    };
    println!("  state        {}", enabled);
    if let Some(mode) = doc.mode.and_then(canhub_frame::Mode::from_u8) {
        println!("  mode         {}", mode);
    }
    if let Some(state) = doc.state.and_then(canhub_frame::BusState::from_u8) {
        println!("  bus          {}", state.description());
    }
    if let Some(nominal) = doc.bitrate_nominal {
        println!("  bitrate      {}", canhub_frame::Bitrate::from_raw(nominal));
    }
    if let Some(data) = doc.bitrate_data.map(canhub_frame::Bitrate::from_raw) {
        if data.is_set() {
            println!("  data rate    {}", data);
        }
    }
    println!(
        "  error frames {}",
        flag(doc.error_frame_enabled, doc.error_frame_support)
    );
    println!(
        "  CAN FD       {}",
        flag(doc.flexible_data_enabled, doc.flexible_data_support)
    );
    println!(
        "  listen-only  {}",
        flag(doc.listen_only_enabled, doc.listen_only_support)
    );
    println!(
        "  frames       {} ({} errors, {} fps, {}% load)",
        doc.frame_count.unwrap_or_default(),
        doc.frame_count_error.unwrap_or_default(),
        doc.frame_rate.unwrap_or_default(),
        doc.bus_load.unwrap_or_default()
    );
    if let Some(name) = &doc.interface_name {
        println!(
            "  interface    {} {}",
            name,
            doc.interface_version.as_deref().unwrap_or_default()
        );
    }
    if let Some(level) = &doc.log_level {
        println!("  log level    {}", level.as_str().dimmed());
    }
    if let Some(error) = &doc.last_error {
        println!("  last error   {}", error.as_str().red());
    }
}
