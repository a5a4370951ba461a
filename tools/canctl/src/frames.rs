//! Frame commands: send and dump

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::*;
use tracing::debug;

use crate::target::Target;
use common::CancellationToken;
use canhub_frame::types::CAN_EXT_ID_MASK;
use canhub_frame::{CanId, DataFrame, ErrorFrame, FilterList, Frame, FrameFilter};

#[derive(Args)]
pub struct SendArgs {
    /// Identifier in hex
    #[arg(value_parser = parse_hex_u32)]
    id: u32,

    /// Payload bytes in hex
    #[arg(value_parser = parse_hex_u8)]
    data: Vec<u8>,

    /// Use a 29-bit identifier
    #[arg(short = 'x', long)]
    extended: bool,

    /// Send as CAN FD frame
    #[arg(long)]
    fd: bool,

    /// Send a remote request with this DLC instead of data
    #[arg(long, conflicts_with_all = ["data", "fd"])]
    remote: Option<u8>,

    /// Number of times to send the frame
    #[arg(short = 'n', long, default_value_t = 1)]
    count: u32,
}

#[derive(Args)]
pub struct DumpArgs {
    /// Only show frames matching id:mask (hex), may be repeated
    #[arg(short = 'f', long = "filter", value_parser = parse_filter)]
    filters: Vec<(u32, u32)>,

    /// Filters apply to extended identifiers
    #[arg(short = 'x', long)]
    extended: bool,

    /// Stop after this many frames
    #[arg(short = 'n', long)]
    count: Option<u64>,
}

fn parse_hex_u32(value: &str) -> Result<u32, String> {
    let digits = value.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid hex value {value}: {e}"))
}

fn parse_hex_u8(value: &str) -> Result<u8, String> {
    let digits = value.trim_start_matches("0x").trim_start_matches("0X");
    u8::from_str_radix(digits, 16).map_err(|e| format!("invalid byte {value}: {e}"))
}

fn parse_filter(value: &str) -> Result<(u32, u32), String> {
    match value.split_once(':') {
        Some((id, mask)) => Ok((parse_hex_u32(id)?, parse_hex_u32(mask)?)),
        None => {
            let id = parse_hex_u32(value)?;
            Ok((id, CAN_EXT_ID_MASK))
        },
    }
}

fn build_frame(args: &SendArgs) -> Result<Frame> {
    let id = if args.extended {
        CanId::extended(args.id)?
    } else {
        CanId::standard(args.id)?
    };

    let frame = match args.remote {
        Some(dlc) => DataFrame::new_remote(id, dlc)?,
        None if args.fd => DataFrame::new_fd(id, &args.data)?,
        None => DataFrame::new(id, &args.data)?,
    };
    Ok(Frame::Data(frame))
}

/// Filter list passing only the requested identifiers
fn build_filters(args: &DumpArgs) -> FilterList {
    if args.filters.is_empty() {
        return FilterList::new();
    }
    let mut filters: FilterList = args
        .filters
        .iter()
        .map(|&(id, mask)| FrameFilter::new(id, mask, args.extended))
        .collect();
    // everything not explicitly passed is blocked
    filters.push(FrameFilter::block(0, 0, false));
    filters.push(FrameFilter::block(0, 0, true));
    filters
}

pub async fn send(target: &Target, args: SendArgs) -> Result<()> {
    let frame = build_frame(&args)?;
    let mut connection = target.connect().await?;
    connection.announce_name("canctl send").await?;

    for _ in 0..args.count {
        connection
            .write_frame(&frame)
            .await
            .context("channel closed the connection")?;
    }

    if let Frame::Data(data) = &frame {
        println!("{} {}", "SENT".green(), data);
    }
    Ok(())
}

pub async fn dump(target: &Target, args: DumpArgs) -> Result<()> {
    let filters = build_filters(&args);
    let mut connection = target.connect().await?;
    connection.announce_name("canctl dump").await?;
    debug!("Dumping with {} filter(s)", filters.len());

    let token = CancellationToken::new();
    common::shutdown::cancel_on_shutdown(token.clone());

    let mut shown = 0u64;
    loop {
        let frame = tokio::select! {
            frame = connection.read_frame() => frame?,
            _ = token.cancelled() => break,
        };
        let Some(frame) = frame else {
            bail!("channel closed the connection");
        };
        if !filters.accepts(&frame) {
            continue;
        }

        println!("{}", format_frame(&frame));
        shown += 1;
        if args.count.is_some_and(|limit| shown >= limit) {
            break;
        }
    }
    token.cancel();
    Ok(())
}

fn format_frame(frame: &Frame) -> String {
    let stamp = frame
        .timestamp()
        .map(|ts| format!("({})", ts))
        .unwrap_or_default();
    match frame {
        Frame::Data(data) => {
            let kind = if data.is_fd() {
                "FD ".cyan()
            } else if data.is_remote() {
                "RTR".yellow()
            } else {
                "   ".normal()
            };
            format!("{} {} {}", stamp.as_str().dimmed(), kind, data)
        },
        Frame::Error(error) => format!(
            "{} {}",
            stamp.as_str().dimmed(),
            format_error(error).as_str().red()
        ),
        Frame::Api(api) => format!("{} {:?}", stamp.as_str().dimmed(), api),
    }
}

fn format_error(error: &ErrorFrame) -> String {
    format!(
        "ERR {} {:?} rx={} tx={}",
        error.bus_state, error.error_type, error.rx_errors, error.tx_errors
    )
}
