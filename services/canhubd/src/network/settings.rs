//! Channel settings documents
//!
//! Settings clients exchange JSON documents with camelCase keys. Every field is
//! optional: a client sends only what it wants to change, the broker always
//! answers with a fully populated document built from a [`ChannelSnapshot`].

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::Result;
use canhub_frame::{Bitrate, BusState, Mode};

/// Version tag carried in every document the broker produces
pub const SETTINGS_API_VERSION: &str = "1.0";

/// Settings message exchanged with settings clients
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate_nominal: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate_data: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_frame_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_frame_support: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flexible_data_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flexible_data_support: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen_only_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen_only_support: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_count_error: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bus_load: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<u32>,
    /// Bus state as its numeric value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<u8>,
    /// Mode request: 0 disables, 1 enables, 2 enables listen-only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface_version: Option<String>,
    /// Process-wide log filter, e.g. `"debug"` or `"info,canhubd=trace"`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl SettingsDocument {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Requested mode, `None` when absent or not a known mode
    pub fn requested_mode(&self) -> Option<Mode> {
        self.mode.and_then(Mode::from_u8)
    }

    /// Whether the document is addressed to `channel`
    ///
    /// A document without a `channel` field is addressed to no channel.
    pub fn targets(&self, channel: u8) -> bool {
        self.channel == Some(channel)
    }
}

/// Where clients can reach a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointInfo {
    pub local_path: Option<PathBuf>,
    pub tcp_addr: SocketAddr,
}

/// Point-in-time view of a channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSnapshot {
    pub id: u8,
    pub name: String,
    pub enabled: bool,
    pub bus_state: BusState,
    pub bitrate_nominal: Bitrate,
    pub bitrate_data: Bitrate,
    pub error_frame_enabled: bool,
    pub error_frame_support: bool,
    pub flexible_data_enabled: bool,
    pub flexible_data_support: bool,
    pub listen_only_enabled: bool,
    pub listen_only_support: bool,
    pub frame_count: u64,
    pub error_count: u64,
    pub bus_load: u8,
    pub frames_per_second: u32,
    pub last_error: Option<String>,
    pub interface_name: Option<String>,
    pub interface_version: Option<String>,
    pub local_clients: usize,
    pub remote_clients: usize,
    pub settings_clients: usize,
    pub endpoints: Option<EndpointInfo>,
}

impl ChannelSnapshot {
    /// Mode equivalent of the enable and listen-only flags
    pub fn mode(&self) -> Mode {
        if !self.enabled {
            Mode::Init
        } else if self.listen_only_enabled {
            Mode::ListenOnly
        } else {
            Mode::Operation
        }
    }
}

impl From<&ChannelSnapshot> for SettingsDocument {
    fn from(snapshot: &ChannelSnapshot) -> Self {
        SettingsDocument {
            api_version: Some(SETTINGS_API_VERSION.to_string()),
            channel: Some(snapshot.id),
            name: Some(snapshot.name.clone()),
            bitrate_nominal: Some(snapshot.bitrate_nominal.to_raw()),
            bitrate_data: Some(snapshot.bitrate_data.to_raw()),
            enabled: Some(snapshot.enabled),
            error_frame_enabled: Some(snapshot.error_frame_enabled),
            error_frame_support: Some(snapshot.error_frame_support),
            flexible_data_enabled: Some(snapshot.flexible_data_enabled),
            flexible_data_support: Some(snapshot.flexible_data_support),
            listen_only_enabled: Some(snapshot.listen_only_enabled),
            listen_only_support: Some(snapshot.listen_only_support),
            frame_count: Some(snapshot.frame_count),
            frame_count_error: Some(snapshot.error_count),
            bus_load: Some(snapshot.bus_load),
            frame_rate: Some(snapshot.frames_per_second),
            state: Some(snapshot.bus_state.as_u8()),
            mode: Some(snapshot.mode().as_u8()),
            reset: None,
            last_error: snapshot.last_error.clone(),
            interface_name: snapshot.interface_name.clone(),
            interface_version: snapshot.interface_version.clone(),
            log_level: None,
        }
    }
}
