//! Server configuration
//!
//! Loaded with figment in three layers: built-in defaults, an optional file
//! (YAML, TOML or JSON, chosen by extension) and `CANHUB_` environment
//! variables such as `CANHUB_MAX_LOCAL_CLIENTS=4`, where `__` separates
//! nested keys. Channel lists can only come from a file.

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::adapter::AdapterKind;
use crate::error::{BrokerError, Result};
use canhub_frame::Bitrate;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "CANHUB_";

/// Highest channel count a server may be configured for
pub const CHANNEL_LIMIT: u8 = 32;

// ============================================================================
// Channel configuration
// ============================================================================

/// Channel created at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Display name, defaults to "CAN <id>"
    pub name: Option<String>,
    pub enabled: bool,
    pub bitrate_nominal: Bitrate,
    pub bitrate_data: Bitrate,
    pub error_frames: bool,
    pub flexible_data: bool,
    pub listen_only: bool,
    pub adapter: AdapterKind,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            name: None,
            enabled: true,
            bitrate_nominal: Bitrate::KBIT_500,
            bitrate_data: Bitrate::Unset,
            error_frames: false,
            flexible_data: false,
            listen_only: false,
            adapter: AdapterKind::None,
        }
    }
}

// ============================================================================
// Server configuration
// ============================================================================

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the TCP and WebSocket listeners bind to
    pub host_address: IpAddr,
    /// Remote listener of channel N binds to `tcp_port_base + N`; 0 picks ephemeral ports
    pub tcp_port_base: u16,
    /// Settings WebSocket port; 0 picks an ephemeral port
    pub settings_port: u16,
    pub local_socket_dir: PathBuf,
    pub local_socket_prefix: String,
    pub max_channels: u8,
    pub max_local_clients: usize,
    pub max_remote_clients: usize,
    pub max_settings_clients: usize,
    /// Per-client outbound queue depth
    pub outbound_queue_depth: usize,
    pub statistics_interval_ms: u64,
    /// Adapter poll delay when the last read returned nothing
    pub adapter_idle_backoff_ms: u64,
    /// Adapter poll delay right after frames were received
    pub adapter_busy_backoff_ms: u64,
    pub timestamp_frames: bool,
    pub allow_bitrate_change: bool,
    pub allow_mode_change: bool,
    pub allow_bus_off_recovery: bool,
    pub channels: Vec<ChannelConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host_address: IpAddr::from([127, 0, 0, 1]),
            tcp_port_base: 55660,
            settings_port: 55659,
            local_socket_dir: std::env::temp_dir(),
            local_socket_prefix: "canhub-".to_string(),
            max_channels: 8,
            max_local_clients: 16,
            max_remote_clients: 16,
            max_settings_clients: 8,
            outbound_queue_depth: 256,
            statistics_interval_ms: 1000,
            adapter_idle_backoff_ms: 50,
            adapter_busy_backoff_ms: 10,
            timestamp_frames: true,
            allow_bitrate_change: true,
            allow_mode_change: true,
            allow_bus_off_recovery: true,
            channels: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(ServerConfig::default()));

        if let Some(path) = path {
            if !path.exists() {
                return Err(BrokerError::config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            let extension = path
                .extension()
                .and_then(|s| s.to_str())
                .ok_or_else(|| BrokerError::config("Invalid file extension"))?;

            figment = match extension {
                "json" => figment.merge(Json::file(path)),
                "toml" => figment.merge(Toml::file(path)),
                "yaml" | "yml" => figment.merge(Yaml::file(path)),
                _ => {
                    return Err(BrokerError::config(format!(
                        "Unsupported config format: {}",
                        extension
                    )))
                },
            };
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]).split("__"));

        let config: ServerConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges and cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.max_channels == 0 || self.max_channels > CHANNEL_LIMIT {
            return Err(BrokerError::config(format!(
                "max_channels must be between 1 and {}",
                CHANNEL_LIMIT
            )));
        }

        if self.channels.len() > usize::from(self.max_channels) {
            return Err(BrokerError::config(format!(
                "{} channels configured but max_channels is {}",
                self.channels.len(),
                self.max_channels
            )));
        }

        if self.tcp_port_base != 0
            && u32::from(self.tcp_port_base) + u32::from(self.max_channels) > u32::from(u16::MAX)
        {
            return Err(BrokerError::config(
                "tcp_port_base leaves no room for all channel ports",
            ));
        }

        if self.settings_port != 0
            && self.tcp_port_base != 0
            && self.settings_port > self.tcp_port_base
            && self.settings_port <= self.tcp_port_base + u16::from(self.max_channels)
        {
            return Err(BrokerError::config(format!(
                "settings_port {} collides with a channel port",
                self.settings_port
            )));
        }

        if self.local_socket_prefix.is_empty() {
            return Err(BrokerError::config("local_socket_prefix cannot be empty"));
        }

        if self.outbound_queue_depth == 0 {
            return Err(BrokerError::config("outbound_queue_depth must be positive"));
        }

        if self.statistics_interval_ms == 0 {
            return Err(BrokerError::config("statistics_interval_ms must be positive"));
        }

        for (index, channel) in self.channels.iter().enumerate() {
            if channel.bitrate_data.is_set() && !channel.flexible_data {
                return Err(BrokerError::config(format!(
                    "channel {}: bitrate_data requires flexible_data",
                    index + 1
                )));
            }
        }

        Ok(())
    }

    pub fn statistics_interval(&self) -> Duration {
        Duration::from_millis(self.statistics_interval_ms)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.adapter_idle_backoff_ms)
    }

    pub fn busy_backoff(&self) -> Duration {
        Duration::from_millis(self.adapter_busy_backoff_ms)
    }

    /// Path of the local endpoint for channel `id`
    pub fn local_socket_path(&self, id: u8) -> PathBuf {
        self.local_socket_dir
            .join(format!("{}{}", self.local_socket_prefix, id))
    }

    /// TCP port of channel `id`, 0 when ports are ephemeral
    pub fn tcp_port(&self, id: u8) -> u16 {
        if self.tcp_port_base == 0 {
            0
        } else {
            self.tcp_port_base.saturating_add(u16::from(id))
        }
    }
}
