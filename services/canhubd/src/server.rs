//! Multi-channel server
//!
//! Owns every channel broker of the process, allocates channel ids and runs
//! the shared settings WebSocket service.

pub mod allocator;
pub mod settings_service;

pub use allocator::ChannelIdAllocator;
pub use settings_service::SettingsService;

use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapter::create_adapter;
use crate::config::{ChannelConfig, ServerConfig};
use crate::error::{BrokerError, Result};
use crate::network::{NetworkBroker, NetworkHandle};

/// Channel id to broker handle
pub type ChannelMap = Arc<RwLock<BTreeMap<u8, NetworkHandle>>>;

#[derive(Debug)]
pub struct Server {
    config: Arc<ServerConfig>,
    allocator: Mutex<ChannelIdAllocator>,
    channels: ChannelMap,
    settings: Option<SettingsService>,
    token: CancellationToken,
}

impl Server {
    /// Create a server without channels or listeners
    pub fn new(config: ServerConfig) -> Self {
        let allocator = ChannelIdAllocator::new(config.max_channels);
        Self {
            config: Arc::new(config),
            allocator: Mutex::new(allocator),
            channels: Arc::new(RwLock::new(BTreeMap::new())),
            settings: None,
            token: CancellationToken::new(),
        }
    }

    /// Create the configured channels and start the settings service
    pub async fn start(config: ServerConfig) -> Result<Self> {
        let mut server = Self::new(config);

        let channels = server.config.channels.clone();
        for channel in &channels {
            server.create_channel(channel).await?;
        }

        let settings_addr =
            SocketAddr::new(server.config.host_address, server.config.settings_port);
        let settings = SettingsService::bind(
            settings_addr,
            server.channels.clone(),
            server.config.outbound_queue_depth,
            server.token.child_token(),
        )
        .await?;
        server.settings = Some(settings);

        info!(
            "Server started with {} channel(s)",
            server.channels.read().len()
        );
        Ok(server)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Create a channel broker with the next free id
    pub async fn create_channel(&self, channel: &ChannelConfig) -> Result<NetworkHandle> {
        let id = self.allocator.lock().acquire().ok_or_else(|| {
            BrokerError::capacity(format!(
                "All {} channels are in use",
                self.config.max_channels
            ))
        })?;

        let name = channel
            .name
            .clone()
            .unwrap_or_else(|| format!("CAN {}", id));
        let handle = NetworkBroker::spawn(id, name.clone(), self.config.clone());

        if let Err(e) = self.configure_channel(&handle, channel).await {
            let _ = handle.shutdown().await;
            self.allocator.lock().release(id);
            return Err(e);
        }

        self.channels.write().insert(id, handle.clone());
        info!("Created channel {} ({})", id, name);
        Ok(handle)
    }

    async fn configure_channel(&self, handle: &NetworkHandle, channel: &ChannelConfig) -> Result<()> {
        if let Some(adapter) = create_adapter(channel.adapter, &format!("CAN {}", handle.id())) {
            if let Err(e) = handle.add_interface(adapter).await {
                warn!(
                    "Channel {}: {} adapter unavailable, running as virtual bus: {}",
                    handle.id(),
                    channel.adapter,
                    e
                );
            }
        }

        handle.set_error_frame_enabled(channel.error_frames).await?;
        handle.set_flexible_data_enabled(channel.flexible_data).await?;
        handle.set_listen_only_enabled(channel.listen_only).await?;
        handle
            .set_bitrate(channel.bitrate_nominal, channel.bitrate_data)
            .await?;

        if channel.enabled {
            handle.set_network_enabled(true).await?;
        }
        Ok(())
    }

    /// Stop a channel and release its id
    pub async fn destroy_channel(&self, id: u8) -> Result<()> {
        let handle = self
            .channels
            .write()
            .remove(&id)
            .ok_or_else(|| BrokerError::channel_not_found(id))?;
        let _ = handle.shutdown().await;
        self.allocator.lock().release(id);
        info!("Destroyed channel {}", id);
        Ok(())
    }

    pub fn channel(&self, id: u8) -> Option<NetworkHandle> {
        self.channels.read().get(&id).cloned()
    }

    pub fn channel_ids(&self) -> Vec<u8> {
        self.channels.read().keys().copied().collect()
    }

    /// Address of the settings WebSocket listener
    pub fn settings_addr(&self) -> Option<SocketAddr> {
        self.settings.as_ref().map(SettingsService::local_addr)
    }

    /// Stop the settings service and every channel
    pub async fn shutdown(mut self) {
        info!("Server shutting down");
        self.token.cancel();
        if let Some(settings) = self.settings.take() {
            settings.shutdown().await;
        }

        let channels: Vec<(u8, NetworkHandle)> = std::mem::take(&mut *self.channels.write())
            .into_iter()
            .collect();
        for (id, handle) in channels {
            if let Err(e) = handle.shutdown().await {
                warn!("Channel {} did not stop cleanly: {}", id, e);
            }
            self.allocator.lock().release(id);
        }
    }
}
