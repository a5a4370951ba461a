//! Cloneable front end of a broker task
//!
//! All broker state lives inside the task; a [`NetworkHandle`] turns method
//! calls into [`Command`]s and waits for the reply where there is one.

use tokio::sync::{mpsc, oneshot};

use super::clients::{ClientId, ClientKind, ClientSink};
use super::settings::{ChannelSnapshot, EndpointInfo, SettingsDocument};
use crate::adapter::{CanAdapter, Feature};
use crate::error::{BrokerError, Result};
use canhub_frame::{Bitrate, RawFrame};

type Reply<T> = oneshot::Sender<T>;

/// Request processed by the broker task
#[derive(Debug)]
pub(crate) enum Command {
    AddInterface {
        adapter: Box<dyn CanAdapter>,
        reply: Reply<Result<()>>,
    },
    RemoveInterface {
        reply: Reply<()>,
    },
    AttachClient {
        kind: ClientKind,
        sink: ClientSink,
        reply: Reply<Result<ClientId>>,
    },
    DetachClient {
        id: ClientId,
    },
    RouteFrame {
        source: ClientId,
        frame: RawFrame,
    },
    SetBitrate {
        nominal: Bitrate,
        data: Bitrate,
        reply: Reply<Result<()>>,
    },
    SetEnabled {
        enabled: bool,
        reply: Reply<Result<()>>,
    },
    SetFeature {
        feature: Feature,
        enabled: bool,
        reply: Reply<Result<bool>>,
    },
    SetName {
        name: String,
    },
    Reset {
        reply: Reply<Result<()>>,
    },
    ApplySettings {
        document: SettingsDocument,
        reply: Reply<Result<()>>,
    },
    Snapshot {
        reply: Reply<ChannelSnapshot>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

/// Handle to one channel's broker
#[derive(Debug, Clone)]
pub struct NetworkHandle {
    id: u8,
    tx: mpsc::Sender<Command>,
}

impl NetworkHandle {
    pub(crate) fn new(id: u8, tx: mpsc::Sender<Command>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| BrokerError::channel_closed(self.id))
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply)).await?;
        response
            .await
            .map_err(|_| BrokerError::channel_closed(self.id))
    }

    /// Attach the hardware adapter; fails with a capacity error if one is attached
    pub async fn add_interface(&self, adapter: Box<dyn CanAdapter>) -> Result<()> {
        self.request(|reply| Command::AddInterface { adapter, reply })
            .await?
    }

    /// Detach the adapter if there is one
    pub async fn remove_interface(&self) -> Result<()> {
        self.request(|reply| Command::RemoveInterface { reply }).await
    }

    pub async fn attach_client(&self, kind: ClientKind, sink: ClientSink) -> Result<ClientId> {
        self.request(|reply| Command::AttachClient { kind, sink, reply })
            .await?
    }

    pub async fn detach_client(&self, id: ClientId) -> Result<()> {
        self.send(Command::DetachClient { id }).await
    }

    /// Hand a frame received from `source` to the broker for routing
    pub async fn route_frame(&self, source: ClientId, frame: RawFrame) -> Result<()> {
        self.send(Command::RouteFrame { source, frame }).await
    }

    pub async fn set_bitrate(&self, nominal: Bitrate, data: Bitrate) -> Result<()> {
        self.request(|reply| Command::SetBitrate {
            nominal,
            data,
            reply,
        })
        .await?
    }

    pub async fn set_network_enabled(&self, enabled: bool) -> Result<()> {
        self.request(|reply| Command::SetEnabled { enabled, reply })
            .await?
    }

    /// Returns the resulting flag, which stays off when the feature is unsupported
    pub async fn set_error_frame_enabled(&self, enabled: bool) -> Result<bool> {
        self.set_feature(Feature::ErrorFrames, enabled).await
    }

    pub async fn set_flexible_data_enabled(&self, enabled: bool) -> Result<bool> {
        self.set_feature(Feature::FlexibleData, enabled).await
    }

    pub async fn set_listen_only_enabled(&self, enabled: bool) -> Result<bool> {
        self.set_feature(Feature::ListenOnly, enabled).await
    }

    async fn set_feature(&self, feature: Feature, enabled: bool) -> Result<bool> {
        self.request(|reply| Command::SetFeature {
            feature,
            enabled,
            reply,
        })
        .await?
    }

    pub async fn set_name(&self, name: impl Into<String>) -> Result<()> {
        self.send(Command::SetName { name: name.into() }).await
    }

    pub async fn reset(&self) -> Result<()> {
        self.request(|reply| Command::Reset { reply }).await?
    }

    pub async fn apply_settings(&self, document: SettingsDocument) -> Result<()> {
        self.request(|reply| Command::ApplySettings { document, reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<ChannelSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    pub async fn endpoints(&self) -> Result<Option<EndpointInfo>> {
        Ok(self.snapshot().await?.endpoints)
    }

    /// Stop the broker; closes endpoints and detaches the adapter
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}
