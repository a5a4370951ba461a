//! canhubd: CAN network broker
//!
//! Shares CAN channels between one optional hardware adapter and any number of
//! local and remote client applications. Each channel is served by its own
//! broker task; a [`server::Server`] owns the set of channels and the settings
//! WebSocket service.

pub mod adapter;
pub mod bootstrap;
pub mod client;
pub mod config;
pub mod error;
pub mod network;
pub mod server;

pub use client::CanSocket;
pub use config::{ChannelConfig, ServerConfig};
pub use error::{BrokerError, Result};
pub use network::{ChannelSnapshot, ClientKind, NetworkBroker, NetworkHandle, SettingsDocument};
pub use server::Server;
