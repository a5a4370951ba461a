//! CAN network brokers
//!
//! A broker joins one CAN channel's participants: local clients on the same
//! host, remote TCP clients, settings subscribers and at most one interface
//! adapter.

pub mod broker;
pub mod clients;
pub mod handle;
pub mod listener;
pub mod settings;
pub mod statistics;

pub use broker::NetworkBroker;
pub use clients::{ClientId, ClientKind, ClientLimits, ClientRegistry, ClientSink, Outbound};
pub use handle::NetworkHandle;
pub use listener::{serve_frame_client, Endpoints};
pub use settings::{ChannelSnapshot, EndpointInfo, SettingsDocument, SETTINGS_API_VERSION};
pub use statistics::{frame_bits, Statistics};
