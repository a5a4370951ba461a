//! Error handling for the CAN broker
//!
//! Every failure a broker reports falls in one of the classes below. None of
//! them is fatal to a channel: callers log, drop the offending frame or client,
//! and continue.

use thiserror::Error;

use crate::adapter::AdapterError;
use canhub_frame::FrameError;

/// Broker error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// Client disconnected or a write to it failed
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Malformed frame: checksum, size, DLC or identifier
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Interface adapter rejected a request
    #[error("Adapter error: {0}")]
    AdapterError(String),

    /// Client or channel capacity exhausted, or a second adapter offered
    #[error("Capacity error: {0}")]
    CapacityError(String),

    /// Operation not possible in the current broker state
    #[error("State error: {0}")]
    StateError(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Input/Output operation errors
    #[error("IO error: {0}")]
    IoError(String),

    /// Settings document could not be parsed or produced
    #[error("Data error: {0}")]
    DataError(String),

    /// Broker task is gone or a reply was lost
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type alias for the broker
pub type Result<T> = std::result::Result<T, BrokerError>;

impl BrokerError {
    pub fn transport(msg: impl Into<String>) -> Self {
        BrokerError::TransportError(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        BrokerError::ProtocolError(msg.into())
    }

    pub fn adapter(msg: impl Into<String>) -> Self {
        BrokerError::AdapterError(msg.into())
    }

    pub fn capacity(msg: impl Into<String>) -> Self {
        BrokerError::CapacityError(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        BrokerError::StateError(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        BrokerError::ConfigError(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        BrokerError::DataError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        BrokerError::InternalError(msg.into())
    }

    // Convenience constructors for specific cases
    pub fn channel_closed(id: u8) -> Self {
        BrokerError::InternalError(format!("Broker for channel {} has stopped", id))
    }

    pub fn channel_not_found(id: impl std::fmt::Display) -> Self {
        BrokerError::StateError(format!("Channel not found: {}", id))
    }

    pub fn is_capacity(&self) -> bool {
        matches!(self, BrokerError::CapacityError(_))
    }
}

// ============================================================================
// From implementations for external error types
// ============================================================================

impl From<std::io::Error> for BrokerError {
    fn from(err: std::io::Error) -> Self {
        BrokerError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for BrokerError {
    fn from(err: serde_json::Error) -> Self {
        BrokerError::DataError(format!("JSON: {err}"))
    }
}

impl From<FrameError> for BrokerError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(msg) => BrokerError::TransportError(msg),
            other => BrokerError::ProtocolError(other.to_string()),
        }
    }
}

impl From<AdapterError> for BrokerError {
    fn from(err: AdapterError) -> Self {
        BrokerError::AdapterError(err.to_string())
    }
}

impl From<figment::Error> for BrokerError {
    fn from(err: figment::Error) -> Self {
        BrokerError::ConfigError(format!("Failed to parse config: {err}"))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for BrokerError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        BrokerError::TransportError(format!("WebSocket: {err}"))
    }
}
