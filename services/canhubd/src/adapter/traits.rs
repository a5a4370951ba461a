//! Interface adapter contract
//!
//! An adapter is the bridge between a broker and one physical (or simulated)
//! CAN controller. Brokers own their adapter exclusively and talk to it only
//! through [`CanAdapter`]; asynchronous notifications flow back over an
//! [`AdapterEventSender`] handed to the adapter when it is attached.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;
use thiserror::Error;
use tokio::sync::mpsc;

use canhub_frame::{Bitrate, BusState, Frame, LogLevel, Mode};

/// Adapter error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// Adapter channel already in use by another process
    #[error("Interface in use: {0}")]
    Used(String),

    /// Device missing or not responding
    #[error("Device error: {0}")]
    Device(String),

    /// Vendor library failure
    #[error("Library error: {0}")]
    Library(String),

    /// Not connected or the connection broke down
    #[error("Connection error: {0}")]
    Connection(String),

    /// Bitrate not supported by the controller
    #[error("Bitrate error: {0}")]
    Bitrate(String),

    /// Mode not supported by the controller
    #[error("Mode error: {0}")]
    Mode(String),

    /// Frame could not be transmitted
    #[error("Write error: {0}")]
    Write(String),

    /// Receive path failed
    #[error("Read error: {0}")]
    Read(String),

    /// Feature not supported
    #[error("Feature error: {0}")]
    Feature(String),
}

/// Connection state of an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Unconnected,
    Connected,
    Failure,
}

// ============================================================================
// Features
// ============================================================================

/// Optional controller capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    ErrorFrames,
    ListenOnly,
    FlexibleData,
    DeviceSpecificConfig,
}

impl Feature {
    const fn bit(self) -> u8 {
        match self {
            Feature::ErrorFrames => 0x01,
            Feature::ListenOnly => 0x02,
            Feature::FlexibleData => 0x04,
            Feature::DeviceSpecificConfig => 0x08,
        }
    }
}

/// Set of [`Feature`]s
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FeatureSet(u8);

impl FeatureSet {
    pub const EMPTY: FeatureSet = FeatureSet(0);

    /// Capabilities of the virtual bus used when no adapter is attached
    pub const VIRTUAL_BUS: FeatureSet =
        FeatureSet(Feature::ErrorFrames.bit() | Feature::FlexibleData.bit());

    pub const fn only(feature: Feature) -> Self {
        FeatureSet(feature.bit())
    }

    pub const fn with(self, feature: Feature) -> Self {
        FeatureSet(self.0 | feature.bit())
    }

    pub fn contains(self, feature: Feature) -> bool {
        self.0 & feature.bit() != 0
    }

    pub fn intersection(self, other: FeatureSet) -> Self {
        FeatureSet(self.0 & other.0)
    }

    pub fn difference(self, other: FeatureSet) -> Self {
        FeatureSet(self.0 & !other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Feature> {
        [
            Feature::ErrorFrames,
            Feature::ListenOnly,
            Feature::FlexibleData,
            Feature::DeviceSpecificConfig,
        ]
        .into_iter()
        .filter(move |feature| self.contains(*feature))
    }
}

impl BitOr for FeatureSet {
    type Output = FeatureSet;

    fn bitor(self, rhs: FeatureSet) -> FeatureSet {
        FeatureSet(self.0 | rhs.0)
    }
}

impl From<Feature> for FeatureSet {
    fn from(feature: Feature) -> Self {
        FeatureSet::only(feature)
    }
}

impl FromIterator<Feature> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        iter.into_iter().fold(FeatureSet::EMPTY, FeatureSet::with)
    }
}

impl fmt::Debug for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

// ============================================================================
// Statistics and events
// ============================================================================

/// Frame counters maintained by an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AdapterStatistics {
    pub received: u64,
    pub transmitted: u64,
    pub errors: u64,
}

impl AdapterStatistics {
    pub fn record_received(&mut self) {
        self.received += 1;
    }

    pub fn record_transmitted(&mut self) {
        self.transmitted += 1;
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Notification from an adapter to its broker
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    ConnectionChanged(ConnectionState),
    /// At least one frame is ready to be read
    NewDataAvailable,
    StateChanged(BusState),
    LogMessage(String, LogLevel),
}

pub type AdapterEventSender = mpsc::UnboundedSender<AdapterEvent>;
pub type AdapterEventReceiver = mpsc::UnboundedReceiver<AdapterEvent>;

// ============================================================================
// Adapter trait
// ============================================================================

/// Contract implemented by every CAN interface backend
#[async_trait]
pub trait CanAdapter: Send + Sync + fmt::Debug {
    /// Human-readable interface name
    fn name(&self) -> &str;

    /// Backend version string
    fn version(&self) -> &str;

    /// Install the channel used for [`AdapterEvent`]s, replacing any previous one
    fn subscribe(&mut self, events: AdapterEventSender);

    /// Open the interface
    async fn connect(&mut self) -> Result<(), AdapterError>;

    /// Close the interface; calling it twice is harmless
    async fn disconnect(&mut self) -> Result<(), AdapterError>;

    fn connection_state(&self) -> ConnectionState;

    /// Configure nominal and data bitrate (the controller should be in init mode)
    async fn set_bitrate(&mut self, nominal: Bitrate, data: Bitrate) -> Result<(), AdapterError>;

    async fn set_mode(&mut self, mode: Mode) -> Result<(), AdapterError>;

    /// Fetch the next received frame, `Ok(None)` when the receive queue is empty
    async fn read(&mut self) -> Result<Option<Frame>, AdapterError>;

    /// Transmit a frame
    async fn write(&mut self, frame: &Frame) -> Result<(), AdapterError>;

    fn supported_features(&self) -> FeatureSet;

    async fn enable_features(&mut self, features: FeatureSet) -> Result<(), AdapterError>;

    async fn disable_features(&mut self, features: FeatureSet) -> Result<(), AdapterError>;

    fn statistics(&self) -> AdapterStatistics;

    /// Reset the controller and clear its error counters
    async fn reset(&mut self) -> Result<(), AdapterError>;
}
