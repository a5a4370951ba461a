//! Mock adapter for testing
//!
//! Lets broker logic be exercised without hardware. The adapter itself is
//! moved into the broker; tests keep a [`MockAdapterHandle`] to inject frames
//! and events and to inspect what the broker asked the adapter to do.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use super::traits::{
    AdapterError, AdapterEvent, AdapterEventSender, AdapterStatistics, CanAdapter,
    ConnectionState, FeatureSet,
};
use canhub_frame::{Bitrate, Frame, Mode};

/// Mock adapter configuration
#[derive(Debug, Clone)]
pub struct MockAdapterConfig {
    pub name: String,
    pub supported_features: FeatureSet,
    pub fail_connect: bool,
    pub fail_write: bool,
    pub fail_bitrate: bool,
}

impl Default for MockAdapterConfig {
    fn default() -> Self {
        Self {
            name: "Mock Adapter".to_string(),
            supported_features: FeatureSet::EMPTY,
            fail_connect: false,
            fail_write: false,
            fail_bitrate: false,
        }
    }
}

/// Call recorded by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Connect,
    Disconnect,
    SetBitrate(Bitrate, Bitrate),
    SetMode(Mode),
    EnableFeatures(FeatureSet),
    DisableFeatures(FeatureSet),
    Reset,
}

#[derive(Debug, Default)]
struct MockAdapterState {
    config: MockAdapterConfig,
    connection: ConnectionState,
    events: Option<AdapterEventSender>,
    /// Frames to be returned by `read`
    receive_queue: VecDeque<Frame>,
    /// History of written frames
    sent_frames: Vec<Frame>,
    calls: Vec<MockCall>,
    stats: AdapterStatistics,
}

/// Mock adapter implementation
#[derive(Debug)]
pub struct MockAdapter {
    name: String,
    state: Arc<Mutex<MockAdapterState>>,
}

/// Test-side view of a [`MockAdapter`]
#[derive(Debug, Clone)]
pub struct MockAdapterHandle {
    state: Arc<Mutex<MockAdapterState>>,
}

impl MockAdapter {
    pub fn new(config: MockAdapterConfig) -> Self {
        Self {
            name: config.name.clone(),
            state: Arc::new(Mutex::new(MockAdapterState {
                config,
                ..Default::default()
            })),
        }
    }

    pub fn with_features(features: FeatureSet) -> Self {
        Self::new(MockAdapterConfig {
            supported_features: features,
            ..Default::default()
        })
    }

    pub fn handle(&self) -> MockAdapterHandle {
        MockAdapterHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl MockAdapterHandle {
    /// Queue a frame for `read` and signal the broker (for testing)
    pub fn push_received(&self, frame: Frame) {
        let mut state = self.state.lock();
        state.receive_queue.push_back(frame);
        if let Some(events) = &state.events {
            let _ = events.send(AdapterEvent::NewDataAvailable);
        }
    }

    /// Deliver an arbitrary event to the subscribed broker (for testing)
    pub fn emit(&self, event: AdapterEvent) -> bool {
        let state = self.state.lock();
        state
            .events
            .as_ref()
            .is_some_and(|events| events.send(event).is_ok())
    }

    pub fn sent_frames(&self) -> Vec<Frame> {
        self.state.lock().sent_frames.clone()
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.lock().connection
    }

    pub fn set_write_failure(&self, should_fail: bool) {
        self.state.lock().config.fail_write = should_fail;
    }

    pub fn set_bitrate_failure(&self, should_fail: bool) {
        self.state.lock().config.fail_bitrate = should_fail;
    }
}

#[async_trait]
impl CanAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        "mock"
    }

    fn subscribe(&mut self, events: AdapterEventSender) {
        self.state.lock().events = Some(events);
    }

    async fn connect(&mut self) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::Connect);
        if state.config.fail_connect {
            state.connection = ConnectionState::Failure;
            return Err(AdapterError::Device("Mock connection failure".to_string()));
        }
        state.connection = ConnectionState::Connected;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::Disconnect);
        state.connection = ConnectionState::Unconnected;
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        self.state.lock().connection
    }

    async fn set_bitrate(&mut self, nominal: Bitrate, data: Bitrate) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::SetBitrate(nominal, data));
        if state.config.fail_bitrate {
            return Err(AdapterError::Bitrate(format!("Mock rejects {nominal}")));
        }
        Ok(())
    }

    async fn set_mode(&mut self, mode: Mode) -> Result<(), AdapterError> {
        self.state.lock().calls.push(MockCall::SetMode(mode));
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Frame>, AdapterError> {
        let mut state = self.state.lock();
        let frame = state.receive_queue.pop_front();
        if frame.is_some() {
            state.stats.record_received();
        }
        Ok(frame)
    }

    async fn write(&mut self, frame: &Frame) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        if state.config.fail_write {
            state.stats.record_error();
            return Err(AdapterError::Write("Mock write failure".to_string()));
        }
        state.sent_frames.push(frame.clone());
        state.stats.record_transmitted();
        Ok(())
    }

    fn supported_features(&self) -> FeatureSet {
        self.state.lock().config.supported_features
    }

    async fn enable_features(&mut self, features: FeatureSet) -> Result<(), AdapterError> {
        self.state.lock().calls.push(MockCall::EnableFeatures(features));
        Ok(())
    }

    async fn disable_features(&mut self, features: FeatureSet) -> Result<(), AdapterError> {
        self.state.lock().calls.push(MockCall::DisableFeatures(features));
        Ok(())
    }

    fn statistics(&self) -> AdapterStatistics {
        self.state.lock().stats
    }

    async fn reset(&mut self) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::Reset);
        state.stats.reset();
        Ok(())
    }
}
