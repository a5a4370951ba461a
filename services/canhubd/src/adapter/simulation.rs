//! Simulated CAN transceiver
//!
//! Behaves like a controller attached to a bus with a single responsive node:
//! every written data frame is answered with identifier + 1 and inverted
//! payload. A data frame with identifier 0 and at least two bytes is taken as
//! a command (`data[0]`) with a repeat count (`data[1]`), which lets tests and
//! demos trigger bursts, error frames and faults from any client.

use async_trait::async_trait;
use std::collections::VecDeque;
use tracing::debug;

use super::traits::{
    AdapterError, AdapterEvent, AdapterEventSender, AdapterStatistics, CanAdapter,
    ConnectionState, Feature, FeatureSet,
};
use canhub_frame::{
    Bitrate, BusState, CanId, DataFrame, ErrorFrame, ErrorType, Frame, LogLevel, Mode, Timestamp,
};

const SIMULATION_VERSION: &str = "1.0";

/// Error counter increment per simulated error frame
const ERROR_COUNTER_STEP: u8 = 8;

const SUPPORTED_FEATURES: FeatureSet = FeatureSet::only(Feature::ErrorFrames)
    .with(Feature::ListenOnly)
    .with(Feature::FlexibleData);

/// Command carried in `data[0]` of a frame with identifier 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum SimCommand {
    #[default]
    Idle,
    ReplyFrame,
    SendBurst,
    ErrorFrameRcv,
    ErrorFrameTrm,
    ConnectionFailure,
    LibraryError,
    DeviceError,
    UnknownError,
}

impl SimCommand {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SimCommand::ReplyFrame,
            2 => SimCommand::SendBurst,
            3 => SimCommand::ErrorFrameRcv,
            4 => SimCommand::ErrorFrameTrm,
            5 => SimCommand::ConnectionFailure,
            6 => SimCommand::LibraryError,
            7 => SimCommand::DeviceError,
            8 => SimCommand::UnknownError,
            _ => SimCommand::Idle,
        }
    }
}

/// Simulation adapter
#[derive(Debug)]
pub struct SimulationAdapter {
    name: String,
    connection: ConnectionState,
    events: Option<AdapterEventSender>,
    pending: VecDeque<Frame>,
    command: SimCommand,
    count: u8,
    rx_errors: u8,
    tx_errors: u8,
    bus_state: BusState,
    enabled_features: FeatureSet,
    nominal: Bitrate,
    data: Bitrate,
    mode: Mode,
    stats: AdapterStatistics,
}

impl SimulationAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connection: ConnectionState::Unconnected,
            events: None,
            pending: VecDeque::new(),
            command: SimCommand::Idle,
            count: 0,
            rx_errors: 0,
            tx_errors: 0,
            bus_state: BusState::Stopped,
            enabled_features: FeatureSet::EMPTY,
            nominal: Bitrate::Unset,
            data: Bitrate::Unset,
            mode: Mode::Init,
            stats: AdapterStatistics::default(),
        }
    }

    pub fn bus_state(&self) -> BusState {
        self.bus_state
    }

    pub fn bitrate(&self) -> (Bitrate, Bitrate) {
        (self.nominal, self.data)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    fn emit(&self, event: AdapterEvent) {
        if let Some(events) = &self.events {
            // the broker may already be gone during shutdown
            let _ = events.send(event);
        }
    }

    fn log(&self, text: impl Into<String>, level: LogLevel) {
        self.emit(AdapterEvent::LogMessage(text.into(), level));
    }

    fn ensure_connected(&self) -> Result<(), AdapterError> {
        match self.connection {
            ConnectionState::Connected => Ok(()),
            other => Err(AdapterError::Connection(format!(
                "{} is not connected ({:?})",
                self.name, other
            ))),
        }
    }

    fn update_bus_state(&mut self) {
        let state = BusState::from_error_counters(self.rx_errors, self.tx_errors);
        if state != self.bus_state {
            self.bus_state = state;
            self.emit(AdapterEvent::StateChanged(state));
        }
    }

    fn reply_to(frame: &DataFrame) -> Result<DataFrame, AdapterError> {
        let id = CanId::truncated(frame.id().raw().wrapping_add(1), frame.is_extended());
        let inverted: Vec<u8> = frame.data().iter().map(|byte| !byte).collect();
        let mut reply = frame.clone();
        reply.set_id(id);
        reply
            .set_data(&inverted)
            .map_err(|e| AdapterError::Write(e.to_string()))?;
        reply.timestamp = Timestamp::now();
        Ok(reply)
    }

    fn error_frame(&self, error_type: ErrorType) -> Frame {
        let mut frame = ErrorFrame::new(self.bus_state, error_type)
            .with_counters(self.rx_errors, self.tx_errors);
        frame.timestamp = Timestamp::now();
        Frame::Error(frame)
    }

    fn finish_command(&mut self) {
        self.command = SimCommand::Idle;
        self.count = 0;
    }

    /// Produce the next frame for the active command
    fn run_command(&mut self) -> Result<Option<Frame>, AdapterError> {
        match self.command {
            SimCommand::Idle | SimCommand::ReplyFrame => {
                self.finish_command();
                Ok(None)
            },
            SimCommand::SendBurst => {
                if self.count == 0 {
                    self.finish_command();
                    return Ok(None);
                }
                self.count -= 1;
                let mut frame = DataFrame::new(CanId::Standard(0x001), &[self.count])
                    .map_err(|e| AdapterError::Read(e.to_string()))?;
                frame.timestamp = Timestamp::now();
                Ok(Some(Frame::Data(frame)))
            },
            SimCommand::ErrorFrameRcv | SimCommand::ErrorFrameTrm => {
                if self.count == 0 {
                    self.finish_command();
                    return Ok(None);
                }
                self.count -= 1;
                let error_type = if self.command == SimCommand::ErrorFrameRcv {
                    self.rx_errors = self.rx_errors.saturating_add(ERROR_COUNTER_STEP);
                    ErrorType::Stuff
                } else {
                    self.tx_errors = self.tx_errors.saturating_add(ERROR_COUNTER_STEP);
                    ErrorType::Bit0
                };
                self.update_bus_state();
                self.stats.record_error();
                Ok(Some(self.error_frame(error_type)))
            },
            SimCommand::ConnectionFailure => {
                self.finish_command();
                self.connection = ConnectionState::Failure;
                self.emit(AdapterEvent::ConnectionChanged(ConnectionState::Failure));
                Err(AdapterError::Connection("simulated connection loss".to_string()))
            },
            SimCommand::LibraryError => {
                self.finish_command();
                Err(AdapterError::Library("simulated library fault".to_string()))
            },
            SimCommand::DeviceError => {
                self.finish_command();
                Err(AdapterError::Device("simulated device fault".to_string()))
            },
            SimCommand::UnknownError => {
                self.finish_command();
                Err(AdapterError::Read("simulated unknown fault".to_string()))
            },
        }
    }
}

#[async_trait]
impl CanAdapter for SimulationAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        SIMULATION_VERSION
    }

    fn subscribe(&mut self, events: AdapterEventSender) {
        self.events = Some(events);
    }

    async fn connect(&mut self) -> Result<(), AdapterError> {
        self.connection = ConnectionState::Connected;
        self.bus_state = BusState::BusActive;
        self.emit(AdapterEvent::ConnectionChanged(ConnectionState::Connected));
        self.emit(AdapterEvent::StateChanged(BusState::BusActive));
        self.log(format!("{} connected", self.name), LogLevel::Info);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), AdapterError> {
        if self.connection != ConnectionState::Unconnected {
            self.connection = ConnectionState::Unconnected;
            self.bus_state = BusState::Stopped;
            self.pending.clear();
            self.finish_command();
            self.emit(AdapterEvent::ConnectionChanged(ConnectionState::Unconnected));
        }
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    async fn set_bitrate(&mut self, nominal: Bitrate, data: Bitrate) -> Result<(), AdapterError> {
        if let (Some(nominal_bps), Some(data_bps)) = (nominal.bits_per_second(), data.bits_per_second())
        {
            if nominal_bps > 1_000_000 {
                return Err(AdapterError::Bitrate(format!(
                    "nominal bitrate {nominal} exceeds 1 MBit/s in FD mode"
                )));
            }
            if data_bps < nominal_bps {
                return Err(AdapterError::Bitrate(format!(
                    "data bitrate {data} is lower than nominal bitrate {nominal}"
                )));
            }
        }

        self.nominal = nominal;
        self.data = data;
        self.log(
            format!("Bitrate set to {nominal} / {data}"),
            LogLevel::Notice,
        );
        Ok(())
    }

    async fn set_mode(&mut self, mode: Mode) -> Result<(), AdapterError> {
        match mode {
            Mode::Operation => {
                self.stats.reset();
                self.mode = mode;
                Ok(())
            },
            Mode::Init => {
                self.mode = mode;
                Ok(())
            },
            other => Err(AdapterError::Mode(format!("{other} is not supported"))),
        }
    }

    async fn read(&mut self) -> Result<Option<Frame>, AdapterError> {
        self.ensure_connected()?;

        if let Some(frame) = self.pending.pop_front() {
            self.stats.record_received();
            return Ok(Some(frame));
        }

        let frame = self.run_command()?;
        if matches!(frame, Some(Frame::Data(_))) {
            self.stats.record_received();
        }
        Ok(frame)
    }

    async fn write(&mut self, frame: &Frame) -> Result<(), AdapterError> {
        self.ensure_connected()?;

        let Frame::Data(data_frame) = frame else {
            return Err(AdapterError::Write(format!(
                "{:?} frames cannot be transmitted",
                frame.kind()
            )));
        };
        self.stats.record_transmitted();

        if data_frame.id().raw() == 0 && data_frame.data_size() > 1 {
            let payload = data_frame.data();
            self.command = SimCommand::from_u8(payload[0]);
            self.count = payload[1];
            debug!(
                "Simulation command {:?} with count {}",
                self.command, self.count
            );
            if self.command == SimCommand::ReplyFrame {
                self.pending.push_back(Frame::Data(Self::reply_to(data_frame)?));
            }
        } else {
            self.pending.push_back(Frame::Data(Self::reply_to(data_frame)?));
        }

        self.emit(AdapterEvent::NewDataAvailable);
        Ok(())
    }

    fn supported_features(&self) -> FeatureSet {
        SUPPORTED_FEATURES
    }

    async fn enable_features(&mut self, features: FeatureSet) -> Result<(), AdapterError> {
        let unsupported = features.difference(SUPPORTED_FEATURES);
        if !unsupported.is_empty() {
            return Err(AdapterError::Feature(format!("{unsupported:?} not supported")));
        }
        self.enabled_features = self.enabled_features | features;
        Ok(())
    }

    async fn disable_features(&mut self, features: FeatureSet) -> Result<(), AdapterError> {
        self.enabled_features = self.enabled_features.difference(features);
        Ok(())
    }

    fn statistics(&self) -> AdapterStatistics {
        self.stats
    }

    async fn reset(&mut self) -> Result<(), AdapterError> {
        self.finish_command();
        self.pending.clear();
        self.rx_errors = 0;
        self.tx_errors = 0;
        self.bus_state = BusState::BusActive;
        self.emit(AdapterEvent::StateChanged(BusState::BusActive));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    async fn connected() -> (SimulationAdapter, mpsc::UnboundedReceiver<AdapterEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut adapter = SimulationAdapter::new("sim");
        adapter.subscribe(tx);
        adapter.connect().await.unwrap();
        (adapter, rx)
    }

    fn command(cmd: u8, count: u8) -> Frame {
        Frame::Data(DataFrame::new(CanId::Standard(0), &[cmd, count]).unwrap())
    }

    #[tokio::test]
    async fn test_reply_inverts_payload() {
        let (mut adapter, _events) = connected().await;
        let frame = DataFrame::new(CanId::Standard(0x100), &[0x11, 0x22]).unwrap();
        adapter.write(&Frame::Data(frame)).await.unwrap();

        let Some(Frame::Data(reply)) = adapter.read().await.unwrap() else {
            panic!("expected a reply frame");
        };
        assert_eq!(reply.id(), CanId::Standard(0x101));
        assert_eq!(reply.data(), &[0xEE, 0xDD]);
        assert_eq!(adapter.read().await.unwrap(), None);

        let stats = adapter.statistics();
        assert_eq!((stats.received, stats.transmitted), (1, 1));
    }

    #[tokio::test]
    async fn test_burst_counts_down() {
        let (mut adapter, _events) = connected().await;
        adapter.write(&command(2, 3)).await.unwrap();

        let mut payloads = Vec::new();
        while let Some(Frame::Data(frame)) = adapter.read().await.unwrap() {
            payloads.push(frame.data()[0]);
        }
        assert_eq!(payloads, vec![2, 1, 0]);
    }

    #[tokio::test]
    async fn test_tx_errors_reach_bus_off() {
        let (mut adapter, mut events) = connected().await;
        adapter.write(&command(4, 40)).await.unwrap();

        let mut last = None;
        while let Some(frame) = adapter.read().await.unwrap() {
            last = Some(frame);
        }
        let Some(Frame::Error(error)) = last else {
            panic!("expected error frames");
        };
        assert_eq!(error.tx_errors, 255);
        assert_eq!(error.bus_state, BusState::BusOff);
        assert_eq!(adapter.bus_state(), BusState::BusOff);

        let mut states = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let AdapterEvent::StateChanged(state) = event {
                states.push(state);
            }
        }
        assert_eq!(
            states,
            vec![
                BusState::BusActive,
                BusState::BusWarn,
                BusState::BusPassive,
                BusState::BusOff
            ]
        );

        adapter.reset().await.unwrap();
        assert_eq!(adapter.bus_state(), BusState::BusActive);
    }

    #[tokio::test]
    async fn test_connection_failure_command() {
        let (mut adapter, mut events) = connected().await;
        adapter.write(&command(5, 1)).await.unwrap();

        assert!(matches!(
            adapter.read().await,
            Err(AdapterError::Connection(_))
        ));
        assert_eq!(adapter.connection_state(), ConnectionState::Failure);

        let mut saw_failure = false;
        while let Ok(event) = events.try_recv() {
            saw_failure |= event == AdapterEvent::ConnectionChanged(ConnectionState::Failure);
        }
        assert!(saw_failure);
    }

    #[tokio::test]
    async fn test_fault_commands() {
        let (mut adapter, _events) = connected().await;
        adapter.write(&command(6, 1)).await.unwrap();
        assert!(matches!(adapter.read().await, Err(AdapterError::Library(_))));
        adapter.write(&command(7, 1)).await.unwrap();
        assert!(matches!(adapter.read().await, Err(AdapterError::Device(_))));
        assert_eq!(adapter.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_bitrate_validation() {
        let (mut adapter, _events) = connected().await;
        assert!(adapter.set_bitrate(Bitrate::KBIT_500, Bitrate::Unset).await.is_ok());
        assert!(adapter.set_bitrate(Bitrate::KBIT_500, Bitrate::MBIT_2).await.is_ok());
        assert!(adapter
            .set_bitrate(Bitrate::MBIT_2, Bitrate::MBIT_2)
            .await
            .is_err());
        assert!(adapter
            .set_bitrate(Bitrate::MBIT_1, Bitrate::KBIT_500)
            .await
            .is_err());
        assert_eq!(adapter.bitrate(), (Bitrate::KBIT_500, Bitrate::MBIT_2));
    }

    #[tokio::test]
    async fn test_modes() {
        let (mut adapter, _events) = connected().await;
        adapter.write(&command(2, 0)).await.unwrap();
        assert_eq!(adapter.statistics().transmitted, 1);

        adapter.set_mode(Mode::Operation).await.unwrap();
        assert_eq!(adapter.statistics(), AdapterStatistics::default());
        assert!(adapter.set_mode(Mode::Init).await.is_ok());
        assert!(matches!(
            adapter.set_mode(Mode::Sleep).await,
            Err(AdapterError::Mode(_))
        ));
    }

    #[tokio::test]
    async fn test_requires_connection() {
        let mut adapter = SimulationAdapter::new("sim");
        assert!(adapter.read().await.is_err());
        assert!(adapter.write(&command(1, 1)).await.is_err());
        assert!(adapter.disconnect().await.is_ok());
    }

    #[tokio::test]
    async fn test_feature_support() {
        let (mut adapter, _events) = connected().await;
        assert!(adapter
            .enable_features(FeatureSet::only(Feature::ListenOnly))
            .await
            .is_ok());
        assert!(adapter
            .enable_features(FeatureSet::only(Feature::DeviceSpecificConfig))
            .await
            .is_err());
    }
}
