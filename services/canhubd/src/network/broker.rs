//! Network broker
//!
//! One broker task per CAN channel. It exclusively owns the channel state:
//! the client registry, the optional adapter, statistics and endpoints.
//! Everything else talks to it through a [`NetworkHandle`], so no lock guards
//! the client lists and a broadcast pass never races a disconnect.
//!
//! The run loop multiplexes four sources:
//! - commands from handles (client traffic, settings, configuration)
//! - adapter events
//! - the adapter poll timer
//! - the statistics timer

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::clients::{ClientId, ClientKind, ClientLimits, ClientRegistry, ClientSink, Outbound};
use super::handle::{Command, NetworkHandle};
use super::listener::Endpoints;
use super::settings::{ChannelSnapshot, SettingsDocument};
use super::statistics::Statistics;
use crate::adapter::{
    AdapterEvent, AdapterEventReceiver, CanAdapter, ConnectionState, Feature, FeatureSet,
};
use crate::config::ServerConfig;
use crate::error::{BrokerError, Result};
use canhub_frame::{
    ApiFrame, Bitrate, BusState, ErrorFrame, ErrorType, Frame, LogLevel, Mode, RawFrame, Timestamp,
};

/// Depth of the command queue shared by all handles of a channel
const COMMAND_QUEUE_DEPTH: usize = 1024;

/// Origin of a routed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Client(ClientId),
    Adapter,
}

impl Source {
    fn client(self) -> Option<ClientId> {
        match self {
            Source::Client(id) => Some(id),
            Source::Adapter => None,
        }
    }
}

/// Adapter request issued by the broker
#[derive(Debug, Clone, Copy)]
enum AdapterOp {
    SetMode(Mode),
    SetBitrate(Bitrate, Bitrate),
    Enable(FeatureSet),
    Disable(FeatureSet),
    Reset,
}

/// Attached interface together with its event stream
#[derive(Debug)]
struct Interface {
    adapter: Box<dyn CanAdapter>,
    events: AdapterEventReceiver,
    /// Next time the adapter receive queue is checked
    next_poll: Instant,
    /// Whether the current drain pass produced frames
    draining: bool,
}

#[derive(Debug)]
pub struct NetworkBroker {
    id: u8,
    name: String,
    config: Arc<ServerConfig>,
    commands: mpsc::Receiver<Command>,
    self_tx: mpsc::WeakSender<Command>,

    nominal: Bitrate,
    data: Bitrate,
    enabled: bool,
    error_frames: bool,
    flexible_data: bool,
    listen_only: bool,
    bus_state: BusState,
    last_error: Option<String>,

    statistics: Statistics,
    clients: ClientRegistry,
    interface: Option<Interface>,
    endpoints: Option<Endpoints>,
}

impl NetworkBroker {
    /// Spawn the broker task for channel `id` and return its handle
    pub fn spawn(id: u8, name: impl Into<String>, config: Arc<ServerConfig>) -> NetworkHandle {
        let (tx, commands) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let limits = ClientLimits {
            local: config.max_local_clients,
            remote: config.max_remote_clients,
            settings: config.max_settings_clients,
        };

        let broker = NetworkBroker {
            id,
            name: name.into(),
            config,
            commands,
            self_tx: tx.downgrade(),
            nominal: Bitrate::Unset,
            data: Bitrate::Unset,
            enabled: false,
            error_frames: false,
            flexible_data: false,
            listen_only: false,
            bus_state: BusState::Stopped,
            last_error: None,
            statistics: Statistics::new(),
            clients: ClientRegistry::new(limits),
            interface: None,
            endpoints: None,
        };

        tokio::spawn(broker.run());
        NetworkHandle::new(id, tx)
    }

    async fn run(mut self) {
        info!("Channel {} ({}) broker started", self.id, self.name);

        let period = self.config.statistics_interval();
        let mut stats_timer = interval_at(Instant::now() + period, period);
        stats_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let poll_at = self.interface.as_ref().map(|iface| iface.next_poll);

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.shutdown().await;
                        let _ = reply.send(());
                        break;
                    },
                    Some(command) => self.handle_command(command).await,
                    None => {
                        self.shutdown().await;
                        break;
                    },
                },
                event = next_event(&mut self.interface) => match event {
                    Some(event) => self.handle_adapter_event(event).await,
                    None => {
                        warn!("Channel {} adapter event stream ended", self.id);
                        self.detach_interface().await;
                    },
                },
                _ = poll_due(poll_at) => self.poll_adapter().await,
                now = stats_timer.tick() => self.tick_statistics(now),
            }
        }

        info!("Channel {} broker stopped", self.id);
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::AddInterface { adapter, reply } => {
                let _ = reply.send(self.add_interface(adapter).await);
            },
            Command::RemoveInterface { reply } => {
                self.detach_interface().await;
                self.publish_settings();
                let _ = reply.send(());
            },
            Command::AttachClient { kind, sink, reply } => {
                let _ = reply.send(self.attach_client(kind, sink));
            },
            Command::DetachClient { id } => {
                if let Some(kind) = self.clients.detach(id) {
                    debug!("Channel {} detached {} client {}", self.id, kind, id);
                }
            },
            Command::RouteFrame { source, frame } => {
                self.route_frame(Source::Client(source), frame).await;
            },
            Command::SetBitrate {
                nominal,
                data,
                reply,
            } => {
                let result = self.set_bitrate(nominal, data).await;
                self.publish_settings();
                let _ = reply.send(result);
            },
            Command::SetEnabled { enabled, reply } => {
                let result = self.set_enabled(enabled).await;
                self.publish_settings();
                let _ = reply.send(result);
            },
            Command::SetFeature {
                feature,
                enabled,
                reply,
            } => {
                let result = self.set_feature(feature, enabled).await;
                self.publish_settings();
                let _ = reply.send(result);
            },
            Command::SetName { name } => {
                self.name = name;
                self.publish_settings();
            },
            Command::Reset { reply } => {
                let result = self.reset().await;
                self.publish_settings();
                let _ = reply.send(result);
            },
            Command::ApplySettings { document, reply } => {
                let result = self.apply_settings(document).await;
                let _ = reply.send(result);
            },
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            },
            // handled by the run loop
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            },
        }
    }

    // ========================================================================
    // Clients
    // ========================================================================

    fn attach_client(&mut self, kind: ClientKind, sink: ClientSink) -> Result<ClientId> {
        let id = self.clients.attach(kind, sink).map_err(|e| {
            warn!("Channel {}: {}", self.id, e);
            e
        })?;

        if kind == ClientKind::Settings {
            if let Some(document) = self.settings_json() {
                self.clients.send_to(id, Outbound::Settings(document));
            }
        }
        Ok(id)
    }

    // ========================================================================
    // Routing
    // ========================================================================

    async fn route_frame(&mut self, source: Source, mut frame: RawFrame) {
        if let Err(e) = frame.verify() {
            warn!("Channel {} dropped frame from {:?}: {}", self.id, source, e);
            return;
        }

        if frame.is_api() {
            if source != Source::Adapter {
                self.handle_api_frame(frame).await;
            }
            return;
        }

        if !self.enabled && source != Source::Adapter {
            debug!("Channel {} is disabled, dropping client frame", self.id);
            return;
        }

        // layout errors a checksum cannot catch (DLC range, unknown enum values)
        let decoded = match frame.decode() {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("Channel {} dropped malformed frame from {:?}: {}", self.id, source, e);
                return;
            },
        };

        if self.config.timestamp_frames {
            frame.set_timestamp(Timestamp::now());
        }
        self.statistics.record(&frame);

        if source == Source::Adapter {
            if frame.is_error() && !self.error_frames {
                return;
            }
        } else if !frame.is_error() && self.interface.is_some() {
            if let Err(e) = self.forward_to_adapter(&decoded).await {
                warn!("Channel {} adapter write failed: {}", self.id, e);
                self.last_error = Some(e.to_string());
                return;
            }
        }

        self.clients.broadcast_frame(frame, source.client());
    }

    async fn forward_to_adapter(&mut self, frame: &Frame) -> Result<()> {
        if self.listen_only {
            return Err(BrokerError::state("listen-only mode, frame not transmitted"));
        }
        if let Some(iface) = self.interface.as_mut() {
            iface.adapter.write(frame).await?;
        }
        Ok(())
    }

    async fn handle_api_frame(&mut self, frame: RawFrame) {
        let api = match frame.decode() {
            Ok(Frame::Api(api)) => api,
            Ok(_) => return,
            Err(e) => {
                warn!("Channel {} dropped API frame: {}", self.id, e);
                return;
            },
        };

        match api {
            ApiFrame::None => {},
            ApiFrame::Bitrate { nominal, data } => {
                if !self.config.allow_bitrate_change {
                    warn!("Channel {}: bitrate change is not permitted", self.id);
                    return;
                }
                if let Err(e) = self.set_bitrate(nominal, data).await {
                    warn!("Channel {}: bitrate request failed: {}", self.id, e);
                }
                self.publish_settings();
            },
            ApiFrame::Mode(mode) => {
                if !self.config.allow_mode_change {
                    warn!("Channel {}: mode change is not permitted", self.id);
                    return;
                }
                if let Err(e) = self.apply_mode(mode).await {
                    warn!("Channel {}: mode request failed: {}", self.id, e);
                }
                self.publish_settings();
            },
            ApiFrame::DriverInit => info!("Channel {}: client driver initialised", self.id),
            ApiFrame::DriverRelease => info!("Channel {}: client driver released", self.id),
            ApiFrame::ProcessId(pid) => debug!("Channel {}: client process id {}", self.id, pid),
            ApiFrame::Name(name) => info!("Channel {}: client name \"{}\"", self.id, name),
        }
    }

    // ========================================================================
    // Adapter
    // ========================================================================

    async fn add_interface(&mut self, mut adapter: Box<dyn CanAdapter>) -> Result<()> {
        if let Some(iface) = &self.interface {
            return Err(BrokerError::capacity(format!(
                "Channel {} already has interface {}",
                self.id,
                iface.adapter.name()
            )));
        }

        let (events_tx, events) = mpsc::unbounded_channel();
        adapter.subscribe(events_tx);
        adapter.connect().await.map_err(|e| {
            warn!("Channel {}: {} failed to connect: {}", self.id, adapter.name(), e);
            BrokerError::from(e)
        })?;

        info!(
            "Channel {}: attached interface {} {}",
            self.id,
            adapter.name(),
            adapter.version()
        );

        self.interface = Some(Interface {
            adapter,
            events,
            next_poll: Instant::now(),
            draining: false,
        });

        // features the adapter cannot provide are switched off
        let enabled = self.enabled_features().intersection(self.supported_features());
        self.error_frames = enabled.contains(Feature::ErrorFrames);
        self.flexible_data = enabled.contains(Feature::FlexibleData);
        self.listen_only = enabled.contains(Feature::ListenOnly);
        if !self.flexible_data {
            self.data = Bitrate::Unset;
        }

        if !enabled.is_empty() {
            let _ = self.adapter_call(AdapterOp::Enable(enabled)).await;
        }
        if self.enabled {
            let _ = self.configure_adapter().await;
        }

        self.publish_settings();
        Ok(())
    }

    /// Detach and disconnect the adapter; a no-op without one
    async fn detach_interface(&mut self) {
        let Some(mut iface) = self.interface.take() else {
            return;
        };
        if let Err(e) = iface.adapter.disconnect().await {
            warn!("Channel {}: disconnect failed: {}", self.id, e);
        }
        info!("Channel {}: detached interface {}", self.id, iface.adapter.name());

        // the virtual bus has no listen-only support
        self.listen_only = false;
        self.bus_state = if self.enabled {
            BusState::BusActive
        } else {
            BusState::Stopped
        };
    }

    fn supported_features(&self) -> FeatureSet {
        self.interface
            .as_ref()
            .map_or(FeatureSet::VIRTUAL_BUS, |iface| iface.adapter.supported_features())
    }

    fn enabled_features(&self) -> FeatureSet {
        [
            (Feature::ErrorFrames, self.error_frames),
            (Feature::FlexibleData, self.flexible_data),
            (Feature::ListenOnly, self.listen_only),
        ]
        .into_iter()
        .filter(|(_, on)| *on)
        .map(|(feature, _)| feature)
        .collect()
    }

    fn operation_mode(&self) -> Mode {
        if self.listen_only {
            Mode::ListenOnly
        } else {
            Mode::Operation
        }
    }

    /// Run one adapter call, recording a failure as the channel's last error
    async fn adapter_call(&mut self, op: AdapterOp) -> Result<()> {
        let Some(iface) = self.interface.as_mut() else {
            return Ok(());
        };
        let adapter = &mut iface.adapter;
        let result = match op {
            AdapterOp::SetMode(mode) => adapter.set_mode(mode).await,
            AdapterOp::SetBitrate(nominal, data) => adapter.set_bitrate(nominal, data).await,
            AdapterOp::Enable(features) => adapter.enable_features(features).await,
            AdapterOp::Disable(features) => adapter.disable_features(features).await,
            AdapterOp::Reset => adapter.reset().await,
        };
        result.map_err(|e| {
            warn!("Channel {}: {:?} failed: {}", self.id, op, e);
            self.last_error = Some(e.to_string());
            BrokerError::from(e)
        })
    }

    /// Init, bitrate, then the operating mode
    async fn configure_adapter(&mut self) -> Result<()> {
        self.adapter_call(AdapterOp::SetMode(Mode::Init)).await?;
        self.adapter_call(AdapterOp::SetBitrate(self.nominal, self.data))
            .await?;
        if self.enabled {
            self.adapter_call(AdapterOp::SetMode(self.operation_mode()))
                .await?;
        }
        Ok(())
    }

    async fn poll_adapter(&mut self) {
        let Some(iface) = self.interface.as_mut() else {
            return;
        };

        let result = iface.adapter.read().await;
        let now = Instant::now();
        match result {
            Ok(Some(frame)) => {
                iface.draining = true;
                // keep draining, other event sources interleave between reads
                iface.next_poll = now;
                match frame.to_raw() {
                    Ok(raw) => self.route_frame(Source::Adapter, raw).await,
                    Err(e) => warn!("Channel {}: adapter frame rejected: {}", self.id, e),
                }
            },
            Ok(None) => {
                let backoff = if iface.draining {
                    self.config.busy_backoff()
                } else {
                    self.config.idle_backoff()
                };
                iface.draining = false;
                iface.next_poll = now + backoff;
            },
            Err(e) => {
                iface.draining = false;
                iface.next_poll = now + self.config.idle_backoff();
                warn!("Channel {}: adapter read failed: {}", self.id, e);
                self.last_error = Some(e.to_string());
            },
        }
    }

    async fn handle_adapter_event(&mut self, event: AdapterEvent) {
        match event {
            AdapterEvent::NewDataAvailable => {
                if let Some(iface) = self.interface.as_mut() {
                    iface.next_poll = Instant::now();
                }
            },
            AdapterEvent::ConnectionChanged(ConnectionState::Failure) => {
                error!("Channel {}: interface connection lost", self.id);
                self.last_error = Some("interface connection lost".to_string());
                self.detach_interface().await;
                self.publish_settings();
            },
            AdapterEvent::ConnectionChanged(state) => {
                debug!("Channel {}: interface {:?}", self.id, state);
            },
            AdapterEvent::StateChanged(state) => self.bus_state_changed(state).await,
            AdapterEvent::LogMessage(text, level) => self.adapter_log(&text, level),
        }
    }

    async fn bus_state_changed(&mut self, state: BusState) {
        if state == self.bus_state {
            return;
        }
        info!(
            "Channel {}: bus state {} -> {}",
            self.id,
            self.bus_state.description(),
            state.description()
        );
        self.bus_state = state;

        if self.error_frames {
            let mut report = ErrorFrame::new(state, ErrorType::None);
            report.timestamp = Timestamp::now();
            match Frame::Error(report).to_raw() {
                Ok(raw) => {
                    self.clients.broadcast_frame(raw, None);
                    self.statistics.record(&raw);
                },
                Err(e) => warn!("Channel {}: state report not encoded: {}", self.id, e),
            }
        }

        if state == BusState::BusOff && self.config.allow_bus_off_recovery && self.enabled {
            warn!("Channel {}: bus-off, recovering", self.id);
            if self.adapter_call(AdapterOp::Reset).await.is_ok() {
                let _ = self
                    .adapter_call(AdapterOp::SetMode(self.operation_mode()))
                    .await;
            }
        }

        self.publish_settings();
    }

    fn adapter_log(&self, text: &str, level: LogLevel) {
        match level {
            LogLevel::Debug => debug!("Channel {} interface: {}", self.id, text),
            LogLevel::Info | LogLevel::Notice => info!("Channel {} interface: {}", self.id, text),
            LogLevel::Warn => warn!("Channel {} interface: {}", self.id, text),
            LogLevel::Error => error!("Channel {} interface: {}", self.id, text),
        }
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    async fn set_bitrate(&mut self, nominal: Bitrate, data: Bitrate) -> Result<()> {
        let data = if self.flexible_data {
            data
        } else {
            Bitrate::Unset
        };
        if (nominal, data) == (self.nominal, self.data) {
            return Ok(());
        }

        info!("Channel {}: bitrate {} / {}", self.id, nominal, data);
        self.nominal = nominal;
        self.data = data;

        if self.interface.is_some() {
            self.configure_adapter().await?;
        }
        Ok(())
    }

    async fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        if enabled == self.enabled {
            return Ok(());
        }

        if enabled {
            let handle = self
                .self_tx
                .upgrade()
                .map(|tx| NetworkHandle::new(self.id, tx))
                .ok_or_else(|| BrokerError::channel_closed(self.id))?;
            let endpoints = Endpoints::open(self.id, &self.config, handle).await?;
            self.endpoints = Some(endpoints);
            self.enabled = true;
            self.bus_state = BusState::BusActive;
            info!("Channel {} ({}) enabled", self.id, self.name);

            if self.interface.is_some() {
                let _ = self.configure_adapter().await;
            }
        } else {
            self.endpoints = None;
            let dropped = self
                .clients
                .detach_kinds(&[ClientKind::Local, ClientKind::Remote]);
            self.enabled = false;
            self.bus_state = BusState::Stopped;
            info!(
                "Channel {} ({}) disabled, {} clients disconnected",
                self.id, self.name, dropped
            );

            let _ = self.adapter_call(AdapterOp::SetMode(Mode::Init)).await;
        }
        Ok(())
    }

    /// Set a feature flag if supported; returns the resulting flag
    async fn set_feature(&mut self, feature: Feature, enabled: bool) -> Result<bool> {
        let supported = self.supported_features().contains(feature);
        let requested = enabled && supported;
        if enabled && !supported {
            info!("Channel {}: {:?} is not supported", self.id, feature);
        }

        // the adapter is told on every call, also when the flag is unchanged
        let set = FeatureSet::only(feature);
        let op = if requested {
            AdapterOp::Enable(set)
        } else {
            AdapterOp::Disable(set)
        };
        self.adapter_call(op).await?;

        let current = self.feature_flag(feature);
        if requested == current {
            return Ok(current);
        }

        match feature {
            Feature::ErrorFrames => self.error_frames = requested,
            Feature::FlexibleData => {
                self.flexible_data = requested;
                if !requested && self.data.is_set() {
                    let nominal = self.nominal;
                    self.set_bitrate(nominal, Bitrate::Unset).await?;
                }
            },
            Feature::ListenOnly => {
                self.listen_only = requested;
                if self.enabled {
                    self.adapter_call(AdapterOp::SetMode(self.operation_mode()))
                        .await?;
                }
            },
            Feature::DeviceSpecificConfig => {},
        }
        Ok(requested)
    }

    fn feature_flag(&self, feature: Feature) -> bool {
        match feature {
            Feature::ErrorFrames => self.error_frames,
            Feature::FlexibleData => self.flexible_data,
            Feature::ListenOnly => self.listen_only,
            Feature::DeviceSpecificConfig => false,
        }
    }

    async fn apply_mode(&mut self, mode: Mode) -> Result<()> {
        match mode {
            Mode::Init => self.set_enabled(false).await,
            Mode::Operation => {
                self.set_feature(Feature::ListenOnly, false).await?;
                self.set_enabled(true).await
            },
            Mode::ListenOnly => {
                if !self.set_feature(Feature::ListenOnly, true).await? {
                    return Err(BrokerError::state(format!(
                        "Channel {} does not support listen-only",
                        self.id
                    )));
                }
                self.set_enabled(true).await
            },
            other => Err(BrokerError::state(format!("{other} mode is not supported"))),
        }
    }

    async fn reset(&mut self) -> Result<()> {
        info!("Channel {}: reset", self.id);
        self.statistics.reset();
        self.last_error = None;
        self.bus_state = if self.enabled {
            BusState::BusActive
        } else {
            BusState::Stopped
        };
        self.adapter_call(AdapterOp::Reset).await
    }

    async fn apply_settings(&mut self, document: SettingsDocument) -> Result<()> {
        if !document.targets(self.id) {
            debug!(
                "Channel {} ignored settings for channel {:?}",
                self.id, document.channel
            );
            return Ok(());
        }

        let mut first_error = None;
        let mut note = |result: Result<()>| {
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        };

        if let Some(name) = document.name.clone() {
            self.name = name;
        }
        if let Some(on) = document.error_frame_enabled {
            note(self.set_feature(Feature::ErrorFrames, on).await.map(drop));
        }
        if let Some(on) = document.flexible_data_enabled {
            note(self.set_feature(Feature::FlexibleData, on).await.map(drop));
        }
        if let Some(on) = document.listen_only_enabled {
            note(self.set_feature(Feature::ListenOnly, on).await.map(drop));
        }

        if document.bitrate_nominal.is_some() || document.bitrate_data.is_some() {
            if self.config.allow_bitrate_change {
                let nominal = document.bitrate_nominal.map_or(self.nominal, Bitrate::from_raw);
                let data = document.bitrate_data.map_or(self.data, Bitrate::from_raw);
                note(self.set_bitrate(nominal, data).await);
            } else {
                warn!("Channel {}: bitrate change is not permitted", self.id);
            }
        }

        if let Some(raw) = document.mode {
            if !self.config.allow_mode_change {
                warn!("Channel {}: mode change is not permitted", self.id);
            } else {
                match document.requested_mode() {
                    Some(mode) => note(self.apply_mode(mode).await),
                    None => note(Err(BrokerError::data(format!("Unknown mode {raw}")))),
                }
            }
        }

        if let Some(enabled) = document.enabled {
            note(self.set_enabled(enabled).await);
        }
        if document.reset == Some(true) {
            note(self.reset().await);
        }

        self.publish_settings();
        first_error.map_or(Ok(()), Err)
    }

    // ========================================================================
    // Snapshots and statistics
    // ========================================================================

    fn snapshot(&self) -> ChannelSnapshot {
        let supported = self.supported_features();
        let adapter = self.interface.as_ref().map(|iface| &iface.adapter);
        ChannelSnapshot {
            id: self.id,
            name: self.name.clone(),
            enabled: self.enabled,
            bus_state: self.bus_state,
            bitrate_nominal: self.nominal,
            bitrate_data: self.data,
            error_frame_enabled: self.error_frames,
            error_frame_support: supported.contains(Feature::ErrorFrames),
            flexible_data_enabled: self.flexible_data,
            flexible_data_support: supported.contains(Feature::FlexibleData),
            listen_only_enabled: self.listen_only,
            listen_only_support: supported.contains(Feature::ListenOnly),
            frame_count: self.statistics.frame_count(),
            error_count: self.statistics.error_count(),
            bus_load: self.statistics.bus_load(),
            frames_per_second: self.statistics.frames_per_second(),
            last_error: self.last_error.clone(),
            interface_name: adapter.map(|a| a.name().to_string()),
            interface_version: adapter.map(|a| a.version().to_string()),
            local_clients: self.clients.count(ClientKind::Local),
            remote_clients: self.clients.count(ClientKind::Remote),
            settings_clients: self.clients.count(ClientKind::Settings),
            endpoints: self.endpoints.as_ref().map(|e| e.info().clone()),
        }
    }

    fn settings_json(&self) -> Option<String> {
        let mut document = SettingsDocument::from(&self.snapshot());
        document.log_level = Some(common::logging::get_log_level());
        match document.to_json() {
            Ok(json) => Some(json),
            Err(e) => {
                error!("Channel {}: settings not serialised: {}", self.id, e);
                None
            },
        }
    }

    /// Push the current settings to every settings client
    fn publish_settings(&mut self) {
        if self.clients.count(ClientKind::Settings) == 0 {
            return;
        }
        if let Some(document) = self.settings_json() {
            self.clients.broadcast_settings(&document);
        }
    }

    fn tick_statistics(&mut self, now: Instant) {
        if self.statistics.tick(now, self.nominal) {
            self.publish_settings();
        }
    }

    async fn shutdown(&mut self) {
        self.endpoints = None;
        self.detach_interface().await;
        self.clients
            .detach_kinds(&[ClientKind::Local, ClientKind::Remote, ClientKind::Settings]);
        self.enabled = false;
        self.bus_state = BusState::Stopped;
    }
}

async fn next_event(interface: &mut Option<Interface>) -> Option<AdapterEvent> {
    match interface {
        Some(iface) => iface.events.recv().await,
        None => std::future::pending().await,
    }
}

async fn poll_due(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
