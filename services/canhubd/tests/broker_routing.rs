//! Broker routing tests against a mock adapter

use std::sync::Arc;
use std::time::Duration;

use canhub_frame::frame::checksum;
use canhub_frame::{
    ApiFrame, Bitrate, BusState, CanId, DataFrame, ErrorFrame, ErrorType, Frame, Mode, RawFrame,
    Timestamp,
};
use canhubd::adapter::{
    AdapterEvent, Feature, FeatureSet, MockAdapter, MockAdapterHandle, MockCall,
};
use canhubd::network::{ClientId, ClientKind, NetworkBroker, NetworkHandle, Outbound};
use canhubd::{ChannelSnapshot, ServerConfig, SettingsDocument};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing_test::traced_test;

const WAIT: Duration = Duration::from_secs(2);

struct TestClient {
    id: ClientId,
    rx: mpsc::Receiver<Outbound>,
}

impl TestClient {
    async fn attach(handle: &NetworkHandle) -> Self {
        let (sink, rx) = mpsc::channel(64);
        let id = handle.attach_client(ClientKind::Local, sink).await.unwrap();
        Self { id, rx }
    }

    /// Next data or error frame, skipping anything else
    async fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match timeout(WAIT, self.rx.recv()).await {
                Ok(Some(Outbound::Frame(raw))) => return raw.decode().ok(),
                Ok(Some(Outbound::Settings(_))) => continue,
                _ => return None,
            }
        }
    }

    fn try_frame(&mut self) -> Option<Frame> {
        while let Ok(message) = self.rx.try_recv() {
            if let Outbound::Frame(raw) = message {
                return raw.decode().ok();
            }
        }
        None
    }
}

fn data(id: u16, payload: &[u8]) -> Frame {
    Frame::Data(DataFrame::new(CanId::Standard(id), payload).unwrap())
}

fn raw(frame: &Frame) -> RawFrame {
    frame.to_raw().unwrap()
}

fn payload(frame: &Frame) -> (u32, Vec<u8>) {
    match frame {
        Frame::Data(data) => (data.id().raw(), data.data().to_vec()),
        other => panic!("expected data frame, got {other:?}"),
    }
}

async fn enabled_channel() -> (NetworkHandle, TempDir) {
    enabled_channel_with(ServerConfig::default()).await
}

async fn enabled_channel_with(config: ServerConfig) -> (NetworkHandle, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        tcp_port_base: 0,
        settings_port: 0,
        local_socket_dir: dir.path().to_path_buf(),
        ..config
    };
    let handle = NetworkBroker::spawn(1, "CAN 1", Arc::new(config));
    handle.set_network_enabled(true).await.unwrap();
    (handle, dir)
}

/// Poll snapshots until `done` holds; adapter events race with commands
async fn wait_for(
    handle: &NetworkHandle,
    done: impl Fn(&ChannelSnapshot) -> bool,
) -> ChannelSnapshot {
    for _ in 0..100 {
        let snapshot = handle.snapshot().await.unwrap();
        if done(&snapshot) {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("channel never reached the expected state");
}

async fn wait_for_calls(mock: &MockAdapterHandle, call: &MockCall) -> Vec<MockCall> {
    for _ in 0..100 {
        let calls = mock.calls();
        if calls.contains(call) {
            return calls;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("adapter never saw {call:?}");
}

fn position(calls: &[MockCall], call: &MockCall) -> usize {
    calls.iter().position(|c| c == call).unwrap()
}

#[tokio::test]
async fn test_frames_are_not_echoed_to_sender() {
    let (handle, _dir) = enabled_channel().await;
    let mut a = TestClient::attach(&handle).await;
    let mut b = TestClient::attach(&handle).await;
    let mut c = TestClient::attach(&handle).await;

    handle
        .route_frame(a.id, raw(&data(0x100, &[0x11, 0x22])))
        .await
        .unwrap();

    assert_eq!(payload(&b.next_frame().await.unwrap()), (0x100, vec![0x11, 0x22]));
    assert_eq!(payload(&c.next_frame().await.unwrap()), (0x100, vec![0x11, 0x22]));

    // the snapshot round-trip orders after the routed frame
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.frame_count, 1);
    assert_eq!(snapshot.local_clients, 3);
    assert!(a.try_frame().is_none());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_disabled_channel_drops_client_frames() {
    let (handle, _dir) = enabled_channel().await;
    let mut a = TestClient::attach(&handle).await;
    let mut b = TestClient::attach(&handle).await;

    handle.set_network_enabled(false).await.unwrap();
    // frame clients are dropped on disable
    assert!(a.rx.recv().await.is_none());
    assert!(b.rx.recv().await.is_none());

    let a2 = TestClient::attach(&handle).await;
    let mut b2 = TestClient::attach(&handle).await;

    handle.route_frame(a2.id, raw(&data(0x1, &[1]))).await.unwrap();
    assert_eq!(handle.snapshot().await.unwrap().frame_count, 0);
    assert!(b2.try_frame().is_none());
}

#[tokio::test]
async fn test_client_frames_reach_adapter() {
    let (handle, _dir) = enabled_channel().await;
    let adapter = MockAdapter::with_features(FeatureSet::EMPTY);
    let mock = adapter.handle();
    handle.add_interface(Box::new(adapter)).await.unwrap();

    let mut a = TestClient::attach(&handle).await;
    let mut b = TestClient::attach(&handle).await;
    handle
        .route_frame(a.id, raw(&data(0x321, &[7, 8, 9])))
        .await
        .unwrap();

    assert_eq!(payload(&b.next_frame().await.unwrap()), (0x321, vec![7, 8, 9]));
    let sent = mock.sent_frames();
    assert_eq!(sent.len(), 1);
    assert_eq!(payload(&sent[0]), (0x321, vec![7, 8, 9]));
    assert!(a.try_frame().is_none());
}

#[tokio::test]
async fn test_adapter_frames_reach_every_client() {
    let (handle, _dir) = enabled_channel().await;
    let adapter = MockAdapter::with_features(FeatureSet::EMPTY);
    let mock = adapter.handle();
    handle.add_interface(Box::new(adapter)).await.unwrap();

    let mut a = TestClient::attach(&handle).await;
    let mut b = TestClient::attach(&handle).await;
    mock.push_received(data(0x42, &[0xAA]));

    assert_eq!(payload(&a.next_frame().await.unwrap()), (0x42, vec![0xAA]));
    assert_eq!(payload(&b.next_frame().await.unwrap()), (0x42, vec![0xAA]));
    assert_eq!(handle.snapshot().await.unwrap().frame_count, 1);
}

#[traced_test]
#[tokio::test]
async fn test_adapter_write_failure_aborts_broadcast() {
    let (handle, _dir) = enabled_channel().await;
    let adapter = MockAdapter::with_features(FeatureSet::EMPTY);
    let mock = adapter.handle();
    handle.add_interface(Box::new(adapter)).await.unwrap();
    mock.set_write_failure(true);

    let a = TestClient::attach(&handle).await;
    let mut b = TestClient::attach(&handle).await;
    handle.route_frame(a.id, raw(&data(0x10, &[1]))).await.unwrap();

    // counted before forwarding, so the failed write still shows up
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.frame_count, 1);
    assert!(snapshot.last_error.is_some());
    assert!(b.try_frame().is_none());
    assert!(logs_contain("adapter write failed"));
}

#[tokio::test]
async fn test_second_adapter_is_rejected() {
    let (handle, _dir) = enabled_channel().await;
    let first = MockAdapter::with_features(FeatureSet::EMPTY);
    let first_mock = first.handle();
    handle.add_interface(Box::new(first)).await.unwrap();

    let second = MockAdapter::with_features(FeatureSet::EMPTY);
    let second_mock = second.handle();
    let err = handle.add_interface(Box::new(second)).await.unwrap_err();
    assert!(err.is_capacity());
    assert!(second_mock.calls().is_empty());

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.interface_name.as_deref(), Some("Mock Adapter"));
    assert!(!first_mock.calls().contains(&MockCall::Disconnect));

    handle.remove_interface().await.unwrap();
    assert!(first_mock.calls().contains(&MockCall::Disconnect));
    assert!(handle.snapshot().await.unwrap().interface_name.is_none());
}

#[tokio::test]
async fn test_unchanged_bitrate_is_not_reapplied() {
    let (handle, _dir) = enabled_channel().await;
    let adapter = MockAdapter::with_features(FeatureSet::EMPTY);
    let mock = adapter.handle();
    handle.add_interface(Box::new(adapter)).await.unwrap();
    mock.clear_calls();

    handle
        .set_bitrate(Bitrate::KBIT_250, Bitrate::Unset)
        .await
        .unwrap();
    handle
        .set_bitrate(Bitrate::KBIT_250, Bitrate::Unset)
        .await
        .unwrap();

    let bitrate_calls = mock
        .calls()
        .into_iter()
        .filter(|call| matches!(call, MockCall::SetBitrate(..)))
        .count();
    assert_eq!(bitrate_calls, 1);
}

#[tokio::test]
async fn test_flexible_data_requires_support() {
    let (handle, _dir) = enabled_channel().await;
    handle
        .add_interface(Box::new(MockAdapter::with_features(FeatureSet::EMPTY)))
        .await
        .unwrap();

    assert!(!handle.set_flexible_data_enabled(true).await.unwrap());
    handle
        .set_bitrate(Bitrate::KBIT_500, Bitrate::MBIT_2)
        .await
        .unwrap();

    let snapshot = handle.snapshot().await.unwrap();
    assert!(!snapshot.flexible_data_support);
    assert!(!snapshot.flexible_data_enabled);
    assert_eq!(snapshot.bitrate_nominal, Bitrate::KBIT_500);
    assert_eq!(snapshot.bitrate_data, Bitrate::Unset);
}

#[tokio::test]
async fn test_virtual_bus_supports_flexible_data() {
    let (handle, _dir) = enabled_channel().await;

    assert!(handle.set_flexible_data_enabled(true).await.unwrap());
    handle
        .set_bitrate(Bitrate::KBIT_500, Bitrate::MBIT_2)
        .await
        .unwrap();
    assert_eq!(handle.snapshot().await.unwrap().bitrate_data, Bitrate::MBIT_2);

    assert!(!handle.set_flexible_data_enabled(false).await.unwrap());
    assert_eq!(handle.snapshot().await.unwrap().bitrate_data, Bitrate::Unset);

    // no listen-only without an adapter
    assert!(!handle.set_listen_only_enabled(true).await.unwrap());
}

#[tokio::test]
async fn test_adapter_error_frames_follow_flag() {
    let (handle, _dir) = enabled_channel().await;
    let adapter = MockAdapter::with_features(FeatureSet::only(Feature::ErrorFrames));
    let mock = adapter.handle();
    handle.add_interface(Box::new(adapter)).await.unwrap();
    let mut client = TestClient::attach(&handle).await;

    let error = Frame::Error(ErrorFrame::new(BusState::BusWarn, ErrorType::Stuff));
    mock.push_received(error.clone());
    mock.push_received(data(0x55, &[5]));

    // the data frame arrives, the error frame before it was withheld
    assert_eq!(payload(&client.next_frame().await.unwrap()), (0x55, vec![5]));
    assert_eq!(handle.snapshot().await.unwrap().error_count, 1);

    assert!(handle.set_error_frame_enabled(true).await.unwrap());
    mock.push_received(error);
    match client.next_frame().await.unwrap() {
        Frame::Error(frame) => assert_eq!(frame.bus_state, BusState::BusWarn),
        other => panic!("expected error frame, got {other:?}"),
    }
    assert_eq!(handle.snapshot().await.unwrap().error_count, 2);
}

#[tokio::test]
async fn test_api_frames_are_not_broadcast() {
    let (handle, _dir) = enabled_channel().await;
    let a = TestClient::attach(&handle).await;
    let mut b = TestClient::attach(&handle).await;

    let request = Frame::Api(ApiFrame::Bitrate {
        nominal: Bitrate::KBIT_125,
        data: Bitrate::Unset,
    });
    handle.route_frame(a.id, raw(&request)).await.unwrap();
    handle
        .route_frame(a.id, raw(&Frame::Api(ApiFrame::Name("logger".to_string()))))
        .await
        .unwrap();

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.bitrate_nominal, Bitrate::KBIT_125);
    assert_eq!(snapshot.frame_count, 0);
    assert!(b.try_frame().is_none());
}

#[tokio::test]
async fn test_connection_failure_detaches_adapter() {
    let (handle, _dir) = enabled_channel().await;
    let adapter = MockAdapter::with_features(FeatureSet::EMPTY);
    let mock = adapter.handle();
    handle.add_interface(Box::new(adapter)).await.unwrap();

    assert!(mock.emit(canhubd::adapter::AdapterEvent::ConnectionChanged(
        canhubd::adapter::ConnectionState::Failure
    )));

    let mut detached = false;
    for _ in 0..50 {
        if handle.snapshot().await.unwrap().interface_name.is_none() {
            detached = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(detached);
    let snapshot = handle.snapshot().await.unwrap();
    assert!(snapshot.enabled);
    assert!(snapshot.last_error.is_some());
}

#[traced_test]
#[tokio::test]
async fn test_malformed_frame_is_dropped_without_adapter() {
    let (handle, _dir) = enabled_channel().await;
    let a = TestClient::attach(&handle).await;
    let mut b = TestClient::attach(&handle).await;

    // classic frame claiming 12 bytes, resealed so the checksum still holds
    let mut bytes = raw(&data(0x10, &[0; 8])).into_bytes();
    bytes[4] = 12;
    let crc = checksum(&bytes[..94]);
    bytes[94..].copy_from_slice(&crc.to_be_bytes());
    let malformed = RawFrame::new(bytes);
    assert!(malformed.verify().is_ok());

    handle.route_frame(a.id, malformed).await.unwrap();

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.frame_count, 0);
    assert!(b.try_frame().is_none());
    assert!(logs_contain("dropped malformed frame"));

    // the channel keeps routing valid frames afterwards
    handle.route_frame(a.id, raw(&data(0x11, &[2]))).await.unwrap();
    assert_eq!(payload(&b.next_frame().await.unwrap()), (0x11, vec![2]));
}

#[tokio::test]
async fn test_reset_clears_counters_and_bus_state() {
    let (handle, _dir) = enabled_channel().await;
    let adapter = MockAdapter::with_features(FeatureSet::EMPTY);
    let mock = adapter.handle();
    handle.add_interface(Box::new(adapter)).await.unwrap();

    let a = TestClient::attach(&handle).await;
    handle.route_frame(a.id, raw(&data(0x1, &[1]))).await.unwrap();
    mock.push_received(Frame::Error(ErrorFrame::new(BusState::BusWarn, ErrorType::Ack)));
    mock.set_write_failure(true);
    handle.route_frame(a.id, raw(&data(0x2, &[2]))).await.unwrap();
    assert!(mock.emit(AdapterEvent::StateChanged(BusState::BusPassive)));

    let before =
        wait_for(&handle, |s| s.bus_state == BusState::BusPassive && s.error_count == 1).await;
    assert_eq!(before.frame_count, 2);
    assert!(before.last_error.is_some());

    mock.clear_calls();
    handle.reset().await.unwrap();

    let after = handle.snapshot().await.unwrap();
    assert_eq!(after.frame_count, 0);
    assert_eq!(after.error_count, 0);
    assert_eq!(after.bus_load, 0);
    assert_eq!(after.frames_per_second, 0);
    assert!(after.last_error.is_none());
    assert_eq!(after.bus_state, BusState::BusActive);
    assert_eq!(mock.calls(), vec![MockCall::Reset]);

    handle.set_network_enabled(false).await.unwrap();
    handle.reset().await.unwrap();
    assert_eq!(handle.snapshot().await.unwrap().bus_state, BusState::Stopped);
}

#[tokio::test]
async fn test_frames_are_restamped_on_arrival() {
    let (handle, _dir) = enabled_channel().await;
    let a = TestClient::attach(&handle).await;
    let mut b = TestClient::attach(&handle).await;

    let mut frame = DataFrame::new(CanId::Standard(0x7), &[7]).unwrap();
    frame.timestamp = Timestamp::new(5, 0);
    handle
        .route_frame(a.id, raw(&Frame::Data(frame)))
        .await
        .unwrap();

    let stamped = b.next_frame().await.unwrap().timestamp().unwrap();
    assert!(stamped.seconds() > 1_600_000_000);
}

#[tokio::test]
async fn test_client_timestamps_kept_when_stamping_is_off() {
    let (handle, _dir) = enabled_channel_with(ServerConfig {
        timestamp_frames: false,
        ..Default::default()
    })
    .await;
    let a = TestClient::attach(&handle).await;
    let mut b = TestClient::attach(&handle).await;

    let mut frame = DataFrame::new(CanId::Standard(0x7), &[7]).unwrap();
    frame.timestamp = Timestamp::new(5, 250);
    handle
        .route_frame(a.id, raw(&Frame::Data(frame)))
        .await
        .unwrap();

    let kept = b.next_frame().await.unwrap().timestamp().unwrap();
    assert_eq!(kept, Timestamp::new(5, 250));
}

#[tokio::test]
async fn test_bus_state_change_is_published() {
    let (handle, _dir) = enabled_channel().await;
    let adapter = MockAdapter::with_features(FeatureSet::only(Feature::ErrorFrames));
    let mock = adapter.handle();
    handle.add_interface(Box::new(adapter)).await.unwrap();
    assert!(handle.set_error_frame_enabled(true).await.unwrap());

    let mut client = TestClient::attach(&handle).await;
    let (sink, mut settings) = mpsc::channel(64);
    handle
        .attach_client(ClientKind::Settings, sink)
        .await
        .unwrap();

    assert!(mock.emit(AdapterEvent::StateChanged(BusState::BusWarn)));

    match client.next_frame().await.unwrap() {
        Frame::Error(frame) => {
            assert_eq!(frame.bus_state, BusState::BusWarn);
            assert_eq!(frame.error_type, ErrorType::None);
        },
        other => panic!("expected error frame, got {other:?}"),
    }

    let mut published = None;
    while let Ok(Some(message)) = timeout(WAIT, settings.recv()).await {
        if let Outbound::Settings(json) = message {
            let document = SettingsDocument::from_json(&json).unwrap();
            if document.state == Some(BusState::BusWarn.as_u8()) {
                published = Some(document);
                break;
            }
        }
    }
    let published = published.expect("bus state change was not published");
    assert_eq!(published.channel, Some(1));
    assert_eq!(published.frame_count_error, Some(1));
}

#[tokio::test]
async fn test_bus_state_change_without_error_frames_is_not_broadcast() {
    let (handle, _dir) = enabled_channel().await;
    let adapter = MockAdapter::with_features(FeatureSet::only(Feature::ErrorFrames));
    let mock = adapter.handle();
    handle.add_interface(Box::new(adapter)).await.unwrap();
    let mut client = TestClient::attach(&handle).await;

    assert!(mock.emit(AdapterEvent::StateChanged(BusState::BusPassive)));
    let snapshot = wait_for(&handle, |s| s.bus_state == BusState::BusPassive).await;
    assert_eq!(snapshot.error_count, 0);
    assert!(client.try_frame().is_none());
}

#[tokio::test]
async fn test_bus_off_is_recovered() {
    let (handle, _dir) = enabled_channel().await;
    let adapter = MockAdapter::with_features(FeatureSet::EMPTY);
    let mock = adapter.handle();
    handle.add_interface(Box::new(adapter)).await.unwrap();
    mock.clear_calls();

    assert!(mock.emit(AdapterEvent::StateChanged(BusState::BusOff)));
    let calls = wait_for_calls(&mock, &MockCall::SetMode(Mode::Operation)).await;

    let operation = position(&calls, &MockCall::SetMode(Mode::Operation));
    assert!(position(&calls, &MockCall::Reset) < operation);
}

#[tokio::test]
async fn test_bus_off_left_alone_when_recovery_is_off() {
    let (handle, _dir) = enabled_channel_with(ServerConfig {
        allow_bus_off_recovery: false,
        ..Default::default()
    })
    .await;
    let adapter = MockAdapter::with_features(FeatureSet::EMPTY);
    let mock = adapter.handle();
    handle.add_interface(Box::new(adapter)).await.unwrap();
    mock.clear_calls();

    assert!(mock.emit(AdapterEvent::StateChanged(BusState::BusOff)));
    wait_for(&handle, |s| s.bus_state == BusState::BusOff).await;
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_rejected_bitrate_is_kept() {
    let (handle, _dir) = enabled_channel().await;
    let adapter = MockAdapter::with_features(FeatureSet::EMPTY);
    let mock = adapter.handle();
    handle.add_interface(Box::new(adapter)).await.unwrap();
    mock.set_bitrate_failure(true);

    assert!(handle
        .set_bitrate(Bitrate::KBIT_500, Bitrate::Unset)
        .await
        .is_err());

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.bitrate_nominal, Bitrate::KBIT_500);
    assert!(snapshot.last_error.is_some());
    assert!(mock
        .calls()
        .contains(&MockCall::SetBitrate(Bitrate::KBIT_500, Bitrate::Unset)));
}

#[tokio::test]
async fn test_listen_only_frames_are_not_transmitted() {
    let (handle, _dir) = enabled_channel().await;
    let adapter = MockAdapter::with_features(FeatureSet::only(Feature::ListenOnly));
    let mock = adapter.handle();
    handle.add_interface(Box::new(adapter)).await.unwrap();

    assert!(handle.set_listen_only_enabled(true).await.unwrap());
    assert!(mock.calls().contains(&MockCall::SetMode(Mode::ListenOnly)));

    let a = TestClient::attach(&handle).await;
    let mut b = TestClient::attach(&handle).await;
    handle.route_frame(a.id, raw(&data(0x20, &[1]))).await.unwrap();

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.frame_count, 1);
    assert!(snapshot.last_error.is_some());
    assert!(mock.sent_frames().is_empty());
    assert!(b.try_frame().is_none());

    // received traffic still reaches clients
    mock.push_received(data(0x21, &[2]));
    assert_eq!(payload(&b.next_frame().await.unwrap()), (0x21, vec![2]));
}

#[tokio::test]
async fn test_feature_requests_always_reach_adapter() {
    let (handle, _dir) = enabled_channel().await;
    let adapter = MockAdapter::with_features(FeatureSet::EMPTY);
    let mock = adapter.handle();
    handle.add_interface(Box::new(adapter)).await.unwrap();
    mock.clear_calls();

    assert!(!handle.set_error_frame_enabled(true).await.unwrap());
    assert!(!handle.set_error_frame_enabled(false).await.unwrap());

    let disable = MockCall::DisableFeatures(FeatureSet::only(Feature::ErrorFrames));
    assert_eq!(mock.calls(), vec![disable.clone(), disable]);
}

#[tokio::test]
async fn test_settings_for_other_channels_are_ignored() {
    let (handle, _dir) = enabled_channel().await;

    let other = SettingsDocument {
        channel: Some(2),
        name: Some("Other".to_string()),
        ..Default::default()
    };
    handle.apply_settings(other).await.unwrap();
    let unaddressed = SettingsDocument {
        name: Some("Nobody".to_string()),
        ..Default::default()
    };
    handle.apply_settings(unaddressed).await.unwrap();
    assert_eq!(handle.snapshot().await.unwrap().name, "CAN 1");

    let own = SettingsDocument {
        channel: Some(1),
        name: Some("Chassis".to_string()),
        ..Default::default()
    };
    handle.apply_settings(own).await.unwrap();
    assert_eq!(handle.snapshot().await.unwrap().name, "Chassis");
}

#[tokio::test(start_paused = true)]
async fn test_statistics_tick_on_virtual_bus() {
    let (handle, _dir) = enabled_channel().await;
    handle
        .set_bitrate(Bitrate::KBIT_125, Bitrate::Unset)
        .await
        .unwrap();
    let a = TestClient::attach(&handle).await;

    for _ in 0..100 {
        handle
            .route_frame(a.id, raw(&data(0x100, &[0; 8])))
            .await
            .unwrap();
    }
    assert_eq!(handle.snapshot().await.unwrap().frame_count, 100);

    tokio::time::advance(Duration::from_secs(1)).await;

    // 100 frames of 130 bits in one second on a 125 kBit/s bus
    let snapshot = wait_for(&handle, |s| s.frames_per_second != 0).await;
    assert_eq!(snapshot.frames_per_second, 100);
    assert_eq!(snapshot.bus_load, 10);
}
