//! Full server tests over real sockets

use std::time::Duration;

use canhub_frame::{CanId, DataFrame, Frame};
use canhubd::{CanSocket, ChannelConfig, NetworkHandle, Server, ServerConfig};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

fn server_config(dir: &std::path::Path) -> ServerConfig {
    ServerConfig {
        tcp_port_base: 0,
        settings_port: 0,
        local_socket_dir: dir.to_path_buf(),
        channels: vec![ChannelConfig::default()],
        ..Default::default()
    }
}

async fn wait_for_clients(handle: &NetworkHandle, local: usize, remote: usize) {
    for _ in 0..100 {
        let snapshot = handle.snapshot().await.unwrap();
        if snapshot.local_clients == local && snapshot.remote_clients == remote {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("clients did not attach");
}

#[cfg(unix)]
#[tokio::test]
async fn test_local_clients_share_a_channel() {
    let dir = tempfile::tempdir().unwrap();
    let server = Server::start(server_config(dir.path())).await.unwrap();
    let handle = server.channel(1).unwrap();
    let path = handle.endpoints().await.unwrap().unwrap().local_path.unwrap();

    let mut a = CanSocket::connect_local(&path).await.unwrap();
    let mut b = CanSocket::connect_local(&path).await.unwrap();
    wait_for_clients(&handle, 2, 0).await;

    let sent = Frame::Data(DataFrame::new(CanId::Standard(0x100), &[0x11, 0x22]).unwrap());
    a.write_frame(&sent).await.unwrap();

    match timeout(WAIT, b.read_frame()).await.unwrap().unwrap() {
        Some(Frame::Data(frame)) => {
            assert_eq!(frame.id(), CanId::Standard(0x100));
            assert_eq!(frame.data(), &[0x11, 0x22]);
        },
        other => panic!("unexpected {other:?}"),
    }
    assert!(timeout(Duration::from_millis(100), a.read_frame())
        .await
        .is_err());
    assert_eq!(handle.snapshot().await.unwrap().frame_count, 1);

    server.shutdown().await;
    assert!(!path.exists());
}

#[tokio::test]
async fn test_remote_client_reaches_local_bus() {
    let dir = tempfile::tempdir().unwrap();
    let server = Server::start(server_config(dir.path())).await.unwrap();
    let handle = server.channel(1).unwrap();
    let addr = handle.endpoints().await.unwrap().unwrap().tcp_addr;

    let mut remote = CanSocket::connect_tcp(addr).await.unwrap();
    let mut other = CanSocket::connect_tcp(addr).await.unwrap();
    wait_for_clients(&handle, 0, 2).await;

    let sent = Frame::Data(DataFrame::new(CanId::Extended(0x1ABC_DE00), &[1, 2, 3, 4]).unwrap());
    remote.write_frame(&sent).await.unwrap();

    match timeout(WAIT, other.read_frame()).await.unwrap().unwrap() {
        Some(Frame::Data(frame)) => {
            assert_eq!(frame.id(), CanId::Extended(0x1ABC_DE00));
            assert!(frame.is_extended());
        },
        other => panic!("unexpected {other:?}"),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_simulation_adapter_answers_client() {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        channels: vec![ChannelConfig {
            adapter: canhubd::adapter::AdapterKind::Simulation,
            ..Default::default()
        }],
        ..server_config(dir.path())
    };
    let server = Server::start(config).await.unwrap();
    let handle = server.channel(1).unwrap();
    let addr = handle.endpoints().await.unwrap().unwrap().tcp_addr;

    let mut client = CanSocket::connect_tcp(addr).await.unwrap();
    wait_for_clients(&handle, 0, 1).await;

    let sent = Frame::Data(DataFrame::new(CanId::Standard(0x200), &[0x0F]).unwrap());
    client.write_frame(&sent).await.unwrap();

    // the simulated node answers on id + 1 with inverted data
    match timeout(WAIT, client.read_frame()).await.unwrap().unwrap() {
        Some(Frame::Data(frame)) => {
            assert_eq!(frame.id(), CanId::Standard(0x201));
            assert_eq!(frame.data(), &[0xF0]);
        },
        other => panic!("unexpected {other:?}"),
    }

    server.shutdown().await;
}
