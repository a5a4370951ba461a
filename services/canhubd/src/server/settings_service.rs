//! Settings WebSocket service
//!
//! One listener serves every channel. Clients connect to `ws://host:port/<id>`
//! (a bare `/` selects the lowest channel), receive the channel's settings
//! document right away and after every change, and may send partial documents
//! to reconfigure the channel.

use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ChannelMap;
use crate::error::{BrokerError, Result};
use crate::network::{ClientKind, NetworkHandle, Outbound, SettingsDocument};

/// Running settings listener
#[derive(Debug)]
pub struct SettingsService {
    local_addr: SocketAddr,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SettingsService {
    pub async fn bind(
        addr: SocketAddr,
        channels: ChannelMap,
        queue_depth: usize,
        token: CancellationToken,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BrokerError::transport(format!("Failed to bind {}: {}", addr, e)))?;
        let local_addr = listener.local_addr()?;
        info!("Settings service listening on ws://{}", local_addr);

        let task = tokio::spawn(accept_loop(listener, channels, queue_depth, token.clone()));
        Ok(Self {
            local_addr,
            token,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and close all settings sessions
    pub async fn shutdown(self) {
        self.token.cancel();
        let _ = self.task.await;
    }
}

async fn accept_loop(
    listener: TcpListener,
    channels: ChannelMap,
    queue_depth: usize,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(handshake(
                        stream,
                        peer,
                        channels.clone(),
                        queue_depth,
                        token.child_token(),
                    ));
                },
                Err(e) => warn!("Settings accept failed: {}", e),
            },
        }
    }
    debug!("Settings service stopped");
}

/// Channel addressed by a request path such as `/2`
fn resolve_channel(channels: &ChannelMap, path: &str) -> Option<NetworkHandle> {
    let channels = channels.read();
    match path.trim_matches('/') {
        "" => channels.values().next().cloned(),
        id => id
            .parse::<u8>()
            .ok()
            .and_then(|id| channels.get(&id).cloned()),
    }
}

async fn handshake(
    stream: TcpStream,
    peer: SocketAddr,
    channels: ChannelMap,
    queue_depth: usize,
    token: CancellationToken,
) {
    let mut selected = None;
    let callback = |request: &Request, response: Response| {
        match resolve_channel(&channels, request.uri().path()) {
            Some(handle) => {
                selected = Some(handle);
                Ok(response)
            },
            None => {
                let mut refusal = ErrorResponse::new(Some(format!(
                    "No channel at {}",
                    request.uri().path()
                )));
                *refusal.status_mut() = StatusCode::NOT_FOUND;
                Err(refusal)
            },
        }
    };

    let ws = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!("Settings handshake with {} failed: {}", peer, e);
            return;
        },
    };
    let Some(handle) = selected else {
        return;
    };

    serve_settings_client(ws, handle, queue_depth, token).await;
}

/// Prepare a client document for the channel selected by the request path
///
/// A missing `channel` is taken from the path; a log level is applied to the
/// whole process before the document reaches the broker.
fn addressed(mut document: SettingsDocument, channel: u8) -> SettingsDocument {
    document.channel.get_or_insert(channel);
    if let Some(level) = document.log_level.take() {
        if let Err(e) = common::logging::set_log_level(&level) {
            warn!("Log level not changed: {}", e);
        }
    }
    document
}

async fn serve_settings_client(
    ws: WebSocketStream<TcpStream>,
    handle: NetworkHandle,
    queue_depth: usize,
    token: CancellationToken,
) {
    let (sink, mut outbound) = mpsc::channel(queue_depth);
    let id = match handle.attach_client(ClientKind::Settings, sink).await {
        Ok(id) => id,
        Err(e) => {
            warn!("Channel {} refused settings client: {}", handle.id(), e);
            return;
        },
    };
    info!("Channel {} settings client {} connected", handle.id(), id);

    let (mut sender, mut receiver) = ws.split();
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            message = outbound.recv() => match message {
                Some(Outbound::Settings(document)) => {
                    if sender.send(Message::Text(document)).await.is_err() {
                        break;
                    }
                },
                Some(Outbound::Frame(_)) => {},
                None => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => match SettingsDocument::from_json(&text) {
                    Ok(document) => match handle.apply_settings(addressed(document, handle.id())).await {
                        Ok(()) => {},
                        Err(e @ BrokerError::InternalError(_)) => {
                            debug!("Channel {} settings client {}: {}", handle.id(), id, e);
                            break;
                        },
                        Err(e) => warn!("Channel {} settings not fully applied: {}", handle.id(), e),
                    },
                    Err(e) => warn!("Channel {} ignored settings message: {}", handle.id(), e),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {},
                Some(Err(e)) => {
                    debug!("Channel {} settings client {} error: {}", handle.id(), id, e);
                    break;
                },
            },
        }
    }

    let _ = sender.close().await;
    let _ = handle.detach_client(id).await;
    info!("Channel {} settings client {} disconnected", handle.id(), id);
}
