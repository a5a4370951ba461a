//! Channel endpoints
//!
//! An enabled channel listens on a local socket (`<dir>/<prefix><id>`, Unix
//! only) and on a TCP port. Each accepted connection becomes a frame client
//! driven by [`serve_frame_client`].

use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
#[cfg(unix)]
use std::path::Path;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::clients::{ClientKind, Outbound};
use super::handle::NetworkHandle;
use super::settings::EndpointInfo;
use crate::config::ServerConfig;
use crate::error::{BrokerError, Result};
use canhub_frame::FrameCodec;

/// Listeners of one enabled channel
///
/// Dropping the value stops accepting, ends every connection served from it and
/// removes the local socket file.
#[derive(Debug)]
pub struct Endpoints {
    info: EndpointInfo,
    token: CancellationToken,
}

impl Endpoints {
    /// Bind the local socket and the TCP port of channel `id`
    pub async fn open(
        id: u8,
        config: &ServerConfig,
        handle: NetworkHandle,
    ) -> Result<Self> {
        let token = CancellationToken::new();
        let queue_depth = config.outbound_queue_depth;

        let tcp_bind = SocketAddr::new(config.host_address, config.tcp_port(id));
        let tcp_listener = TcpListener::bind(tcp_bind).await.map_err(|e| {
            BrokerError::transport(format!("Failed to bind {}: {}", tcp_bind, e))
        })?;
        let tcp_addr = tcp_listener.local_addr()?;

        #[cfg(unix)]
        let local_path = {
            let path = config.local_socket_path(id);
            let listener = bind_local(&path)?;
            tokio::spawn(accept_local(
                listener,
                handle.clone(),
                queue_depth,
                token.clone(),
            ));
            Some(path)
        };
        #[cfg(not(unix))]
        let local_path: Option<std::path::PathBuf> = None;

        tokio::spawn(accept_tcp(tcp_listener, handle, queue_depth, token.clone()));

        info!(
            "Channel {} listening on {} and {}",
            id,
            tcp_addr,
            local_path
                .as_ref()
                .map_or_else(|| "no local socket".to_string(), |p| p.display().to_string())
        );

        Ok(Self {
            info: EndpointInfo {
                local_path,
                tcp_addr,
            },
            token,
        })
    }

    pub fn info(&self) -> &EndpointInfo {
        &self.info
    }
}

impl Drop for Endpoints {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(path) = &self.info.local_path {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove {}: {}", path.display(), e);
                }
            }
        }
    }
}

#[cfg(unix)]
fn bind_local(path: &Path) -> Result<tokio::net::UnixListener> {
    // a previous process may have left its socket file behind
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    tokio::net::UnixListener::bind(path).map_err(|e| {
        BrokerError::transport(format!("Failed to bind {}: {}", path.display(), e))
    })
}

#[cfg(unix)]
async fn accept_local(
    listener: tokio::net::UnixListener,
    handle: NetworkHandle,
    queue_depth: usize,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    tokio::spawn(serve_frame_client(
                        stream,
                        ClientKind::Local,
                        handle.clone(),
                        queue_depth,
                        token.child_token(),
                    ));
                },
                Err(e) => warn!("Channel {} local accept failed: {}", handle.id(), e),
            },
        }
    }
    debug!("Channel {} local listener stopped", handle.id());
}

async fn accept_tcp(
    listener: TcpListener,
    handle: NetworkHandle,
    queue_depth: usize,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("Channel {} remote connection from {}", handle.id(), peer);
                    let _ = stream.set_nodelay(true);
                    tokio::spawn(serve_frame_client(
                        stream,
                        ClientKind::Remote,
                        handle.clone(),
                        queue_depth,
                        token.child_token(),
                    ));
                },
                Err(e) => warn!("Channel {} TCP accept failed: {}", handle.id(), e),
            },
        }
    }
    debug!("Channel {} TCP listener stopped", handle.id());
}

/// Register a frame connection with the broker and pump frames both ways
///
/// Returns when the peer disconnects, the broker drops the client, or
/// `token` is cancelled.
pub async fn serve_frame_client<S>(
    stream: S,
    kind: ClientKind,
    handle: NetworkHandle,
    queue_depth: usize,
    token: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, mut outbound) = mpsc::channel(queue_depth);
    let id = match handle.attach_client(kind, sink).await {
        Ok(id) => id,
        Err(e) => {
            warn!("Channel {} refused {} client: {}", handle.id(), kind, e);
            return;
        },
    };
    info!("Channel {} {} client {} connected", handle.id(), kind, id);

    let mut framed = Framed::new(stream, FrameCodec::new());
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            message = outbound.recv() => match message {
                Some(Outbound::Frame(frame)) => {
                    if let Err(e) = framed.send(frame).await {
                        debug!("Channel {} client {} write failed: {}", handle.id(), id, e);
                        break;
                    }
                },
                Some(Outbound::Settings(_)) => {},
                // the broker dropped this client
                None => break,
            },
            incoming = framed.next() => match incoming {
                Some(Ok(frame)) => {
                    if handle.route_frame(id, frame).await.is_err() {
                        break;
                    }
                },
                Some(Err(e)) => {
                    debug!("Channel {} client {} read failed: {}", handle.id(), id, e);
                    break;
                },
                None => break,
            },
        }
    }

    let _ = handle.detach_client(id).await;
    info!("Channel {} {} client {} disconnected", handle.id(), kind, id);
}
