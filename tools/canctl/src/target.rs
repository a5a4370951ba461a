//! Channel connection target

use anyhow::{Context, Result};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use tokio::net::TcpStream;

use canhubd::config::ServerConfig;
use canhub_frame::Frame;
use canhubd::CanSocket;

/// Where the channel is reached
#[derive(Debug, Clone)]
pub enum Target {
    Local(PathBuf),
    Tcp(SocketAddr),
}

/// Open connection of either transport
pub enum Connection {
    #[cfg(unix)]
    Local(CanSocket<tokio::net::UnixStream>),
    Tcp(CanSocket<TcpStream>),
}

impl Target {
    /// Explicit options win; otherwise channel 1 on this host
    pub fn from_options(socket: Option<PathBuf>, tcp: Option<SocketAddr>) -> Self {
        match (socket, tcp) {
            (Some(path), _) => Target::Local(path),
            (None, Some(addr)) => Target::Tcp(addr),
            (None, None) => Self::default_channel(),
        }
    }

    fn default_channel() -> Self {
        let defaults = ServerConfig::default();
        if cfg!(unix) {
            Target::Local(defaults.local_socket_path(1))
        } else {
            Target::Tcp(SocketAddr::new(
                Ipv4Addr::LOCALHOST.into(),
                defaults.tcp_port(1),
            ))
        }
    }

    pub async fn connect(&self) -> Result<Connection> {
        match self {
            #[cfg(unix)]
            Target::Local(path) => {
                let socket = CanSocket::connect_local(path)
                    .await
                    .with_context(|| format!("cannot reach channel at {}", path.display()))?;
                Ok(Connection::Local(socket))
            },
            #[cfg(not(unix))]
            Target::Local(path) => {
                anyhow::bail!("local sockets are not available ({})", path.display())
            },
            Target::Tcp(addr) => {
                let socket = CanSocket::connect_tcp(*addr)
                    .await
                    .with_context(|| format!("cannot reach channel at {}", addr))?;
                Ok(Connection::Tcp(socket))
            },
        }
    }
}

impl Connection {
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        match self {
            #[cfg(unix)]
            Connection::Local(socket) => socket.write_frame(frame).await?,
            Connection::Tcp(socket) => socket.write_frame(frame).await?,
        }
        Ok(())
    }

    pub async fn read_frame(&mut self) -> Result<Option<Frame>> {
        let frame = match self {
            #[cfg(unix)]
            Connection::Local(socket) => socket.read_frame().await?,
            Connection::Tcp(socket) => socket.read_frame().await?,
        };
        Ok(frame)
    }

    pub async fn announce_name(&mut self, name: &str) -> Result<()> {
        match self {
            #[cfg(unix)]
            Connection::Local(socket) => socket.announce_name(name).await?,
            Connection::Tcp(socket) => socket.announce_name(name).await?,
        }
        Ok(())
    }
}
