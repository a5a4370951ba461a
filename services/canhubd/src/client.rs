//! Client library
//!
//! [`CanSocket`] connects an application to a channel, either through the
//! channel's local socket or over TCP, and exchanges [`Frame`]s with it.
//! Control requests (bitrate, mode, peer name) travel as API frames on the
//! same connection.

use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
#[cfg(unix)]
use std::path::Path;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::warn;

use crate::error::{BrokerError, Result};
use canhub_frame::{ApiFrame, Bitrate, Frame, FrameCodec, Mode};

/// Connection to one channel
#[derive(Debug)]
pub struct CanSocket<S> {
    framed: Framed<S, FrameCodec>,
}

#[cfg(unix)]
impl CanSocket<tokio::net::UnixStream> {
    /// Connect through the channel's local socket
    pub async fn connect_local(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = tokio::net::UnixStream::connect(path).await.map_err(|e| {
            BrokerError::transport(format!("Failed to connect to {}: {}", path.display(), e))
        })?;
        Ok(Self::new(stream))
    }
}

impl CanSocket<TcpStream> {
    /// Connect to a channel's TCP port
    pub async fn connect_tcp(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| BrokerError::transport(format!("Failed to connect to {}: {}", addr, e)))?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

impl<S> CanSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already connected stream
    pub fn new(stream: S) -> Self {
        Self {
            framed: Framed::new(stream, FrameCodec::new()),
        }
    }

    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.framed.send(frame).await?;
        Ok(())
    }

    /// Next valid frame, `None` once the broker closed the connection
    ///
    /// Records that fail checksum or layout validation are skipped.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>> {
        while let Some(raw) = self.framed.next().await {
            match raw?.decode() {
                Ok(frame) => return Ok(Some(frame)),
                Err(e) => warn!("Discarding invalid frame: {}", e),
            }
        }
        Ok(None)
    }

    /// Ask the broker to change the channel bitrate
    pub async fn set_bitrate(&mut self, nominal: Bitrate, data: Bitrate) -> Result<()> {
        self.write_frame(&Frame::Api(ApiFrame::Bitrate { nominal, data }))
            .await
    }

    /// Ask the broker to switch the channel mode
    pub async fn set_mode(&mut self, mode: Mode) -> Result<()> {
        self.write_frame(&Frame::Api(ApiFrame::Mode(mode))).await
    }

    /// Tell the broker who is connected; logged on the broker side
    pub async fn announce_name(&mut self, name: impl Into<String>) -> Result<()> {
        self.write_frame(&Frame::Api(ApiFrame::Name(name.into())))
            .await?;
        self.write_frame(&Frame::Api(ApiFrame::ProcessId(std::process::id())))
            .await
    }

    pub fn into_inner(self) -> S {
        self.framed.into_inner()
    }
}
