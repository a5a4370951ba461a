//! Client bookkeeping for one channel
//!
//! Every client is represented by the sending half of its bounded outbound
//! queue. Delivery never waits: a client whose queue is full or closed is
//! dropped from the registry, which closes its connection.

use std::fmt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::error::{BrokerError, Result};
use canhub_frame::RawFrame;

/// Connection flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientKind {
    /// Same-host client over the local socket
    Local,
    /// TCP client
    Remote,
    /// Settings document subscriber
    Settings,
}

impl ClientKind {
    pub fn carries_frames(self) -> bool {
        matches!(self, ClientKind::Local | ClientKind::Remote)
    }
}

impl fmt::Display for ClientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientKind::Local => write!(f, "local"),
            ClientKind::Remote => write!(f, "remote"),
            ClientKind::Settings => write!(f, "settings"),
        }
    }
}

/// Identity of a client within its channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Message queued for a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(RawFrame),
    Settings(String),
}

pub type ClientSink = mpsc::Sender<Outbound>;

/// Maximum number of clients per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientLimits {
    pub local: usize,
    pub remote: usize,
    pub settings: usize,
}

impl ClientLimits {
    fn for_kind(&self, kind: ClientKind) -> usize {
        match kind {
            ClientKind::Local => self.local,
            ClientKind::Remote => self.remote,
            ClientKind::Settings => self.settings,
        }
    }
}

#[derive(Debug)]
struct ClientEntry {
    id: ClientId,
    kind: ClientKind,
    sink: ClientSink,
}

#[derive(Debug)]
pub struct ClientRegistry {
    limits: ClientLimits,
    next_id: u64,
    clients: Vec<ClientEntry>,
}

impl ClientRegistry {
    pub fn new(limits: ClientLimits) -> Self {
        Self {
            limits,
            next_id: 1,
            clients: Vec::new(),
        }
    }

    pub fn attach(&mut self, kind: ClientKind, sink: ClientSink) -> Result<ClientId> {
        let limit = self.limits.for_kind(kind);
        if self.count(kind) >= limit {
            return Err(BrokerError::capacity(format!(
                "{} client limit of {} reached",
                kind, limit
            )));
        }

        let id = ClientId(self.next_id);
        self.next_id += 1;
        self.clients.push(ClientEntry { id, kind, sink });
        Ok(id)
    }

    /// Remove a client; unknown ids are ignored
    pub fn detach(&mut self, id: ClientId) -> Option<ClientKind> {
        let index = self.clients.iter().position(|entry| entry.id == id)?;
        Some(self.clients.remove(index).kind)
    }

    /// Drop every client of the given kinds
    pub fn detach_kinds(&mut self, kinds: &[ClientKind]) -> usize {
        let before = self.clients.len();
        self.clients.retain(|entry| !kinds.contains(&entry.kind));
        before - self.clients.len()
    }

    pub fn count(&self, kind: ClientKind) -> usize {
        self.clients.iter().filter(|entry| entry.kind == kind).count()
    }

    /// Queue a frame for every frame client except `origin`
    ///
    /// Returns the number of clients that received it.
    pub fn broadcast_frame(&mut self, frame: RawFrame, origin: Option<ClientId>) -> usize {
        self.deliver(
            |entry| entry.kind.carries_frames() && Some(entry.id) != origin,
            || Outbound::Frame(frame),
        )
    }

    /// Queue a settings document for every settings client
    pub fn broadcast_settings(&mut self, document: &str) -> usize {
        self.deliver(
            |entry| entry.kind == ClientKind::Settings,
            || Outbound::Settings(document.to_string()),
        )
    }

    /// Queue a message for one client
    pub fn send_to(&mut self, id: ClientId, message: Outbound) -> bool {
        let Some(index) = self.clients.iter().position(|entry| entry.id == id) else {
            return false;
        };
        if self.clients[index].sink.try_send(message).is_ok() {
            return true;
        }
        let entry = self.clients.remove(index);
        debug!("{} client {} dropped on direct send", entry.kind, entry.id);
        false
    }

    fn deliver(
        &mut self,
        mut wanted: impl FnMut(&ClientEntry) -> bool,
        mut message: impl FnMut() -> Outbound,
    ) -> usize {
        let mut delivered = 0;
        let mut dropped = Vec::new();

        for entry in self.clients.iter().filter(|entry| wanted(entry)) {
            match entry.sink.try_send(message()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("{} client {} is not keeping up, disconnecting", entry.kind, entry.id);
                    dropped.push(entry.id);
                },
                Err(TrySendError::Closed(_)) => {
                    debug!("{} client {} went away", entry.kind, entry.id);
                    dropped.push(entry.id);
                },
            }
        }

        if !dropped.is_empty() {
            self.clients.retain(|entry| !dropped.contains(&entry.id));
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canhub_frame::{CanId, DataFrame, Frame};

    fn limits() -> ClientLimits {
        ClientLimits {
            local: 2,
            remote: 1,
            settings: 1,
        }
    }

    fn frame() -> RawFrame {
        Frame::Data(DataFrame::new(CanId::Standard(0x100), &[1]).unwrap())
            .to_raw()
            .unwrap()
    }

    #[test]
    fn test_capacity_per_kind() {
        let mut registry = ClientRegistry::new(limits());
        let (tx, _rx) = mpsc::channel(4);
        assert!(registry.attach(ClientKind::Remote, tx.clone()).is_ok());
        let err = registry.attach(ClientKind::Remote, tx.clone()).unwrap_err();
        assert!(err.is_capacity());
        // other kinds are counted separately
        assert!(registry.attach(ClientKind::Local, tx).is_ok());
    }

    #[test]
    fn test_broadcast_skips_origin_and_settings() {
        let mut registry = ClientRegistry::new(limits());
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        let (tx_s, mut rx_s) = mpsc::channel(4);
        let a = registry.attach(ClientKind::Local, tx_a).unwrap();
        registry.attach(ClientKind::Local, tx_b).unwrap();
        registry.attach(ClientKind::Settings, tx_s).unwrap();

        assert_eq!(registry.broadcast_frame(frame(), Some(a)), 1);
        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap(), Outbound::Frame(frame()));
        assert!(rx_s.try_recv().is_err());

        assert_eq!(registry.broadcast_settings("{}"), 1);
        assert_eq!(rx_s.try_recv().unwrap(), Outbound::Settings("{}".to_string()));
    }

    #[test]
    fn test_full_and_closed_clients_are_removed() {
        let mut registry = ClientRegistry::new(limits());
        let (tx_full, _rx_full) = mpsc::channel(1);
        let (tx_closed, rx_closed) = mpsc::channel(1);
        let full = registry.attach(ClientKind::Local, tx_full).unwrap();
        let closed = registry.attach(ClientKind::Local, tx_closed).unwrap();
        drop(rx_closed);

        assert_eq!(registry.broadcast_frame(frame(), None), 1);
        assert_eq!(registry.count(ClientKind::Local), 1);
        assert_eq!(registry.detach(closed), None);

        // queue depth 1 is now exhausted
        assert_eq!(registry.broadcast_frame(frame(), None), 0);
        assert_eq!(registry.count(ClientKind::Local), 0);
        assert_eq!(registry.detach(full), None);
    }

    #[test]
    fn test_detach_is_idempotent() {
        let mut registry = ClientRegistry::new(limits());
        let (tx, _rx) = mpsc::channel(1);
        let id = registry.attach(ClientKind::Settings, tx).unwrap();
        assert_eq!(registry.detach(id), Some(ClientKind::Settings));
        assert_eq!(registry.detach(id), None);
    }

    #[test]
    fn test_send_to_single_client() {
        let mut registry = ClientRegistry::new(limits());
        let (tx, mut rx) = mpsc::channel(1);
        let id = registry.attach(ClientKind::Settings, tx).unwrap();
        assert!(registry.send_to(id, Outbound::Settings("snapshot".to_string())));
        assert_eq!(rx.try_recv().unwrap(), Outbound::Settings("snapshot".to_string()));
        assert!(!registry.send_to(ClientId(99), Outbound::Settings(String::new())));
    }
}
