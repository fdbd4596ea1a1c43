//! Versioned duplex message channel between the annotator and its front-end.
//!
//! Every message travels with a version. `send()` allocates the next version
//! from the sending side; `send_with_version()` reuses one, which is how a
//! reply is tied to the request that caused it. Receivers keep only the
//! newest answer with a `Versioned` latch, so replies that arrive out of
//! order never overwrite fresher state.

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use serde::{Deserialize, Serialize};

use crate::error::{JournalError, Result};

pub type Message = serde_json::Value;

/// A message plus the version it was sent under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u64,
    pub message: Message,
}

pub trait Tunnel {
    /// Send under a fresh version and return it.
    fn send(&mut self, message: Message) -> Result<u64>;

    /// Send under an existing version, typically a reply.
    fn send_with_version(&mut self, version: u64, message: Message) -> Result<()>;

    /// Next pending envelope, if any. Never blocks.
    fn try_recv(&mut self) -> Result<Option<Envelope>>;

    /// Hand every pending envelope to `handler`, in arrival order. Returns
    /// how many were delivered.
    fn on_receive<F>(&mut self, mut handler: F) -> Result<usize>
    where
        Self: Sized,
        F: FnMut(Envelope) -> Result<()>,
    {
        let mut delivered = 0;
        while let Some(envelope) = self.try_recv()? {
            handler(envelope)?;
            delivered += 1;
        }
        Ok(delivered)
    }
}

// ── ChannelTunnel ──────────────────────────────────────────────────

/// In-process tunnel end backed by a pair of crossbeam channels.
pub struct ChannelTunnel {
    tx: Sender<Envelope>,
    rx: Receiver<Envelope>,
    next_version: u64,
}

impl ChannelTunnel {
    /// Two connected ends. Versions start at 1 on each side.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = crossbeam_channel::unbounded();
        let (b_tx, a_rx) = crossbeam_channel::unbounded();
        (
            Self {
                tx: a_tx,
                rx: a_rx,
                next_version: 1,
            },
            Self {
                tx: b_tx,
                rx: b_rx,
                next_version: 1,
            },
        )
    }

    /// Block until an envelope arrives or the peer goes away.
    pub fn recv(&mut self) -> Result<Envelope> {
        self.rx.recv().map_err(|_| JournalError::TunnelClosed)
    }

    fn push(&self, envelope: Envelope) -> Result<()> {
        self.tx.send(envelope).map_err(|_| JournalError::TunnelClosed)
    }
}

impl Tunnel for ChannelTunnel {
    fn send(&mut self, message: Message) -> Result<u64> {
        let version = self.next_version;
        self.push(Envelope { version, message })?;
        self.next_version += 1;
        Ok(version)
    }

    fn send_with_version(&mut self, version: u64, message: Message) -> Result<()> {
        self.push(Envelope { version, message })
    }

    fn try_recv(&mut self) -> Result<Option<Envelope>> {
        match self.rx.try_recv() {
            Ok(envelope) => Ok(Some(envelope)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(JournalError::TunnelClosed),
        }
    }
}

// ── RecordingTunnel ────────────────────────────────────────────────

/// One entry of a recorded session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TunnelRecord {
    SendMsg { version: u64, msg: Message },
    SendMsgWithVersion { version: u64, msg: Message },
    OnReceive { version: u64, msg: Message },
}

/// Wraps a tunnel and records all traffic in both directions.
pub struct RecordingTunnel<T> {
    inner: T,
    records: Vec<TunnelRecord>,
}

impl<T: Tunnel> RecordingTunnel<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            records: Vec::new(),
        }
    }

    pub fn records(&self) -> &[TunnelRecord] {
        &self.records
    }

    /// The recording as a JSON array.
    pub fn serialize(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.records)?)
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Tunnel> Tunnel for RecordingTunnel<T> {
    fn send(&mut self, message: Message) -> Result<u64> {
        let version = self.inner.send(message.clone())?;
        self.records.push(TunnelRecord::SendMsg {
            version,
            msg: message,
        });
        Ok(version)
    }

    fn send_with_version(&mut self, version: u64, message: Message) -> Result<()> {
        self.records.push(TunnelRecord::SendMsgWithVersion {
            version,
            msg: message.clone(),
        });
        self.inner.send_with_version(version, message)
    }

    fn try_recv(&mut self) -> Result<Option<Envelope>> {
        let envelope = self.inner.try_recv()?;
        if let Some(envelope) = &envelope {
            self.records.push(TunnelRecord::OnReceive {
                version: envelope.version,
                msg: envelope.message.clone(),
            });
        }
        Ok(envelope)
    }
}

// ── Versioned ──────────────────────────────────────────────────────

/// Holds the value of the newest version seen so far.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    version: Option<u64>,
    value: Option<T>,
}

impl<T> Default for Versioned<T> {
    fn default() -> Self {
        Self {
            version: None,
            value: None,
        }
    }
}

impl<T> Versioned<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` if `version` is newer than anything accepted before.
    pub fn accept(&mut self, version: u64, value: T) -> bool {
        if self.version.is_some_and(|current| version <= current) {
            tracing::debug!(version, current = ?self.version, "dropping stale message");
            return false;
        }
        self.version = Some(version);
        self.value = Some(value);
        true
    }

    pub fn version(&self) -> Option<u64> {
        self.version
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }
}

// -- Tests --------------------------------------------------------------------
