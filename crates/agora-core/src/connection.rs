//! Connection handles.
//!
//! A [`Connection`] is the hub's view of one live transport session: its
//! identity, the user it belongs to, its bounded outbound queue and its
//! lifecycle state. The transport itself is owned by the two pump tasks.

use crate::error::EnqueueError;
use agora_protocol::UserId;
use bytes::Bytes;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Receiving end of a connection's outbound queue.
pub type OutboundReceiver = mpsc::Receiver<Bytes>;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque, process-unique connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next connection ID.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric ID.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Lifecycle of a connection. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    /// Accepted, not yet in the registry.
    Connecting = 0,
    /// In the registry and receiving events.
    Registered = 1,
    /// Being removed.
    Unregistering = 2,
    /// Removed, queue closed. Terminal.
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Registered,
            2 => ConnectionState::Unregistering,
            _ => ConnectionState::Closed,
        }
    }
}

/// Why a connection left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    /// Peer closed the transport.
    PeerClosed,
    /// Transport read failed.
    ReadError,
    /// Nothing was read within the read timeout.
    IdleTimeout,
    /// Peer sent a frame above the size limit.
    FrameTooLarge,
    /// Transport write failed.
    WriteError,
    /// A write did not finish within the write timeout.
    WriteTimeout,
    /// Outbound queue was full.
    Overflow,
    /// Removed by an administrator.
    Evicted,
    /// Hub shutdown.
    Shutdown,
}

impl DisconnectReason {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::PeerClosed => "peer_closed",
            DisconnectReason::ReadError => "read_error",
            DisconnectReason::IdleTimeout => "idle_timeout",
            DisconnectReason::FrameTooLarge => "frame_too_large",
            DisconnectReason::WriteError => "write_error",
            DisconnectReason::WriteTimeout => "write_timeout",
            DisconnectReason::Overflow => "overflow",
            DisconnectReason::Evicted => "evicted",
            DisconnectReason::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One live duplex session as seen by the hub.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    user: Option<UserId>,
    /// The only sender of the outbound queue. Taken (closing the queue)
    /// exactly once, by unregistration.
    outbound: Mutex<Option<mpsc::Sender<Bytes>>>,
    capacity: usize,
    state: AtomicU8,
    created_at: Instant,
    /// Milliseconds after `created_at` of the last inbound activity.
    last_activity_ms: AtomicU64,
    /// Cancelled when the connection is torn down; stops both pumps.
    shutdown: CancellationToken,
}

impl Connection {
    /// Create a connection in the `Connecting` state with an outbound queue
    /// of `capacity` messages.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(user: Option<UserId>, capacity: usize) -> (Arc<Self>, OutboundReceiver) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = Self {
            id: ConnectionId::next(),
            user,
            outbound: Mutex::new(Some(tx)),
            capacity,
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            created_at: Instant::now(),
            last_activity_ms: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        };
        (Arc::new(conn), rx)
    }

    /// The connection's handle.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The user this connection belongs to, if identified.
    #[must_use]
    pub fn user(&self) -> Option<UserId> {
        self.user
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Move from `from` to `to`. Returns `false` if the state was not `from`.
    pub(crate) fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn set_state(&self, to: ConnectionState) {
        self.state.store(to as u8, Ordering::SeqCst);
    }

    /// Capacity of the outbound queue.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Messages currently waiting in the outbound queue.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.outbound
            .lock()
            .as_ref()
            .map(|tx| self.capacity - tx.capacity())
            .unwrap_or(0)
    }

    /// Put an encoded frame on the outbound queue without waiting.
    ///
    /// # Errors
    ///
    /// [`EnqueueError::Full`] when the queue is at capacity (the caller is
    /// expected to disconnect this connection), [`EnqueueError::Closed`]
    /// once the connection has been unregistered.
    pub fn enqueue(&self, frame: Bytes) -> Result<(), EnqueueError> {
        let outbound = self.outbound.lock();
        let tx = outbound.as_ref().ok_or(EnqueueError::Closed)?;
        tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Close the outbound queue. Returns `true` only for the call that
    /// actually closed it.
    pub(crate) fn close_outbound(&self) -> bool {
        self.outbound.lock().take().is_some()
    }

    /// Record inbound activity.
    pub fn touch(&self) {
        let elapsed = self.created_at.elapsed().as_millis() as u64;
        self.last_activity_ms.fetch_max(elapsed, Ordering::Relaxed);
    }

    /// When the peer was last heard from (creation time if never).
    #[must_use]
    pub fn last_activity(&self) -> Instant {
        self.created_at + Duration::from_millis(self.last_activity_ms.load(Ordering::Relaxed))
    }

    /// Time since the peer was last heard from.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_activity().elapsed()
    }

    /// Token cancelled on teardown.
    #[must_use]
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Whether teardown has started.
    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
