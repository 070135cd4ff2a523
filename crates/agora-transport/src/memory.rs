//! In-process transport.
//!
//! [`pair`] returns the two halves the hub drives plus a [`MemoryPeer`]
//! that plays the remote client. Used for tests, benchmarks and embedding
//! the hub behind a non-network front end.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::traits::{FrameReader, FrameWriter, Incoming, TransportError};

/// What the hub wrote to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// A data frame.
    Frame(Bytes),
    /// A keepalive probe.
    Ping,
    /// The hub closed the connection.
    Close,
}

type InboundItem = Result<Incoming, TransportError>;

/// Create an in-memory connection.
///
/// `capacity` bounds each direction; a peer that stops reading makes the
/// hub's writes block once `capacity` frames are in flight.
#[must_use]
pub fn pair(capacity: usize) -> (MemoryReader, MemoryWriter, MemoryPeer) {
    let (in_tx, in_rx) = mpsc::channel(capacity);
    let (out_tx, out_rx) = mpsc::channel(capacity);
    let closed = Arc::new(AtomicBool::new(false));

    let reader = MemoryReader { rx: in_rx };
    let writer = MemoryWriter {
        tx: out_tx,
        closed: closed.clone(),
    };
    let peer = MemoryPeer {
        tx: Some(in_tx),
        rx: out_rx,
        closed,
    };
    (reader, writer, peer)
}

/// Read half handed to the hub.
pub struct MemoryReader {
    rx: mpsc::Receiver<InboundItem>,
}

#[async_trait]
impl FrameReader for MemoryReader {
    async fn recv(&mut self) -> Result<Option<Incoming>, TransportError> {
        match self.rx.recv().await {
            Some(Ok(incoming)) => Ok(Some(incoming)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    fn remote_addr(&self) -> Option<String> {
        Some("memory".to_string())
    }
}

/// Write half handed to the hub.
pub struct MemoryWriter {
    tx: mpsc::Sender<PeerEvent>,
    closed: Arc<AtomicBool>,
}

impl MemoryWriter {
    async fn push(&self, event: PeerEvent) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        self.tx
            .send(event)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }
}

#[async_trait]
impl FrameWriter for MemoryWriter {
    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        self.push(PeerEvent::Frame(frame)).await
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.push(PeerEvent::Ping).await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(()); // Already closed
        }
        // The peer may be gone already; a missing close frame is fine.
        let _ = self.tx.try_send(PeerEvent::Close);
        Ok(())
    }
}

/// The remote end of an in-memory connection.
pub struct MemoryPeer {
    tx: Option<mpsc::Sender<InboundItem>>,
    rx: mpsc::Receiver<PeerEvent>,
    closed: Arc<AtomicBool>,
}

impl MemoryPeer {
    /// Send a data frame to the hub.
    ///
    /// Returns `false` if the hub is no longer reading.
    pub async fn send(&self, frame: impl Into<Bytes>) -> bool {
        self.push(Ok(Incoming::Frame(frame.into()))).await
    }

    /// Send a keepalive to the hub.
    pub async fn heartbeat(&self) -> bool {
        self.push(Ok(Incoming::Heartbeat)).await
    }

    /// Make the hub's next read fail with `error`.
    pub async fn fail(&self, error: TransportError) -> bool {
        self.push(Err(error)).await
    }

    async fn push(&self, item: InboundItem) -> bool {
        match &self.tx {
            Some(tx) => tx.send(item).await.is_ok(),
            None => false,
        }
    }

    /// Hang up: the hub's reader observes a clean close.
    pub fn disconnect(&mut self) {
        self.tx = None;
    }

    /// Receive the next thing the hub wrote.
    ///
    /// Returns `None` once the hub dropped its writer.
    pub async fn recv(&mut self) -> Option<PeerEvent> {
        self.rx.recv().await
    }

    /// Receive the next data frame, skipping pings.
    ///
    /// Returns `None` on close.
    pub async fn recv_frame(&mut self) -> Option<Bytes> {
        loop {
            match self.rx.recv().await? {
                PeerEvent::Frame(frame) => return Some(frame),
                PeerEvent::Ping => continue,
                PeerEvent::Close => return None,
            }
        }
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<PeerEvent> {
        self.rx.try_recv().ok()
    }

    /// Whether the hub closed its writer.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_peer_to_reader() {
        let (mut reader, _writer, peer) = pair(4);

        assert!(peer.send(&b"hello"[..]).await);
        assert!(peer.heartbeat().await);

        assert_eq!(
            reader.recv().await.unwrap(),
            Some(Incoming::Frame(Bytes::from_static(b"hello")))
        );
        assert_eq!(reader.recv().await.unwrap(), Some(Incoming::Heartbeat));
    }

    #[tokio::test]
    async fn test_disconnect_is_clean_close() {
        let (mut reader, _writer, mut peer) = pair(4);
        peer.disconnect();
        assert_eq!(reader.recv().await.unwrap(), None);
        assert!(!peer.send(&b"late"[..]).await);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let (mut reader, _writer, peer) = pair(4);
        peer.fail(TransportError::ReceiveFailed("reset".into())).await;
        assert!(matches!(
            reader.recv().await,
            Err(TransportError::ReceiveFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_writer_to_peer() {
        let (_reader, mut writer, mut peer) = pair(4);

        writer.send(Bytes::from_static(b"one")).await.unwrap();
        writer.ping().await.unwrap();
        writer.send(Bytes::from_static(b"two")).await.unwrap();
        writer.close().await.unwrap();

        assert_eq!(peer.recv_frame().await, Some(Bytes::from_static(b"one")));
        assert_eq!(peer.recv_frame().await, Some(Bytes::from_static(b"two")));
        assert_eq!(peer.recv().await, Some(PeerEvent::Close));
        assert!(peer.is_closed());
        assert!(matches!(
            writer.send(Bytes::from_static(b"three")).await,
            Err(TransportError::ConnectionClosed)
        ));
    }
}
