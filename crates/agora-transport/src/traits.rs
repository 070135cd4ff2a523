//! Transport abstraction traits for Agora.
//!
//! A live duplex connection is handed to the hub as two halves: a reader
//! driven by the inbound pump and a writer driven by the outbound pump.
//! The halves must be usable from different tasks at the same time.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A read or write deadline expired.
    #[error("Connection timed out")]
    Timeout,

    /// Inbound frame exceeded the size limit.
    #[error("Frame of {size} bytes exceeds limit of {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Something read from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A complete data frame.
    Frame(Bytes),
    /// A transport-level keepalive (ping or pong) from the peer.
    Heartbeat,
}

/// Read half of a connection.
#[async_trait]
pub trait FrameReader: Send {
    /// Receive the next frame or heartbeat.
    ///
    /// Returns `None` if the peer closed the connection cleanly.
    async fn recv(&mut self) -> Result<Option<Incoming>, TransportError>;

    /// Get the remote address of the connection, if available.
    fn remote_addr(&self) -> Option<String> {
        None
    }
}

/// Write half of a connection.
#[async_trait]
pub trait FrameWriter: Send {
    /// Write one already-encoded frame.
    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError>;

    /// Send a keepalive probe.
    async fn ping(&mut self) -> Result<(), TransportError>;

    /// Close the connection gracefully.
    async fn close(&mut self) -> Result<(), TransportError>;
}

#[async_trait]
impl<R: FrameReader + ?Sized> FrameReader for Box<R> {
    async fn recv(&mut self) -> Result<Option<Incoming>, TransportError> {
        (**self).recv().await
    }

    fn remote_addr(&self) -> Option<String> {
        (**self).remote_addr()
    }
}

#[async_trait]
impl<W: FrameWriter + ?Sized> FrameWriter for Box<W> {
    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        (**self).send(frame).await
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        (**self).ping().await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        (**self).close().await
    }
}
