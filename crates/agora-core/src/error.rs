//! Hub errors.

use agora_protocol::ProtocolError;
use thiserror::Error;

/// Errors surfaced by the hub's public API.
///
/// Per-connection failures never show up here; they tear down the
/// affected connection and are only logged.
#[derive(Debug, Error)]
pub enum HubError {
    /// Configuration rejected at startup.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The shared intake queue is full; the event was dropped.
    #[error("Intake queue is full")]
    IntakeFull,

    /// The hub is shutting down.
    #[error("Hub is shutting down")]
    ShuttingDown,

    /// The connection already left the `Connecting` state.
    #[error("Connection {0} cannot be registered in its current state")]
    InvalidState(String),

    /// Event could not be encoded.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Why an enqueue onto an outbound queue failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EnqueueError {
    /// Queue at capacity; the caller must disconnect the connection.
    #[error("Outbound queue is full")]
    Full,

    /// Queue already closed by unregistration.
    #[error("Outbound queue is closed")]
    Closed,
}
