//! # agora-core
//!
//! Connection registry, presence and event dispatch for the Agora realtime hub.
//!
//! This crate provides the moving parts of the hub:
//!
//! - **Connection** - One live session with its bounded outbound queue
//! - **Registry** - Who is connected, by connection and by user
//! - **Lifecycle** - Serialized register/unregister with presence edges
//! - **Dispatcher** - Worker pool routing events by kind
//! - **Hub** - The facade the server and collaborators talk to
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐    ┌──────────────┐    ┌──────────────┐
//! │ inbound pump │───▶│ intake queue │───▶│   workers    │
//! └──────────────┘    └──────────────┘    └──────┬───────┘
//!                                                │ registry lookup
//!                                                ▼
//! ┌──────────────┐    ┌──────────────┐    ┌──────────────┐
//! │  transport   │◀───│outbound pump │◀───│outbound queue│
//! └──────────────┘    └──────────────┘    └──────────────┘
//! ```
//!
//! A producer that finds an outbound queue full disconnects that
//! connection instead of waiting.

pub mod config;
pub mod connection;
pub mod error;
pub mod hub;
pub mod metrics;
pub mod presence;
pub mod registry;

mod dispatcher;
mod lifecycle;
mod pump;

pub use config::HubConfig;
pub use connection::{Connection, ConnectionId, ConnectionState, DisconnectReason, OutboundReceiver};
pub use error::{EnqueueError, HubError};
pub use hub::{Hub, HubStats, Session};
pub use presence::PresenceEvent;
pub use registry::Registry;
