//! # agora-transport
//!
//! Transport abstraction layer for the Agora realtime hub.
//!
//! The hub never touches a socket directly. Each accepted connection is
//! handed over as a [`FrameReader`] / [`FrameWriter`] pair:
//!
//! - **WebSocket** - an upgraded axum socket, the production transport
//! - **Memory** - an in-process pair with a scriptable peer
//!
//! ```rust,ignore
//! use agora_transport::{FrameReader, Incoming};
//!
//! async fn drain(mut reader: impl FrameReader) {
//!     while let Ok(Some(Incoming::Frame(frame))) = reader.recv().await {
//!         // Process frame
//!     }
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use traits::{FrameReader, FrameWriter, Incoming, TransportError};
