//! # agora-protocol
//!
//! Wire protocol definitions for the Agora realtime hub.
//!
//! This crate defines what travels between forum clients and the hub:
//! the tagged event envelope, the closed set of event kinds with their
//! routing class, the payload schema of each kind, and the JSON codec.
//!
//! ## Event Kinds
//!
//! - `chat_message` / `typing` - Direct, addressed to one user
//! - `new_post` / `update_post` / `delete_post` / `new_comment` - Broadcast
//! - `online_status` - Presence, emitted by the hub only
//! - `ping` / `pong` - Application keepalive
//!
//! ## Example
//!
//! ```rust
//! use agora_protocol::{codec, Envelope, EventKind, PostNotice};
//!
//! let envelope = Envelope::with_payload(EventKind::NewPost, &PostNotice { post_id: 1 }).unwrap();
//!
//! let encoded = codec::encode(&envelope).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(decoded.kind(), &EventKind::NewPost);
//! ```

pub mod codec;
pub mod envelope;
pub mod kinds;
pub mod payloads;

pub use codec::{decode, encode, ProtocolError};
pub use envelope::Envelope;
pub use kinds::{EventKind, Route};
pub use payloads::{ChatMessage, CommentNotice, OnlineStatus, PostNotice, TypingIndicator, UserId};
