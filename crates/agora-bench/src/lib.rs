//! Shared fixtures for the Agora benchmarks.

use agora_core::HubConfig;
use agora_protocol::{ChatMessage, Envelope, EventKind, PostNotice, UserId};

/// Hub configuration roomy enough that benchmarks never hit overflow.
#[must_use]
pub fn bench_config() -> HubConfig {
    HubConfig {
        intake_capacity: 65_536,
        outbound_capacity: 4096,
        ..HubConfig::default()
    }
}

/// A multi-threaded runtime for driving the hub.
///
/// # Panics
///
/// Panics if the runtime cannot be built.
#[must_use]
pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build runtime")
}

/// A chat message with a `len`-byte body.
///
/// # Panics
///
/// Panics if serialization fails.
#[must_use]
pub fn chat(from: u64, to: u64, len: usize) -> Envelope {
    Envelope::with_payload(
        EventKind::ChatMessage,
        &ChatMessage {
            sender_id: UserId(from),
            receiver_id: UserId(to),
            content: "x".repeat(len),
            image_url: None,
            created_at: None,
            sender_name: Some("bench".into()),
        },
    )
    .expect("chat envelope")
}

/// A `new_post` notice.
///
/// # Panics
///
/// Panics if serialization fails.
#[must_use]
pub fn post(id: u64) -> Envelope {
    Envelope::with_payload(EventKind::NewPost, &PostNotice { post_id: id }).expect("post envelope")
}
