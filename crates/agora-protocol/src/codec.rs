//! Codec for encoding and decoding Agora envelopes.
//!
//! Envelopes are JSON objects of the form `{"type": <kind>, "payload": <any>}`,
//! one per transport frame. The outbound side may pack several envelopes
//! into one frame separated by `\n`.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::borrow::Cow;
use thiserror::Error;

use crate::envelope::Envelope;
use crate::kinds::EventKind;

/// Default maximum inbound frame size (512 KiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 512 * 1024;

/// Separator between envelopes in a coalesced frame.
pub const BATCH_SEPARATOR: u8 = b'\n';

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds the configured maximum.
    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// The envelope's kind tag is empty.
    #[error("Envelope has an empty kind")]
    EmptyKind,

    /// Payload is not valid JSON.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid envelope data.
    #[error("Invalid envelope: {0}")]
    Invalid(String),
}

/// Outer shape of an inbound envelope. Only the tag is inspected.
#[derive(Deserialize)]
struct WireIn<'a> {
    #[serde(rename = "type", borrow)]
    kind: Cow<'a, str>,
    #[serde(borrow, default)]
    payload: Option<&'a RawValue>,
}

#[derive(Serialize)]
struct WireOut<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    payload: &'a RawValue,
}

/// Decode one envelope from a frame.
///
/// # Errors
///
/// Returns an error if the frame is not a JSON object with a non-empty
/// `type` field.
pub fn decode(data: &[u8]) -> Result<Envelope, ProtocolError> {
    let wire: WireIn<'_> = serde_json::from_slice(data)?;
    if wire.kind.is_empty() {
        return Err(ProtocolError::EmptyKind);
    }
    Ok(Envelope::from_raw(EventKind::from_tag(&wire.kind), wire.payload))
}

/// Decode one envelope, rejecting frames above `max_size` first.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] or any [`decode`] error.
pub fn decode_bounded(data: &[u8], max_size: usize) -> Result<Envelope, ProtocolError> {
    check_size(data.len(), max_size)?;
    decode(data)
}

/// Check a frame length against a limit.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] if `size > max`.
pub fn check_size(size: usize, max: usize) -> Result<(), ProtocolError> {
    if size > max {
        return Err(ProtocolError::FrameTooLarge { size, max });
    }
    Ok(())
}

/// Encode an envelope to a single-line frame.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(envelope: &Envelope) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::new();
    encode_into(envelope, &mut buf)?;
    Ok(buf.freeze())
}

/// Encode an envelope into an existing buffer.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_into(envelope: &Envelope, buf: &mut BytesMut) -> Result<(), ProtocolError> {
    let payload: &RawValue = serde_json::from_slice(envelope.payload())
        .map_err(|e| ProtocolError::InvalidPayload(e.to_string()))?;
    let wire = WireOut {
        kind: envelope.kind().as_tag(),
        payload,
    };
    let start = buf.len();
    serde_json::to_writer((&mut *buf).writer(), &wire)?;

    // Raw payloads keep the sender's whitespace; a literal newline outside a
    // string would split the frame when batched.
    for byte in &mut buf[start..] {
        if *byte == b'\n' || *byte == b'\r' {
            *byte = b' ';
        }
    }
    Ok(())
}

/// Join already-encoded envelopes into one frame.
#[must_use]
pub fn coalesce(frames: &[Bytes]) -> Bytes {
    match frames {
        [] => Bytes::new(),
        [single] => single.clone(),
        many => {
            let total = many.iter().map(Bytes::len).sum::<usize>() + many.len() - 1;
            let mut buf = BytesMut::with_capacity(total);
            for (i, frame) in many.iter().enumerate() {
                if i > 0 {
                    buf.put_u8(BATCH_SEPARATOR);
                }
                buf.extend_from_slice(frame);
            }
            buf.freeze()
        }
    }
}

/// Split a possibly coalesced frame back into individual envelopes.
pub fn split_batch(frame: &[u8]) -> impl Iterator<Item = &[u8]> {
    frame
        .split(|b| *b == BATCH_SEPARATOR)
        .filter(|part| !part.iter().all(u8::is_ascii_whitespace))
}
