//! The event envelope.
//!
//! Every queue in the hub carries envelopes: a kind tag plus a payload that
//! stays opaque JSON until a worker needs to look inside it.

use crate::codec::ProtocolError;
use crate::kinds::EventKind;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::value::RawValue;

/// Payload used when an envelope carries no body.
const NULL_PAYLOAD: &[u8] = b"null";

/// A tagged event: `{kind, payload}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    kind: EventKind,
    /// Raw JSON text of the payload. Always valid JSON.
    payload: Bytes,
}

impl Envelope {
    /// Create an envelope from a kind and raw JSON payload bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a single JSON value.
    pub fn new(kind: impl Into<EventKind>, payload: impl Into<Bytes>) -> Result<Self, ProtocolError> {
        let payload = payload.into();
        serde_json::from_slice::<&RawValue>(&payload)
            .map_err(|e| ProtocolError::InvalidPayload(e.to_string()))?;
        Ok(Self {
            kind: kind.into(),
            payload,
        })
    }

    /// Create an envelope by serializing a typed payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn with_payload<T: Serialize>(kind: EventKind, payload: &T) -> Result<Self, ProtocolError> {
        let payload = serde_json::to_vec(payload)?;
        Ok(Self {
            kind,
            payload: Bytes::from(payload),
        })
    }

    /// Create an envelope with a `null` payload.
    #[must_use]
    pub fn bare(kind: EventKind) -> Self {
        Self {
            kind,
            payload: Bytes::from_static(NULL_PAYLOAD),
        }
    }

    /// Build from parts already known to be valid JSON.
    pub(crate) fn from_raw(kind: EventKind, payload: Option<&RawValue>) -> Self {
        let payload = match payload {
            Some(raw) => Bytes::copy_from_slice(raw.get().as_bytes()),
            None => Bytes::from_static(NULL_PAYLOAD),
        };
        Self { kind, payload }
    }

    /// The event kind.
    #[must_use]
    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// The raw JSON payload.
    #[must_use]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Decode the payload into its schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not match `T`.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payloads::{PostNotice, UserId};

    #[test]
    fn test_new_rejects_invalid_json() {
        assert!(Envelope::new("new_post", r#"{"postId":1}"#).is_ok());
        assert!(matches!(
            Envelope::new("new_post", "{not json"),
            Err(ProtocolError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_with_payload_and_decode() {
        let envelope = Envelope::with_payload(EventKind::NewPost, &PostNotice { post_id: 12 }).unwrap();
        assert_eq!(envelope.kind(), &EventKind::NewPost);
        let notice: PostNotice = envelope.decode_payload().unwrap();
        assert_eq!(notice.post_id, 12);
        assert!(envelope.decode_payload::<UserId>().is_err());
    }

    #[test]
    fn test_bare_payload_is_null() {
        let envelope = Envelope::bare(EventKind::Pong);
        assert_eq!(&envelope.payload()[..], b"null");
    }
}
