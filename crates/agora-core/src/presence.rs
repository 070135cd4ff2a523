//! Presence tracking for Agora.
//!
//! Presence is derived: a user is online while the registry holds at least
//! one of their connections. The only thing stored here is the transient
//! event emitted when that changes.

use agora_protocol::{Envelope, EventKind, OnlineStatus, ProtocolError, UserId};
use serde::{Deserialize, Serialize};

/// A user came online or went offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEvent {
    /// The user whose presence changed.
    pub user_id: UserId,
    /// New status.
    pub online: bool,
}

impl PresenceEvent {
    /// The user's first connection registered.
    #[must_use]
    pub fn online(user_id: UserId) -> Self {
        Self {
            user_id,
            online: true,
        }
    }

    /// The user's last connection unregistered.
    #[must_use]
    pub fn offline(user_id: UserId) -> Self {
        Self {
            user_id,
            online: false,
        }
    }

    /// The `online_status` envelope sent to clients.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_envelope(&self) -> Result<Envelope, ProtocolError> {
        Envelope::with_payload(
            EventKind::OnlineStatus,
            &OnlineStatus {
                user_id: self.user_id,
                online: self.online,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_protocol::codec;

    #[test]
    fn test_presence_envelope() {
        let envelope = PresenceEvent::offline(UserId(9)).to_envelope().unwrap();
        assert_eq!(envelope.kind(), &EventKind::OnlineStatus);

        let encoded = codec::encode(&envelope).unwrap();
        assert_eq!(
            &encoded[..],
            br#"{"type":"online_status","payload":{"userId":9,"online":false}}"#
        );
    }
}
