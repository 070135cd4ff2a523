//! Payload schemas for each event kind.
//!
//! Payloads travel through the hub as raw JSON and are only decoded into
//! these types by the worker that routes them. Field names are camelCase,
//! matching what the forum's browser clients send.

use crate::codec::ProtocolError;
use crate::kinds::EventKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A logical user identity, resolved upstream by the session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl UserId {
    /// Create a new user ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw numeric ID.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// A private message between two users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// RFC 3339 timestamp assigned by the message store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
}

/// "User X is (not) typing to you."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingIndicator {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub is_typing: bool,
}

/// A post was created, edited or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostNotice {
    pub post_id: u64,
}

/// A comment was added to a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentNotice {
    pub post_id: u64,
    pub comment_id: u64,
}

/// Presence change pushed to every client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineStatus {
    pub user_id: UserId,
    pub online: bool,
}

/// Validate the payload of a direct kind and return the user it is addressed to.
///
/// # Errors
///
/// Returns an error if the payload does not match the kind's schema, or if
/// the kind is not a direct kind.
pub fn direct_target(kind: &EventKind, payload: &[u8]) -> Result<UserId, ProtocolError> {
    match kind {
        EventKind::ChatMessage => {
            let msg: ChatMessage = serde_json::from_slice(payload)?;
            Ok(msg.receiver_id)
        }
        EventKind::Typing => {
            let msg: TypingIndicator = serde_json::from_slice(payload)?;
            Ok(msg.receiver_id)
        }
        other => Err(ProtocolError::Invalid(format!(
            "{} is not a direct event",
            other
        ))),
    }
}

/// Validate the payload of a broadcast kind.
///
/// # Errors
///
/// Returns an error if the payload does not match the kind's schema.
pub fn validate_broadcast(kind: &EventKind, payload: &[u8]) -> Result<(), ProtocolError> {
    match kind {
        EventKind::NewPost | EventKind::UpdatePost | EventKind::DeletePost => {
            serde_json::from_slice::<PostNotice>(payload)?;
        }
        EventKind::NewComment => {
            serde_json::from_slice::<CommentNotice>(payload)?;
        }
        EventKind::OnlineStatus => {
            serde_json::from_slice::<OnlineStatus>(payload)?;
        }
        other => {
            return Err(ProtocolError::Invalid(format!(
                "{} is not a broadcast event",
                other
            )))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_camel_case() {
        let json = br#"{"senderId":1,"receiverId":2,"content":"hi","senderName":"ann"}"#;
        let msg: ChatMessage = serde_json::from_slice(json).unwrap();
        assert_eq!(msg.sender_id, UserId(1));
        assert_eq!(msg.receiver_id, UserId(2));
        assert_eq!(msg.sender_name.as_deref(), Some("ann"));
        assert!(msg.image_url.is_none());
    }

    #[test]
    fn test_direct_target() {
        let chat = br#"{"senderId":1,"receiverId":7,"content":"yo"}"#;
        assert_eq!(
            direct_target(&EventKind::ChatMessage, chat).unwrap(),
            UserId(7)
        );

        let typing = br#"{"senderId":1,"receiverId":3,"isTyping":true}"#;
        assert_eq!(direct_target(&EventKind::Typing, typing).unwrap(), UserId(3));
    }

    #[test]
    fn test_direct_target_rejects_bad_schema() {
        let missing_receiver = br#"{"senderId":1,"content":"yo"}"#;
        assert!(direct_target(&EventKind::ChatMessage, missing_receiver).is_err());
        assert!(direct_target(&EventKind::NewPost, br#"{"postId":1}"#).is_err());
    }

    #[test]
    fn test_validate_broadcast() {
        assert!(validate_broadcast(&EventKind::NewPost, br#"{"postId":4}"#).is_ok());
        assert!(
            validate_broadcast(&EventKind::NewComment, br#"{"postId":4,"commentId":9}"#).is_ok()
        );
        assert!(validate_broadcast(&EventKind::NewComment, br#"{"postId":4}"#).is_err());
        assert!(validate_broadcast(&EventKind::Typing, br#"{}"#).is_err());
    }

    #[test]
    fn test_online_status_wire_shape() {
        let status = OnlineStatus {
            user_id: UserId(5),
            online: true,
        };
        assert_eq!(
            serde_json::to_string(&status).unwrap(),
            r#"{"userId":5,"online":true}"#
        );
    }
}
