//! Event kinds and their routing class.
//!
//! The kind is the only part of an envelope the hub needs to understand
//! before handing it to a worker.

use std::fmt;

/// How the dispatcher routes an event of a given kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Delivered to every live connection of one user.
    Direct,
    /// Delivered to every live connection, minus the originator.
    Broadcast,
    /// Answered on the originating connection only.
    Reply,
    /// Only the hub may emit this kind; copies received from clients are dropped.
    HubOnly,
    /// Not recognised; dropped.
    Discard,
}

impl Route {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Direct => "direct",
            Route::Broadcast => "broadcast",
            Route::Reply => "reply",
            Route::HubOnly => "hub_only",
            Route::Discard => "discard",
        }
    }
}

/// The closed set of event kinds the hub knows how to route.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Private chat message between two users.
    ChatMessage,
    /// Typing indicator sent to a chat partner.
    Typing,
    /// A post was created.
    NewPost,
    /// A post was edited.
    UpdatePost,
    /// A post was removed.
    DeletePost,
    /// A comment was added to a post.
    NewComment,
    /// A user's presence changed.
    OnlineStatus,
    /// Application-level keepalive from a client.
    Ping,
    /// Answer to [`EventKind::Ping`].
    Pong,
    /// Any tag the hub does not recognise.
    Unknown(String),
}

impl EventKind {
    /// Parse a wire tag. Never fails; unrecognised tags become [`EventKind::Unknown`].
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "chat_message" => EventKind::ChatMessage,
            "typing" => EventKind::Typing,
            "new_post" => EventKind::NewPost,
            "update_post" => EventKind::UpdatePost,
            "delete_post" => EventKind::DeletePost,
            "new_comment" => EventKind::NewComment,
            "online_status" => EventKind::OnlineStatus,
            "ping" => EventKind::Ping,
            "pong" => EventKind::Pong,
            other => EventKind::Unknown(other.to_string()),
        }
    }

    /// The wire tag for this kind.
    #[must_use]
    pub fn as_tag(&self) -> &str {
        match self {
            EventKind::ChatMessage => "chat_message",
            EventKind::Typing => "typing",
            EventKind::NewPost => "new_post",
            EventKind::UpdatePost => "update_post",
            EventKind::DeletePost => "delete_post",
            EventKind::NewComment => "new_comment",
            EventKind::OnlineStatus => "online_status",
            EventKind::Ping => "ping",
            EventKind::Pong => "pong",
            EventKind::Unknown(tag) => tag,
        }
    }

    /// Routing class for events of this kind arriving from a client.
    #[must_use]
    pub fn route(&self) -> Route {
        match self {
            EventKind::ChatMessage | EventKind::Typing => Route::Direct,
            EventKind::NewPost
            | EventKind::UpdatePost
            | EventKind::DeletePost
            | EventKind::NewComment => Route::Broadcast,
            EventKind::Ping => Route::Reply,
            EventKind::OnlineStatus | EventKind::Pong => Route::HubOnly,
            EventKind::Unknown(_) => Route::Discard,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

impl From<&str> for EventKind {
    fn from(tag: &str) -> Self {
        Self::from_tag(tag)
    }
}
