//! Wire envelopes.
//!
//! Every frame on the channel is a flat JSON object tagged by `type`:
//!
//! ```text
//! { "type": "CHAT", "from": "7", "to": "9", "content": "hi", "timestamp": 1700000000000 }
//! ```

use crate::UserId;
use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub type Millis = u64;

/// Current wall-clock time in milliseconds.
pub fn now_millis() -> Millis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as Millis
}

/// Message type tag. The set is closed; unknown tags fail to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tag {
    /// A chat message for `to`.
    Chat,
    /// `from` is typing to `to`.
    Typing,
    /// `from` has read everything `to` sent them.
    MarkRead,
    /// Unread conversations are waiting.
    NewMessages,
    /// Heartbeat sent by the client.
    Ping,
    /// Heartbeat answer. Never routed to handlers.
    Pong,
}

impl Tag {
    /// The tag as it appears on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Tag::Chat => "CHAT",
            Tag::Typing => "TYPING",
            Tag::MarkRead => "MARK_READ",
            Tag::NewMessages => "NEW_MESSAGES",
            Tag::Ping => "PING",
            Tag::Pong => "PONG",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed, timestamped message unit.
///
/// `from` is optional only because heartbeat frames carry no sender; envelopes
/// built by the dispatcher always set it to the authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type, `type` on the wire.
    #[serde(rename = "type")]
    pub tag: Tag,
    /// Sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<UserId>,
    /// Recipient. Absent on heartbeats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<UserId>,
    /// Message text, or a marker such as `typing` for signals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Milliseconds since the Unix epoch when the envelope was built.
    #[serde(default)]
    pub timestamp: Millis,
}

impl Envelope {
    /// A heartbeat stamped with `timestamp`.
    pub fn ping(timestamp: Millis) -> Self {
        Self {
            tag: Tag::Ping,
            from: None,
            to: None,
            content: None,
            timestamp,
        }
    }

    /// Parse a text frame.
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(frame).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    /// Serialize to a text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

/// One conversation as reported by the conversation-summary query.
///
/// Only `unreadCount` is interpreted; everything else is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    #[serde(default)]
    pub unread_count: i64,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl ConversationSummary {
    pub fn has_unread(&self) -> bool {
        self.unread_count > 0
    }
}

/// What a handler receives.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A frame that arrived over the channel.
    Envelope(Envelope),
    /// Conversations with unread messages, discovered by polling.
    UnreadConversations(Vec<ConversationSummary>),
}

impl Inbound {
    /// The envelope, if this came from the channel.
    pub fn envelope(&self) -> Option<&Envelope> {
        match self {
            Inbound::Envelope(envelope) => Some(envelope),
            Inbound::UnreadConversations(_) => None,
        }
    }
}
