//! Outbound intents and their projection onto envelopes.

use crate::error::{FallbackError, ProtocolError};
use crate::message::{Envelope, Millis, Tag};
use crate::UserId;
use serde::{Deserialize, Serialize};

/// Marker content carried by typing indicators.
pub const TYPING_MARKER: &str = "typing";

/// An application-level request to send something, before it becomes an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    #[serde(rename = "type")]
    pub tag: Tag,
    #[serde(default)]
    pub data: IntentData,
}

/// Loose payload of an intent; which fields matter depends on the tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Intent {
    /// Send `content` to `receiver`.
    pub fn chat(receiver: UserId, content: impl Into<String>) -> Self {
        Self {
            tag: Tag::Chat,
            data: IntentData {
                receiver_id: Some(receiver),
                content: Some(content.into()),
                ..Default::default()
            },
        }
    }

    /// Tell `receiver` the user is typing. Never sent over the fallback.
    pub fn typing(receiver: UserId) -> Self {
        Self {
            tag: Tag::Typing,
            data: IntentData {
                receiver_id: Some(receiver),
                ..Default::default()
            },
        }
    }

    /// Mark everything from `sender` as read.
    pub fn mark_read(sender: UserId) -> Self {
        Self {
            tag: Tag::MarkRead,
            data: IntentData {
                sender_id: Some(sender),
                ..Default::default()
            },
        }
    }

    /// Notify `receiver` of unread messages. Realtime only.
    pub fn new_messages(receiver: UserId, content: impl Into<String>) -> Self {
        Self {
            tag: Tag::NewMessages,
            data: IntentData {
                receiver_id: Some(receiver),
                content: Some(content.into()),
                ..Default::default()
            },
        }
    }

    /// Build the envelope for this intent as sent by `from` at `timestamp`.
    pub fn to_envelope(&self, from: UserId, timestamp: Millis) -> Result<Envelope, ProtocolError> {
        let (to, content) = match self.tag {
            Tag::Chat | Tag::NewMessages => (
                self.require(self.data.receiver_id.clone(), "receiverId")?,
                Some(self.require(self.data.content.clone(), "content")?),
            ),
            Tag::Typing => (
                self.require(self.data.receiver_id.clone(), "receiverId")?,
                Some(TYPING_MARKER.to_string()),
            ),
            Tag::MarkRead => (self.require(self.data.sender_id.clone(), "senderId")?, None),
            Tag::Ping | Tag::Pong => return Err(ProtocolError::UnsupportedIntent(self.tag)),
        };

        Ok(Envelope {
            tag: self.tag,
            from: Some(from),
            to: Some(to),
            content,
            timestamp,
        })
    }

    fn require<T>(&self, value: Option<T>, field: &'static str) -> Result<T, ProtocolError> {
        value.ok_or(ProtocolError::MissingField {
            tag: self.tag,
            field,
        })
    }
}

/// Result of sending an intent, as seen by feature code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    SentViaChannel,
    SentViaFallback,
    /// Nothing to deliver over request/response (typing indicators).
    Ignored,
    /// No authenticated user, or the intent could not become an envelope.
    Invalid,
    Failed(SendFailure),
}

impl SendOutcome {
    /// True when the message left this process by either path.
    pub fn is_delivered(&self) -> bool {
        matches!(self, SendOutcome::SentViaChannel | SendOutcome::SentViaFallback)
    }
}

/// Why a send that reached the fallback stage failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendFailure {
    #[error("{0} has no request/response equivalent")]
    Unsupported(Tag),
    #[error(transparent)]
    Fallback(#[from] FallbackError),
}
