//! Last-resort polling for messages missed while no channel exists.
//!
//! Read-only with respect to the connection: it never touches the channel and
//! never triggers a reconnect. The caller decides when to poll.

use crate::fallback::FallbackApi;
use chatwire_core::{ConnectionState, HandlerRegistry, Inbound, Tag};

/// Result of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The channel is connected; nothing to do.
    Skipped,
    NothingUnread,
    /// The `NEW_MESSAGES` handler was called with this many conversations.
    Notified(usize),
    /// Unread conversations exist but nobody is listening.
    Unhandled(usize),
    /// A request failed; logged and swallowed.
    Failed,
}

pub(crate) async fn poll(
    state: ConnectionState,
    fallback: &dyn FallbackApi,
    registry: &HandlerRegistry,
) -> PollOutcome {
    if state == ConnectionState::Connected {
        return PollOutcome::Skipped;
    }

    let unread = match fallback.unread_count().await {
        Ok(count) => count,
        Err(error) => {
            tracing::warn!(%error, "unread count poll failed");
            return PollOutcome::Failed;
        }
    };
    if unread == 0 {
        return PollOutcome::NothingUnread;
    }

    let conversations = match fallback.conversations().await {
        Ok(conversations) => conversations,
        Err(error) => {
            tracing::warn!(%error, "conversation poll failed");
            return PollOutcome::Failed;
        }
    };
    let unread: Vec<_> = conversations
        .into_iter()
        .filter(|conversation| conversation.has_unread())
        .collect();
    if unread.is_empty() {
        return PollOutcome::NothingUnread;
    }

    let count = unread.len();
    tracing::debug!(conversations = count, "poll found unread conversations");
    if registry.notify(Tag::NewMessages, Inbound::UnreadConversations(unread)) {
        PollOutcome::Notified(count)
    } else {
        PollOutcome::Unhandled(count)
    }
}
