//! Message dispatcher.
//!
//! Outbound sends try the channel first, wait briefly for a channel that is
//! still connecting, and otherwise go through the request/response fallback.
//! Inbound frames are decoded and routed through the handler registry.

use crate::fallback::FallbackApi;
use crate::manager::Event;
use crate::session::SessionSource;
use chatwire_core::{
    ConnectionState, Envelope, HandlerRegistry, Intent, SendFailure, SendOutcome, Tag,
    TransportError, now_millis,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

/// What happened to one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Received {
    /// Heartbeat reply; consumed, never dispatched.
    Pong,
    Dispatched,
    Unhandled,
    Malformed,
}

/// Decode `frame` and hand it to its handler.
pub(crate) fn receive(frame: &str, registry: &HandlerRegistry) -> Received {
    let envelope = match Envelope::decode(frame) {
        Ok(envelope) => envelope,
        Err(error) => {
            tracing::warn!(%error, "dropping inbound frame");
            return Received::Malformed;
        }
    };

    if envelope.tag == Tag::Pong {
        return Received::Pong;
    }

    tracing::debug!(tag = %envelope.tag, from = ?envelope.from, "inbound envelope");
    if registry.dispatch(envelope) {
        Received::Dispatched
    } else {
        Received::Unhandled
    }
}

pub(crate) struct Dispatcher {
    events: mpsc::UnboundedSender<Event>,
    state: watch::Receiver<ConnectionState>,
    session: Arc<dyn SessionSource>,
    fallback: Arc<dyn FallbackApi>,
    grace: Duration,
}

impl Dispatcher {
    pub(crate) fn new(
        events: mpsc::UnboundedSender<Event>,
        state: watch::Receiver<ConnectionState>,
        session: Arc<dyn SessionSource>,
        fallback: Arc<dyn FallbackApi>,
        grace: Duration,
    ) -> Self {
        Self {
            events,
            state,
            session,
            fallback,
            grace,
        }
    }

    pub(crate) async fn send(&self, intent: &Intent) -> SendOutcome {
        let Some(user) = self.session.current_user() else {
            tracing::warn!(tag = %intent.tag, "no authenticated user, not sending");
            return SendOutcome::Invalid;
        };

        let envelope = match intent.to_envelope(user, now_millis()) {
            Ok(envelope) => envelope,
            Err(error) => {
                tracing::warn!(%error, "rejecting intent");
                return SendOutcome::Invalid;
            }
        };
        let frame = match envelope.encode() {
            Ok(frame) => frame,
            Err(error) => {
                tracing::warn!(%error, "rejecting intent");
                return SendOutcome::Invalid;
            }
        };

        if self.send_via_channel(frame).await {
            return SendOutcome::SentViaChannel;
        }
        self.send_via_fallback(&envelope).await
    }

    async fn send_via_channel(&self, frame: String) -> bool {
        let mut state = self.state.clone();
        let current = *state.borrow_and_update();
        match current {
            ConnectionState::Connected => {}
            ConnectionState::Connecting => {
                let became_open = tokio::time::timeout(
                    self.grace,
                    state.wait_for(|s| *s == ConnectionState::Connected),
                )
                .await
                .is_ok_and(|changed| changed.is_ok());
                if !became_open {
                    tracing::debug!(grace = ?self.grace, "channel still connecting, using fallback");
                    return false;
                }
            }
            ConnectionState::Initializing | ConnectionState::Disconnected => return false,
        }

        match self.write(frame).await {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(%error, "channel write failed, using fallback");
                false
            }
        }
    }

    async fn write(&self, frame: String) -> Result<(), TransportError> {
        let (reply, result) = oneshot::channel();
        self.events
            .send(Event::Write { frame, reply })
            .map_err(|_| TransportError::NotConnected)?;
        result.await.map_err(|_| TransportError::NotConnected)?
    }

    async fn send_via_fallback(&self, envelope: &Envelope) -> SendOutcome {
        let result = match (envelope.tag, &envelope.to, &envelope.content) {
            (Tag::Chat, Some(receiver), Some(content)) => {
                self.fallback.send_chat(receiver, content).await
            }
            (Tag::MarkRead, Some(sender), _) => self.fallback.mark_read(sender).await,
            (Tag::Typing, _, _) => return SendOutcome::Ignored,
            (tag, _, _) => {
                tracing::warn!(%tag, "no fallback for this message type");
                return SendOutcome::Failed(SendFailure::Unsupported(tag));
            }
        };

        match result {
            Ok(()) => SendOutcome::SentViaFallback,
            Err(error) => {
                tracing::warn!(tag = %envelope.tag, %error, "fallback delivery failed");
                SendOutcome::Failed(error.into())
            }
        }
    }
}
