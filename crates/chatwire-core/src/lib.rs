//! Core types for chatwire.
//!
//! This crate holds the protocol vocabulary shared by the client runtime and
//! anything else that speaks the wire envelope: tags, envelopes, intents,
//! the handler registry and the backoff policy. It does no I/O.

mod backoff;
mod error;
mod identity;
mod intent;
mod message;
mod registry;

pub use backoff::{Backoff, RetryState};
pub use error::{FallbackError, PreconditionError, ProtocolError, TransportError};
pub use identity::{UserId, UserIdParseError};
pub use intent::{Intent, IntentData, SendFailure, SendOutcome, TYPING_MARKER};
pub use message::{ConversationSummary, Envelope, Inbound, Millis, Tag, now_millis};
pub use registry::{Handler, HandlerKey, HandlerRegistry};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Nothing attempted yet.
    Initializing,
    /// Channel opening, not yet usable.
    Connecting,
    /// Channel open and heartbeating.
    Connected,
    /// No channel. May be waiting on a retry, or stopped for good.
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Initializing => "initializing",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
        })
    }
}
