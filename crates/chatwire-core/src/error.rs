//! Failure taxonomy.
//!
//! None of these cross the client's public contract as errors: preconditions and
//! transport failures surface as `Disconnected`, protocol failures are logged and
//! dropped, and fallback failures become [`SendOutcome::Failed`](crate::SendOutcome).

use crate::message::Tag;

/// An open request that cannot be attempted until something external changes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreconditionError {
    #[error("runtime has no channel support")]
    Unsupported,
    #[error("no session token")]
    MissingToken,
}

/// The persistent channel failed. Retried by the connection manager.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("channel not open")]
    NotConnected,
    #[error("channel rejected write: {0}")]
    SendRejected(String),
    #[error("open timed out")]
    OpenTimeout,
    #[error("channel closed unexpectedly")]
    UnexpectedClose,
}

/// A frame or intent that does not fit the protocol. Dropped locally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("could not encode envelope: {0}")]
    Encode(String),
    #[error("{0} cannot be sent by application code")]
    UnsupportedIntent(Tag),
    #[error("{tag} intent is missing {field}")]
    MissingField { tag: Tag, field: &'static str },
}

/// The request/response client failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FallbackError {
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("server error {0}")]
    Server(u16),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("could not decode response: {0}")]
    Decode(String),
}
