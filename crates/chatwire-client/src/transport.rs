//! The channel seam.
//!
//! A [`Connector`] opens channels the way a browser constructs a WebSocket:
//! `open` returns a handle immediately and the outcome arrives later as events
//! on [`ChannelEvents`]. Every event is stamped with the [`ChannelId`] it was
//! issued for, so the connection manager can ignore anything from a channel it
//! has already discarded.

use crate::manager::Event;
use crate::session::SessionToken;
use chatwire_core::TransportError;
use reqwest::Url;
use std::fmt;
use tokio::sync::mpsc;

/// Identity of one channel instance. Never reused within a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub(crate) u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a channel reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The handshake completed; frames can flow.
    Opened,
    /// One inbound text frame.
    Frame(String),
    /// `clean` is true only for a deliberate, normal closure.
    Closed { clean: bool },
    /// A transport fault. A `Closed` normally follows.
    Error(String),
}

/// Why the client is closing a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Explicit close, e.g. logout. The only clean reason.
    Logout,
    /// Did not open within the open timeout.
    Timeout,
    /// Replaced by a newer channel.
    Superseded,
    /// Heartbeat could not be delivered.
    Unhealthy,
}

impl CloseReason {
    pub fn is_clean(self) -> bool {
        self == CloseReason::Logout
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::Logout => "User logout",
            CloseReason::Timeout => "open timeout",
            CloseReason::Superseded => "superseded",
            CloseReason::Unhealthy => "heartbeat failed",
        }
    }
}

/// Everything needed to open one channel.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub endpoint: Url,
    pub token: SessionToken,
}

impl OpenRequest {
    /// The endpoint with the token appended as the `token` query parameter.
    pub fn url(&self) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("token", self.token.expose());
        url
    }
}

/// Sink for a channel's events. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ChannelEvents {
    id: ChannelId,
    tx: mpsc::UnboundedSender<Event>,
}

impl ChannelEvents {
    pub(crate) fn new(id: ChannelId, tx: mpsc::UnboundedSender<Event>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn opened(&self) {
        self.emit(ChannelEvent::Opened);
    }

    pub fn frame(&self, text: impl Into<String>) {
        self.emit(ChannelEvent::Frame(text.into()));
    }

    pub fn closed(&self, clean: bool) {
        self.emit(ChannelEvent::Closed { clean });
    }

    pub fn error(&self, error: impl fmt::Display) {
        self.emit(ChannelEvent::Error(error.to_string()));
    }

    fn emit(&self, event: ChannelEvent) {
        // The manager is gone; nobody is left to care.
        let _ = self.tx.send(Event::Channel { id: self.id, event });
    }
}

/// Opens channels.
pub trait Connector: Send + Sync + 'static {
    /// Whether this runtime can open channels at all.
    fn is_supported(&self) -> bool {
        true
    }

    /// Start opening a channel. An `Err` means the attempt could not even begin.
    fn open(
        &self,
        request: OpenRequest,
        events: ChannelEvents,
    ) -> Result<Box<dyn Channel>, TransportError>;
}

/// Handle to one open or opening channel.
pub trait Channel: Send {
    /// Queue a text frame. Fails synchronously if the channel cannot take it.
    fn send(&self, frame: String) -> Result<(), TransportError>;

    fn close(&self, reason: CloseReason);
}
