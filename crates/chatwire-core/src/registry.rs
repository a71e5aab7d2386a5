//! Handler registry: one callback per message type, plus an optional catch-all.
//!
//! Registration is last-writer-wins. Handlers are cloned out of the map before
//! they run, so a handler may register or unregister without deadlocking, but
//! the change only affects later dispatches.

use crate::message::{Envelope, Inbound, Tag};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// A registered callback.
pub type Handler = Arc<dyn Fn(&Inbound) + Send + Sync>;

/// Key under which a handler is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKey {
    Tag(Tag),
    /// Receives envelopes whose tag has no handler of its own.
    Default,
}

impl From<Tag> for HandlerKey {
    fn from(tag: Tag) -> Self {
        HandlerKey::Tag(tag)
    }
}

/// Shared mapping from [`HandlerKey`] to [`Handler`]. Cloning shares the map.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<RwLock<HashMap<HandlerKey, Handler>>>,
}

impl HandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler` for `key`, returning the handler it replaced.
    pub fn register<F>(&self, key: impl Into<HandlerKey>, handler: F) -> Option<Handler>
    where
        F: Fn(&Inbound) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), Arc::new(handler))
    }

    /// Remove the handler for `key`. Returns whether one was installed.
    pub fn unregister(&self, key: impl Into<HandlerKey>) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key.into())
            .is_some()
    }

    /// Whether a handler is installed for exactly `key`.
    pub fn contains(&self, key: impl Into<HandlerKey>) -> bool {
        self.get(key).is_some()
    }

    /// The handler installed for exactly `key`, without default fallback.
    pub fn get(&self, key: impl Into<HandlerKey>) -> Option<Handler> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key.into())
            .cloned()
    }

    /// The handler an envelope of `tag` would reach: its own, else the default.
    pub fn resolve(&self, tag: Tag) -> Option<Handler> {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers
            .get(&HandlerKey::Tag(tag))
            .or_else(|| handlers.get(&HandlerKey::Default))
            .cloned()
    }

    /// Route an inbound envelope. `PONG` never reaches a handler.
    ///
    /// Returns whether a handler ran.
    pub fn dispatch(&self, envelope: Envelope) -> bool {
        if envelope.tag == Tag::Pong {
            return false;
        }
        match self.resolve(envelope.tag) {
            Some(handler) => {
                handler(&Inbound::Envelope(envelope));
                true
            }
            None => {
                tracing::debug!(tag = %envelope.tag, "no handler, dropping envelope");
                false
            }
        }
    }

    /// Invoke exactly the handler for `key`, without default fallback.
    pub fn notify(&self, key: impl Into<HandlerKey>, inbound: Inbound) -> bool {
        match self.get(key) {
            Some(handler) => {
                handler(&inbound);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_set().entries(handlers.keys()).finish()
    }
}
