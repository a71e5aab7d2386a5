//! Session credentials, as seen by the client.
//!
//! The client only reads the token; whoever owns the login flow writes it.

use chatwire_core::UserId;
use std::fmt;
use std::sync::{PoisonError, RwLock};
use tokio::sync::watch;

/// Opaque bearer token. `Debug` never prints it.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for putting on the wire.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(***)")
    }
}

/// Where the client gets its credentials and identity.
pub trait SessionSource: Send + Sync + 'static {
    fn token(&self) -> Option<SessionToken>;

    /// The authenticated user, stamped as `from` on outbound envelopes.
    fn current_user(&self) -> Option<UserId>;

    /// Changes to the token. The client opens on `Some` and closes on `None`.
    fn watch_token(&self) -> watch::Receiver<Option<SessionToken>>;
}

/// In-memory session.
#[derive(Debug)]
pub struct SessionStore {
    token: watch::Sender<Option<SessionToken>>,
    user: RwLock<Option<UserId>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// A logged-out session.
    pub fn new() -> Self {
        let (token, _) = watch::channel(None);
        Self {
            token,
            user: RwLock::new(None),
        }
    }

    /// A session that is already logged in.
    pub fn logged_in(token: SessionToken, user: UserId) -> Self {
        let store = Self::new();
        store.login(token, user);
        store
    }

    /// Store credentials. The user is set before the token is published so
    /// anything reacting to the token sees a complete session.
    pub fn login(&self, token: SessionToken, user: UserId) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = Some(user);
        self.token.send_replace(Some(token));
    }

    pub fn logout(&self) {
        self.token.send_replace(None);
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl SessionSource for SessionStore {
    fn token(&self) -> Option<SessionToken> {
        self.token.borrow().clone()
    }

    fn current_user(&self) -> Option<UserId> {
        self.user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn watch_token(&self) -> watch::Receiver<Option<SessionToken>> {
        self.token.subscribe()
    }
}
