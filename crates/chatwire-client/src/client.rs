//! The public handle.

use crate::config::{ClientConfig, ConfigError};
use crate::dispatcher::Dispatcher;
use crate::fallback::{FallbackApi, HttpFallback};
use crate::manager::{ConnectionManager, Event, ManagerSettings, ManagerSnapshot, OpenOrigin};
use crate::polling::{self, PollOutcome};
use crate::session::{SessionSource, SessionToken};
use crate::transport::Connector;
use crate::ws::WsConnector;
use chatwire_core::{
    ConnectionState, Handler, HandlerKey, HandlerRegistry, Inbound, Intent, RetryState,
    SendOutcome,
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// A realtime connection for one session.
///
/// Cloning shares the connection. The connection manager stops, closing its
/// channel, when the last clone is dropped. Must be created inside a tokio
/// runtime.
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<Inner>,
}

struct Inner {
    events: mpsc::UnboundedSender<Event>,
    state: watch::Receiver<ConnectionState>,
    registry: HandlerRegistry,
    dispatcher: Dispatcher,
    fallback: Arc<dyn FallbackApi>,
    session_watch: JoinHandle<()>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.session_watch.abort();
        let _ = self.events.send(Event::Shutdown);
    }
}

impl RealtimeClient {
    /// Connect over WebSocket with HTTP fallback, as described by `config`.
    pub fn connect(
        config: ClientConfig,
        session: Arc<dyn SessionSource>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let fallback = HttpFallback::new(config.api_endpoint()?, config.api_timeout(), session.clone())
            .map_err(|e| ConfigError::Invalid {
                field: "api_url",
                reason: e.to_string(),
            })?;
        Self::with_transports(config, session, Arc::new(WsConnector), Arc::new(fallback))
    }

    /// Like [`connect`](Self::connect) with caller-supplied transports.
    pub fn with_transports(
        config: ClientConfig,
        session: Arc<dyn SessionSource>,
        connector: Arc<dyn Connector>,
        fallback: Arc<dyn FallbackApi>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let settings = ManagerSettings {
            endpoint: config.channel_endpoint()?,
            open_timeout: config.open_timeout(),
            heartbeat_interval: config.heartbeat_interval(),
            retry: RetryState::new(config.backoff()),
        };

        let (events, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Initializing);
        let registry = HandlerRegistry::new();

        let mut tokens = session.watch_token();
        let logged_in = tokens.borrow_and_update().is_some();

        let manager = ConnectionManager::new(
            settings,
            connector,
            session.clone(),
            registry.clone(),
            state_tx,
            events.clone(),
        );
        tokio::spawn(manager.run(rx));

        if logged_in {
            let _ = events.send(Event::Open(OpenOrigin::External));
        }
        let session_watch = tokio::spawn(follow_session(tokens, events.clone()));

        let dispatcher = Dispatcher::new(
            events.clone(),
            state.clone(),
            session,
            fallback.clone(),
            config.connect_grace(),
        );

        Ok(Self {
            inner: Arc::new(Inner {
                events,
                state,
                registry,
                dispatcher,
                fallback,
                session_watch,
            }),
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Observe state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.inner.registry
    }

    /// Install a handler. Replaces any handler already registered for `key`.
    pub fn register<F>(&self, key: impl Into<HandlerKey>, handler: F) -> Option<Handler>
    where
        F: Fn(&Inbound) + Send + Sync + 'static,
    {
        self.inner.registry.register(key, handler)
    }

    pub fn unregister(&self, key: impl Into<HandlerKey>) -> bool {
        self.inner.registry.unregister(key)
    }

    /// Deliver `intent` over the channel if possible, else over the fallback.
    pub async fn send(&self, intent: Intent) -> SendOutcome {
        self.inner.dispatcher.send(&intent).await
    }

    /// Ask for a channel. A no-op while one is connecting or connected.
    pub fn open(&self) {
        self.post(Event::Open(OpenOrigin::External));
    }

    /// Close the channel cleanly and cancel any pending retry.
    pub fn close(&self) {
        self.post(Event::Close);
    }

    /// Network reachability came back.
    pub fn came_online(&self) {
        self.post(Event::CameOnline);
    }

    /// Pull missed messages when there is no connected channel.
    pub async fn poll_missed_messages(&self) -> PollOutcome {
        polling::poll(self.state(), self.inner.fallback.as_ref(), &self.inner.registry).await
    }

    /// Inspect the connection manager. Processed in order with earlier calls.
    pub async fn snapshot(&self) -> Option<ManagerSnapshot> {
        let (reply, snapshot) = oneshot::channel();
        self.inner.events.send(Event::Inspect(reply)).ok()?;
        snapshot.await.ok()
    }

    fn post(&self, event: Event) {
        if self.inner.events.send(event).is_err() {
            tracing::warn!("connection manager is not running");
        }
    }
}

/// Open on login, close on logout.
///
/// Every new token is forwarded as an open request; the manager ignores it
/// when the live channel already carries that token and replaces the channel
/// otherwise. A logout immediately followed by a login may surface here as a
/// single change.
async fn follow_session(
    mut tokens: watch::Receiver<Option<SessionToken>>,
    events: mpsc::UnboundedSender<Event>,
) {
    while tokens.changed().await.is_ok() {
        let logged_in = tokens.borrow_and_update().is_some();
        let event = if logged_in {
            tracing::info!("session available, opening channel");
            Event::Open(OpenOrigin::External)
        } else {
            tracing::info!("session cleared, closing channel");
            Event::Close
        };
        if events.send(event).is_err() {
            break;
        }
    }
}
