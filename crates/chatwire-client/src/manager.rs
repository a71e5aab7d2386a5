//! Connection manager.
//!
//! One driver task owns the channel, the attempt counter and every timer.
//! Channel callbacks, timer firings and API calls all arrive as [`Event`]s on a
//! single queue and are applied one at a time by [`ConnectionManager::handle`],
//! so no two transitions ever interleave.
//!
//! ```text
//! Initializing ──open──▶ Connecting ──opened──▶ Connected
//!                            │                      │
//!               timeout / unclean close   unclean close / heartbeat failure
//!                            ▼                      ▼
//!                        Disconnected ◀─────────────┘
//!                            │
//!                 retry timer (attempts < max) ──▶ Connecting
//! ```

use crate::dispatcher::{self, Received};
use crate::heartbeat::HeartbeatMonitor;
use crate::reconnect::ReconnectScheduler;
use crate::session::{SessionSource, SessionToken};
use crate::transport::{
    Channel, ChannelEvent, ChannelEvents, ChannelId, CloseReason, Connector, OpenRequest,
};
use chatwire_core::{
    ConnectionState, Envelope, HandlerRegistry, PreconditionError, RetryState, TransportError,
    now_millis,
};
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Who asked for a channel to be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpenOrigin {
    /// Login, reachability or an explicit call. Resets the attempt counter.
    External,
    /// The reconnect scheduler.
    Retry,
}

#[derive(Debug)]
pub(crate) enum Event {
    Open(OpenOrigin),
    /// Clean, user-initiated close.
    Close,
    CameOnline,
    Write {
        frame: String,
        reply: oneshot::Sender<Result<(), TransportError>>,
    },
    Channel {
        id: ChannelId,
        event: ChannelEvent,
    },
    OpenTimeout(ChannelId),
    HeartbeatTick(ChannelId),
    RetryDue(u64),
    Inspect(oneshot::Sender<ManagerSnapshot>),
    Shutdown,
}

/// Point-in-time view of the manager's internals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerSnapshot {
    pub state: ConnectionState,
    /// Open attempts since the last success or external open request.
    pub attempts: u32,
    pub channel: Option<ChannelId>,
    pub retry_pending: bool,
    pub heartbeat_running: bool,
}

pub(crate) struct ManagerSettings {
    pub(crate) endpoint: Url,
    pub(crate) open_timeout: Duration,
    pub(crate) heartbeat_interval: Duration,
    pub(crate) retry: RetryState,
}

struct ActiveChannel {
    id: ChannelId,
    channel: Box<dyn Channel>,
    /// The credentials the channel authenticated with.
    token: SessionToken,
    open: bool,
}

pub(crate) struct ConnectionManager {
    endpoint: Url,
    open_timeout: Duration,
    connector: Arc<dyn Connector>,
    session: Arc<dyn SessionSource>,
    registry: HandlerRegistry,
    state: watch::Sender<ConnectionState>,
    events: mpsc::UnboundedSender<Event>,
    active: Option<ActiveChannel>,
    next_channel: u64,
    retry: RetryState,
    open_timer: Option<JoinHandle<()>>,
    heartbeat: HeartbeatMonitor,
    reconnect: ReconnectScheduler,
}

impl ConnectionManager {
    pub(crate) fn new(
        settings: ManagerSettings,
        connector: Arc<dyn Connector>,
        session: Arc<dyn SessionSource>,
        registry: HandlerRegistry,
        state: watch::Sender<ConnectionState>,
        events: mpsc::UnboundedSender<Event>,
    ) -> Self {
        Self {
            endpoint: settings.endpoint,
            open_timeout: settings.open_timeout,
            connector,
            session,
            registry,
            state,
            events,
            active: None,
            next_channel: 0,
            retry: settings.retry,
            open_timer: None,
            heartbeat: HeartbeatMonitor::new(settings.heartbeat_interval),
            reconnect: ReconnectScheduler::new(),
        }
    }

    /// Drive the manager until [`Event::Shutdown`].
    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Event>) {
        while let Some(event) = rx.recv().await {
            if matches!(event, Event::Shutdown) {
                break;
            }
            self.handle(event);
        }
        self.teardown();
        tracing::debug!("connection manager stopped");
    }

    /// The transition function.
    pub(crate) fn handle(&mut self, event: Event) {
        match event {
            Event::Open(origin) => self.open(origin),
            Event::Close => self.close(),
            Event::CameOnline => {
                if self.current_state() == ConnectionState::Disconnected
                    && self.session.token().is_some()
                {
                    tracing::info!("network restored, reopening channel");
                    self.open(OpenOrigin::External);
                }
            }
            Event::Write { frame, reply } => {
                let _ = reply.send(self.write(frame));
            }
            Event::Channel { id, event } => self.on_channel_event(id, event),
            Event::OpenTimeout(id) => self.on_open_timeout(id),
            Event::HeartbeatTick(id) => self.on_heartbeat_tick(id),
            Event::RetryDue(token) => {
                if self.reconnect.fire(token) {
                    self.open(OpenOrigin::Retry);
                }
            }
            Event::Inspect(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Event::Shutdown => self.teardown(),
        }
    }

    fn open(&mut self, origin: OpenOrigin) {
        let token = match self.check_preconditions() {
            Ok(token) => token,
            Err(reason) => {
                tracing::warn!(%reason, "not opening channel");
                self.teardown();
                return;
            }
        };

        if let Some(active) = &self.active {
            if active.token == token {
                tracing::debug!(channel = %active.id, "channel already live, ignoring open");
                return;
            }
            tracing::info!(channel = %active.id, "session changed, replacing channel");
            self.discard(CloseReason::Superseded);
        }

        if origin == OpenOrigin::External {
            self.reconnect.cancel();
            self.retry.reset();
        }

        self.cancel_open_timer();
        self.heartbeat.stop();

        let attempt = self.retry.record_attempt();
        self.next_channel += 1;
        let id = ChannelId(self.next_channel);
        self.set_state(ConnectionState::Connecting);
        tracing::info!(channel = %id, attempt, endpoint = %self.endpoint, "opening channel");

        let request = OpenRequest {
            endpoint: self.endpoint.clone(),
            token: token.clone(),
        };
        match self
            .connector
            .open(request, ChannelEvents::new(id, self.events.clone()))
        {
            Ok(channel) => {
                self.active = Some(ActiveChannel {
                    id,
                    channel,
                    token,
                    open: false,
                });
                self.arm_open_timer(id);
            }
            Err(e) => {
                tracing::warn!(channel = %id, error = %e, "could not start opening channel");
                self.set_state(ConnectionState::Disconnected);
                self.retry_if_allowed();
            }
        }
    }

    fn check_preconditions(&self) -> Result<SessionToken, PreconditionError> {
        if !self.connector.is_supported() {
            return Err(PreconditionError::Unsupported);
        }
        self.session.token().ok_or(PreconditionError::MissingToken)
    }

    fn close(&mut self) {
        self.teardown();
        tracing::info!("channel closed on request");
    }

    /// Cancel every timer, close any channel cleanly, and settle in `Disconnected`.
    fn teardown(&mut self) {
        self.reconnect.cancel();
        self.cancel_open_timer();
        self.heartbeat.stop();
        if let Some(active) = self.active.take() {
            active.channel.close(CloseReason::Logout);
        }
        self.set_state(ConnectionState::Disconnected);
    }

    fn write(&self, frame: String) -> Result<(), TransportError> {
        match &self.active {
            Some(active) if active.open => active.channel.send(frame),
            _ => Err(TransportError::NotConnected),
        }
    }

    fn on_channel_event(&mut self, id: ChannelId, event: ChannelEvent) {
        if !self.is_active(id) {
            tracing::debug!(channel = %id, ?event, "ignoring event from stale channel");
            return;
        }

        match event {
            ChannelEvent::Opened => self.on_opened(id),
            ChannelEvent::Frame(text) => {
                if dispatcher::receive(&text, &self.registry) == Received::Pong {
                    self.heartbeat.record_pong();
                }
            }
            ChannelEvent::Error(message) => {
                // The close that follows drives the transition.
                tracing::warn!(channel = %id, %message, "channel error");
            }
            ChannelEvent::Closed { clean } => {
                self.active = None;
                self.cancel_open_timer();
                self.heartbeat.stop();
                self.set_state(ConnectionState::Disconnected);
                if clean {
                    tracing::info!(channel = %id, "channel closed cleanly");
                } else {
                    tracing::warn!(channel = %id, error = %TransportError::UnexpectedClose, "channel lost");
                    self.retry_if_allowed();
                }
            }
        }
    }

    fn on_opened(&mut self, id: ChannelId) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.open {
            return;
        }
        active.open = true;
        self.cancel_open_timer();
        self.retry.reset();
        self.set_state(ConnectionState::Connected);
        tracing::info!(channel = %id, "channel connected");

        self.heartbeat.start(id, self.events.clone());
        self.beat(id);
    }

    fn on_open_timeout(&mut self, id: ChannelId) {
        match &self.active {
            Some(active) if active.id == id && !active.open => {}
            _ => return,
        }
        self.open_timer = None;
        tracing::warn!(channel = %id, timeout = ?self.open_timeout, "{}", TransportError::OpenTimeout);
        self.abandon(CloseReason::Timeout);
    }

    fn on_heartbeat_tick(&mut self, id: ChannelId) {
        if !self.heartbeat.is_monitoring(id) {
            return;
        }
        self.beat(id);
    }

    /// Send one heartbeat, or give the channel up if that is impossible.
    fn beat(&mut self, id: ChannelId) {
        let result = match &self.active {
            Some(active) if active.id == id && active.open => Envelope::ping(now_millis())
                .encode()
                .map_err(|e| TransportError::SendRejected(e.to_string()))
                .and_then(|frame| active.channel.send(frame)),
            _ => Err(TransportError::NotConnected),
        };

        if let Err(error) = result {
            tracing::warn!(channel = %id, %error, "heartbeat failed, reconnecting");
            self.abandon(CloseReason::Unhealthy);
        }
    }

    /// Force the active channel shut and treat it as an unexpected loss.
    fn abandon(&mut self, reason: CloseReason) {
        self.discard(reason);
        self.set_state(ConnectionState::Disconnected);
        self.retry_if_allowed();
    }

    /// Drop the active channel and its timers without touching the state.
    fn discard(&mut self, reason: CloseReason) {
        self.cancel_open_timer();
        self.heartbeat.stop();
        if let Some(active) = self.active.take() {
            active.channel.close(reason);
        }
    }

    fn retry_if_allowed(&mut self) {
        if self.retry.can_retry() {
            let delay = self.retry.next_delay();
            tracing::info!(attempts = self.retry.attempts(), ?delay, "scheduling reconnect");
            self.reconnect.schedule(delay, self.events.clone());
        } else {
            tracing::warn!(
                attempts = self.retry.attempts(),
                "giving up on channel until the next external open"
            );
        }
    }

    fn arm_open_timer(&mut self, id: ChannelId) {
        self.cancel_open_timer();
        let events = self.events.clone();
        let timeout = self.open_timeout;
        self.open_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = events.send(Event::OpenTimeout(id));
        }));
    }

    fn cancel_open_timer(&mut self) {
        if let Some(timer) = self.open_timer.take() {
            timer.abort();
        }
    }

    fn is_active(&self, id: ChannelId) -> bool {
        self.active.as_ref().is_some_and(|active| active.id == id)
    }

    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "connection state");
        }
    }

    fn snapshot(&self) -> ManagerSnapshot {
        ManagerSnapshot {
            state: self.current_state(),
            attempts: self.retry.attempts(),
            channel: self.active.as_ref().map(|active| active.id),
            retry_pending: self.reconnect.is_pending(),
            heartbeat_running: self.heartbeat.is_running(),
        }
    }
}
