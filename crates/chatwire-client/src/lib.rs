//! Client runtime for chatwire.
//!
//! [`RealtimeClient`] keeps one realtime channel alive for a session: it opens
//! the channel when credentials appear, heartbeats it, reconnects with bounded
//! backoff when it drops, and routes inbound envelopes to registered handlers.
//! Outbound messages go over the channel when possible and over the HTTP
//! fallback otherwise. [`RealtimeClient::poll_missed_messages`] catches up on
//! anything missed while no channel existed.
//!
//! Transports sit behind [`Connector`] and [`FallbackApi`];
//! [`WsConnector`] and [`HttpFallback`] are the production implementations.

mod client;
mod config;
mod dispatcher;
mod fallback;
mod heartbeat;
mod manager;
mod polling;
mod reconnect;
mod session;
mod transport;
mod ws;

pub use client::RealtimeClient;
pub use config::{
    ClientConfig, ConfigError, ENV_API_TIMEOUT_MS, ENV_API_URL, ENV_WS_URL, ReconnectConfig,
};
pub use fallback::{FallbackApi, HttpFallback};
pub use manager::ManagerSnapshot;
pub use polling::PollOutcome;
pub use session::{SessionSource, SessionStore, SessionToken};
pub use transport::{
    Channel, ChannelEvent, ChannelEvents, ChannelId, CloseReason, Connector, OpenRequest,
};
pub use ws::WsConnector;
