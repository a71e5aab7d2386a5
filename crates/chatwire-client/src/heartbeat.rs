//! Heartbeat monitor.
//!
//! The monitor only produces ticks; the connection manager decides what a tick
//! means, because only it knows whether the channel is still open.

use crate::manager::Event;
use crate::transport::ChannelId;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

pub(crate) struct HeartbeatMonitor {
    interval: Duration,
    running: Option<(ChannelId, JoinHandle<()>)>,
    last_pong: Option<Instant>,
}

impl HeartbeatMonitor {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            running: None,
            last_pong: None,
        }
    }

    /// Start ticking for `channel`, replacing any previous monitor.
    pub(crate) fn start(&mut self, channel: ChannelId, events: mpsc::UnboundedSender<Event>) {
        self.stop();
        let period = self.interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if events.send(Event::HeartbeatTick(channel)).is_err() {
                    break;
                }
            }
        });
        self.running = Some((channel, task));
    }

    pub(crate) fn stop(&mut self) {
        if let Some((channel, task)) = self.running.take() {
            task.abort();
            tracing::debug!(%channel, "heartbeat stopped");
        }
        self.last_pong = None;
    }

    /// Whether a tick for `channel` comes from the live monitor.
    pub(crate) fn is_monitoring(&self, channel: ChannelId) -> bool {
        matches!(self.running, Some((id, _)) if id == channel)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub(crate) fn record_pong(&mut self) {
        let now = Instant::now();
        if let Some(previous) = self.last_pong.replace(now) {
            tracing::debug!(since_last = ?now - previous, "pong");
        } else {
            tracing::debug!("first pong");
        }
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
