//! Reconnect scheduler: at most one pending retry timer.

use crate::manager::Event;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub(crate) struct ReconnectScheduler {
    pending: Option<(u64, JoinHandle<()>)>,
    next_token: u64,
}

impl ReconnectScheduler {
    pub(crate) fn new() -> Self {
        Self {
            pending: None,
            next_token: 0,
        }
    }

    /// Arm a single-shot retry after `delay`, cancelling any pending one.
    pub(crate) fn schedule(&mut self, delay: Duration, events: mpsc::UnboundedSender<Event>) {
        self.cancel();
        self.next_token += 1;
        let token = self.next_token;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(Event::RetryDue(token));
        });
        self.pending = Some((token, task));
    }

    pub(crate) fn cancel(&mut self) {
        if let Some((_, task)) = self.pending.take() {
            task.abort();
        }
    }

    /// Consume a fired timer. False if `token` was cancelled or replaced.
    pub(crate) fn fire(&mut self, token: u64) -> bool {
        match self.pending {
            Some((current, _)) if current == token => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl Drop for ReconnectScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
