//! Leading-edge debounce.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

/// Lets the first call per key through, then swallows calls until `window`
/// has passed without any.
pub struct Debounce<K> {
    window: Duration,
    last_seen: HashMap<K, Instant>,
}

impl<K: Eq + Hash> Debounce<K> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_seen: HashMap::new(),
        }
    }

    pub fn fire(&mut self, key: K) -> bool {
        let now = Instant::now();
        self.last_seen
            .insert(key, now)
            .is_none_or(|previous| now.duration_since(previous) >= self.window)
    }
}
