//! Push scheduling with debounce.
//!
//! Provides:
//! - `Debouncer` - Per-key trailing deadlines driven by a listen loop

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

/// Tracks one pending deadline per key.
///
/// Every trigger pushes the key's deadline out to `now + window`, so a burst
/// of triggers fires once, a full window after the last one. The owning loop
/// sleeps until [`Debouncer::next_deadline`] and then drains
/// [`Debouncer::take_due`].
pub struct Debouncer<K> {
    /// Pending keys: key -> fire time.
    pending: HashMap<K, Instant>,

    /// Coalescing window.
    window: Duration,
}

impl<K: Hash + Eq + Clone> Debouncer<K> {
    pub fn new(window: Duration) -> Self {
        Debouncer {
            pending: HashMap::new(),
            window,
        }
    }

    /// Schedule `key` a full window from now, replacing any earlier deadline.
    pub fn trigger(&mut self, key: K) {
        self.pending.insert(key, Instant::now() + self.window);
    }

    /// Schedule `key` to fire immediately.
    pub fn trigger_now(&mut self, key: K) {
        self.pending.insert(key, Instant::now());
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    /// Remove and return every key whose deadline has passed.
    pub fn take_due(&mut self) -> Vec<K> {
        let now = Instant::now();
        let due: Vec<K> = self
            .pending
            .iter()
            .filter(|(_, fire_at)| **fire_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &due {
            self.pending.remove(key);
        }
        due
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    pub fn cancel(&mut self, key: &K) {
        self.pending.remove(key);
    }
}
