use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::core::config::MAX_TIMER_HORIZON;

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    generation: u64,
}

struct CacheState<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    /// Pending expirations. An element whose generation no longer matches
    /// its entry belongs to an overwritten value and is skipped.
    expirations: BinaryHeap<Reverse<(Instant, u64, K)>>,
    next_generation: u64,
}

/// Thread-safe cache with a fixed TTL per insertion.
///
/// Every insertion gets a fresh generation stamp and its own expiry; an
/// overwrite therefore re-keys the expiry and the older deadline can no
/// longer evict the newer value. Expired entries are swept on every access.
pub struct Cache<K, V> {
    state: Mutex<CacheState<K, V>>,
    ttl: Duration,
}

impl<K: Eq + Hash + Ord + Clone, V: Clone> Cache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                expirations: BinaryHeap::new(),
                next_generation: 0,
            }),
            ttl,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut state = self.state.lock();
        Self::sweep(&mut state, Instant::now());
        state.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn set(&self, key: K, value: V) {
        let now = Instant::now();
        let mut state = self.state.lock();
        Self::sweep(&mut state, now);

        let generation = state.next_generation;
        state.next_generation += 1;

        let expires_at = now
            .checked_add(self.ttl)
            .unwrap_or_else(|| now + MAX_TIMER_HORIZON);
        state
            .expirations
            .push(Reverse((expires_at, generation, key.clone())));
        state.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at,
                generation,
            },
        );
    }

    pub fn remove(&self, key: &K) -> bool {
        // The heap element is left behind; its generation no longer matches.
        self.state.lock().entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.expirations.clear();
    }

    /// Drop every entry whose TTL has elapsed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut state = self.state.lock();
        Self::sweep(&mut state, Instant::now())
    }

    pub fn len(&self) -> usize {
        let mut state = self.state.lock();
        Self::sweep(&mut state, Instant::now());
        state.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Time left before `key` expires.
    pub fn remaining_ttl(&self, key: &K) -> Option<Duration> {
        let now = Instant::now();
        let mut state = self.state.lock();
        Self::sweep(&mut state, now);
        state
            .entries
            .get(key)
            .map(|entry| entry.expires_at.saturating_duration_since(now))
    }

    fn sweep(state: &mut CacheState<K, V>, now: Instant) -> usize {
        let mut removed = 0;

        loop {
            let due = state
                .expirations
                .peek()
                .is_some_and(|Reverse((expires_at, _, _))| *expires_at <= now);
            if !due {
                break;
            }

            let Some(Reverse((_, generation, key))) = state.expirations.pop() else {
                break;
            };

            let current = state
                .entries
                .get(&key)
                .is_some_and(|entry| entry.generation == generation);
            if current {
                state.entries.remove(&key);
                removed += 1;
            }
        }

        removed
    }
}

/// Flag result cache keyed by lookup fingerprint.
#[derive(Clone)]
pub struct FlagCache {
    inner: Arc<Cache<String, bool>>,
}

impl FlagCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Cache::new(ttl)),
        }
    }

    /// Returns `None` for keys never stored and for expired keys alike.
    pub fn get(&self, fingerprint: &str) -> Option<bool> {
        self.inner.get(&fingerprint.to_string())
    }

    pub fn set(&self, fingerprint: impl Into<String>, value: bool) {
        self.inner.set(fingerprint.into(), value);
    }

    pub fn remove(&self, fingerprint: &str) -> bool {
        self.inner.remove(&fingerprint.to_string())
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
