//! Keyed store with per-entry expiry.
//!
//! The shared primitive under both the rate limiter and the response cache.
//! Reads never delete: an expired entry stays in the map, invisible to
//! [`KeyedExpiringStore::get`], until something removes it explicitly.
//!
//! Every read-modify-write of a single key goes through [`KeyedExpiringStore::update`],
//! which runs its closure while holding the key's shard. The closure is
//! synchronous, so no other request can interleave between the read and
//! the write.

use crate::clock::Clock;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::Duration;

/// A stored value together with the instant it stops being live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expiring<V> {
    pub value: V,
    /// Epoch milliseconds; the entry is dead once `now >= expires_at`
    pub expires_at: u64,
}

impl<V> Expiring<V> {
    pub fn new(value: V, expires_at: u64) -> Self {
        Self { value, expires_at }
    }

    pub fn is_live(&self, now: u64) -> bool {
        now < self.expires_at
    }
}

/// Mapping from string key to a value with an expiry instant
pub struct KeyedExpiringStore<V> {
    entries: DashMap<String, Expiring<V>>,
    clock: Arc<dyn Clock>,
}

impl<V> KeyedExpiringStore<V> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    pub fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    /// Insert or overwrite `key`, expiring `ttl` from now
    pub fn put(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let expires_at = self.now().saturating_add(ttl_ms);
        self.put_until(key, value, expires_at);
    }

    /// Insert or overwrite `key` with an absolute expiry
    pub fn put_until(&self, key: impl Into<String>, value: V, expires_at: u64) {
        self.entries.insert(key.into(), Expiring::new(value, expires_at));
    }

    /// Live value for `key`, if any
    pub fn get(&self, key: &str) -> Option<V>
    where
        V: Clone,
    {
        let now = self.now();
        self.entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
    }

    /// Live entry (value and expiry) for `key`, if any
    pub fn get_entry(&self, key: &str) -> Option<Expiring<V>>
    where
        V: Clone,
    {
        let now = self.now();
        self.entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| (*entry).clone())
    }

    /// Atomically read, modify and optionally replace the entry for `key`.
    ///
    /// `f` receives the live entry (`None` when absent or expired) and the
    /// current time. It may mutate the entry in place; returning
    /// `Some(replacement)` stores a new entry under `key`.
    pub fn update<R, F>(&self, key: &str, f: F) -> R
    where
        F: FnOnce(Option<&mut Expiring<V>>, u64) -> (Option<Expiring<V>>, R),
    {
        let now = self.now();
        match self.entries.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get_mut();
                let live = current.is_live(now);
                let (replacement, output) = f(live.then_some(current), now);
                if let Some(replacement) = replacement {
                    occupied.insert(replacement);
                }
                output
            }
            Entry::Vacant(vacant) => {
                let (replacement, output) = f(None, now);
                if let Some(replacement) = replacement {
                    vacant.insert(replacement);
                }
                output
            }
        }
    }

    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove `key` only if its entry has expired
    pub fn remove_if_expired(&self, key: &str) -> bool {
        let now = self.now();
        self.entries
            .remove_if(key, |_, entry| !entry.is_live(now))
            .is_some()
    }

    /// Remove every expired entry, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = self.now();
        self.retain(|_, entry| entry.is_live(now))
    }

    /// Keep only keys for which `keep` returns true, returning how many were dropped
    pub fn retain_keys(&self, mut keep: impl FnMut(&str) -> bool) -> usize {
        self.retain(|key, _| keep(key))
    }

    fn retain(&self, mut keep: impl FnMut(&str, &Expiring<V>) -> bool) -> usize {
        let mut removed = 0;
        self.entries.retain(|key, entry| {
            let kept = keep(key, entry);
            if !kept {
                removed += 1;
            }
            kept
        });
        removed
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Snapshot of the keys currently in the map, live or not
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of entries physically present, including expired ones
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> std::fmt::Debug for KeyedExpiringStore<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedExpiringStore")
            .field("len", &self.entries.len())
            .finish()
    }
}
