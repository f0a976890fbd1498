use crate::{CacheConfig, CacheEntry, CacheStats};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// TTL key/value cache.
///
/// Expiry is checked lazily on `get`; there is no background sweeper. Safe to
/// share between components through an `Arc`: reads are concurrent and a
/// concurrent `set` on the same key is last-write-wins.
pub struct ResponseCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self::new(CacheConfig::default().with_ttl(ttl))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn default_ttl(&self) -> Duration {
        self.config.default_ttl
    }

    /// Returns the value only if an unexpired entry exists. Expired entries are dropped.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();

        if let Some(entry) = self.entries.get(key) {
            if entry.is_valid_at(now) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
        }

        // Re-check under the write lock so a fresh concurrent `set` survives.
        if self
            .entries
            .remove_if(key, |_, entry| !entry.is_valid_at(now))
            .is_some()
        {
            debug!(cache_key = %short_key(key), "Cache entry expired");
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert or replace; `ttl` falls back to the configured default.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let key = key.into();
        let ttl = ttl.unwrap_or(self.config.default_ttl);

        if !self.entries.contains_key(&key) && self.entries.len() >= self.config.max_entries {
            self.make_room();
        }

        self.entries.insert(key, CacheEntry::new(value, ttl));
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|entry| entry.is_valid_at(Instant::now()))
            .unwrap_or(false)
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|(_, entry)| entry.value)
    }

    /// Remove every entry. Hit/miss counters are kept.
    pub fn clear(&self) -> usize {
        let cleared = self.entries.len();
        self.entries.clear();
        cleared
    }

    /// Drop expired entries, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_valid_at(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let total_entries = self.entries.len();
        let valid_entries = self
            .entries
            .iter()
            .filter(|entry| entry.value().is_valid_at(now))
            .count();

        CacheStats {
            total_entries,
            valid_entries,
            expired_entries: total_entries.saturating_sub(valid_entries),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn make_room(&self) {
        let purged = self.purge_expired();
        if purged > 0 {
            debug!(purged, "Purged expired cache entries to make room");
        }

        while self.entries.len() >= self.config.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().created_at)
                .map(|entry| entry.key().clone());

            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    debug!(cache_key = %short_key(&key), "Evicted oldest cache entry");
                }
                None => break,
            }
        }
    }
}

impl<V: Clone> Default for ResponseCache<V> {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

pub(crate) fn short_key(key: &str) -> &str {
    match key.char_indices().nth(24) {
        Some((idx, _)) => &key[..idx],
        None => key,
    }
}
