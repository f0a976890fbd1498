use geoquery_core::CacheSettings;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Cache entry metadata. Entries are replaced wholesale, never mutated.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub created_at: Instant,
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            created_at: Instant::now(),
            ttl,
        }
    }

    /// Valid iff `now < created_at + ttl`; a zero TTL is never valid.
    pub fn is_valid_at(&self, now: Instant) -> bool {
        match self.created_at.checked_add(self.ttl) {
            Some(expires_at) => now < expires_at,
            None => true,
        }
    }

    pub fn is_expired(&self) -> bool {
        !self.is_valid_at(Instant::now())
    }
}

/// Cache performance statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses
    }
}

/// Cache configuration options
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            default_ttl: Duration::from_secs(300),
        }
    }
}

impl CacheConfig {
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self {
            max_entries: settings.max_entries.max(1),
            default_ttl: Duration::from_secs(settings.ttl_secs),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_ttl_is_never_valid() {
        let entry = CacheEntry::new(1, Duration::ZERO);
        assert!(!entry.is_valid_at(entry.created_at));
        assert!(entry.is_expired());
    }

    #[test]
    fn test_entry_valid_before_expiry() {
        let entry = CacheEntry::new("v", Duration::from_secs(60));
        assert!(entry.is_valid_at(entry.created_at + Duration::from_secs(59)));
        assert!(!entry.is_valid_at(entry.created_at + Duration::from_secs(60)));
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert_eq!(stats.hit_rate(), 0.75);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
