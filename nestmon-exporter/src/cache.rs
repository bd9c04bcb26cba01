//! Single-slot result cache with a time-to-live.

use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::trace;

/// A cached value and the instant it stops being valid.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_valid(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Thread-safe cache holding one rendered string for one source.
///
/// Each source owns exactly one of these. The slot is replaced whole on
/// [`TtlCache::set`], so a reader sees either the old value or the new one,
/// never a mix. Two tasks missing at the same moment may both refresh
/// upstream; the last write wins.
#[derive(Debug)]
pub struct TtlCache {
    key: String,
    slot: RwLock<Option<CacheEntry>>,
}

impl TtlCache {
    /// Create an empty cache for the source named `key`.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            slot: RwLock::new(None),
        }
    }

    /// The source name this slot belongs to.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the cached value if present and not expired.
    pub fn get(&self) -> Option<String> {
        let now = Instant::now();
        let slot = self.slot.read();
        match slot.as_ref() {
            Some(entry) if entry.is_valid(now) => Some(entry.value.clone()),
            Some(_) => {
                trace!(key = %self.key, "Cache entry expired");
                None
            }
            None => None,
        }
    }

    /// Store `value`, valid for `ttl` from now.
    pub fn set(&self, value: String, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        *self.slot.write() = Some(CacheEntry { value, expires_at });
        trace!(key = %self.key, ttl_ms = ttl.as_millis() as u64, "Cache entry stored");
    }

    /// Drop the stored entry.
    pub fn clear(&self) {
        *self.slot.write() = None;
    }

    /// Time left before the current entry expires, if it is still valid.
    #[cfg(test)]
    pub(crate) fn remaining(&self) -> Option<Duration> {
        let now = Instant::now();
        self.slot
            .read()
            .as_ref()
            .filter(|entry| entry.is_valid(now))
            .map(|entry| entry.expires_at - now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_empty_cache_misses() {
        let cache = TtlCache::new("nest");
        assert_eq!(cache.key(), "nest");
        assert!(cache.get().is_none());
        assert!(cache.remaining().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_before_expiry_miss_after() {
        let cache = TtlCache::new("nest");
        cache.set("is_online 1".to_string(), Duration::from_secs(59));

        tokio::time::advance(Duration::from_secs(58)).await;
        assert_eq!(cache.get().as_deref(), Some("is_online 1"));
        assert_eq!(cache.remaining(), Some(Duration::from_secs(1)));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get().is_none(), "entry must expire exactly at the TTL");
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_never_hits() {
        let cache = TtlCache::new("openweather");
        cache.set("x 1".to_string(), Duration::ZERO);
        assert!(cache.get().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_overwrites_and_restamps() {
        let cache = TtlCache::new("nest");
        cache.set("old".to_string(), Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(8)).await;
        cache.set("new".to_string(), Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(cache.get().as_deref(), Some("new"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear() {
        let cache = TtlCache::new("nest");
        cache.set("value".to_string(), Duration::from_secs(10));
        cache.clear();
        assert!(cache.get().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_readers_never_see_torn_values() {
        let cache = Arc::new(TtlCache::new("nest"));
        let a = "a".repeat(4096);
        let b = "b".repeat(4096);
        cache.set(a.clone(), Duration::from_secs(60));

        let writer = {
            let cache = cache.clone();
            let (a, b) = (a.clone(), b.clone());
            tokio::spawn(async move {
                for i in 0..500 {
                    let value = if i % 2 == 0 { b.clone() } else { a.clone() };
                    cache.set(value, Duration::from_secs(60));
                    tokio::task::yield_now().await;
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                let (a, b) = (a.clone(), b.clone());
                tokio::spawn(async move {
                    for _ in 0..500 {
                        let value = cache.get().expect("entry should be present");
                        assert!(value == a || value == b);
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
    }
}
