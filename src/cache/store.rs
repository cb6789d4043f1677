//! Cache storage backends.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),

    #[error("cached value could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Key/value store with per-entry TTL.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// `Ok(None)` on a miss or an expired entry.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process store bounded by `max_entries`.
#[derive(Clone)]
pub struct MemoryCacheStore {
    inner: Arc<DashMap<String, Entry>>,
    max_entries: usize,
}

impl MemoryCacheStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.inner.len();
        self.inner.retain(|_, entry| entry.expires_at > now);
        let removed = before.saturating_sub(self.inner.len());
        metrics::record_cache_size(self.inner.len());
        removed
    }

    /// Make room for one insert: expired entries first, then the soonest to expire.
    fn make_room(&self) {
        if self.inner.len() < self.max_entries {
            return;
        }
        self.purge_expired();
        while self.inner.len() >= self.max_entries {
            let victim = self
                .inner
                .iter()
                .min_by_key(|r| r.value().expires_at)
                .map(|r| r.key().clone());
            match victim {
                Some(key) => {
                    self.inner.remove(&key);
                    tracing::debug!(key = %key, "Evicted cache entry");
                }
                None => break,
            }
        }
    }

    /// Periodically purge until shutdown is signalled.
    pub async fn run_sweeper(self, interval: Duration, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.purge_expired();
                    if removed > 0 {
                        tracing::debug!(removed, remaining = self.inner.len(), "Cache sweep");
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Cache sweeper stopping");
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let expired = match self.inner.get(key) {
            None => return Ok(None),
            Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
            Some(_) => true,
        };
        if expired {
            self.inner.remove_if(key, |_, entry| entry.expires_at <= now);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        if !self.inner.contains_key(key) {
            self.make_room();
        }
        self.inner.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        metrics::record_cache_size(self.inner.len());
        Ok(())
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

/// Store used when caching is disabled: every lookup misses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCacheStore;

#[async_trait]
impl CacheStore for NoopCacheStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    fn len(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let store = MemoryCacheStore::new(16);
        store.set("k", "v".to_string(), Duration::from_secs(1)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_entry_expires_in_real_time() {
        let store = MemoryCacheStore::new(16);
        store.set("k", "v".to_string(), Duration::from_secs(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_writer_wins() {
        let store = MemoryCacheStore::new(16);
        store.set("k", "first".to_string(), Duration::from_secs(60)).await.unwrap();
        store.set("k", "second".to_string(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("second"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_prefers_expired_then_soonest() {
        let store = MemoryCacheStore::new(2);
        store.set("short", "1".to_string(), Duration::from_secs(1)).await.unwrap();
        store.set("long", "2".to_string(), Duration::from_secs(100)).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        store.set("new", "3".to_string(), Duration::from_secs(50)).await.unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("long").await.unwrap().as_deref(), Some("2"));

        // Nothing expired now, so the soonest-expiring entry ("new") goes.
        store.set("newest", "4".to_string(), Duration::from_secs(200)).await.unwrap();
        assert_eq!(store.get("new").await.unwrap(), None);
        assert_eq!(store.get("long").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.get("newest").await.unwrap().as_deref(), Some("4"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_purges_and_stops_on_shutdown() {
        let store = MemoryCacheStore::new(16);
        store.set("a", "1".to_string(), Duration::from_secs(1)).await.unwrap();

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(store.clone().run_sweeper(Duration::from_secs(5), rx));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(store.is_empty());

        tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_noop_always_misses() {
        let store = NoopCacheStore;
        store.set("k", "v".to_string(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
