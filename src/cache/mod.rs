//! Response cache subsystem.
//!
//! # Data Flow
//! ```text
//! Gateway request
//!     → fingerprint.rs (SHA-256 of provider, format, normalized payload)
//!     → ResponseCache::get
//!         → hit:  CachedResponse returned, no provider call
//!         → miss: provider call, then ResponseCache::put on success only
//! ```
//!
//! # Design Decisions
//! - The cache never fails a request: store errors and undecodable entries count as misses
//! - Values are stored as serialized JSON strings so any `CacheStore` can hold them
//! - Concurrent identical requests are not coalesced; the last writer wins

pub mod fingerprint;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::observability::metrics;

pub use fingerprint::Fingerprint;
pub use store::{CacheError, CacheStore, MemoryCacheStore, NoopCacheStore};

/// What a successful request leaves behind in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedResponse {
    /// Recovered value for json/yaml, a string for text.
    pub content: serde_json::Value,
    pub raw_content: String,
}

/// Fingerprint-keyed cache in front of a [`CacheStore`].
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopCacheStore))
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub async fn get(&self, key: &Fingerprint) -> Option<CachedResponse> {
        let raw = match self.store.get(key.as_str()).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                metrics::record_cache_lookup("miss");
                return None;
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache lookup failed, treating as miss");
                metrics::record_cache_lookup("error");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(response) => {
                tracing::debug!(key = %key, "Cache hit");
                metrics::record_cache_lookup("hit");
                Some(response)
            }
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    error = %e,
                    "Cached entry undecodable, treating as miss"
                );
                metrics::record_cache_lookup("error");
                None
            }
        }
    }

    /// Best effort; a failing store is logged and ignored.
    pub async fn put(&self, key: &Fingerprint, response: &CachedResponse, ttl: Duration) {
        let value = match serde_json::to_string(response) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Could not serialize response for cache");
                return;
            }
        };
        if let Err(e) = self.store.set(key.as_str(), value, ttl).await {
            tracing::warn!(key = %key, error = %e, "Cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ExpectedFormat;
    use crate::providers::{GenerationPayload, ProviderKind};
    use async_trait::async_trait;

    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }

        async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }

        fn len(&self) -> usize {
            0
        }
    }

    fn key() -> Fingerprint {
        let payload = GenerationPayload {
            prompt: "Write a haiku".to_string(),
            ..GenerationPayload::default()
        };
        Fingerprint::compute(ProviderKind::Anthropic, ExpectedFormat::Text, &payload)
    }

    fn response() -> CachedResponse {
        CachedResponse {
            content: serde_json::json!("old pond"),
            raw_content: "old pond".to_string(),
        }
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let cache = ResponseCache::new(Arc::new(MemoryCacheStore::new(8)));
        cache.put(&key(), &response(), Duration::from_secs(60)).await;
        assert_eq!(cache.get(&key()).await, Some(response()));
    }

    #[tokio::test]
    async fn test_unreachable_store_is_a_miss() {
        let cache = ResponseCache::new(Arc::new(BrokenStore));
        cache.put(&key(), &response(), Duration::from_secs(60)).await;
        assert_eq!(cache.get(&key()).await, None);
    }

    #[tokio::test]
    async fn test_garbage_entry_is_a_miss() {
        let store = Arc::new(MemoryCacheStore::new(8));
        store
            .set(key().as_str(), "not json".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        let cache = ResponseCache::new(store);
        assert_eq!(cache.get(&key()).await, None);
    }

    #[tokio::test]
    async fn test_disabled_cache() {
        let cache = ResponseCache::disabled();
        cache.put(&key(), &response(), Duration::from_secs(60)).await;
        assert_eq!(cache.get(&key()).await, None);
    }
}
