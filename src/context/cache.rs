//! Bounded caches for provider results
//!
//! Embedding vectors and summaries are keyed by content hash and evicted by
//! capacity and time-to-live so long-running processes stay bounded.

use super::text::content_hash;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Capacity- and TTL-bounded cache keyed by a SHA-256 digest of its inputs
#[derive(Clone)]
pub struct ProviderCache<V: Clone + Send + Sync + 'static> {
    entries: Cache<String, V>,
}

impl<V: Clone + Send + Sync + 'static> ProviderCache<V> {
    /// Create a new cache with max entry count and TTL
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Cache key for a list of inputs
    pub fn key(parts: &[&str]) -> String {
        content_hash(parts)
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        self.entries.get(key).await
    }

    pub async fn insert(&self, key: String, value: V) {
        self.entries.insert(key, value).await;
    }

    /// Number of live entries after pending maintenance runs
    pub async fn len(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Embedding vectors keyed by content hash
pub type EmbeddingCache = ProviderCache<Arc<Vec<f32>>>;

/// Summaries keyed by hash of (text, target length)
pub type SummaryCache = ProviderCache<String>;
