// In-process response cache.
// Bounded LRU of upstream responses keyed by resource path, with a per-entry TTL.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

use lru::LruCache;
use serde_json::Value;
use tokio::time::Instant;
use tracing::trace;

use crate::error::Result;

/// Default TTL for upstream responses: 5 minutes.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Default maximum number of cached responses.
pub const DEFAULT_CAPACITY: usize = 500;

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    inserted_at: Instant,
}

impl Entry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() >= ttl
    }
}

/// Capacity- and age-bounded cache of upstream JSON responses.
///
/// Inserting past capacity evicts the least recently used entry. Entries
/// older than the TTL read as absent and are dropped on the read that finds
/// them. A zero TTL disables caching.
pub struct ResponseCache {
    entries: Mutex<LruCache<String, Entry>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Look up a fresh entry, marking it most recently used.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock().ok()?;
        let expired = match entries.get(key) {
            Some(entry) if !entry.is_expired(self.ttl) => {
                trace!(key, "response cache hit");
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            trace!(key, "response cache entry expired");
            entries.pop(key);
        }
        None
    }

    /// Insert or overwrite an entry, restarting its TTL.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(
                key.into(),
                Entry {
                    value,
                    inserted_at: Instant::now(),
                },
            );
        }
    }

    /// Return the cached value for `key`, or run `fetch` and cache its result.
    ///
    /// Failed fetches are not cached.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        trace!(key, "response cache miss");
        let value = fetch().await?;
        self.set(key, value.clone());
        Ok(value)
    }

    /// Number of entries currently held, including ones that have expired but
    /// not yet been read.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        let capacity = NonZeroUsize::new(DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self::new(capacity, DEFAULT_TTL)
    }
}
