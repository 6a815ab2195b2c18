//! Time-bounded reference model cache.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use lru::LruCache;
use tracing::debug;

use crate::error::Result;
use crate::node::ModelNode;
use crate::provider::ModelProvider;

/// One cached lookup. `model` is `None` when the provider had no such model;
/// that negative result is cached like any other.
#[derive(Debug, Clone)]
struct ModelCacheEntry {
    model: Option<ModelNode>,
    inserted_at: Instant,
}

/// Caches provider lookups for `ttl`, keeping at most `capacity` entries.
///
/// The least recently used entry is evicted when full, and expired entries
/// are dropped when looked up. The lock is only held for cache reads and
/// writes, never across a provider call. Two threads missing on the same id
/// at once may both fetch; the later write wins.
pub struct ModelCache {
    provider: Box<dyn ModelProvider>,
    ttl: Duration,
    entries: Mutex<LruCache<String, ModelCacheEntry>>,
}

impl ModelCache {
    pub fn new(provider: Box<dyn ModelProvider>, ttl: Duration, capacity: NonZeroUsize) -> Self {
        Self {
            provider,
            ttl,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Cached model for `model_id`, fetching it when absent or expired.
    ///
    /// Provider errors are returned and leave the cache untouched.
    pub fn get(&self, model_id: &str) -> Result<Option<ModelNode>> {
        {
            let mut entries = self.lock();
            match entries.get(model_id) {
                Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                    return Ok(entry.model.clone());
                }
                Some(_) => {
                    entries.pop(model_id);
                }
                None => {}
            }
        }

        debug!(model_id, "model cache miss");
        let model = self.provider.fetch(model_id)?;
        self.put(model_id, model.clone());
        Ok(model)
    }

    /// Install an entry stamped with the current time.
    pub fn put(&self, model_id: &str, model: Option<ModelNode>) {
        self.lock().put(
            model_id.to_string(),
            ModelCacheEntry {
                model,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, ModelCacheEntry>> {
        // Entries are plain values, a panic elsewhere cannot leave one half-written.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
