//! Search result cache
//!
//! Bounded LRU map from normalized query key to the last final result for that
//! query. Entries never expire on their own; a repeated query is served from
//! the cache first and revalidated by a fresh request.

use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use super::entity::AggregatedResult;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct CacheEntry {
    result: AggregatedResult,
    stored_at: DateTime<Utc>,
}

#[derive(Debug)]
struct CacheState {
    entries: LruCache<String, CacheEntry>,
    hits: u64,
    misses: u64,
}

/// Thread-safe LRU cache of finished searches
#[derive(Debug)]
pub struct SearchCache {
    state: Mutex<CacheState>,
    capacity: NonZeroUsize,
}

impl SearchCache {
    /// Create a cache holding at most `capacity` results
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or(Error::InvalidCacheCapacity)?;
        Ok(Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
            }),
            capacity,
        })
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a result, refreshing its recency
    pub fn get(&self, key: &str) -> Option<AggregatedResult> {
        let mut state = self.lock();
        let found = state.entries.get(key).map(|e| e.result.clone());
        match found {
            Some(result) => {
                state.hits += 1;
                debug!(query = %key, "Search cache hit");
                Some(result)
            }
            None => {
                state.misses += 1;
                debug!(query = %key, "Search cache miss");
                None
            }
        }
    }

    /// Look up a result without touching recency or statistics
    pub fn peek(&self, key: &str) -> Option<AggregatedResult> {
        self.lock().entries.peek(key).map(|e| e.result.clone())
    }

    /// When the result for `key` was stored
    pub fn stored_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.lock().entries.peek(key).map(|e| e.stored_at)
    }

    /// Insert or refresh a result, evicting the least recently used entry when full
    pub fn put(&self, key: &str, result: AggregatedResult) {
        let entry = CacheEntry {
            result,
            stored_at: Utc::now(),
        };
        if let Some((evicted, _)) = self.lock().entries.push(key.to_string(), entry)
            && evicted != key
        {
            debug!(query = %key, evicted = %evicted, "Evicted search cache entry");
        }
    }

    pub fn remove(&self, key: &str) -> Option<AggregatedResult> {
        self.lock().entries.pop(key).map(|e| e.result)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Drop every entry; statistics are kept
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            entries: state.entries.len(),
            capacity: self.capacity.get(),
            hits: state.hits,
            misses: state.misses,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}
