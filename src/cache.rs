use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::storage::{Storage, namespaced};
use crate::types::AnimeRecord;

pub const SEASONAL_CACHE_KEY: &str = "seasonal-anime";
/// Entries are served while `now - timestamp` is below this many milliseconds.
/// A timestamp ahead of the clock is treated as corrupt.
pub const CACHE_TTL_MS: i64 = 30 * 60 * 1000;

pub fn search_cache_key(query: &str) -> String {
    format!("search-{}", query.trim())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: Vec<AnimeRecord>,
    pub timestamp: i64,
}

/// Time-bounded response cache over a [`Storage`]. No size bound and no
/// eviction beyond expiry; unreadable entries count as misses.
#[derive(Debug, Clone)]
pub struct ResponseCache<S> {
    storage: S,
    ttl_ms: i64,
}

impl<S: Storage> ResponseCache<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            ttl_ms: CACHE_TTL_MS,
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<AnimeRecord>> {
        self.get_at(key, Utc::now().timestamp_millis())
    }

    pub fn get_at(&self, key: &str, now_ms: i64) -> Option<Vec<AnimeRecord>> {
        let storage_key = storage_key(key);
        let raw = match self.storage.get_item(&storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(key, error = %err, "cache read failed");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(key, error = %err, "discarding malformed cache entry");
                self.evict(&storage_key);
                return None;
            }
        };

        match now_ms.checked_sub(entry.timestamp) {
            Some(age_ms) if (0..self.ttl_ms).contains(&age_ms) => Some(entry.data),
            Some(age_ms) if age_ms >= self.ttl_ms => {
                tracing::debug!(key, age_ms, "cache entry expired");
                self.evict(&storage_key);
                None
            }
            _ => {
                tracing::warn!(
                    key,
                    timestamp = entry.timestamp,
                    "discarding cache entry with unusable timestamp"
                );
                self.evict(&storage_key);
                None
            }
        }
    }

    pub fn put(&self, key: &str, data: &[AnimeRecord]) {
        self.put_at(key, data, Utc::now().timestamp_millis());
    }

    pub fn put_at(&self, key: &str, data: &[AnimeRecord], now_ms: i64) {
        let entry = CacheEntry {
            data: data.to_vec(),
            timestamp: now_ms,
        };
        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(key, error = %err, "failed to encode cache entry");
                return;
            }
        };
        if let Err(err) = self.storage.set_item(&storage_key(key), &raw) {
            tracing::warn!(key, error = %err, "cache write failed");
        }
    }

    pub fn invalidate(&self, key: &str) {
        self.evict(&storage_key(key));
    }

    fn evict(&self, storage_key: &str) {
        if let Err(err) = self.storage.remove_item(storage_key) {
            tracing::warn!(key = storage_key, error = %err, "cache eviction failed");
        }
    }
}

fn storage_key(key: &str) -> String {
    namespaced(&format!("cache:{key}"))
}
