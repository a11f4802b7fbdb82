use tokio_util::sync::CancellationToken;

use crate::cache::{ResponseCache, SEASONAL_CACHE_KEY, search_cache_key};
use crate::providers::{AnimeSource, ClientError};
use crate::storage::Storage;
use crate::types::AnimeRecord;

/// Cache-through access to an [`AnimeSource`]. Concurrent misses for the same
/// key each fetch on their own; the last write wins.
pub struct AnimeService<P, S> {
    source: P,
    cache: ResponseCache<S>,
}

impl<P: AnimeSource, S: Storage> AnimeService<P, S> {
    pub fn new(source: P, cache: ResponseCache<S>) -> Self {
        Self { source, cache }
    }

    pub async fn seasonal(
        &self,
        cancel: &CancellationToken,
        refresh: bool,
    ) -> Result<Vec<AnimeRecord>, ClientError> {
        if refresh {
            self.cache.invalidate(SEASONAL_CACHE_KEY);
        } else if let Some(hit) = self.cache.get(SEASONAL_CACHE_KEY) {
            tracing::debug!(key = SEASONAL_CACHE_KEY, count = hit.len(), "cache hit");
            return Ok(hit);
        }

        let records = self.source.seasonal(cancel).await?;
        self.cache.put(SEASONAL_CACHE_KEY, &records);
        Ok(records)
    }

    pub async fn search(
        &self,
        query: &str,
        cancel: &CancellationToken,
        refresh: bool,
    ) -> Result<Vec<AnimeRecord>, ClientError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let key = search_cache_key(query);
        if refresh {
            self.cache.invalidate(&key);
        } else if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(key = %key, count = hit.len(), "cache hit");
            return Ok(hit);
        }

        let records = self.source.search(query, cancel).await?;
        self.cache.put(&key, &records);
        Ok(records)
    }

    pub async fn details(
        &self,
        id: u64,
        cancel: &CancellationToken,
    ) -> Result<AnimeRecord, ClientError> {
        self.source.details(id, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSource {
        seasonal_calls: AtomicUsize,
        search_calls: AtomicUsize,
    }

    fn record(id: u64) -> AnimeRecord {
        serde_json::from_value(serde_json::json!({"id": id, "title": format!("#{id}")})).unwrap()
    }

    impl AnimeSource for CountingSource {
        async fn seasonal(
            &self,
            cancel: &CancellationToken,
        ) -> Result<Vec<AnimeRecord>, ClientError> {
            if cancel.is_cancelled() {
                return Err(ClientError::Cancelled);
            }
            let n = self.seasonal_calls.fetch_add(1, Ordering::SeqCst) as u64;
            Ok(vec![record(n + 1)])
        }

        async fn search(
            &self,
            query: &str,
            _cancel: &CancellationToken,
        ) -> Result<Vec<AnimeRecord>, ClientError> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![AnimeRecord {
                title: query.to_string(),
                ..record(99)
            }])
        }

        async fn details(
            &self,
            id: u64,
            _cancel: &CancellationToken,
        ) -> Result<AnimeRecord, ClientError> {
            Ok(record(id))
        }
    }

    fn service(storage: MemoryStorage) -> AnimeService<CountingSource, MemoryStorage> {
        AnimeService::new(CountingSource::default(), ResponseCache::new(storage))
    }

    #[tokio::test]
    async fn second_seasonal_call_is_served_from_cache() {
        let service = service(MemoryStorage::new());
        let cancel = CancellationToken::new();

        let first = service.seasonal(&cancel, false).await.unwrap();
        let second = service.seasonal(&cancel, false).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(service.source.seasonal_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_bypasses_cache() {
        let service = service(MemoryStorage::new());
        let cancel = CancellationToken::new();

        service.seasonal(&cancel, false).await.unwrap();
        let refreshed = service.seasonal(&cancel, true).await.unwrap();
        assert_eq!(refreshed[0].id, 2);
        assert_eq!(service.source.seasonal_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancelled_fetch_leaves_cache_untouched() {
        let storage = MemoryStorage::new();
        let service = service(storage.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = service.seasonal(&cancel, false).await.unwrap_err();
        assert!(matches!(err, ClientError::Cancelled));
        assert_eq!(
            ResponseCache::new(storage).get(SEASONAL_CACHE_KEY),
            None
        );
    }

    #[tokio::test]
    async fn searches_are_cached_per_term() {
        let service = service(MemoryStorage::new());
        let cancel = CancellationToken::new();

        service.search("bocchi", &cancel, false).await.unwrap();
        service.search(" bocchi ", &cancel, false).await.unwrap();
        let other = service.search("frieren", &cancel, false).await.unwrap();
        assert_eq!(other[0].title, "frieren");
        assert_eq!(service.source.search_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn blank_search_never_fetches() {
        let service = service(MemoryStorage::new());
        let results = service
            .search("   ", &CancellationToken::new(), false)
            .await
            .unwrap();
        assert!(results.is_empty());
        assert_eq!(service.source.search_calls.load(Ordering::SeqCst), 0);
    }
}
