// ABOUTME: Memoising search cache keyed by the exact query string
// ABOUTME: Concurrent identical lookups share one backend call; entries expire by TTL and the oldest is evicted when full

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::debug;

use crate::client::{Result, SearchBackend, SearchError};

pub const DEFAULT_MAX_ENTRIES: usize = 1024;

#[derive(Debug)]
struct CachedResult {
    text: String,
    fetched_at: Instant,
}

#[derive(Debug)]
struct CacheSlot {
    created_at: Instant,
    cell: OnceCell<CachedResult>,
}

impl CacheSlot {
    fn new(now: Instant) -> Self {
        Self {
            created_at: now,
            cell: OnceCell::new(),
        }
    }

    /// A slot still being filled never counts as expired
    fn is_expired(&self, ttl: Option<Duration>, now: Instant) -> bool {
        match (ttl, self.cell.get()) {
            (Some(ttl), Some(result)) => now.duration_since(result.fetched_at) >= ttl,
            _ => false,
        }
    }
}

pub struct SearchCache {
    backend: Arc<dyn SearchBackend>,
    slots: DashMap<String, Arc<CacheSlot>>,
    ttl: Option<Duration>,
    max_entries: usize,
}

impl SearchCache {
    /// Cache with no expiry and the default size bound
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self::with_limits(backend, DEFAULT_MAX_ENTRIES, None)
    }

    pub fn with_limits(
        backend: Arc<dyn SearchBackend>,
        max_entries: usize,
        ttl: Option<Duration>,
    ) -> Self {
        Self {
            backend,
            slots: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&self) {
        self.slots.clear();
    }

    /// Return the stored result for `query`, calling the backend only on a miss.
    /// Failures are returned to every waiter and are not stored.
    pub async fn search(&self, query: &str) -> Result<String> {
        let slot = self.slot_for(query);

        let result = slot
            .cell
            .get_or_try_init(|| async {
                debug!("Search cache miss: {:?}", query);
                let text = self.backend.search(query).await?;
                Ok::<_, SearchError>(CachedResult {
                    text,
                    fetched_at: Instant::now(),
                })
            })
            .await;

        match result {
            Ok(cached) => Ok(cached.text.clone()),
            Err(e) => {
                // Only drop our own slot; a newer one may already have replaced it
                self.slots
                    .remove_if(query, |_, current| Arc::ptr_eq(current, &slot));
                Err(e)
            }
        }
    }

    fn slot_for(&self, query: &str) -> Arc<CacheSlot> {
        let now = Instant::now();

        if let Some(slot) = self.slots.get(query) {
            if !slot.is_expired(self.ttl, now) {
                return Arc::clone(slot.value());
            }
        }

        if !self.slots.contains_key(query) && self.slots.len() >= self.max_entries {
            self.evict(now);
        }

        let mut entry = self
            .slots
            .entry(query.to_string())
            .or_insert_with(|| Arc::new(CacheSlot::new(now)));
        if entry.value().is_expired(self.ttl, now) {
            debug!("Search cache entry expired: {:?}", query);
            *entry.value_mut() = Arc::new(CacheSlot::new(now));
        }
        Arc::clone(entry.value())
    }

    /// Drop expired entries, then the oldest one if the table is still full
    fn evict(&self, now: Instant) {
        if self.ttl.is_some() {
            self.slots.retain(|_, slot| !slot.is_expired(self.ttl, now));
        }
        if self.slots.len() < self.max_entries {
            return;
        }

        let oldest = self
            .slots
            .iter()
            .min_by_key(|entry| entry.value().created_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            debug!("Evicting oldest search cache entry: {:?}", key);
            self.slots.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingBackend {
        calls: AtomicUsize,
        fail_first: AtomicUsize,
    }

    impl CountingBackend {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SearchBackend for CountingBackend {
        async fn search(&self, query: &str) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if n < self.fail_first.load(Ordering::SeqCst) {
                return Err(SearchError::ParseError("flaky".to_string()));
            }
            Ok(format!("results for {} #{}", query, n))
        }
    }

    fn cache(backend: &Arc<CountingBackend>, max: usize, ttl: Option<Duration>) -> SearchCache {
        SearchCache::with_limits(backend.clone(), max, ttl)
    }

    #[tokio::test]
    async fn test_repeat_query_served_from_cache() {
        let backend = Arc::new(CountingBackend::default());
        let cache = cache(&backend, 16, None);

        let first = cache.search("rust async").await.unwrap();
        let second = cache.search("rust async").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.calls(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_keys_are_exact_query_strings() {
        let backend = Arc::new(CountingBackend::default());
        let cache = cache(&backend, 16, None);

        cache.search("Rust").await.unwrap();
        cache.search("rust").await.unwrap();
        cache.search("rust ").await.unwrap();
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_identical_queries_coalesce() {
        let backend = Arc::new(CountingBackend::default());
        let cache = Arc::new(cache(&backend, 16, None));

        let lookups = (0..32).map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.search("same").await.unwrap() })
        });
        let results: Vec<String> = futures::future::join_all(lookups)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(backend.calls(), 1);
        assert!(results.iter().all(|r| r == &results[0]));
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let backend = Arc::new(CountingBackend::default());
        backend.fail_first.store(1, Ordering::SeqCst);
        let cache = cache(&backend, 16, None);

        assert!(cache.search("q").await.is_err());
        assert!(cache.is_empty());

        let ok = cache.search("q").await.unwrap();
        assert_eq!(ok, "results for q #1");
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let backend = Arc::new(CountingBackend::default());
        let cache = cache(&backend, 16, Some(Duration::from_secs(60)));

        cache.search("q").await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        cache.search("q").await.unwrap();
        assert_eq!(backend.calls(), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        let refreshed = cache.search("q").await.unwrap();
        assert_eq!(refreshed, "results for q #1");
        assert_eq!(backend.calls(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oldest_entry_evicted_when_full() {
        let backend = Arc::new(CountingBackend::default());
        let cache = cache(&backend, 2, None);

        cache.search("a").await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.search("b").await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.search("c").await.unwrap();

        assert_eq!(cache.len(), 2);
        // "b" and "c" survive; "a" is fetched again
        cache.search("b").await.unwrap();
        cache.search("c").await.unwrap();
        assert_eq!(backend.calls(), 3);
        cache.search("a").await.unwrap();
        assert_eq!(backend.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_evicted_before_live_ones() {
        let backend = Arc::new(CountingBackend::default());
        let cache = cache(&backend, 2, Some(Duration::from_secs(10)));

        cache.search("old").await.unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.search("young").await.unwrap();
        tokio::time::advance(Duration::from_secs(3)).await;

        // "old" has expired, so adding "new" must keep "young"
        cache.search("new").await.unwrap();
        assert_eq!(cache.len(), 2);
        cache.search("young").await.unwrap();
        assert_eq!(backend.calls(), 3);
    }
}
