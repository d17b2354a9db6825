//! TTL cache with request de-duplication and stale fallback.
//!
//! # Design Decisions
//! - At most one outstanding fetch per key: concurrent misses share one
//!   `Shared` future held in the pending map
//! - The shared future itself stores the result and clears the pending slot,
//!   so the store happens exactly once however many callers await it
//! - Failures never create or refresh entries
//! - Hits are not filtered by region; callers put region-sensitive parts
//!   into the key

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;

use crate::error::FetchError;
use crate::observability::metrics;
use crate::region::{Region, RegionRouter};

type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, FetchError>>>;

/// A cached value with its fetch time and the region active when stored.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: Instant,
    pub region: Region,
}

/// Snapshot of cache occupancy. Ages are measured from now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub size: usize,
    pub oldest: Option<Duration>,
    pub newest: Option<Duration>,
}

struct Inner<T> {
    entries: DashMap<String, CacheEntry<T>>,
    pending: DashMap<String, SharedFetch<T>>,
    router: Arc<RegionRouter>,
    default_ttl: Duration,
}

/// Region-tagged TTL cache. Cloning shares the same storage.
pub struct RegionalCache<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for RegionalCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> RegionalCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(router: Arc<RegionRouter>, default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                pending: DashMap::new(),
                router,
                default_ttl,
            }),
        }
    }

    /// Return the cached value for `key`, fetching it when missing or older
    /// than `custom_duration` (or the cache default).
    pub async fn get<F, Fut>(&self, key: &str, fetcher: F, custom_duration: Option<Duration>) -> Result<T, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let ttl = custom_duration.unwrap_or(self.inner.default_ttl);
        if let Some(data) = self.fresh(key, ttl) {
            metrics::record_cache_event("hit");
            tracing::debug!(key = %key, "Cache hit");
            return Ok(data);
        }

        let fetch = match self.inner.pending.entry(key.to_string()) {
            Entry::Occupied(pending) => {
                metrics::record_cache_event("dedup");
                tracing::debug!(key = %key, "Joining in-flight fetch");
                pending.get().clone()
            }
            Entry::Vacant(slot) => {
                metrics::record_cache_event("miss");
                let shared = Self::shared_fetch(Arc::clone(&self.inner), key.to_string(), fetcher());
                slot.insert(shared.clone());
                shared
            }
        };

        match fetch.await {
            Ok(data) => Ok(data),
            Err(e) if e.is_abort() => Err(e),
            Err(e) => {
                let stale = self.inner.entries.get(key).map(|entry| entry.data.clone());
                match stale {
                    Some(data) => {
                        metrics::record_cache_event("stale");
                        tracing::warn!(key = %key, error = %e, "Fetch failed, serving stale fallback");
                        Ok(data)
                    }
                    None => Err(e),
                }
            }
        }
    }

    fn shared_fetch<Fut>(inner: Arc<Inner<T>>, key: String, fetch: Fut) -> SharedFetch<T>
    where
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        async move {
            let result = fetch.await;
            if let Ok(data) = &result {
                let region = inner.router.detect_region();
                inner.entries.insert(
                    key.clone(),
                    CacheEntry {
                        data: data.clone(),
                        timestamp: Instant::now(),
                        region,
                    },
                );
                tracing::debug!(key = %key, region = %region, "Cache stored");
            }
            inner.pending.remove(&key);
            result
        }
        .boxed()
        .shared()
    }

    fn fresh(&self, key: &str, ttl: Duration) -> Option<T> {
        self.inner
            .entries
            .get(key)
            .filter(|entry| entry.timestamp.elapsed() < ttl)
            .map(|entry| entry.data.clone())
    }

    /// Current entry for `key` regardless of age.
    pub fn peek(&self, key: &str) -> Option<CacheEntry<T>> {
        self.inner.entries.get(key).map(|entry| entry.clone())
    }

    pub fn invalidate(&self, key: &str) {
        self.inner.entries.remove(key);
    }

    /// Remove every entry whose key starts with `prefix`. Returns the count.
    pub fn invalidate_by_prefix(&self, prefix: &str) -> usize {
        let before = self.inner.entries.len();
        self.inner.entries.retain(|key, _| !key.starts_with(prefix));
        before.saturating_sub(self.inner.entries.len())
    }

    pub fn invalidate_all(&self) {
        self.inner.entries.clear();
    }

    /// Drop entries older than `max_age`. Returns the count removed.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let before = self.inner.entries.len();
        self.inner
            .entries
            .retain(|_, entry| entry.timestamp.elapsed() <= max_age);
        let removed = before.saturating_sub(self.inner.entries.len());
        if removed > 0 {
            tracing::debug!(removed, "Cache cleanup");
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for entry in self.inner.entries.iter() {
            let age = entry.timestamp.elapsed();
            stats.size += 1;
            stats.oldest = Some(stats.oldest.map_or(age, |o| o.max(age)));
            stats.newest = Some(stats.newest.map_or(age, |n| n.min(age)));
        }
        stats
    }

    /// Number of fetches currently in flight.
    pub fn pending_len(&self) -> usize {
        self.inner.pending.len()
    }
}
