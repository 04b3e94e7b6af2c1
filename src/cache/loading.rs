//! Single-flight loading cache.
//!
//! A `LoadingCache` answers `get(key)` from memory when it can and otherwise
//! runs its `CacheLoader` exactly once per missing key, however many callers
//! are waiting on that key. Successful loads are stored with a write
//! timestamp; failed loads are handed to every waiter and then forgotten.

use std::fmt;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use lru::LruCache;
use metrics::counter;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use super::config::CacheConfig;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::loading";

const METRIC_CACHE_HIT: &str = "plaza_cache_hit_total";
const METRIC_CACHE_MISS: &str = "plaza_cache_miss_total";
const METRIC_CACHE_EVICT: &str = "plaza_cache_evict_total";
const METRIC_CACHE_EXPIRED: &str = "plaza_cache_expired_total";
const METRIC_CACHE_LOAD_ERROR: &str = "plaza_cache_load_error_total";

/// Computes the value for a missing key.
#[async_trait]
pub trait CacheLoader<K, V>: Send + Sync {
    type Error;

    async fn load(&self, key: &K) -> Result<V, Self::Error>;
}

type Flight<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

struct CacheEntry<V> {
    value: V,
    created_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() >= ttl
    }
}

/// Size- and TTL-bounded cache with single-flight loading.
///
/// Cloning is cheap and clones share the same entries.
pub struct LoadingCache<K, V, E> {
    inner: Arc<Inner<K, V, E>>,
}

struct Inner<K, V, E> {
    name: &'static str,
    ttl: Duration,
    entries: RwLock<LruCache<K, CacheEntry<V>>>,
    in_flight: DashMap<K, Flight<V, E>>,
    loader: Arc<dyn CacheLoader<K, V, Error = E>>,
}

impl<K, V, E> Clone for LoadingCache<K, V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V, E> LoadingCache<K, V, E>
where
    K: Hash + Eq + Clone + fmt::Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + fmt::Display + Send + Sync + 'static,
{
    /// Build a cache named `name` (used as the metrics label) around `loader`.
    pub fn new<L>(name: &'static str, config: &CacheConfig, loader: L) -> Self
    where
        L: CacheLoader<K, V, Error = E> + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                name,
                ttl: config.ttl(),
                entries: RwLock::new(LruCache::new(config.max_size_non_zero())),
                in_flight: DashMap::new(),
                loader: Arc::new(loader),
            }),
        }
    }

    /// Return the cached value for `key`, loading it on a miss.
    ///
    /// Concurrent callers for the same missing key await one shared load and
    /// all observe its outcome. Errors are never cached.
    pub async fn get(&self, key: K) -> Result<V, E> {
        if let Some(value) = self.inner.lookup(&key) {
            counter!(METRIC_CACHE_HIT, "cache" => self.inner.name).increment(1);
            return Ok(value);
        }

        let flight = match self.inner.in_flight.entry(key.clone()) {
            Entry::Occupied(entry) => {
                debug!(cache = self.inner.name, key = %key, "Joining in-flight cache load");
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                // A load may have finished between the first lookup and taking the slot.
                if let Some(value) = self.inner.lookup(&key) {
                    counter!(METRIC_CACHE_HIT, "cache" => self.inner.name).increment(1);
                    return Ok(value);
                }

                counter!(METRIC_CACHE_MISS, "cache" => self.inner.name).increment(1);
                let flight = Arc::clone(&self.inner).load(key.clone()).boxed().shared();
                entry.insert(flight.clone());
                flight
            }
        };

        flight.await
    }

    /// Number of stored entries, including expired ones not yet reclaimed.
    pub fn len(&self) -> usize {
        rw_read(&self.inner.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V, E> Inner<K, V, E>
where
    K: Hash + Eq + Clone + fmt::Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + fmt::Display + Send + Sync + 'static,
{
    fn lookup(&self, key: &K) -> Option<V> {
        let mut entries = rw_write(&self.entries, SOURCE, "lookup");
        match entries.get(key) {
            Some(entry) if !entry.is_expired(self.ttl) => return Some(entry.value.clone()),
            Some(_) => {}
            None => return None,
        }

        entries.pop(key);
        counter!(METRIC_CACHE_EXPIRED, "cache" => self.name).increment(1);
        None
    }

    async fn load(self: Arc<Self>, key: K) -> Result<V, E> {
        debug!(cache = self.name, key = %key, "Loading cache entry from source");

        let outcome = AssertUnwindSafe(self.loader.load(&key))
            .catch_unwind()
            .await;
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => {
                // A poisoned flight left in the map would re-panic every later caller.
                self.in_flight.remove(&key);
                counter!(METRIC_CACHE_LOAD_ERROR, "cache" => self.name).increment(1);
                error!(cache = self.name, key = %key, "Cache loader panicked; slot released");
                panic::resume_unwind(payload);
            }
        };

        match &result {
            Ok(value) => self.store(key.clone(), value.clone()),
            Err(error) => {
                counter!(METRIC_CACHE_LOAD_ERROR, "cache" => self.name).increment(1);
                warn!(
                    cache = self.name,
                    key = %key,
                    error = %error,
                    "Cache load failed; result not cached"
                );
            }
        }

        // Stored before release so late callers hit instead of starting a new load.
        self.in_flight.remove(&key);
        result
    }

    fn store(&self, key: K, value: V) {
        let mut entries = rw_write(&self.entries, SOURCE, "store");

        // At capacity, reclaim expired entries before evicting a live one.
        if !entries.contains(&key) && entries.len() == entries.cap().get() {
            let expired: Vec<K> = entries
                .iter()
                .filter(|(_, entry)| entry.is_expired(self.ttl))
                .map(|(stale, _)| stale.clone())
                .collect();
            for stale in expired {
                entries.pop(&stale);
                counter!(METRIC_CACHE_EXPIRED, "cache" => self.name).increment(1);
            }
        }

        let entry = CacheEntry {
            value,
            created_at: Instant::now(),
        };
        if let Some((evicted, _)) = entries.push(key.clone(), entry) {
            if evicted != key {
                counter!(METRIC_CACHE_EVICT, "cache" => self.name).increment(1);
                debug!(cache = self.name, evicted = %evicted, "Evicted cache entry at capacity");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;

    #[derive(Clone, Default)]
    struct EchoLoader {
        calls: Arc<AtomicUsize>,
        fail: Arc<AtomicBool>,
    }

    #[async_trait]
    impl CacheLoader<u32, String> for EchoLoader {
        type Error = String;

        async fn load(&self, key: &u32) -> Result<String, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(format!("source unavailable for {key}"));
            }
            Ok(format!("value-{key}"))
        }
    }

    fn build_cache(
        max_size: usize,
        expire_seconds: u64,
    ) -> (LoadingCache<u32, String, String>, EchoLoader) {
        let loader = EchoLoader::default();
        let config = CacheConfig {
            max_size,
            expire_seconds,
        };
        (LoadingCache::new("test", &config, loader.clone()), loader)
    }

    #[tokio::test]
    async fn second_get_is_served_from_memory() {
        let (cache, loader) = build_cache(8, 60);

        assert_eq!(cache.get(1).await.as_deref(), Ok("value-1"));
        assert_eq!(cache.get(1).await.as_deref(), Ok("value-1"));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn failed_load_is_not_cached() {
        let (cache, loader) = build_cache(8, 60);
        loader.fail.store(true, Ordering::SeqCst);

        let err = cache.get(7).await.expect_err("load should fail");
        assert_eq!(err, "source unavailable for 7");
        assert!(cache.is_empty());

        loader.fail.store(false, Ordering::SeqCst);
        assert_eq!(cache.get(7).await.as_deref(), Ok("value-7"));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_write_ttl() {
        let (cache, loader) = build_cache(8, 30);

        cache.get(3).await.expect("initial load");
        tokio::time::advance(Duration::from_secs(29)).await;
        cache.get(3).await.expect("still fresh");
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        cache.get(3).await.expect("reload after expiry");
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);

        cache.get(3).await.expect("fresh again");
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn size_bound_evicts_least_recently_used() {
        let (cache, loader) = build_cache(2, 60);

        cache.get(1).await.expect("load 1");
        cache.get(2).await.expect("load 2");
        cache.get(1).await.expect("touch 1");
        cache.get(3).await.expect("load 3 evicts 2");
        assert_eq!(cache.len(), 2);
        assert_eq!(loader.calls.load(Ordering::SeqCst), 3);

        cache.get(1).await.expect("1 survived");
        assert_eq!(loader.calls.load(Ordering::SeqCst), 3);

        cache.get(2).await.expect("2 reloaded");
        assert_eq!(loader.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_reclaimed_before_live_ones() {
        let (cache, loader) = build_cache(2, 10);

        cache.get(1).await.expect("load 1");
        tokio::time::advance(Duration::from_secs(6)).await;
        cache.get(2).await.expect("load 2");
        // Touch 1 so it is most recently used but still the oldest write.
        cache.get(1).await.expect("hit 1");
        tokio::time::advance(Duration::from_secs(5)).await;

        // 1 is expired, 2 is live: inserting 3 must keep 2.
        cache.get(3).await.expect("load 3");
        cache.get(2).await.expect("hit 2");
        assert_eq!(loader.calls.load(Ordering::SeqCst), 3);
        assert!(cache.len() <= 2);
    }

    #[derive(Clone, Default)]
    struct PanicOnceLoader {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CacheLoader<u32, String> for PanicOnceLoader {
        type Error = String;

        async fn load(&self, key: &u32) -> Result<String, String> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("loader blew up for {key}");
            }
            Ok(format!("value-{key}"))
        }
    }

    #[tokio::test]
    async fn panicking_loader_does_not_wedge_the_key() {
        let loader = PanicOnceLoader::default();
        let config = CacheConfig {
            max_size: 4,
            expire_seconds: 60,
        };
        let cache = LoadingCache::new("panic", &config, loader.clone());

        let first = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get(1).await })
        };
        let err = first.await.expect_err("first load panics");
        assert!(err.is_panic());
        assert!(!cache.inner.in_flight.contains_key(&1));

        assert_eq!(cache.get(1).await.as_deref(), Ok("value-1"));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cache_recovers_from_poisoned_lock() {
        let (cache, _) = build_cache(4, 60);

        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = cache
                .inner
                .entries
                .write()
                .expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        assert_eq!(cache.len(), 0);
    }
}
