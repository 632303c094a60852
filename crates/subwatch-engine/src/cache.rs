//! Time-bounded aggregate cache using moka
//!
//! Entries expire purely by TTL. Writes to the event store never invalidate
//! them, so a cached aggregate may lag new events by up to one TTL.

use moka::future::Cache;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

/// Statistics for cache monitoring
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of entries in cache
    pub entry_count: u64,
}

/// TTL cache keyed by filter parameters
///
/// Values are stored behind `Arc` so every reader inside one TTL window sees
/// the identical computed value.
#[derive(Debug, Clone)]
pub struct TtlCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    inner: Cache<K, Arc<V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Create cache with capacity and time-to-live
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Get cached value
    #[inline]
    pub async fn get(&self, key: &K) -> Option<Arc<V>> {
        self.inner.get(key).await
    }

    /// Insert value
    #[inline]
    pub async fn insert(&self, key: K, value: V) -> Arc<V> {
        let value = Arc::new(value);
        self.inner.insert(key, Arc::clone(&value)).await;
        value
    }

    /// Get or compute value
    ///
    /// Concurrent misses may both compute; the last insert wins.
    pub async fn try_get_or_insert_with<E, F, Fut>(&self, key: K, f: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(cached) = self.get(&key).await {
            return Ok(cached);
        }

        let value = f().await?;
        Ok(self.insert(key, value).await)
    }

    /// Invalidate all entries
    #[inline]
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// Get cache statistics
    #[inline]
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.inner.entry_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn computes_once_within_ttl() {
        let cache: TtlCache<u8, String> = TtlCache::new(16, Duration::from_secs(60));
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            let value = cache
                .try_get_or_insert_with(1, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>("computed".to_string())
                })
                .await
                .unwrap();
            assert_eq!(value.as_str(), "computed");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cache: TtlCache<u8, u32> = TtlCache::new(16, Duration::from_secs(60));
        let failed = cache
            .try_get_or_insert_with(1, || async { Err::<u32, _>("store down") })
            .await;
        assert!(failed.is_err());
        assert!(cache.get(&1).await.is_none());
    }

    #[tokio::test]
    async fn expires_after_ttl() {
        let cache: TtlCache<u8, u32> = TtlCache::new(16, Duration::from_millis(50));
        cache.insert(1, 7).await;
        assert_eq!(cache.get(&1).await.as_deref(), Some(&7));
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.get(&1).await.is_none());
    }
}
