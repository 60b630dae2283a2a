use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// A bounded, process-wide cache keyed by a stable string name.
///
/// The evaluator's condition compiler is the intended consumer: compiling a
/// CEL expression is comparatively expensive, and the same named condition
/// is evaluated over and over across unrelated check requests. This cache
/// is read-mostly and safe to share behind an `Arc` across concurrently
/// running checks; concurrent misses on the same key are coalesced by
/// `moka` rather than each paying the compile cost.
#[derive(Clone)]
pub struct ExpressionCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    inner: moka::future::Cache<String, V>,
}

impl<V> ExpressionCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// `max_capacity` bounds the number of distinct condition names held at
    /// once; entries are evicted approximately-LRU once the bound is hit.
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: moka::future::Cache::builder()
                .max_capacity(max_capacity)
                .time_to_idle(Duration::from_secs(3600))
                .build(),
        }
    }

    /// Look up `key`; on miss, run `init` once (coalescing concurrent
    /// misses on the same key) and cache the result.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: &str, init: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Clone + Send + Sync + 'static,
    {
        self.inner
            .try_get_with(key.to_string(), init())
            .await
            .map_err(|arc_err: Arc<E>| (*arc_err).clone())
    }

    /// Drop a single entry, used when an admin update to a condition
    /// definition should invalidate its compiled form. Invalidation is not
    /// mandated by the contract this cache serves (staleness is tolerated),
    /// but callers that want it can have it cheaply.
    pub fn invalidate(&self, key: &str) {
        self.inner.invalidate(key);
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn caches_successful_compiles() {
        let cache: ExpressionCache<i32> = ExpressionCache::new(100);
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let calls = calls.clone();
            let result = cache
                .get_or_try_insert_with("condition_a", || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<i32, String>(42)
                })
                .await
                .unwrap();
            assert_eq!(result, 42);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_share_entries() {
        let cache: ExpressionCache<i32> = ExpressionCache::new(100);
        let a = cache
            .get_or_try_insert_with("a", || async { Ok::<i32, String>(1) })
            .await
            .unwrap();
        let b = cache
            .get_or_try_insert_with("b", || async { Ok::<i32, String>(2) })
            .await
            .unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(cache.entry_count(), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_recompile() {
        let cache: ExpressionCache<i32> = ExpressionCache::new(100);
        let calls = Arc::new(AtomicUsize::new(0));

        let do_get = |calls: Arc<AtomicUsize>| {
            let cache = cache.clone();
            async move {
                cache
                    .get_or_try_insert_with("condition_a", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<i32, String>(7)
                    })
                    .await
                    .unwrap()
            }
        };

        do_get(calls.clone()).await;
        cache.invalidate("condition_a");
        do_get(calls.clone()).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
