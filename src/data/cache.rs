//! In-memory compute cache
//!
//! Memoizes bundles per (ticker, selector) with a time-to-live. Each key has
//! its own slot: a tokio mutex serializes computations for that key only,
//! while the stored entry sits behind a separate lock so readers never wait
//! on a computation and never see a half-written value.
//!
//! Invalidation is whole-store. A generation counter is bumped on every
//! clear, and a computation started under an older generation returns its
//! result to its callers without storing it.

use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::core::{ExpirationSelector, GexResult, Greek, Ticker};
use crate::exposure::ExposureBundle;

/// Cache key
pub type CacheKey = (Ticker, ExpirationSelector);

struct Entry<V> {
    value: Arc<V>,
    stored_at: Instant,
    generation: u64,
}

struct Slot<V> {
    /// Held for the whole of a computation
    flight: tokio::sync::Mutex<()>,
    entry: RwLock<Option<Entry<V>>>,
}

impl<V> Slot<V> {
    fn new() -> Self {
        Self {
            flight: tokio::sync::Mutex::new(()),
            entry: RwLock::new(None),
        }
    }
}

/// TTL cache with at most one in-flight computation per key
pub struct ComputeCache<K, V> {
    ttl: Duration,
    slots: DashMap<K, Arc<Slot<V>>>,
    generation: AtomicU64,
    computations: AtomicU64,
}

impl<K, V> ComputeCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: DashMap::new(),
            generation: AtomicU64::new(0),
            computations: AtomicU64::new(0),
        }
    }

    /// Current generation; bumped by every [`invalidate_all`](Self::invalidate_all)
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Computations started since creation
    pub fn computations(&self) -> u64 {
        self.computations.load(Ordering::SeqCst)
    }

    fn slot(&self, key: &K) -> Arc<Slot<V>> {
        self.slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Slot::new()))
            .value()
            .clone()
    }

    fn fresh(&self, slot: &Slot<V>) -> Option<Arc<V>> {
        let generation = self.generation();
        slot.entry
            .read()
            .as_ref()
            .filter(|e| e.generation == generation && e.stored_at.elapsed() < self.ttl)
            .map(|e| Arc::clone(&e.value))
    }

    /// Unexpired value for `key`, without waiting on any computation
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let slot = self.slots.get(key).map(|s| Arc::clone(s.value()))?;
        self.fresh(&slot)
    }

    /// Cached value for `key`, or the result of `compute`.
    ///
    /// Concurrent callers for the same key wait for the first caller's
    /// computation and share its value. Errors are returned to the caller
    /// that computed and are not cached; waiting callers then retry.
    pub async fn get_or_compute<F, Fut>(&self, key: K, compute: F) -> GexResult<Arc<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GexResult<V>>,
    {
        let slot = self.slot(&key);
        if let Some(value) = self.fresh(&slot) {
            tracing::debug!("cache hit for {:?}", key);
            return Ok(value);
        }

        let _flight = slot.flight.lock().await;
        if let Some(value) = self.fresh(&slot) {
            tracing::debug!("cache filled while waiting for {:?}", key);
            return Ok(value);
        }

        tracing::debug!("cache miss for {:?}, computing", key);
        let generation = self.generation();
        self.computations.fetch_add(1, Ordering::SeqCst);
        let value = Arc::new(compute().await?);

        // The slot may have been dropped from the map while this caller waited
        if self.generation() == generation {
            *self.slot(&key).entry.write() = Some(Entry {
                value: Arc::clone(&value),
                stored_at: Instant::now(),
                generation,
            });
        } else {
            tracing::debug!("cache cleared during computation for {:?}, not storing", key);
        }
        Ok(value)
    }

    /// Drop every key and fence off in-flight computations
    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.slots.clear();
    }

    /// Keys currently holding an unexpired value
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| self.fresh(s.value()).is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lightweight summary polled by clients to decide whether to refetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub ticker: Ticker,
    pub selector: ExpirationSelector,
    pub spot: f64,
    pub as_of: DateTime<Utc>,
    pub as_of_label: String,
    pub delta_flip: Option<f64>,
    pub gamma_flip: Option<f64>,
}

impl SyncRecord {
    pub fn from_bundle(bundle: &ExposureBundle) -> Self {
        Self {
            ticker: bundle.ticker.clone(),
            selector: bundle.selector,
            spot: bundle.spot,
            as_of: bundle.as_of,
            as_of_label: bundle.as_of_label.clone(),
            delta_flip: bundle.flip(Greek::Delta),
            gamma_flip: bundle.flip(Greek::Gamma),
        }
    }

    /// Whether a client that last saw `as_of_label` at `spot` should refetch
    pub fn differs_from(&self, as_of_label: &str, spot: f64) -> bool {
        self.as_of_label != as_of_label || self.spot != spot
    }
}

/// Sync records by cache key
#[derive(Default)]
pub struct SyncStore {
    records: DashMap<CacheKey, SyncRecord>,
}

impl SyncStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, record: SyncRecord) {
        self.records
            .insert((record.ticker.clone(), record.selector), record);
    }

    pub fn get(&self, ticker: &Ticker, selector: ExpirationSelector) -> Option<SyncRecord> {
        self.records
            .get(&(ticker.clone(), selector))
            .map(|r| r.value().clone())
    }

    pub fn clear(&self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use crate::core::GexError;

    fn key(ticker: &str) -> CacheKey {
        (Ticker::new(ticker), ExpirationSelector::All)
    }

    #[tokio::test]
    async fn test_single_flight_per_key() {
        let cache: ComputeCache<CacheKey, u64> = ComputeCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);
        let calls = &calls;

        let compute = || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(42)
        };

        let (a, b) = tokio::join!(
            cache.get_or_compute(key("SPY"), compute),
            cache.get_or_compute(key("SPY"), compute)
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.computations(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_flight_across_tasks() {
        let cache: Arc<ComputeCache<CacheKey, u64>> =
            Arc::new(ComputeCache::new(Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    cache
                        .get_or_compute(key("QQQ"), || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok(7)
                        })
                        .await
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(*handle.await.unwrap().unwrap(), 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unrelated_keys_do_not_block() {
        let cache: ComputeCache<CacheKey, u64> = ComputeCache::new(Duration::from_secs(60));
        let cache = &cache;
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        // SPY's computation waits until QQQ has been computed
        let slow = cache.get_or_compute(key("SPY"), || async move {
            rx.await.map_err(|e| GexError::Task(e.to_string()))?;
            Ok(1)
        });
        let fast = async move {
            let v = cache.get_or_compute(key("QQQ"), || async { Ok(2) }).await;
            let _ = tx.send(());
            v
        };

        let (slow, fast) = tokio::join!(slow, fast);
        assert_eq!(*slow.unwrap(), 1);
        assert_eq!(*fast.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_waiter_across_clear_fills_live_slot() {
        let cache: ComputeCache<CacheKey, u64> = ComputeCache::new(Duration::from_secs(60));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let first = cache.get_or_compute(key("SPY"), || async move {
            rx.await.map_err(|e| GexError::Task(e.to_string()))?;
            Ok(1)
        });
        let waiter = cache.get_or_compute(key("SPY"), || async { Ok(2) });
        let clear = async {
            cache.invalidate_all();
            let _ = tx.send(());
        };

        let (first, waiter, ()) = tokio::join!(first, waiter, clear);
        assert_eq!(*first.unwrap(), 1);
        assert_eq!(*waiter.unwrap(), 2);
        assert_eq!(cache.computations(), 2);
        assert_eq!(cache.get(&key("SPY")).as_deref(), Some(&2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let cache: ComputeCache<CacheKey, u64> = ComputeCache::new(Duration::from_secs(900));
        cache.get_or_compute(key("SPY"), || async { Ok(1) }).await.unwrap();
        assert_eq!(cache.get(&key("SPY")).as_deref(), Some(&1));

        tokio::time::advance(Duration::from_secs(899)).await;
        assert!(cache.get(&key("SPY")).is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get(&key("SPY")).is_none());

        let v = cache.get_or_compute(key("SPY"), || async { Ok(2) }).await.unwrap();
        assert_eq!(*v, 2);
        assert_eq!(cache.computations(), 2);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache: ComputeCache<CacheKey, u64> = ComputeCache::new(Duration::from_secs(60));
        let err = cache
            .get_or_compute(key("SPY"), || async { Err(GexError::data("boom")) })
            .await;
        assert!(err.is_err());
        assert!(cache.get(&key("SPY")).is_none());

        let v = cache.get_or_compute(key("SPY"), || async { Ok(3) }).await.unwrap();
        assert_eq!(*v, 3);
    }

    #[tokio::test]
    async fn test_clear_during_computation_is_not_stored() {
        let cache: ComputeCache<CacheKey, u64> = ComputeCache::new(Duration::from_secs(60));

        let v = cache
            .get_or_compute(key("SPY"), || async {
                cache.invalidate_all();
                Ok(5)
            })
            .await
            .unwrap();

        assert_eq!(*v, 5);
        assert_eq!(cache.generation(), 1);
        assert!(cache.get(&key("SPY")).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_sync_store() {
        let store = SyncStore::new();
        let record = SyncRecord {
            ticker: Ticker::new("SPY"),
            selector: ExpirationSelector::All,
            spot: 500.0,
            as_of: Utc::now(),
            as_of_label: "2026 Oct 16, 02:30 PM EDT".into(),
            delta_flip: Some(495.0),
            gamma_flip: None,
        };
        store.put(record.clone());

        let stored = store.get(&Ticker::new("spy"), ExpirationSelector::All).unwrap();
        assert_eq!(stored, record);
        assert!(!stored.differs_from("2026 Oct 16, 02:30 PM EDT", 500.0));
        assert!(stored.differs_from("2026 Oct 16, 02:45 PM EDT", 500.0));
        assert!(stored.differs_from("2026 Oct 16, 02:30 PM EDT", 501.0));
        assert!(store.get(&Ticker::new("SPY"), ExpirationSelector::Opex).is_none());

        store.clear();
        assert!(store.is_empty());
    }
}
