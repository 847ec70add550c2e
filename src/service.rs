//! Exposure service
//!
//! Owns everything shared between request handling and the refresh loop:
//! live snapshots, the compute cache, sync records and the retry set.
//! Constructed explicitly and shared behind an `Arc`.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::config::EngineConfig;
use crate::core::{ChainData, ExpirationSelector, GexError, GexResult, RawChain, Snapshot, Ticker};
use crate::data::{CacheKey, ComputeCache, SnapshotLoader, SyncRecord, SyncStore};
use crate::exposure::{CalcOutcome, ExposureAnalyzer, ExposureBundle};
use crate::scheduler::RetrySet;

pub struct ExposureService {
    config: EngineConfig,
    analyzer: ExposureAnalyzer,
    loader: Arc<dyn SnapshotLoader>,
    snapshots: DashMap<Ticker, Arc<Snapshot>>,
    cache: ComputeCache<CacheKey, ExposureBundle>,
    sync: SyncStore,
    retry: RetrySet,
}

impl ExposureService {
    pub fn new(config: EngineConfig, loader: Arc<dyn SnapshotLoader>) -> Self {
        Self {
            analyzer: ExposureAnalyzer::from_config(&config),
            cache: ComputeCache::new(Duration::from_secs(config.cache.ttl_secs)),
            config,
            loader,
            snapshots: DashMap::new(),
            sync: SyncStore::new(),
            retry: RetrySet::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn loader(&self) -> &Arc<dyn SnapshotLoader> {
        &self.loader
    }

    pub fn cache(&self) -> &ComputeCache<CacheKey, ExposureBundle> {
        &self.cache
    }

    pub fn retry_set(&self) -> &RetrySet {
        &self.retry
    }

    /// Live snapshot for a ticker
    pub fn snapshot(&self, ticker: &Ticker) -> ChainData {
        match self.snapshots.get(ticker) {
            Some(snapshot) => ChainData::Available(Arc::clone(snapshot.value())),
            None => ChainData::Unavailable,
        }
    }

    /// Replace a ticker's snapshot and clear every cached result
    pub fn ingest(&self, raw: RawChain) -> GexResult<Arc<Snapshot>> {
        let snapshot = self.stage(raw)?;
        self.invalidate();
        Ok(snapshot)
    }

    /// Replace a ticker's snapshot, leaving cached results in place.
    ///
    /// Batch loads stage every ticker, then call [`invalidate`](Self::invalidate) once.
    pub fn stage(&self, raw: RawChain) -> GexResult<Arc<Snapshot>> {
        let snapshot = Arc::new(Snapshot::ingest(raw, &self.config.pricing)?);
        tracing::info!(
            "{}: ingested {} contracts at spot {:.2} ({})",
            snapshot.ticker,
            snapshot.contracts.len(),
            snapshot.spot,
            snapshot.as_of_label(&self.config.pricing)
        );

        self.snapshots
            .insert(snapshot.ticker.clone(), Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Drop every cached bundle and sync record
    pub fn invalidate(&self) {
        self.cache.invalidate_all();
        self.sync.clear();
    }

    /// Cached bundle for a key, or compute it from the live snapshot.
    ///
    /// Returns [`CalcOutcome::Unavailable`] when no snapshot has been ingested
    /// for the ticker.
    pub async fn get_or_compute(
        &self,
        ticker: &Ticker,
        selector: ExpirationSelector,
    ) -> GexResult<CalcOutcome> {
        if self.snapshot(ticker).snapshot().is_none() {
            return Ok(CalcOutcome::Unavailable);
        }

        let bundle = self
            .cache
            .get_or_compute((ticker.clone(), selector), || async {
                // Snapshot is read under the flight lock, after the generation
                let generation = self.cache.generation();
                let snapshot = self
                    .snapshot(ticker)
                    .snapshot()
                    .cloned()
                    .ok_or_else(|| GexError::unavailable(ticker.as_str()))?;
                let analyzer = self.analyzer.clone();
                let bundle =
                    tokio::task::spawn_blocking(move || analyzer.compute(&snapshot, selector))
                        .await
                        .map_err(|e| GexError::Task(e.to_string()))??;

                if self.cache.generation() == generation {
                    self.sync.put(SyncRecord::from_bundle(&bundle));
                }
                Ok(bundle)
            })
            .await?;

        Ok(CalcOutcome::from_bundle(bundle))
    }

    /// Bundle already in the cache, without computing
    pub fn cached(
        &self,
        ticker: &Ticker,
        selector: ExpirationSelector,
    ) -> Option<Arc<ExposureBundle>> {
        self.cache.get(&(ticker.clone(), selector))
    }

    pub fn sync_record(&self, ticker: &Ticker, selector: ExpirationSelector) -> Option<SyncRecord> {
        self.sync.get(ticker, selector)
    }

    /// Whether a client that last saw `as_of_label` at `spot` is behind.
    ///
    /// Keys not computed since the last ingestion are checked against the
    /// live snapshot instead.
    pub fn is_stale(
        &self,
        ticker: &Ticker,
        selector: ExpirationSelector,
        as_of_label: &str,
        spot: f64,
    ) -> bool {
        if let Some(record) = self.sync.get(ticker, selector) {
            return record.differs_from(as_of_label, spot);
        }
        match self.snapshot(ticker) {
            ChainData::Available(snapshot) => {
                snapshot.as_of_label(&self.config.pricing) != as_of_label || snapshot.spot != spot
            }
            ChainData::Unavailable => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ContractQuote, OptionType};
    use crate::data::LoadOutcome;
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone, Utc};

    struct NoLoader;

    #[async_trait]
    impl SnapshotLoader for NoLoader {
        async fn load(&self, _ticker: &Ticker) -> GexResult<LoadOutcome> {
            Ok(LoadOutcome::Unavailable)
        }
    }

    fn service() -> ExposureService {
        let mut config = EngineConfig::default();
        config.grid.points = 41;
        ExposureService::new(config, Arc::new(NoLoader))
    }

    fn raw(ticker: &str, spot: f64) -> RawChain {
        let expiry = NaiveDate::from_ymd_opt(2026, 11, 20).unwrap();
        let quote = |strike, option_type| ContractQuote {
            strike,
            expiry,
            option_type,
            open_interest: 1000.0,
            implied_vol: 0.22,
            symbol: None,
        };
        RawChain {
            ticker: Ticker::new(ticker),
            spot,
            as_of: Utc.with_ymd_and_hms(2026, 10, 16, 18, 30, 0).unwrap(),
            markers: None,
            quotes: vec![
                quote(95.0, OptionType::Put),
                quote(100.0, OptionType::Call),
                quote(105.0, OptionType::Call),
            ],
            skipped: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_unknown_ticker_is_unavailable() {
        let service = service();
        let outcome = service
            .get_or_compute(&Ticker::new("SPY"), ExpirationSelector::All)
            .await
            .unwrap();
        assert!(outcome.is_unavailable());
        assert!(service.cache().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_requests_compute_once() {
        let service = service();
        service.ingest(raw("SPY", 100.0)).unwrap();
        let spy = Ticker::new("SPY");

        let (a, b) = tokio::join!(
            service.get_or_compute(&spy, ExpirationSelector::All),
            service.get_or_compute(&spy, ExpirationSelector::All)
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(service.cache().computations(), 1);
        assert!(Arc::ptr_eq(a.bundle().unwrap(), b.bundle().unwrap()));

        // A different selector is a different key
        service
            .get_or_compute(&spy, ExpirationSelector::Opex)
            .await
            .unwrap();
        assert_eq!(service.cache().computations(), 2);
    }

    #[tokio::test]
    async fn test_ingest_invalidates_everything() {
        let service = service();
        let (spy, qqq) = (Ticker::new("SPY"), Ticker::new("QQQ"));
        service.ingest(raw("SPY", 100.0)).unwrap();
        service.ingest(raw("QQQ", 100.0)).unwrap();

        service.get_or_compute(&spy, ExpirationSelector::All).await.unwrap();
        service.get_or_compute(&qqq, ExpirationSelector::All).await.unwrap();
        assert!(service.sync_record(&qqq, ExpirationSelector::All).is_some());

        service.ingest(raw("SPY", 101.0)).unwrap();
        assert!(service.cached(&spy, ExpirationSelector::All).is_none());
        assert!(service.cached(&qqq, ExpirationSelector::All).is_none());
        assert!(service.sync_record(&qqq, ExpirationSelector::All).is_none());

        let outcome = service.get_or_compute(&spy, ExpirationSelector::All).await.unwrap();
        assert_eq!(outcome.bundle().unwrap().spot, 101.0);
    }

    #[tokio::test]
    async fn test_waiter_across_ingest_values_new_snapshot() {
        let service = service();
        let spy = Ticker::new("SPY");
        let all = ExpirationSelector::All;
        let old = service.ingest(raw("SPY", 100.0)).unwrap();
        let label = old.as_of_label(&service.config().pricing);
        let superseded = ExposureAnalyzer::from_config(service.config())
            .compute(&old, all)
            .unwrap();

        // The first caller holds the flight lock until SPY has been re-ingested
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let first = service
            .cache()
            .get_or_compute((spy.clone(), all), || async move {
                rx.await.map_err(|e| GexError::Task(e.to_string()))?;
                Ok(superseded)
            });
        let waiter = service.get_or_compute(&spy, all);
        let reingest = async {
            service.ingest(raw("SPY", 101.0)).unwrap();
            let _ = tx.send(());
        };

        let (first, waiter, ()) = tokio::join!(first, waiter, reingest);
        assert_eq!(first.unwrap().spot, 100.0);
        assert_eq!(waiter.unwrap().bundle().unwrap().spot, 101.0);

        assert_eq!(service.sync_record(&spy, all).unwrap().spot, 101.0);
        assert_eq!(service.cached(&spy, all).unwrap().spot, 101.0);
        assert!(service.is_stale(&spy, all, &label, 100.0));
        assert!(!service.is_stale(&spy, all, &label, 101.0));
    }

    #[tokio::test]
    async fn test_stage_keeps_cache_until_invalidated() {
        let service = service();
        let (spy, qqq) = (Ticker::new("SPY"), Ticker::new("QQQ"));
        service.ingest(raw("QQQ", 100.0)).unwrap();
        service.get_or_compute(&qqq, ExpirationSelector::All).await.unwrap();

        service.stage(raw("SPY", 100.0)).unwrap();
        assert!(service.cached(&qqq, ExpirationSelector::All).is_some());
        assert!(service.snapshot(&spy).snapshot().is_some());

        service.invalidate();
        assert!(service.cached(&qqq, ExpirationSelector::All).is_none());
        assert!(service.sync_record(&qqq, ExpirationSelector::All).is_none());
    }

    #[tokio::test]
    async fn test_sync_record_and_staleness() {
        let service = service();
        let spy = Ticker::new("SPY");
        service.ingest(raw("SPY", 100.0)).unwrap();
        let outcome = service.get_or_compute(&spy, ExpirationSelector::All).await.unwrap();
        let bundle = outcome.bundle().unwrap();

        let record = service.sync_record(&spy, ExpirationSelector::All).unwrap();
        assert_eq!(record.spot, 100.0);
        assert_eq!(record.as_of_label, bundle.as_of_label);
        assert_eq!(record.delta_flip, bundle.flip(crate::core::Greek::Delta));

        assert!(!service.is_stale(&spy, ExpirationSelector::All, &bundle.as_of_label, 100.0));
        let earlier = "2026 Oct 16, 09:30 AM EDT";
        assert!(service.is_stale(&spy, ExpirationSelector::All, earlier, 100.0));
        assert!(service.is_stale(&spy, ExpirationSelector::All, &bundle.as_of_label, 99.5));

        // No record for this selector yet: compared against the live snapshot
        assert!(!service.is_stale(&spy, ExpirationSelector::ZeroDte, &bundle.as_of_label, 100.0));
        assert!(service.is_stale(&spy, ExpirationSelector::ZeroDte, earlier, 100.0));
        assert!(!service.is_stale(&Ticker::new("QQQ"), ExpirationSelector::All, earlier, 1.0));
    }

    #[tokio::test]
    async fn test_bad_spot_rejected_keeps_previous_snapshot() {
        let service = service();
        let spy = Ticker::new("SPY");
        service.ingest(raw("SPY", 100.0)).unwrap();
        assert!(service.ingest(raw("SPY", f64::NAN)).is_err());

        let snapshot = service.snapshot(&spy);
        assert_eq!(snapshot.snapshot().unwrap().spot, 100.0);
    }
}
