//! Freshness & retry controller
//!
//! Two triggers drive ingestion:
//!
//! 1. **Full cycle**: reload every ticker in the universe, clear cached
//!    results once, recompute the warm selectors, and queue tickers whose net
//!    delta came out exactly zero while the market is open and their
//!    expiration is still live.
//! 2. **Retry cycle**: reload only the queued tickers, once, and unqueue them
//!    whatever happens.
//!
//! No single ticker can stop a cycle: timeouts, loader errors and panics are
//! logged and the ticker returns to `Idle`, still serving its previous snapshot.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use futures::{FutureExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::core::{
    expiration_instant, CalendarMarkers, ExpirationSelector, GexError, GexResult, Snapshot, Ticker,
};
use crate::data::LoadOutcome;
use crate::service::ExposureService;

use super::{Schedule, Trigger};

/// Refresh state of one ticker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickerState {
    Idle,
    Fetching,
    Computed,
    /// Net delta was zero but nothing suggested missing data
    ComputedDegenerate,
    RetryQueued,
}

/// Tickers awaiting one retry fetch
#[derive(Debug, Default)]
pub struct RetrySet {
    tickers: DashSet<Ticker>,
}

impl RetrySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, ticker: &Ticker) -> bool {
        self.tickers.contains(ticker)
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }

    /// Queued tickers, sorted
    pub fn tickers(&self) -> Vec<Ticker> {
        let mut tickers: Vec<Ticker> = self.tickers.iter().map(|t| t.key().clone()).collect();
        tickers.sort();
        tickers
    }

    /// Returns false if already queued
    pub(crate) fn insert(&self, ticker: Ticker) -> bool {
        self.tickers.insert(ticker)
    }

    pub(crate) fn remove(&self, ticker: &Ticker) -> bool {
        self.tickers.remove(ticker).is_some()
    }
}

/// How one ticker's refresh ended
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Computed,
    /// Net delta exactly zero; `queued` when a retry was scheduled
    Degenerate { queued: bool },
    Unavailable,
    TimedOut,
    Failed(String),
}

/// Per-ticker results of one cycle
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub outcomes: Vec<(Ticker, RefreshOutcome)>,
}

impl CycleReport {
    pub fn outcome(&self, ticker: &Ticker) -> Option<&RefreshOutcome> {
        self.outcomes
            .iter()
            .find(|(t, _)| t == ticker)
            .map(|(_, outcome)| outcome)
    }

    pub fn count(&self, pred: impl Fn(&RefreshOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Keeps the service fed with fresh snapshots
pub struct FreshnessController {
    service: Arc<ExposureService>,
    states: DashMap<Ticker, TickerState>,
    full: Schedule,
    fast: Schedule,
}

impl FreshnessController {
    pub fn new(service: Arc<ExposureService>) -> Self {
        let config = service.config();
        let tz = config.pricing.timezone;
        let full = Schedule::new(config.schedule.full.clone(), tz);
        let fast = Schedule::new(config.schedule.fast.clone(), tz);
        Self {
            service,
            states: DashMap::new(),
            full,
            fast,
        }
    }

    pub fn service(&self) -> &Arc<ExposureService> {
        &self.service
    }

    pub fn state(&self, ticker: &Ticker) -> TickerState {
        self.states
            .get(ticker)
            .map(|s| *s.value())
            .unwrap_or(TickerState::Idle)
    }

    fn set_state(&self, ticker: &Ticker, state: TickerState) {
        self.states.insert(ticker.clone(), state);
    }

    /// Reload the whole universe as of `now`
    pub async fn run_full_cycle_at(&self, now: DateTime<Utc>) -> CycleReport {
        let universe = self.service.config().universe.0.clone();
        tracing::info!("full refresh of {} tickers", universe.len());
        let report = self.refresh_all(universe, now, true).await;
        self.log_report("full", &report);
        report
    }

    /// Reload the queued tickers once, then unqueue them
    pub async fn run_retry_cycle_at(&self, now: DateTime<Utc>) -> CycleReport {
        let retry = self.service.retry_set();
        let queued = retry.tickers();
        if queued.is_empty() {
            return CycleReport::default();
        }

        tracing::info!("retrying {} tickers: {:?}", queued.len(), queued);
        let report = self.refresh_all(queued.clone(), now, false).await;
        for ticker in &queued {
            retry.remove(ticker);
        }
        self.log_report("retry", &report);
        report
    }

    /// Load every ticker, clear cached results once, then warm and classify
    async fn refresh_all(&self, tickers: Vec<Ticker>, now: DateTime<Utc>, detect: bool) -> CycleReport {
        let max_concurrent = self.service.config().fetch.max_concurrent.max(1);

        let loaded = futures::stream::iter(tickers)
            .map(|ticker| async move {
                let staged = AssertUnwindSafe(self.fetch_ticker(&ticker))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Err(self.panicked(&ticker, "fetch")));
                (ticker, staged)
            })
            .buffer_unordered(max_concurrent)
            .collect::<Vec<_>>()
            .await;

        let mut outcomes = Vec::with_capacity(loaded.len());
        let mut staged = Vec::new();
        let mut kept = Vec::new();
        for (ticker, result) in loaded {
            match result {
                Ok(snapshot) => staged.push((ticker, snapshot)),
                Err(outcome) => {
                    if self.service.snapshot(&ticker).snapshot().is_some() {
                        kept.push(ticker.clone());
                    }
                    outcomes.push((ticker, outcome));
                }
            }
        }
        if staged.is_empty() {
            return CycleReport { outcomes };
        }

        self.service.invalidate();

        let warmed = futures::stream::iter(staged)
            .map(|(ticker, snapshot)| async move {
                let outcome = AssertUnwindSafe(self.classify_ticker(&ticker, &snapshot, now, detect))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| self.panicked(&ticker, "warm-up"));
                (ticker, outcome)
            })
            .buffer_unordered(max_concurrent)
            .collect::<Vec<_>>()
            .await;
        outcomes.extend(warmed);

        // Tickers that failed this cycle still serve their previous snapshot
        futures::stream::iter(kept)
            .for_each_concurrent(max_concurrent, |ticker| async move {
                if let Err(e) = self.warm(&ticker).await {
                    tracing::warn!("{}: re-warming previous snapshot failed: {}", ticker, e);
                }
            })
            .await;

        CycleReport { outcomes }
    }

    /// Load and stage one snapshot; `Err` carries the outcome of a failed load
    async fn fetch_ticker(&self, ticker: &Ticker) -> Result<Arc<Snapshot>, RefreshOutcome> {
        self.set_state(ticker, TickerState::Fetching);
        let fetch = &self.service.config().fetch;

        let loaded = tokio::time::timeout(
            Duration::from_secs(fetch.timeout_secs),
            self.service.loader().load(ticker),
        )
        .await;

        let raw = match loaded {
            Ok(Ok(LoadOutcome::Available(raw))) => raw,
            Ok(Ok(LoadOutcome::Unavailable)) => {
                tracing::warn!("{}: snapshot unavailable, keeping cached results", ticker);
                self.set_state(ticker, TickerState::Idle);
                return Err(RefreshOutcome::Unavailable);
            }
            Ok(Err(e)) => return Err(self.fail(ticker, e)),
            Err(_) => {
                let e = GexError::Timeout {
                    ticker: ticker.to_string(),
                    secs: fetch.timeout_secs,
                };
                tracing::warn!("{}", e);
                self.set_state(ticker, TickerState::Idle);
                return Err(RefreshOutcome::TimedOut);
            }
        };

        self.service.stage(raw).map_err(|e| self.fail(ticker, e))
    }

    /// Compute every warm selector; returns the first whose net delta is exactly zero
    async fn warm(&self, ticker: &Ticker) -> GexResult<Option<ExpirationSelector>> {
        let mut degenerate = None;
        for &selector in &self.service.config().warm_selectors.0 {
            let outcome = self.service.get_or_compute(ticker, selector).await?;
            if outcome.is_unavailable() {
                continue;
            }
            let zero = outcome.bundle().is_some_and(|b| b.total_delta() == 0.0);
            if zero && degenerate.is_none() {
                degenerate = Some(selector);
            }
        }
        Ok(degenerate)
    }

    async fn classify_ticker(
        &self,
        ticker: &Ticker,
        snapshot: &Snapshot,
        now: DateTime<Utc>,
        detect: bool,
    ) -> RefreshOutcome {
        let degenerate = match self.warm(ticker).await {
            Ok(degenerate) => degenerate,
            Err(e) => return self.fail(ticker, e),
        };

        let retry = self.service.retry_set();
        let Some(selector) = degenerate else {
            if retry.remove(ticker) {
                tracing::info!("{}: recovered, removed from retry set", ticker);
            }
            self.set_state(ticker, TickerState::Computed);
            return RefreshOutcome::Computed;
        };

        if !detect {
            tracing::warn!("{}: still zero net delta after retry", ticker);
            self.set_state(ticker, TickerState::ComputedDegenerate);
            return RefreshOutcome::Degenerate { queued: false };
        }

        if retry.contains(ticker) {
            self.set_state(ticker, TickerState::RetryQueued);
            return RefreshOutcome::Degenerate { queued: false };
        }

        if self.fast.is_active(now) && !self.expiration_lapsed(&snapshot.markers, selector, now) {
            retry.insert(ticker.clone());
            tracing::warn!("{} [{}]: net delta is exactly zero, queued for retry", ticker, selector);
            self.set_state(ticker, TickerState::RetryQueued);
            RefreshOutcome::Degenerate { queued: true }
        } else {
            tracing::info!("{} [{}]: net delta is zero outside retry conditions", ticker, selector);
            self.set_state(ticker, TickerState::ComputedDegenerate);
            RefreshOutcome::Degenerate { queued: false }
        }
    }

    fn panicked(&self, ticker: &Ticker, stage: &str) -> RefreshOutcome {
        tracing::error!("{}: {} panicked", ticker, stage);
        self.set_state(ticker, TickerState::Idle);
        RefreshOutcome::Failed(format!("panic during {}", stage))
    }

    fn fail(&self, ticker: &Ticker, e: GexError) -> RefreshOutcome {
        tracing::error!("{}: refresh failed: {}", ticker, e);
        self.set_state(ticker, TickerState::Idle);
        RefreshOutcome::Failed(e.to_string())
    }

    /// Whether the selector's expiration closed more than the grace window ago
    fn expiration_lapsed(
        &self,
        markers: &CalendarMarkers,
        selector: ExpirationSelector,
        now: DateTime<Utc>,
    ) -> bool {
        let config = self.service.config();
        let expiry = match selector {
            ExpirationSelector::Monthly | ExpirationSelector::Opex => markers.opex,
            ExpirationSelector::All | ExpirationSelector::ZeroDte => markers.next_expiry,
        };
        let grace = chrono::Duration::minutes(config.retry.grace_minutes);
        match expiration_instant(expiry, config.pricing.timezone, config.pricing.expiry_close) {
            Some(close) => now >= close + grace,
            None => true,
        }
    }

    fn log_report(&self, cycle: &str, report: &CycleReport) {
        tracing::info!(
            "{} cycle done: {} computed, {} degenerate, {} unavailable, {} timed out, {} failed",
            cycle,
            report.count(|o| matches!(o, RefreshOutcome::Computed)),
            report.count(|o| matches!(o, RefreshOutcome::Degenerate { .. })),
            report.count(|o| matches!(o, RefreshOutcome::Unavailable)),
            report.count(|o| matches!(o, RefreshOutcome::TimedOut)),
            report.count(|o| matches!(o, RefreshOutcome::Failed(_))),
        );
    }

    /// Run until `shutdown` flips to true or its sender is dropped.
    ///
    /// One full cycle runs immediately, then both triggers are evaluated
    /// every `tick_millis`. Shutdown abandons a cycle in progress.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut full = Trigger::new(self.full.clone());
        let mut fast = Trigger::new(self.fast.clone());

        let start = Utc::now();
        tokio::select! {
            _ = self.run_full_cycle_at(start) => {}
            _ = shutdown_requested(&mut shutdown) => {
                tracing::info!("scheduler shutting down during startup refresh");
                return;
            }
        }
        full.prime(start);
        fast.prime(start);

        let tick = Duration::from_millis(self.service.config().schedule.tick_millis.max(1));
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown_requested(&mut shutdown) => break,
            }

            let now = Utc::now();
            let cycles = async {
                if full.poll(now) {
                    self.run_full_cycle_at(now).await;
                }
                if fast.poll(now) && !self.service.retry_set().is_empty() {
                    self.run_retry_cycle_at(now).await;
                }
            };
            tokio::select! {
                _ = cycles => {}
                _ = shutdown_requested(&mut shutdown) => break,
            }
        }
        tracing::info!("scheduler shutting down");
    }
}

/// Resolves once shutdown is signalled or the sender is gone
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
