//! # GEX Engine - Dealer Greek Exposure
//!
//! Computes dealer-positioned delta, gamma, vanna and charm exposure from
//! option-chain snapshots, and the spot level where each aggregate crosses
//! zero.
//!
//! ## Overview
//!
//! For every (ticker, expiration selector) the engine produces an
//! [`ExposureBundle`](exposure::ExposureBundle):
//! - **Live aggregates** by strike and by expiration at the snapshot spot
//! - **Profiles** of each Greek re-valued across a ±20% spot grid, for the
//!   all-expiries, ex-next-expiry and next-monthly cohorts
//! - **Flip points** where a profile first changes sign
//!
//! Results are cached per key with single-flight computation, and a
//! freshness controller reloads snapshots on a market-hours schedule,
//! retrying tickers whose net delta came back exactly zero.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gex_engine::prelude::*;
//!
//! # async fn demo() -> GexResult<()> {
//! let loader = Arc::new(JsonFileLoader::new("data"));
//! let service = ExposureService::new(EngineConfig::default(), loader.clone());
//!
//! let spy = Ticker::new("SPY");
//! if let LoadOutcome::Available(raw) = loader.load(&spy).await? {
//!     service.ingest(raw)?;
//! }
//! if let Some(bundle) = service.get_or_compute(&spy, ExpirationSelector::All).await?.bundle() {
//!     println!("gamma flip: {:?}", bundle.flip(Greek::Gamma));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## What This Engine Does NOT Do
//!
//! - Download chains from a broker or vendor
//! - Render charts or serve HTTP
//! - Infer actual dealer positioning (calls are assumed dealer-long)

pub mod config;
pub mod core;
pub mod data;
pub mod exposure;
pub mod models;
pub mod scheduler;
pub mod service;

/// Prelude with commonly used types
pub mod prelude {
    pub use crate::config::{EngineConfig, PricingConfig};

    // Core types
    pub use crate::core::{
        CalendarMarkers, ChainData, Contract, ContractQuote, ExpirationSelector, GexError,
        GexResult, Greek, Greeks, OptionType, RawChain, Snapshot, Ticker,
    };

    // Loading & caching
    pub use crate::data::{
        ComputeCache, JsonFileLoader, LoadOutcome, SnapshotLoader, SyncRecord, SyncStore,
    };

    // Exposure
    pub use crate::exposure::{
        find_flip, CalcOutcome, Cohort, ExposureAnalyzer, ExposureBundle, ExposureCalculator,
        ExposureProfile, FlipPoint, FlipRegime, SpotLevelGrid, StrikeAggregate,
    };

    // Black-Scholes
    pub use crate::models::{greeks as bs_greeks, norm_cdf, norm_pdf};

    // Scheduling
    pub use crate::scheduler::{FreshnessController, Schedule, TickerState, WindowRule};

    pub use crate::service::ExposureService;
}

// Re-export main types at crate root
pub use crate::core::{GexError, GexResult};
pub use crate::exposure::ExposureBundle;
pub use crate::service::ExposureService;
