//! Greek exposure pipeline
//!
//! Snapshot → calculator → cohort aggregation → flip detection, packaged as
//! one [`ExposureBundle`] per (ticker, selector).

mod analyzer;
mod calculator;
mod cohort;
mod flip;
mod grid;

pub use analyzer::*;
pub use calculator::*;
pub use cohort::*;
pub use flip::*;
pub use grid::*;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{CalendarMarkers, ExpirationSelector, Greek, SkippedRow, Ticker};

/// Aggregate exposure of one Greek and cohort across the spot grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureProfile {
    pub greek: Greek,
    pub cohort: Cohort,
    /// Aligned index-for-index with the bundle's grid
    pub values: Vec<f64>,
    pub flip: Option<FlipPoint>,
}

impl ExposureProfile {
    /// Display band, see [`FlipRegime`]
    pub fn regime(&self) -> FlipRegime {
        FlipRegime::classify(&self.values, self.flip.as_ref())
    }
}

/// Row counts behind a bundle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Selected contracts with usable pricing inputs
    pub contracts_used: usize,
    /// Selected contracts excluded for non-positive T, IV, strike or spot
    pub contracts_excluded: usize,
    /// Rows dropped while loading or ingesting the snapshot
    pub skipped: Vec<SkippedRow>,
}

/// Everything computed for one (ticker, selector) key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExposureBundle {
    pub ticker: Ticker,
    pub selector: ExpirationSelector,
    pub as_of: DateTime<Utc>,
    /// As-of time in the exchange timezone, for display and sync checks
    pub as_of_label: String,
    pub markers: CalendarMarkers,
    pub spot: f64,
    pub grid: SpotLevelGrid,
    /// Live-spot aggregates by strike, ascending
    pub by_strike: Vec<StrikeAggregate>,
    /// Live-spot aggregates by expiration, ascending
    pub by_expiry: Vec<StrikeAggregate>,
    /// One profile per Greek and cohort
    pub profiles: Vec<ExposureProfile>,
    pub diagnostics: Diagnostics,
}

impl ExposureBundle {
    pub fn profile(&self, greek: Greek, cohort: Cohort) -> Option<&ExposureProfile> {
        self.profiles
            .iter()
            .find(|p| p.greek == greek && p.cohort == cohort)
    }

    /// Flip point of the all-expiries profile for a Greek
    pub fn flip(&self, greek: Greek) -> Option<f64> {
        self.profile(greek, Cohort::All)
            .and_then(|p| p.flip)
            .map(|f| f.spot)
    }

    /// Dealer-net live exposure across every selected contract
    pub fn total(&self, greek: Greek) -> f64 {
        self.by_strike.iter().map(|row| row.total.get(greek)).sum()
    }

    /// Net delta exposure at the live spot; exactly zero marks a suspect result
    pub fn total_delta(&self) -> f64 {
        self.total(Greek::Delta)
    }

    /// Strike rows inside the grid's spot band
    pub fn strikes_in_band(&self) -> impl Iterator<Item = &StrikeAggregate> + '_ {
        self.by_strike
            .iter()
            .filter(|row| row.key.strike().is_some_and(|k| self.grid.contains(k)))
    }

    /// Listed expirations contributing to the bundle
    pub fn expirations(&self) -> Vec<NaiveDate> {
        self.by_expiry.iter().filter_map(|row| row.key.expiry()).collect()
    }
}
