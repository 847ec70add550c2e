//! ExposureAnalyzer - Main facade for the exposure pipeline
//!
//! Combines selection, grid revaluation, cohort aggregation and flip
//! detection into a single call.

use std::sync::Arc;

use crate::config::{EngineConfig, GridConfig, PricingConfig};
use crate::core::{ChainData, ExpirationSelector, GexResult, Greek, Snapshot};

use super::{
    aggregate_by_expiry, aggregate_by_strike, find_flip, profile_points, select_members,
    CalcOutcome, Cohort, Diagnostics, ExposureBundle, ExposureCalculator, ExposureProfile,
    SpotLevelGrid,
};

/// Runs the full exposure pipeline for one snapshot
#[derive(Debug, Clone)]
pub struct ExposureAnalyzer {
    calculator: ExposureCalculator,
    grid: GridConfig,
}

impl ExposureAnalyzer {
    pub fn new(pricing: PricingConfig, grid: GridConfig) -> Self {
        Self {
            calculator: ExposureCalculator::new(pricing),
            grid,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.pricing.clone(), config.grid.clone())
    }

    pub fn calculator(&self) -> &ExposureCalculator {
        &self.calculator
    }

    /// Analyze whatever the loader produced.
    ///
    /// An unavailable chain yields [`CalcOutcome::Unavailable`], never a
    /// bundle of zeros.
    pub fn analyze(
        &self,
        chain: &ChainData,
        selector: ExpirationSelector,
    ) -> GexResult<CalcOutcome> {
        match chain {
            ChainData::Available(snapshot) => {
                let bundle = self.compute(snapshot, selector)?;
                Ok(CalcOutcome::from_bundle(Arc::new(bundle)))
            }
            ChainData::Unavailable => Ok(CalcOutcome::Unavailable),
        }
    }

    /// Compute the bundle for one selector of a snapshot
    pub fn compute(
        &self,
        snapshot: &Snapshot,
        selector: ExpirationSelector,
    ) -> GexResult<ExposureBundle> {
        let calc = &self.calculator;
        let spot = snapshot.spot;
        let members = select_members(
            &snapshot.contracts,
            selector,
            &snapshot.markers,
            snapshot.as_of,
            calc,
        );
        let grid = SpotLevelGrid::around(spot, self.grid.band, self.grid.points)?;

        let points = profile_points(calc, &members, grid.levels());
        let mut profiles = Vec::with_capacity(Greek::ALL.len() * Cohort::ALL.len());
        for greek in Greek::ALL {
            for cohort in Cohort::ALL {
                let values: Vec<f64> = points
                    .iter()
                    .map(|totals| totals[cohort.index()].get(greek))
                    .collect();
                let flip = find_flip(grid.levels(), &values);
                profiles.push(ExposureProfile {
                    greek,
                    cohort,
                    values,
                    flip,
                });
            }
        }

        let contracts_used = members
            .iter()
            .filter(|m| calc.is_valued(m.contract, spot, m.time))
            .count();
        let diagnostics = Diagnostics {
            contracts_used,
            contracts_excluded: members.len() - contracts_used,
            skipped: snapshot.skipped.clone(),
        };

        let bundle = ExposureBundle {
            ticker: snapshot.ticker.clone(),
            selector,
            as_of: snapshot.as_of,
            as_of_label: snapshot.as_of_label(calc.pricing()),
            markers: snapshot.markers,
            spot,
            by_strike: aggregate_by_strike(calc, &members, spot),
            by_expiry: aggregate_by_expiry(calc, &members, spot),
            grid,
            profiles,
            diagnostics,
        };

        tracing::debug!(
            "{} [{}]: {} contracts used, {} excluded, net delta {:.2}",
            bundle.ticker,
            selector,
            bundle.diagnostics.contracts_used,
            bundle.diagnostics.contracts_excluded,
            bundle.total_delta()
        );

        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CalendarMarkers, ContractQuote, OptionType, RawChain, SkippedRow, Ticker};
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    fn analyzer() -> ExposureAnalyzer {
        ExposureAnalyzer::from_config(&EngineConfig::default())
    }

    fn straddle_snapshot(skipped: Vec<SkippedRow>) -> Snapshot {
        let as_of = Utc.with_ymd_and_hms(2026, 10, 16, 18, 0, 0).unwrap();
        let expiry = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap() + Duration::days(30);
        let quote = |option_type| ContractQuote {
            strike: 100.0,
            expiry,
            option_type,
            open_interest: 500.0,
            implied_vol: 0.2,
            symbol: None,
        };
        let raw = RawChain {
            ticker: Ticker::new("TEST"),
            spot: 100.0,
            as_of,
            markers: Some(CalendarMarkers {
                next_expiry: NaiveDate::from_ymd_opt(2026, 10, 16).unwrap(),
                opex: expiry,
                zero_dte: NaiveDate::from_ymd_opt(2026, 10, 16).unwrap(),
            }),
            quotes: vec![quote(OptionType::Call), quote(OptionType::Put)],
            skipped,
        };
        Snapshot::ingest(raw, &PricingConfig::default()).unwrap()
    }

    #[test]
    fn test_bundle_shape() {
        let snapshot = straddle_snapshot(Vec::new());
        let bundle = analyzer().compute(&snapshot, ExpirationSelector::All).unwrap();

        assert_eq!(bundle.profiles.len(), 12);
        assert_eq!(bundle.grid.len(), 300);
        for profile in &bundle.profiles {
            assert_eq!(profile.values.len(), bundle.grid.len());
        }
        assert_eq!(bundle.by_strike.len(), 1);
        assert_eq!(bundle.expirations().len(), 1);
        assert_eq!(bundle.diagnostics.contracts_used, 2);
        assert_eq!(bundle.strikes_in_band().count(), 1);
        assert!(bundle.as_of_label.starts_with("2026 Oct 16, 02:00 PM"));
    }

    #[test]
    fn test_straddle_nets_gamma_and_flips_delta() {
        let snapshot = straddle_snapshot(Vec::new());
        let bundle = analyzer().compute(&snapshot, ExpirationSelector::All).unwrap();

        let row = &bundle.by_strike[0];
        assert!(row.call.delta > 0.0 && row.put.delta < 0.0);
        assert!(row.call.gamma > 0.0);
        assert!((row.call.gamma - row.put.gamma).abs() < 1e-9 * row.call.gamma);
        assert!(bundle.total(Greek::Gamma).abs() < 1e-6);
        assert!(bundle.total_delta() != 0.0);

        // Net delta is zero where d1 = 0: S = K·exp(-(r + σ²/2)T)
        let expected = 100.0 * (-(0.05_f64 + 0.02) * 30.0 / 365.0).exp();
        let flip = bundle.flip(Greek::Delta).unwrap();
        assert!((flip - expected).abs() < 0.05, "flip {} vs {}", flip, expected);

        let profile = bundle.profile(Greek::Delta, Cohort::All).unwrap();
        let lower = profile.flip.unwrap().lower_index;
        assert!(profile.values[lower] * profile.values[lower + 1] < 0.0);
    }

    #[test]
    fn test_cohort_profiles_follow_markers() {
        let snapshot = straddle_snapshot(Vec::new());
        let bundle = analyzer().compute(&snapshot, ExpirationSelector::All).unwrap();

        // The single expiry is after next_expiry and equals opex
        let all = bundle.profile(Greek::Delta, Cohort::All).unwrap();
        let ex_next = bundle.profile(Greek::Delta, Cohort::ExNext).unwrap();
        let monthly = bundle.profile(Greek::Delta, Cohort::NextMonthly).unwrap();
        assert_eq!(all.values, ex_next.values);
        assert_eq!(all.values, monthly.values);
    }

    #[test]
    fn test_empty_selection_is_all_zero() {
        let snapshot = straddle_snapshot(Vec::new());
        let bundle = analyzer().compute(&snapshot, ExpirationSelector::ZeroDte).unwrap();

        assert!(bundle.by_strike.is_empty());
        assert_eq!(bundle.total_delta(), 0.0);
        for profile in &bundle.profiles {
            assert!(profile.values.iter().all(|v| *v == 0.0));
            assert!(profile.flip.is_none());
        }
    }

    #[test]
    fn test_outcome_tags() {
        let a = analyzer();
        let outcome = a
            .analyze(&ChainData::Unavailable, ExpirationSelector::All)
            .unwrap();
        assert!(outcome.is_unavailable());
        assert!(outcome.bundle().is_none());

        let clean = ChainData::Available(Arc::new(straddle_snapshot(Vec::new())));
        assert!(matches!(
            a.analyze(&clean, ExpirationSelector::All).unwrap(),
            CalcOutcome::Computed(_)
        ));

        let skipped = vec![SkippedRow {
            symbol: "TEST261115X00100000".into(),
            reason: "bad type".into(),
        }];
        let partial = ChainData::Available(Arc::new(straddle_snapshot(skipped)));
        match a.analyze(&partial, ExpirationSelector::All).unwrap() {
            CalcOutcome::Partial { bundle, skipped } => {
                assert_eq!(skipped.len(), 1);
                assert_eq!(bundle.diagnostics.contracts_used, 2);
            }
            other => panic!("expected partial outcome, got {:?}", other),
        }
    }
}
