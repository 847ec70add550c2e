//! Greek exposure calculator
//!
//! Scales per-unit Greeks into exposures:
//!
//! | Greek | Exposure |
//! |-------|----------|
//! | delta | Δ · OI · m · S · 0.01 |
//! | gamma | Γ · OI · m · S² · 0.01 |
//! | vanna | vanna · OI · m · S · 0.01 |
//! | charm | charm · OI · m · S / 365 |
//!
//! Each contract is valued independently, so callers are free to evaluate
//! contracts or spot levels in parallel.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::PricingConfig;
use crate::core::{Contract, Greek, Greeks, OptionType, SkippedRow};
use crate::models::black_scholes;

use super::ExposureBundle;

/// Result of one computation for a (ticker, selector) key
#[derive(Debug, Clone)]
pub enum CalcOutcome {
    /// Every row of the snapshot was usable
    Computed(Arc<ExposureBundle>),
    /// Computed from the usable rows; the rest were skipped
    Partial {
        bundle: Arc<ExposureBundle>,
        skipped: Vec<SkippedRow>,
    },
    /// The loader had no data for the ticker
    Unavailable,
}

impl CalcOutcome {
    /// Tag a bundle by whether its snapshot skipped any rows
    pub fn from_bundle(bundle: Arc<ExposureBundle>) -> Self {
        if bundle.diagnostics.skipped.is_empty() {
            CalcOutcome::Computed(bundle)
        } else {
            let skipped = bundle.diagnostics.skipped.clone();
            CalcOutcome::Partial { bundle, skipped }
        }
    }

    pub fn bundle(&self) -> Option<&Arc<ExposureBundle>> {
        match self {
            CalcOutcome::Computed(bundle) | CalcOutcome::Partial { bundle, .. } => Some(bundle),
            CalcOutcome::Unavailable => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, CalcOutcome::Unavailable)
    }
}

/// Per-contract exposure calculator
#[derive(Debug, Clone)]
pub struct ExposureCalculator {
    pricing: PricingConfig,
}

impl ExposureCalculator {
    pub fn new(pricing: PricingConfig) -> Self {
        Self { pricing }
    }

    pub fn pricing(&self) -> &PricingConfig {
        &self.pricing
    }

    /// Years to expiry for a contract as of the snapshot time
    pub fn time_to_expiry(&self, contract: &Contract, as_of: DateTime<Utc>) -> f64 {
        contract.time_to_expiry(as_of, self.pricing.timezone, self.pricing.expiry_close)
    }

    /// Whether a contract contributes at all
    pub fn is_valued(&self, contract: &Contract, spot: f64, time: f64) -> bool {
        black_scholes::inputs_valid(spot, contract.strike, contract.implied_vol, time)
    }

    /// Scale per-unit Greeks into exposures at `spot`
    pub fn scale(&self, unit: &Greeks, open_interest: f64, spot: f64) -> Greeks {
        let size = open_interest * self.pricing.contract_multiplier;
        Greeks {
            delta: unit.delta * size * spot * 0.01,
            gamma: unit.gamma * size * spot * spot * 0.01,
            vanna: unit.vanna * size * spot * 0.01,
            charm: unit.charm * size * spot / 365.0,
        }
    }

    /// Exposure at the live spot, from the Greeks computed at ingestion
    pub fn live_exposure(&self, contract: &Contract, spot: f64, time: f64) -> Greeks {
        if !self.is_valued(contract, spot, time) {
            return Greeks::default();
        }
        self.scale(&contract.greeks, contract.open_interest, spot)
    }

    /// Exposure with the contract revalued at an arbitrary spot
    pub fn exposure_at(&self, contract: &Contract, spot: f64, time: f64) -> Greeks {
        black_scholes::greeks(
            spot,
            contract.strike,
            self.pricing.risk_free_rate,
            self.pricing.dividend_yield,
            contract.implied_vol,
            time,
            contract.option_type,
        )
        .map(|unit| self.scale(&unit, contract.open_interest, spot))
        .unwrap_or_default()
    }
}

/// Apply the dealer sign convention to one contract's exposure
pub fn dealer_signed(option_type: OptionType, exposure: &Greeks) -> Greeks {
    Greeks {
        delta: exposure.delta * option_type.dealer_sign(Greek::Delta),
        gamma: exposure.gamma * option_type.dealer_sign(Greek::Gamma),
        vanna: exposure.vanna * option_type.dealer_sign(Greek::Vanna),
        charm: exposure.charm * option_type.dealer_sign(Greek::Charm),
    }
}

/// Dealer-net total of call-side and put-side exposure
pub fn net_exposure(call: &Greeks, put: &Greeks) -> Greeks {
    dealer_signed(OptionType::Call, call).add(&dealer_signed(OptionType::Put, put))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CalendarMarkers, ContractQuote, RawChain, Snapshot, Ticker};
    use chrono::{Duration, NaiveDate, TimeZone};

    fn two_contract_snapshot() -> Snapshot {
        // 2026-10-16 14:00 EDT, expiry 30 calendar days later
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
                next_expiry: expiry,
                opex: expiry,
                zero_dte: expiry,
            }),
            quotes: vec![quote(OptionType::Call), quote(OptionType::Put)],
            skipped: Vec::new(),
        };
        Snapshot::ingest(raw, &PricingConfig::default()).unwrap()
    }

    #[test]
    fn test_call_put_pair_exposures() {
        let snapshot = two_contract_snapshot();
        let calc = ExposureCalculator::new(PricingConfig::default());

        let exposures: Vec<Greeks> = snapshot
            .contracts
            .iter()
            .map(|c| {
                let t = calc.time_to_expiry(c, snapshot.as_of);
                assert!((t - 30.0 / 365.0).abs() < 1e-12);
                calc.live_exposure(c, snapshot.spot, t)
            })
            .collect();
        let (call, put) = (exposures[0], exposures[1]);

        assert!(call.delta > 0.0 && put.delta < 0.0);
        // Delta parity with q = 0: call Δ - put Δ = 1
        let unit = 500.0 * 100.0 * 100.0 * 0.01;
        assert!((call.delta - put.delta - unit).abs() < 1e-6);

        assert!(call.gamma > 0.0);
        assert!((call.gamma - put.gamma).abs() < 1e-9 * call.gamma.abs());
        assert!((call.vanna - put.vanna).abs() < 1e-9 * call.vanna.abs().max(1.0));
    }

    #[test]
    fn test_revaluation_matches_live_at_spot() {
        let snapshot = two_contract_snapshot();
        let calc = ExposureCalculator::new(PricingConfig::default());
        for c in &snapshot.contracts {
            let t = calc.time_to_expiry(c, snapshot.as_of);
            let live = calc.live_exposure(c, snapshot.spot, t);
            let revalued = calc.exposure_at(c, snapshot.spot, t);
            assert!((live.gamma - revalued.gamma).abs() < 1e-9);
            assert!((live.delta - revalued.delta).abs() < 1e-9);
        }
    }

    #[test]
    fn test_dealer_sign_convention() {
        let exposure = Greeks::new(-10.0, 5.0, 2.0, 1.0);
        let put = dealer_signed(OptionType::Put, &exposure);
        assert_eq!(put, Greeks::new(-10.0, -5.0, -2.0, -1.0));
        assert_eq!(dealer_signed(OptionType::Call, &exposure), exposure);

        let total = net_exposure(&Greeks::new(30.0, 5.0, 2.0, 1.0), &exposure);
        assert_eq!(total, Greeks::new(20.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn test_excluded_contract_contributes_zero() {
        let calc = ExposureCalculator::new(PricingConfig::default());
        let mut contract = two_contract_snapshot().contracts[0].clone();
        contract.implied_vol = 0.0;
        assert_eq!(calc.exposure_at(&contract, 100.0, 0.1), Greeks::default());
        assert_eq!(calc.live_exposure(&contract, 100.0, 0.1), Greeks::default());

        contract.implied_vol = 0.2;
        assert_eq!(calc.exposure_at(&contract, 100.0, 0.0), Greeks::default());
        assert_eq!(calc.exposure_at(&contract, 100.0, -0.01), Greeks::default());
    }
}
