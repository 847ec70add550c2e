//! Cohort aggregation
//!
//! Contracts are first narrowed by the request's [`ExpirationSelector`], then
//! grouped into three expiry cohorts by comparing expirations with the
//! snapshot's calendar markers:
//!
//! - `All`: every selected contract
//! - `ExNext`: expirations strictly after the next expiry
//! - `NextMonthly`: expirations on the monthly OPEX date
//!
//! Profiles sum dealer-signed exposure per grid point; strike and date
//! buckets sum call, put and net exposure at the live spot.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::{CalendarMarkers, Contract, ExpirationSelector, Greeks, OptionType};

use super::calculator::{dealer_signed, net_exposure, ExposureCalculator};

/// Expiry cohort
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cohort {
    All,
    ExNext,
    NextMonthly,
}

impl Cohort {
    pub const ALL: [Cohort; 3] = [Cohort::All, Cohort::ExNext, Cohort::NextMonthly];

    /// Whether a contract expiring on `expiry` belongs to this cohort
    pub fn contains(&self, expiry: NaiveDate, markers: &CalendarMarkers) -> bool {
        match self {
            Cohort::All => true,
            Cohort::ExNext => expiry > markers.next_expiry,
            Cohort::NextMonthly => expiry == markers.opex,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Cohort::All => 0,
            Cohort::ExNext => 1,
            Cohort::NextMonthly => 2,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Cohort::All => "All Expiries",
            Cohort::ExNext => "Ex-Next Expiry",
            Cohort::NextMonthly => "Next Monthly",
        }
    }
}

impl fmt::Display for Cohort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether a selector keeps a contract expiring on `expiry`
pub fn selector_includes(
    selector: ExpirationSelector,
    expiry: NaiveDate,
    markers: &CalendarMarkers,
) -> bool {
    match selector {
        ExpirationSelector::All => true,
        ExpirationSelector::Monthly => {
            expiry.year() == markers.next_expiry.year()
                && expiry.month() == markers.next_expiry.month()
        }
        ExpirationSelector::Opex => expiry == markers.opex,
        ExpirationSelector::ZeroDte => expiry == markers.zero_dte,
    }
}

/// A selected contract with everything needed to revalue it
#[derive(Debug, Clone, Copy)]
pub struct CohortMember<'a> {
    pub contract: &'a Contract,
    /// Years to expiry at the snapshot time
    pub time: f64,
    /// Membership flags, indexed by [`Cohort::index`]
    pub cohorts: [bool; 3],
}

impl<'a> CohortMember<'a> {
    pub fn new(contract: &'a Contract, time: f64, markers: &CalendarMarkers) -> Self {
        let mut cohorts = [false; 3];
        for cohort in Cohort::ALL {
            cohorts[cohort.index()] = cohort.contains(contract.expiry, markers);
        }
        Self {
            contract,
            time,
            cohorts,
        }
    }

    pub fn in_cohort(&self, cohort: Cohort) -> bool {
        self.cohorts[cohort.index()]
    }
}

/// Select contracts for a selector and tag their cohorts
pub fn select_members<'a>(
    contracts: &'a [Contract],
    selector: ExpirationSelector,
    markers: &CalendarMarkers,
    as_of: DateTime<Utc>,
    calc: &ExposureCalculator,
) -> Vec<CohortMember<'a>> {
    contracts
        .iter()
        .filter(|c| selector_includes(selector, c.expiry, markers))
        .map(|c| CohortMember::new(c, calc.time_to_expiry(c, as_of), markers))
        .collect()
}

/// Dealer-signed exposure per cohort at one spot level, indexed by [`Cohort::index`]
pub fn cohort_totals_at(
    calc: &ExposureCalculator,
    members: &[CohortMember<'_>],
    spot: f64,
) -> [Greeks; 3] {
    let mut totals = [Greeks::default(); 3];
    for member in members {
        let exposure = calc.exposure_at(member.contract, spot, member.time);
        let signed = dealer_signed(member.contract.option_type, &exposure);
        for (total, included) in totals.iter_mut().zip(member.cohorts) {
            if included {
                *total = total.add(&signed);
            }
        }
    }
    totals
}

/// Cohort totals at every grid level, evaluated in parallel across levels
pub fn profile_points(
    calc: &ExposureCalculator,
    members: &[CohortMember<'_>],
    levels: &[f64],
) -> Vec<[Greeks; 3]> {
    levels
        .par_iter()
        .map(|&spot| cohort_totals_at(calc, members, spot))
        .collect()
}

/// Bucket key for bar-style aggregates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketKey {
    Strike(f64),
    Expiry(NaiveDate),
}

impl BucketKey {
    pub fn strike(&self) -> Option<f64> {
        match self {
            BucketKey::Strike(strike) => Some(*strike),
            BucketKey::Expiry(_) => None,
        }
    }

    pub fn expiry(&self) -> Option<NaiveDate> {
        match self {
            BucketKey::Strike(_) => None,
            BucketKey::Expiry(date) => Some(*date),
        }
    }
}

/// Live-spot exposure for one strike or expiration bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrikeAggregate {
    pub key: BucketKey,
    /// Call-side exposure, unsigned
    pub call: Greeks,
    /// Put-side exposure, unsigned
    pub put: Greeks,
    /// Dealer-net exposure
    pub total: Greeks,
    /// Mean implied volatility of the bucket's valued calls
    pub call_iv: Option<f64>,
    /// Mean implied volatility of the bucket's valued puts
    pub put_iv: Option<f64>,
}

#[derive(Default)]
struct BucketAcc {
    call: Greeks,
    put: Greeks,
    call_iv: (f64, usize),
    put_iv: (f64, usize),
}

impl BucketAcc {
    fn push(&mut self, option_type: OptionType, exposure: &Greeks, iv: Option<f64>) {
        let (side, iv_acc) = match option_type {
            OptionType::Call => (&mut self.call, &mut self.call_iv),
            OptionType::Put => (&mut self.put, &mut self.put_iv),
        };
        *side = side.add(exposure);
        if let Some(iv) = iv {
            iv_acc.0 += iv;
            iv_acc.1 += 1;
        }
    }

    fn finish(self, key: BucketKey) -> StrikeAggregate {
        let mean = |(sum, n): (f64, usize)| (n > 0).then(|| sum / n as f64);
        StrikeAggregate {
            key,
            total: net_exposure(&self.call, &self.put),
            call: self.call,
            put: self.put,
            call_iv: mean(self.call_iv),
            put_iv: mean(self.put_iv),
        }
    }
}

/// Live-spot aggregates grouped by strike (ascending)
pub fn aggregate_by_strike(
    calc: &ExposureCalculator,
    members: &[CohortMember<'_>],
    spot: f64,
) -> Vec<StrikeAggregate> {
    let mut ordered: Vec<&CohortMember<'_>> = members.iter().collect();
    ordered.sort_by(|a, b| a.contract.strike.total_cmp(&b.contract.strike));
    group_consecutive(calc, ordered, spot, |m| BucketKey::Strike(m.contract.strike))
}

/// Live-spot aggregates grouped by expiration date (ascending)
pub fn aggregate_by_expiry(
    calc: &ExposureCalculator,
    members: &[CohortMember<'_>],
    spot: f64,
) -> Vec<StrikeAggregate> {
    let mut ordered: Vec<&CohortMember<'_>> = members.iter().collect();
    ordered.sort_by_key(|m| m.contract.expiry);
    group_consecutive(calc, ordered, spot, |m| BucketKey::Expiry(m.contract.expiry))
}

fn group_consecutive(
    calc: &ExposureCalculator,
    ordered: Vec<&CohortMember<'_>>,
    spot: f64,
    key_of: impl Fn(&CohortMember<'_>) -> BucketKey,
) -> Vec<StrikeAggregate> {
    let mut rows = Vec::new();
    let mut current: Option<(BucketKey, BucketAcc)> = None;

    for member in ordered {
        let key = key_of(member);
        let contract = member.contract;
        let exposure = calc.live_exposure(contract, spot, member.time);
        let iv = calc
            .is_valued(contract, spot, member.time)
            .then_some(contract.implied_vol);

        if let Some((k, acc)) = current.as_mut() {
            if *k == key {
                acc.push(contract.option_type, &exposure, iv);
                continue;
            }
        }
        if let Some((k, acc)) = current.take() {
            rows.push(acc.finish(k));
        }
        let mut acc = BucketAcc::default();
        acc.push(contract.option_type, &exposure, iv);
        current = Some((key, acc));
    }

    if let Some((k, acc)) = current {
        rows.push(acc.finish(k));
    }
    rows
}
