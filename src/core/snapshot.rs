//! Option-chain snapshots
//!
//! A [`RawChain`] is what a loader hands over: parsed rows, spot and as-of
//! time. [`Snapshot::ingest`] turns it into the immutable per-ticker snapshot
//! the calculator reads, valuing every contract once at the live spot.

use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::error::{GexError, GexResult};
use super::option::{third_friday, Contract, OptionType, Ticker};
use crate::config::PricingConfig;
use crate::models::black_scholes;

/// Calendar dates that define cohorts and expiration selectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarMarkers {
    /// Earliest listed expiration on or after the as-of date
    pub next_expiry: NaiveDate,
    /// Standard monthly expiration (third Friday)
    pub opex: NaiveDate,
    /// Front listed expiration, same-day when one is listed
    pub zero_dte: NaiveDate,
}

impl CalendarMarkers {
    /// Derive markers from the listed expirations
    pub fn derive(as_of: NaiveDate, expirations: impl IntoIterator<Item = NaiveDate>) -> Self {
        let next_expiry = expirations
            .into_iter()
            .filter(|&d| d >= as_of)
            .min()
            .unwrap_or(as_of);

        Self {
            next_expiry,
            opex: monthly_opex(as_of, next_expiry),
            zero_dte: next_expiry,
        }
    }
}

/// Third Friday of the next-expiry month, rolled forward a month if it has passed
fn monthly_opex(as_of: NaiveDate, next_expiry: NaiveDate) -> NaiveDate {
    let (year, month) = (next_expiry.year(), next_expiry.month());
    match third_friday(year, month) {
        Some(friday) if friday >= as_of => friday,
        _ => {
            let (year, month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
            third_friday(year, month).unwrap_or(next_expiry)
        }
    }
}

/// One parsed chain row before valuation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractQuote {
    pub strike: f64,
    pub expiry: NaiveDate,
    pub option_type: OptionType,
    pub open_interest: f64,
    pub implied_vol: f64,
    pub symbol: Option<String>,
}

/// A row dropped during loading or ingestion, kept for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRow {
    pub symbol: String,
    pub reason: String,
}

/// Chain as supplied by a loader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawChain {
    pub ticker: Ticker,
    pub spot: f64,
    pub as_of: DateTime<Utc>,
    /// Explicit markers; derived from the expirations when absent
    pub markers: Option<CalendarMarkers>,
    pub quotes: Vec<ContractQuote>,
    /// Rows the loader could not parse
    pub skipped: Vec<SkippedRow>,
}

/// Live snapshot for one ticker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub ticker: Ticker,
    pub spot: f64,
    pub as_of: DateTime<Utc>,
    pub markers: CalendarMarkers,
    /// Contracts in chain order
    pub contracts: Vec<Contract>,
    /// Rows dropped by the loader or during ingestion
    pub skipped: Vec<SkippedRow>,
}

impl Snapshot {
    /// Validate a raw chain and value each contract at the live spot.
    ///
    /// Malformed rows are skipped and recorded; only an unusable spot fails
    /// the whole snapshot.
    pub fn ingest(raw: RawChain, pricing: &PricingConfig) -> GexResult<Self> {
        if !(raw.spot.is_finite() && raw.spot > 0.0) {
            return Err(GexError::data(format!(
                "{}: spot price {} is not usable",
                raw.ticker, raw.spot
            )));
        }

        let mut skipped = raw.skipped;
        let mut contracts = Vec::with_capacity(raw.quotes.len());

        for quote in raw.quotes {
            if let Some(reason) = malformed_reason(&quote) {
                skipped.push(SkippedRow {
                    symbol: quote.symbol.clone().unwrap_or_else(|| {
                        format!("{:?} {} {}", quote.option_type, quote.strike, quote.expiry)
                    }),
                    reason,
                });
                continue;
            }

            let time = super::option::time_to_expiry(
                quote.expiry,
                raw.as_of,
                pricing.timezone,
                pricing.expiry_close,
            );
            let greeks = black_scholes::greeks(
                raw.spot,
                quote.strike,
                pricing.risk_free_rate,
                pricing.dividend_yield,
                quote.implied_vol,
                time,
                quote.option_type,
            )
            .unwrap_or_default();

            contracts.push(Contract {
                strike: quote.strike,
                expiry: quote.expiry,
                option_type: quote.option_type,
                open_interest: quote.open_interest,
                implied_vol: quote.implied_vol,
                symbol: quote.symbol,
                greeks,
            });
        }

        if !skipped.is_empty() {
            tracing::warn!(
                "{}: skipped {} malformed rows during ingestion",
                raw.ticker,
                skipped.len()
            );
        }

        let as_of_date = raw.as_of.with_timezone(&pricing.timezone).date_naive();
        let markers = raw.markers.unwrap_or_else(|| {
            CalendarMarkers::derive(as_of_date, contracts.iter().map(|c| c.expiry))
        });

        Ok(Self {
            ticker: raw.ticker,
            spot: raw.spot,
            as_of: raw.as_of,
            markers,
            contracts,
            skipped,
        })
    }

    /// Human-readable as-of time in the exchange timezone, e.g. "2026 Oct 16, 02:30 PM EDT"
    pub fn as_of_label(&self, pricing: &PricingConfig) -> String {
        self.as_of
            .with_timezone(&pricing.timezone)
            .format("%Y %b %d, %I:%M %p %Z")
            .to_string()
    }

    /// All listed expirations, ascending and de-duplicated
    pub fn expirations(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self.contracts.iter().map(|c| c.expiry).collect();
        dates.sort();
        dates.dedup();
        dates
    }
}

fn malformed_reason(quote: &ContractQuote) -> Option<String> {
    if !quote.strike.is_finite() {
        Some(format!("non-finite strike {}", quote.strike))
    } else if !quote.implied_vol.is_finite() {
        Some(format!("non-finite implied volatility {}", quote.implied_vol))
    } else if !quote.open_interest.is_finite() || quote.open_interest < 0.0 {
        Some(format!("invalid open interest {}", quote.open_interest))
    } else {
        None
    }
}

/// What the calculator is handed for a ticker
#[derive(Debug, Clone)]
pub enum ChainData {
    Available(Arc<Snapshot>),
    Unavailable,
}

impl ChainData {
    pub fn snapshot(&self) -> Option<&Arc<Snapshot>> {
        match self {
            ChainData::Available(snapshot) => Some(snapshot),
            ChainData::Unavailable => None,
        }
    }
}
