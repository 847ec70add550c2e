//! Option contract definitions
//!
//! Contracts as the exposure engine sees them: strike, expiry, type, open
//! interest and implied volatility, plus the per-unit Greeks at live spot.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::GexError;
use super::greeks::{Greek, Greeks};

/// Seconds in the 365-day year used for same-day time to expiry
pub const SECONDS_PER_YEAR: f64 = 365.0 * 86_400.0;

/// Option type (Call or Put)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    /// Sign applied when netting this side into a total.
    ///
    /// Dealers are assumed long calls and short puts, so put gamma, vanna and
    /// charm subtract. Delta carries its own sign already.
    pub fn dealer_sign(&self, greek: Greek) -> f64 {
        match (self, greek) {
            (_, Greek::Delta) => 1.0,
            (OptionType::Call, _) => 1.0,
            (OptionType::Put, _) => -1.0,
        }
    }
}

/// Underlying symbol, normalised to upper case
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Ticker(String);

impl Ticker {
    pub fn new(symbol: impl AsRef<str>) -> Self {
        Self(symbol.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Ticker {
    fn from(s: &str) -> Self {
        Ticker::new(s)
    }
}

impl From<String> for Ticker {
    fn from(s: String) -> Self {
        Ticker::new(s)
    }
}

impl From<Ticker> for String {
    fn from(ticker: Ticker) -> Self {
        ticker.0
    }
}

/// Which slice of the chain a computation covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpirationSelector {
    #[serde(rename = "all")]
    All,
    #[serde(rename = "monthly")]
    Monthly,
    #[serde(rename = "opex")]
    Opex,
    #[serde(rename = "0dte")]
    ZeroDte,
}

impl ExpirationSelector {
    pub const ALL: [ExpirationSelector; 4] = [
        ExpirationSelector::All,
        ExpirationSelector::Monthly,
        ExpirationSelector::Opex,
        ExpirationSelector::ZeroDte,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExpirationSelector::All => "all",
            ExpirationSelector::Monthly => "monthly",
            ExpirationSelector::Opex => "opex",
            ExpirationSelector::ZeroDte => "0dte",
        }
    }
}

impl fmt::Display for ExpirationSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpirationSelector {
    type Err = GexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(ExpirationSelector::All),
            "monthly" => Ok(ExpirationSelector::Monthly),
            "opex" => Ok(ExpirationSelector::Opex),
            "0dte" => Ok(ExpirationSelector::ZeroDte),
            other => Err(GexError::invalid_input(format!(
                "unknown expiration selector '{}'",
                other
            ))),
        }
    }
}

/// Option contract from one snapshot. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    /// Strike price
    pub strike: f64,
    /// Expiration date
    pub expiry: NaiveDate,
    /// Option type (Call/Put)
    pub option_type: OptionType,
    /// Open interest in contracts
    pub open_interest: f64,
    /// Implied volatility as quoted by the provider
    pub implied_vol: f64,
    /// Contract symbol (exchange-specific)
    pub symbol: Option<String>,
    /// Per-unit Greeks at the snapshot's live spot (zero when excluded)
    pub greeks: Greeks,
}

impl Contract {
    /// Time to expiry in years as of `as_of`.
    ///
    /// Later-day expirations count whole calendar days over 365; same-day
    /// expirations use the seconds remaining until the close.
    pub fn time_to_expiry(&self, as_of: DateTime<Utc>, tz: Tz, close: NaiveTime) -> f64 {
        time_to_expiry(self.expiry, as_of, tz, close)
    }
}

/// Time to expiry in years for an expiration date, see [`Contract::time_to_expiry`]
pub fn time_to_expiry(expiry: NaiveDate, as_of: DateTime<Utc>, tz: Tz, close: NaiveTime) -> f64 {
    let local_date = as_of.with_timezone(&tz).date_naive();
    let days = (expiry - local_date).num_days();

    if days != 0 {
        return days as f64 / 365.0;
    }

    match expiration_instant(expiry, tz, close) {
        Some(close_at) => (close_at - as_of).num_seconds() as f64 / SECONDS_PER_YEAR,
        None => 0.0,
    }
}

/// Instant an expiration settles: the close on its date, in the exchange timezone
pub fn expiration_instant(expiry: NaiveDate, tz: Tz, close: NaiveTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&expiry.and_time(close))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Third Friday of the given month
pub fn third_friday(year: i32, month: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let offset = (7 + 4 - first.weekday().num_days_from_monday() as i64) % 7;
    Some(first + chrono::Duration::days(offset + 14))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ny() -> Tz {
        chrono_tz::America::New_York
    }

    fn close() -> NaiveTime {
        NaiveTime::from_hms_opt(16, 0, 0).unwrap()
    }

    #[test]
    fn test_option_type() {
        assert_eq!(OptionType::Put.dealer_sign(Greek::Delta), 1.0);
        assert_eq!(OptionType::Put.dealer_sign(Greek::Gamma), -1.0);
        assert_eq!(OptionType::Call.dealer_sign(Greek::Charm), 1.0);
    }

    #[test]
    fn test_selector_round_trip_from_str() {
        for selector in ExpirationSelector::ALL {
            assert_eq!(selector.as_str().parse::<ExpirationSelector>().unwrap(), selector);
        }
        assert!("weekly".parse::<ExpirationSelector>().is_err());
        assert_eq!(" 0DTE ".parse::<ExpirationSelector>().unwrap(), ExpirationSelector::ZeroDte);
    }

    #[test]
    fn test_ticker_normalised() {
        assert_eq!(Ticker::new(" spy ").as_str(), "SPY");
        assert_eq!(Ticker::from("qqq"), Ticker::new("QQQ"));
    }

    #[test]
    fn test_time_to_expiry_calendar_days() {
        // 2026-10-16 14:30 EDT
        let as_of = Utc.with_ymd_and_hms(2026, 10, 16, 18, 30, 0).unwrap();
        let expiry = NaiveDate::from_ymd_opt(2026, 11, 15).unwrap();
        let t = time_to_expiry(expiry, as_of, ny(), close());
        assert!((t - 30.0 / 365.0).abs() < 1e-12);
    }

    #[test]
    fn test_time_to_expiry_same_day_fraction() {
        // 14:00 EDT, 2 hours before the close
        let as_of = Utc.with_ymd_and_hms(2026, 10, 16, 18, 0, 0).unwrap();
        let expiry = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        let t = time_to_expiry(expiry, as_of, ny(), close());
        assert!((t - 7200.0 / SECONDS_PER_YEAR).abs() < 1e-12);

        // After the close the contract has lapsed
        let late = Utc.with_ymd_and_hms(2026, 10, 16, 21, 0, 0).unwrap();
        assert!(time_to_expiry(expiry, late, ny(), close()) < 0.0);
    }

    #[test]
    fn test_third_friday() {
        assert_eq!(third_friday(2026, 10), NaiveDate::from_ymd_opt(2026, 10, 16));
        assert_eq!(third_friday(2026, 11), NaiveDate::from_ymd_opt(2026, 11, 20));
        assert_eq!(third_friday(2025, 1), NaiveDate::from_ymd_opt(2025, 1, 17));
    }
}
