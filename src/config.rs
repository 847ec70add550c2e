//! Engine configuration
//!
//! Everything that shapes a computation or the refresh loop lives here rather
//! than being passed per call. All sections have defaults, so a JSON file only
//! needs the keys it overrides.

use std::path::Path;

use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::core::{ExpirationSelector, GexError, GexResult, Ticker};
use crate::scheduler::WindowRule;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub pricing: PricingConfig,
    pub grid: GridConfig,
    pub cache: CacheConfig,
    pub retry: RetryConfig,
    pub schedule: ScheduleConfig,
    pub fetch: FetchConfig,
    /// Tickers refreshed by the full cycle
    pub universe: Universe,
    /// Selectors computed right after each ingestion
    pub warm_selectors: WarmSelectors,
}

impl EngineConfig {
    /// Load from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> GexResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&text)
            .map_err(|e| GexError::config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> GexResult<()> {
        if self.grid.points < 2 {
            return Err(GexError::config("grid.points must be at least 2"));
        }
        if !(self.grid.band > 0.0 && self.grid.band < 1.0) {
            return Err(GexError::config("grid.band must be in (0, 1)"));
        }
        if !(self.pricing.contract_multiplier > 0.0) {
            return Err(GexError::config("pricing.contract_multiplier must be positive"));
        }
        if !self.pricing.risk_free_rate.is_finite() || !self.pricing.dividend_yield.is_finite() {
            return Err(GexError::config("pricing rates must be finite"));
        }
        if self.fetch.max_concurrent == 0 {
            return Err(GexError::config("fetch.max_concurrent must be at least 1"));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(GexError::config("fetch.timeout_secs must be at least 1"));
        }
        if self.schedule.tick_millis == 0 {
            return Err(GexError::config("schedule.tick_millis must be at least 1"));
        }
        for rule in self.schedule.full.iter().chain(self.schedule.fast.iter()) {
            rule.validate()?;
        }
        Ok(())
    }
}

/// Pricing constants shared by every contract
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Continuously compounded risk-free rate
    pub risk_free_rate: f64,
    /// Continuous dividend yield
    pub dividend_yield: f64,
    /// Shares per contract
    pub contract_multiplier: f64,
    /// Exchange timezone for expirations and schedules
    pub timezone: Tz,
    /// Local time at which an expiration settles
    pub expiry_close: NaiveTime,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.05,
            dividend_yield: 0.0,
            contract_multiplier: 100.0,
            timezone: chrono_tz::America::New_York,
            expiry_close: NaiveTime::from_hms_opt(16, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

/// Synthetic spot grid around the live spot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Half-width as a fraction of spot (0.2 = ±20%)
    pub band: f64,
    /// Number of grid points, bounds included
    pub points: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            band: 0.2,
            points: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Bundle lifetime
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 900 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Minutes after an expiration's close during which a zero result is still suspicious
    pub grace_minutes: i64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { grace_minutes: 15 }
    }
}

/// Timer rules for the refresh loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Full-universe refresh
    pub full: Vec<WindowRule>,
    /// Retry-set drain
    pub fast: Vec<WindowRule>,
    /// How often the loop evaluates the rules
    pub tick_millis: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            full: vec![
                WindowRule::weekdays(9, 0, 16, 0, 15 * 60),
                WindowRule::weekdays(16, 0, 16, 31, 15 * 60),
            ],
            fast: vec![
                WindowRule::weekdays(9, 0, 16, 0, 5),
                WindowRule::weekdays(16, 0, 16, 31, 5),
            ],
            tick_millis: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-ticker load timeout
    pub timeout_secs: u64,
    /// Loads in flight at once
    pub max_concurrent: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_concurrent: 4,
        }
    }
}

/// Ticker universe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Universe(pub Vec<Ticker>);

impl Default for Universe {
    fn default() -> Self {
        Self(
            [
                "SPX", "SPY", "QQQ", "IWM", "AAPL", "MSFT", "NVDA", "AMZN", "META", "GOOGL",
                "TSLA",
            ]
            .into_iter()
            .map(Ticker::new)
            .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WarmSelectors(pub Vec<ExpirationSelector>);

impl Default for WarmSelectors {
    fn default() -> Self {
        Self(vec![ExpirationSelector::All])
    }
}
