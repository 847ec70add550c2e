//! Snapshot loaders
//!
//! The engine does not download chains itself. A [`SnapshotLoader`] hands it
//! an already-fetched chain, or says plainly that none is available.
//!
//! [`JsonFileLoader`] reads `<dir>/<ticker>_quotedata.json` documents, which
//! are either the string `"Unavailable"` or a chain:
//!
//! ```json
//! { "ticker": "SPY", "spot": 500.0, "as_of": "2026-10-16T18:30:00Z",
//!   "markers": null,
//!   "options": [ { "option": "SPY261120C00500000", "open_interest": 1200, "iv": 0.18 } ] }
//! ```

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::core::{
    CalendarMarkers, ContractQuote, GexError, GexResult, OptionType, RawChain, SkippedRow, Ticker,
};

/// Sentinel document body for "no data yet"
pub const UNAVAILABLE_SENTINEL: &str = "Unavailable";

/// What a loader returned for one ticker
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    Available(RawChain),
    Unavailable,
}

/// Source of parsed option-chain snapshots
#[async_trait]
pub trait SnapshotLoader: Send + Sync {
    /// Load the latest chain for a ticker.
    ///
    /// `Ok(LoadOutcome::Unavailable)` means the source has nothing; `Err` is
    /// reserved for faults such as unreadable or corrupt documents.
    async fn load(&self, ticker: &Ticker) -> GexResult<LoadOutcome>;
}

/// Parsed OCC option symbol
#[derive(Debug, Clone, PartialEq)]
pub struct OccSymbol {
    pub root: String,
    pub expiry: NaiveDate,
    pub option_type: OptionType,
    pub strike: f64,
}

/// Parse an OCC option symbol
/// Format: [root][YYMMDD][C/P][strike × 1000, 8 digits]
/// Example: SPY261120C00500000 (SPY 2026-11-20 500 Call)
pub fn parse_occ_symbol(symbol: &str) -> Option<OccSymbol> {
    let symbol = symbol.trim();
    if symbol.len() < 16 || !symbol.is_ascii() {
        return None;
    }

    let split = symbol.len() - 15;
    let (root, rest) = symbol.split_at(split);
    let root = root.trim_end();
    if root.is_empty() {
        return None;
    }

    let yy: i32 = rest[0..2].parse().ok()?;
    let mm: u32 = rest[2..4].parse().ok()?;
    let dd: u32 = rest[4..6].parse().ok()?;
    let expiry = NaiveDate::from_ymd_opt(2000 + yy, mm, dd)?;

    let option_type = match &rest[6..7] {
        "C" => OptionType::Call,
        "P" => OptionType::Put,
        _ => return None,
    };

    let digits = &rest[7..];
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let strike = digits.parse::<u64>().ok()? as f64 / 1000.0;

    Some(OccSymbol {
        root: root.to_string(),
        expiry,
        option_type,
        strike,
    })
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QuoteDocument {
    Sentinel(String),
    Chain(ChainDocument),
}

#[derive(Debug, Deserialize)]
struct ChainDocument {
    #[serde(default)]
    ticker: Option<String>,
    spot: f64,
    as_of: DateTime<Utc>,
    #[serde(default)]
    markers: Option<CalendarMarkers>,
    #[serde(default)]
    options: Vec<OptionRow>,
}

#[derive(Debug, Deserialize)]
struct OptionRow {
    option: String,
    #[serde(default)]
    open_interest: Option<f64>,
    /// Missing IV is kept as zero, which excludes the contract from valuation
    #[serde(default)]
    iv: Option<f64>,
}

/// Parse one quote document for `ticker`
pub fn parse_quote_document(ticker: &Ticker, text: &str) -> GexResult<LoadOutcome> {
    let document: QuoteDocument = serde_json::from_str(text)
        .map_err(|e| GexError::data(format!("{}: malformed quote document: {}", ticker, e)))?;

    let chain = match document {
        QuoteDocument::Sentinel(s) if s.eq_ignore_ascii_case(UNAVAILABLE_SENTINEL) => {
            return Ok(LoadOutcome::Unavailable);
        }
        QuoteDocument::Sentinel(s) => {
            return Err(GexError::data(format!("{}: unexpected document '{}'", ticker, s)));
        }
        QuoteDocument::Chain(chain) => chain,
    };

    if let Some(doc_ticker) = chain.ticker.as_deref() {
        if Ticker::new(doc_ticker) != *ticker {
            return Err(GexError::data(format!(
                "document for {} found under {}",
                doc_ticker, ticker
            )));
        }
    }

    let mut quotes = Vec::with_capacity(chain.options.len());
    let mut skipped = Vec::new();
    for row in chain.options {
        match parse_occ_symbol(&row.option) {
            Some(occ) => quotes.push(ContractQuote {
                strike: occ.strike,
                expiry: occ.expiry,
                option_type: occ.option_type,
                open_interest: row.open_interest.unwrap_or(0.0),
                implied_vol: row.iv.unwrap_or(0.0),
                symbol: Some(row.option),
            }),
            None => skipped.push(SkippedRow {
                reason: "unparseable option symbol".into(),
                symbol: row.option,
            }),
        }
    }

    Ok(LoadOutcome::Available(RawChain {
        ticker: ticker.clone(),
        spot: chain.spot,
        as_of: chain.as_of,
        markers: chain.markers,
        quotes,
        skipped,
    }))
}

/// Loads `<dir>/<ticker lowercase>_quotedata.json`
#[derive(Debug, Clone)]
pub struct JsonFileLoader {
    dir: PathBuf,
}

impl JsonFileLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, ticker: &Ticker) -> PathBuf {
        self.dir
            .join(format!("{}_quotedata.json", ticker.as_str().to_ascii_lowercase()))
    }
}

#[async_trait]
impl SnapshotLoader for JsonFileLoader {
    async fn load(&self, ticker: &Ticker) -> GexResult<LoadOutcome> {
        let path = self.path_for(ticker);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("{}: no quote document at {}", ticker, path.display());
                return Ok(LoadOutcome::Unavailable);
            }
            Err(e) => return Err(e.into()),
        };
        parse_quote_document(ticker, &text)
    }
}
