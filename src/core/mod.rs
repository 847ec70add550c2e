//! Core data types for the exposure engine
//!
//! Defines fundamental types:
//! - Contract: strike, expiry, type, open interest, IV and per-unit Greeks
//! - Snapshot: one ticker's live chain with spot and calendar markers
//! - Greeks: delta, gamma, vanna, charm

pub mod error;
pub mod greeks;
pub mod option;
pub mod snapshot;

pub use error::*;
pub use greeks::*;
pub use option::*;
pub use snapshot::*;
