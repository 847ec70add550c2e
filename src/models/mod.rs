//! Pricing models
//!
//! Black-Scholes closed forms for the Greeks the exposure engine aggregates.

pub mod black_scholes;

pub use black_scholes::*;
