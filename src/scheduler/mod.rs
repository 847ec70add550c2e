//! Refresh scheduling
//!
//! Window-based triggers and the controller that keeps snapshots fresh,
//! queueing one fast retry for tickers that came back with zero net delta.

pub mod controller;
pub mod schedule;

pub use controller::*;
pub use schedule::*;
