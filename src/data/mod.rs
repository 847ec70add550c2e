//! Snapshot loading and result caching
//!
//! Handles:
//! - Quote documents on disk behind the [`SnapshotLoader`] seam
//! - Single-flight compute cache with TTL and generation fencing
//! - Sync records for client staleness checks

pub mod cache;
pub mod loader;

pub use cache::*;
pub use loader::*;
