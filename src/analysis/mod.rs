//! Analysis modules.
//!
//! Aggregation of a pending batch into per-entity counts.

pub mod aggregator;

pub use aggregator::*;
