//! Aggregation engine.
//!
//! The reusable core of the pipeline: grouped counting and percentage
//! rollups over an in-memory dataset.

pub mod aggregator;

pub use aggregator::*;
