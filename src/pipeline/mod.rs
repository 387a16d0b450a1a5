//! Scrape-normalize-persist-detect pipeline.
//!
//! - [`normalizer`] turns a raw page into canonical records.
//! - [`detector`] compares them with the pool's baseline.
//! - [`cycle`] runs one cycle end to end against the store.

pub mod cycle;
pub mod detector;
pub mod normalizer;

pub use cycle::{CycleOutcome, CycleRunner};
pub use detector::{AnomalyDetector, AnomalyThresholds, SeverityBand};
pub use normalizer::normalize;
