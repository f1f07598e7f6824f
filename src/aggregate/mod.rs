//! Aggregation of per-rank trace records into per-phase matrices and histograms.

pub mod error;
pub mod matrix;
pub mod state;

pub use error::AggregationError;
pub use matrix::RankMatrix;
pub use state::{AggregationState, FinalizedRun, PhaseAggregate};
