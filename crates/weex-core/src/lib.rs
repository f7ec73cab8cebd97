//! Core data types, units, and rollup calculations for WeeWX
//!
//! This crate provides the fundamental data structures shared by the
//! daily-summary store and the aggregate resolver: typed records, the
//! observation-type registry, the mergeable [`Accumulator`], day-boundary
//! arithmetic and the unit catalog.

pub mod obs;
pub mod rollups;
pub mod timespan;
pub mod types;
pub mod units;

pub use obs::*;
pub use rollups::*;
pub use timespan::*;
pub use types::*;
pub use units::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Unknown observation type: {0}")]
    UnknownType(String),

    #[error("Unknown aggregation type: {0}")]
    UnknownAggregation(String),

    #[error("Invalid observation type name: {0}")]
    InvalidName(String),

    #[error("Unknown unit system: {0}")]
    UnknownUnitSystem(String),

    #[error("Unknown time zone: {0}")]
    UnknownTimeZone(String),

    #[error("Invalid timespan: start {start} is after stop {stop}")]
    InvalidTimespan { start: i64, stop: i64 },

    #[error("Accumulator kind mismatch: expected {expected}, found {found}")]
    KindMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

pub type CoreResult<T> = Result<T, CoreError>;
