//! Range aggregate queries
//!
//! An [`AggregateResolver`] answers "aggregate X of observation Y over
//! timespan Z" by asking a chain of [`AggregateProvider`]s in order until one
//! finds the query applicable: derived types first (degree days, vector
//! composites), then the daily-summary fast path, then a raw-archive scan.

pub mod archive;
pub mod daily;
pub mod degree_days;
pub mod resolver;
pub mod vector;

pub use archive::*;
pub use daily::*;
pub use degree_days::*;
pub use resolver::*;
pub use vector::*;

use thiserror::Error;
use weex_core::{convert, AggregateType, CoreError, Timespan, UnitError, ValueTuple};
use weex_daysum::{DailySummaryStore, DaySumError};
use weex_db::DbError;

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("Unknown observation type: {0}")]
    UnknownType(String),

    #[error("Unknown aggregation {aggregate} for {obs_type}")]
    UnknownAggregation {
        obs_type: String,
        aggregate: AggregateType,
    },

    #[error("Aggregation {aggregate} requires option '{option}'")]
    MissingOption {
        aggregate: AggregateType,
        option: &'static str,
    },

    #[error("Store error: {0}")]
    Store(#[from] DaySumError),

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error(transparent)]
    Unit(#[from] UnitError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<rusqlite::Error> for AggregateError {
    fn from(err: rusqlite::Error) -> Self {
        AggregateError::Db(DbError::from(err))
    }
}

pub type AggregateResult<T> = Result<T, AggregateError>;

/// What a provider made of a query
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// The provider answered; the value is in the store's unit system
    Applicable(Option<f64>),
    /// Ask the next provider
    NotApplicable,
}

/// Extra arguments some aggregates need
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateOptions {
    /// Threshold of the day-count aggregates (`max_ge` and friends)
    pub val: Option<ValueTuple>,
}

impl AggregateOptions {
    pub fn with_val(val: ValueTuple) -> Self {
        Self { val: Some(val) }
    }

    /// The `val` threshold expressed in `unit`. A threshold without a unit
    /// is taken to be in `unit` already.
    pub fn threshold(&self, aggregate: AggregateType, unit: Option<&str>) -> AggregateResult<f64> {
        let missing = || AggregateError::MissingOption {
            aggregate,
            option: "val",
        };
        let val = self.val.as_ref().ok_or_else(missing)?;
        let value = match (val.unit.as_deref(), unit) {
            (Some(_), Some(target)) => convert(val, target)?.value,
            _ => val.value,
        };
        value.ok_or_else(missing)
    }
}

/// One strategy for answering aggregate queries
pub trait AggregateProvider {
    fn name(&self) -> &'static str;

    /// Whether this provider knows the observation type at all
    fn recognizes(&self, store: &DailySummaryStore, obs_type: &str) -> bool;

    fn get_aggregate(
        &self,
        store: &DailySummaryStore,
        obs_type: &str,
        span: Timespan,
        aggregate: AggregateType,
        options: &AggregateOptions,
    ) -> AggregateResult<Outcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_conversion() {
        let opts = AggregateOptions::with_val(ValueTuple::new(Some(10.0), Some("degree_C"), None));
        let f = opts.threshold(AggregateType::MaxGe, Some("degree_F")).unwrap();
        assert!((f - 50.0).abs() < 1e-9);

        let bare = AggregateOptions::with_val(ValueTuple::new(Some(3.0), None, None));
        assert_eq!(bare.threshold(AggregateType::SumGe, Some("inch")).unwrap(), 3.0);
    }

    #[test]
    fn test_threshold_missing() {
        assert!(matches!(
            AggregateOptions::default().threshold(AggregateType::MinLe, None),
            Err(AggregateError::MissingOption { option: "val", .. })
        ));
        let wrong = AggregateOptions::with_val(ValueTuple::new(Some(1.0), Some("inch"), None));
        assert!(matches!(
            wrong.threshold(AggregateType::MaxGe, Some("degree_F")),
            Err(AggregateError::Unit(_))
        ));
    }
}
