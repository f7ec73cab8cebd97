//! Daily summaries
//!
//! Maintains one rollup row per observation type and archive day on top of
//! the raw archive table, either incrementally as records arrive
//! ([`DailySummaryStore::add_record`]) or by rebuilding everything from the
//! archive ([`BackfillEngine`]).

pub mod backfill;
pub mod store;

pub use backfill::*;
pub use store::*;

use thiserror::Error;
use weex_core::{CoreError, UnitSystem};
use weex_db::DbError;

#[derive(Debug, Error)]
pub enum DaySumError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Unit system mismatch: store uses {expected}, record uses {found}")]
    UnitSystemMismatch {
        expected: UnitSystem,
        found: UnitSystem,
    },

    #[error("Schema mismatch for {obs_type}: {detail}")]
    SchemaMismatch { obs_type: String, detail: String },
}

impl DaySumError {
    /// Faults confined to one record; the store stays usable
    pub fn is_record_fault(&self) -> bool {
        matches!(
            self,
            DaySumError::UnitSystemMismatch { .. } | DaySumError::SchemaMismatch { .. } | DaySumError::Core(_)
        )
    }
}

pub type DaySumResult<T> = Result<T, DaySumError>;
