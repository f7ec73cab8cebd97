//! Database access layer for the WeeWX SQLite schema
//!
//! Owns everything that speaks SQL: connection setup, scoped transactions,
//! schema introspection, the raw archive table, day-summary tables and the
//! summary metadata table. Table layouts follow Python WeeWX so existing
//! databases can be read and extended in place.

pub mod archive;
pub mod client;
pub mod queries;
pub mod schema;

pub use archive::*;
pub use client::*;
pub use schema::*;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database already exists: {}", .0.display())]
    DatabaseExists(PathBuf),

    #[error("No such database: {}", .0.display())]
    NoDatabase(PathBuf),

    #[error("Database operation failed: {0}")]
    OperationalError(#[from] rusqlite::Error),

    #[error("No such table: {0}")]
    NoSuchTable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    /// Faults raised by the engine while executing a statement
    pub fn is_operational(&self) -> bool {
        matches!(self, DbError::OperationalError(_) | DbError::NoSuchTable(_))
    }
}

pub type DbResult<T> = Result<T, DbError>;
