//! Table layouts matching the Python WeeWX SQLite schema
//!
//! IMPORTANT: Day-summary and metadata tables must stay bit-compatible with
//! databases written by Python WeeWX. Do not rename tables or columns without
//! checking against a real station database.

/// Table names
pub mod tables {
    pub const DEFAULT_ARCHIVE: &str = "archive";

    /// Day-summary table of one observation type
    pub fn day_summary(archive: &str, obs_type: &str) -> String {
        format!("{archive}_day_{obs_type}")
    }

    /// Metadata table of the day summaries; the double underscore keeps it
    /// clear of any observation type name.
    pub fn metadata(archive: &str) -> String {
        format!("{archive}_day__metadata")
    }
}

/// Keys of the metadata table
pub mod meta_keys {
    pub const VERSION: &str = "Version";
    pub const LAST_UPDATE: &str = "lastUpdate";
    pub const LAST_BACKFILL: &str = "lastBackfill";
    pub const UNIT_SYSTEM: &str = "unitSystem";
}

/// Day-summary schema version written to new databases
pub const EXPECTED_SCHEMA_VERSION: &str = "4.0";

pub const SCALAR_DAY_COLUMNS: &[&str] = &[
    "dateTime", "min", "mintime", "max", "maxtime", "sum", "count", "wsum", "sumtime",
];

/// Columns vector tables carry after the scalar ones
pub const VECTOR_DAY_COLUMNS: &[&str] = &["max_dir", "xsum", "ysum", "squaresum", "squarecount"];

fn column_type(column: &str) -> &'static str {
    match column {
        "dateTime" => "INTEGER NOT NULL UNIQUE PRIMARY KEY",
        "mintime" | "maxtime" | "count" | "sumtime" | "squarecount" => "INTEGER",
        _ => "REAL",
    }
}

/// Physical layout of a day-summary table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableLayout {
    Scalar,
    Vector,
}

impl TableLayout {
    pub fn for_vector(is_vector: bool) -> Self {
        if is_vector {
            TableLayout::Vector
        } else {
            TableLayout::Scalar
        }
    }

    pub fn is_vector(self) -> bool {
        self == TableLayout::Vector
    }

    pub fn columns(self) -> Vec<&'static str> {
        match self {
            TableLayout::Scalar => SCALAR_DAY_COLUMNS.to_vec(),
            TableLayout::Vector => SCALAR_DAY_COLUMNS
                .iter()
                .chain(VECTOR_DAY_COLUMNS)
                .copied()
                .collect(),
        }
    }

    /// Layout of an existing table from its column names; `None` when the
    /// table lacks the scalar columns.
    pub fn detect<S: AsRef<str>>(columns: &[S]) -> Option<Self> {
        let has = |name: &str| columns.iter().any(|c| c.as_ref() == name);
        if !SCALAR_DAY_COLUMNS.iter().all(|&c| has(c)) {
            return None;
        }
        if VECTOR_DAY_COLUMNS.iter().all(|&c| has(c)) {
            Some(TableLayout::Vector)
        } else {
            Some(TableLayout::Scalar)
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TableLayout::Scalar => "scalar",
            TableLayout::Vector => "vector",
        }
    }
}

/// Quote an SQL identifier
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn create_day_table_sql(table: &str, layout: TableLayout) -> String {
    let columns = layout
        .columns()
        .into_iter()
        .map(|c| format!("{} {}", c, column_type(c)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE IF NOT EXISTS {} ({})", quote_ident(table), columns)
}

pub fn create_metadata_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (name CHAR(20) NOT NULL UNIQUE PRIMARY KEY, value TEXT)",
        quote_ident(table)
    )
}

pub fn create_archive_table_sql<'a>(table: &str, columns: impl IntoIterator<Item = &'a str>) -> String {
    let mut defs = vec![
        "dateTime INTEGER NOT NULL UNIQUE PRIMARY KEY".to_string(),
        "usUnits INTEGER NOT NULL".to_string(),
        "interval INTEGER NOT NULL".to_string(),
    ];
    defs.extend(columns.into_iter().map(|c| format!("{} REAL", quote_ident(c))));
    format!("CREATE TABLE IF NOT EXISTS {} ({})", quote_ident(table), defs.join(", "))
}
