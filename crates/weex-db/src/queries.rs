//! Day-summary and metadata queries

use crate::schema::{create_day_table_sql, create_metadata_table_sql, quote_ident, TableLayout};
use crate::{DbClient, DbResult};
use rusqlite::{OptionalExtension, Row, ToSql};
use tracing::{debug, instrument};
use weex_core::{DailySummaryRow, Timestamp, VectorColumns};

fn select_sql(table: &str, layout: TableLayout) -> String {
    format!("SELECT {} FROM {}", layout.columns().join(", "), quote_ident(table))
}

fn day_row(row: &Row<'_>, layout: TableLayout) -> rusqlite::Result<DailySummaryRow> {
    let vector = if layout.is_vector() {
        Some(VectorColumns {
            max_dir: row.get(9)?,
            xsum: row.get::<_, Option<f64>>(10)?.unwrap_or(0.0),
            ysum: row.get::<_, Option<f64>>(11)?.unwrap_or(0.0),
            squaresum: row.get::<_, Option<f64>>(12)?.unwrap_or(0.0),
            squarecount: row.get::<_, Option<i64>>(13)?.unwrap_or(0),
        })
    } else {
        None
    };
    Ok(DailySummaryRow {
        date_time: row.get(0)?,
        min: row.get(1)?,
        mintime: row.get(2)?,
        max: row.get(3)?,
        maxtime: row.get(4)?,
        sum: row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
        count: row.get::<_, Option<i64>>(6)?.unwrap_or(0),
        wsum: row.get::<_, Option<f64>>(7)?.unwrap_or(0.0),
        sumtime: row.get::<_, Option<i64>>(8)?.unwrap_or(0),
        vector,
    })
}

impl DbClient {
    pub fn create_metadata_table(&self, table: &str) -> DbResult<()> {
        self.execute(&create_metadata_table_sql(table), [])?;
        Ok(())
    }

    /// Get metadata value by name
    pub fn get_metadata(&self, table: &str, name: &str) -> DbResult<Option<String>> {
        let value = self
            .connection()
            .query_row(
                &format!("SELECT value FROM {} WHERE name = ?1", quote_ident(table)),
                [name],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(value.flatten())
    }

    /// Set metadata value
    #[instrument(skip(self))]
    pub fn set_metadata(&self, table: &str, name: &str, value: &str) -> DbResult<()> {
        self.execute(
            &format!(
                "INSERT INTO {} (name, value) VALUES (?1, ?2) \
                 ON CONFLICT(name) DO UPDATE SET value = excluded.value",
                quote_ident(table)
            ),
            [name, value],
        )?;
        debug!("Set metadata: {} = {}", name, value);
        Ok(())
    }

    pub fn delete_metadata(&self, table: &str, name: &str) -> DbResult<()> {
        self.execute(
            &format!("DELETE FROM {} WHERE name = ?1", quote_ident(table)),
            [name],
        )?;
        Ok(())
    }

    pub fn create_day_table(&self, table: &str, layout: TableLayout) -> DbResult<()> {
        self.execute(&create_day_table_sql(table, layout), [])?;
        debug!("Ensured {} day table {}", layout.label(), table);
        Ok(())
    }

    /// The row for one day, if any
    pub fn read_day_row(
        &self,
        table: &str,
        layout: TableLayout,
        day_start: Timestamp,
    ) -> DbResult<Option<DailySummaryRow>> {
        let sql = format!("{} WHERE dateTime = ?1", select_sql(table, layout));
        let row = self
            .connection()
            .query_row(&sql, [day_start], |row| day_row(row, layout))
            .optional()?;
        Ok(row)
    }

    /// Insert or replace the row for `row.date_time`.
    ///
    /// A vector table receives zeroed vector columns for a row without them.
    pub fn upsert_day_row(&self, table: &str, layout: TableLayout, row: &DailySummaryRow) -> DbResult<()> {
        let columns = layout.columns();
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
            quote_ident(table),
            columns.join(", "),
            placeholders
        );

        let vector = row.vector.unwrap_or_default();
        let mut values: Vec<&dyn ToSql> = vec![
            &row.date_time,
            &row.min,
            &row.mintime,
            &row.max,
            &row.maxtime,
            &row.sum,
            &row.count,
            &row.wsum,
            &row.sumtime,
        ];
        if layout.is_vector() {
            values.extend([
                &vector.max_dir as &dyn ToSql,
                &vector.xsum,
                &vector.ysum,
                &vector.squaresum,
                &vector.squarecount,
            ]);
        }
        self.execute(&sql, values.as_slice())?;
        Ok(())
    }

    /// Rows with `from <= dateTime < to`, ordered by day
    #[instrument(skip(self))]
    pub fn day_rows(
        &self,
        table: &str,
        layout: TableLayout,
        from: Timestamp,
        to: Timestamp,
    ) -> DbResult<Vec<DailySummaryRow>> {
        let sql = format!(
            "{} WHERE dateTime >= ?1 AND dateTime < ?2 ORDER BY dateTime ASC",
            select_sql(table, layout)
        );
        let mut stmt = self.connection().prepare(&sql)?;
        let rows = stmt
            .query_map([from, to], |row| day_row(row, layout))?
            .collect::<Result<Vec<_>, _>>()?;
        debug!("Retrieved {} rows from {}", rows.len(), table);
        Ok(rows)
    }

    pub fn clear_day_table(&self, table: &str) -> DbResult<usize> {
        self.execute(&format!("DELETE FROM {}", quote_ident(table)), [])
    }

    pub fn drop_table(&self, table: &str) -> DbResult<()> {
        self.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)), [])?;
        debug!("Dropped table {}", table);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tables;

    fn scalar_row(day: Timestamp, min: f64, max: f64) -> DailySummaryRow {
        DailySummaryRow {
            date_time: day,
            min: Some(min),
            mintime: Some(day + 300),
            max: Some(max),
            maxtime: Some(day + 600),
            sum: min + max,
            count: 2,
            wsum: (min + max) * 300.0,
            sumtime: 600,
            vector: None,
        }
    }

    #[test]
    fn test_metadata_upsert() {
        let db = DbClient::open_in_memory().unwrap();
        let meta = tables::metadata("archive");
        db.create_metadata_table(&meta).unwrap();

        assert_eq!(db.get_metadata(&meta, "lastUpdate").unwrap(), None);
        db.set_metadata(&meta, "lastUpdate", "100").unwrap();
        db.set_metadata(&meta, "lastUpdate", "200").unwrap();
        assert_eq!(db.get_metadata(&meta, "lastUpdate").unwrap().as_deref(), Some("200"));

        db.delete_metadata(&meta, "lastUpdate").unwrap();
        assert_eq!(db.get_metadata(&meta, "lastUpdate").unwrap(), None);
    }

    #[test]
    fn test_scalar_day_rows() {
        let db = DbClient::open_in_memory().unwrap();
        let table = tables::day_summary("archive", "outTemp");
        db.create_day_table(&table, TableLayout::Scalar).unwrap();

        for day in [0, 86_400, 172_800] {
            db.upsert_day_row(&table, TableLayout::Scalar, &scalar_row(day, 1.0, 5.0))
                .unwrap();
        }
        let replaced = scalar_row(86_400, -3.0, 5.0);
        db.upsert_day_row(&table, TableLayout::Scalar, &replaced).unwrap();

        assert_eq!(
            db.read_day_row(&table, TableLayout::Scalar, 86_400).unwrap(),
            Some(replaced)
        );
        assert_eq!(db.read_day_row(&table, TableLayout::Scalar, 7).unwrap(), None);

        let rows = db.day_rows(&table, TableLayout::Scalar, 86_400, 172_801).unwrap();
        assert_eq!(rows.iter().map(|r| r.date_time).collect::<Vec<_>>(), vec![86_400, 172_800]);

        assert_eq!(db.clear_day_table(&table).unwrap(), 3);
        db.drop_table(&table).unwrap();
        assert!(!db.has_table(&table).unwrap());
    }

    #[test]
    fn test_vector_day_row() {
        let db = DbClient::open_in_memory().unwrap();
        let table = tables::day_summary("archive", "wind");
        db.create_day_table(&table, TableLayout::Vector).unwrap();

        let mut row = scalar_row(0, 0.0, 12.0);
        row.vector = Some(VectorColumns {
            max_dir: Some(270.0),
            xsum: -4.5,
            ysum: 1.25,
            squaresum: 144.0,
            squarecount: 2,
        });
        db.upsert_day_row(&table, TableLayout::Vector, &row).unwrap();
        assert_eq!(db.read_day_row(&table, TableLayout::Vector, 0).unwrap(), Some(row));
    }
}
