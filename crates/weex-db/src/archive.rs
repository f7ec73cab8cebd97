//! Raw archive table
//!
//! The archive holds one row per record: `dateTime`, `usUnits`, `interval`
//! and one `REAL` column per scalar observation type. It is the source the
//! day summaries are rebuilt from.

use crate::schema::{create_archive_table_sql, quote_ident};
use crate::{DbClient, DbResult};
use rusqlite::types::Value;
use rusqlite::params_from_iter;
use tracing::{debug, info, instrument};
use weex_core::{CoreResult, ObsId, ObsSchema, Record, Timestamp, UnitSystem};

/// One archive row as stored, before its unit system is validated
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveRow {
    pub date_time: Timestamp,
    pub us_units: i32,
    pub interval: i32,
    pub values: Vec<(ObsId, Option<f64>)>,
}

impl ArchiveRow {
    pub fn to_record(&self) -> CoreResult<Record> {
        let unit_system = UnitSystem::try_from(self.us_units)?;
        let mut record = Record::new(self.date_time, unit_system, self.interval);
        for (id, value) in &self.values {
            record.set(*id, *value);
        }
        Ok(record)
    }
}

/// Handle on the archive table of one database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveTable {
    name: String,
}

impl ArchiveTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create the table if needed and add any scalar column it lacks
    #[instrument(skip(self, db, schema), fields(table = %self.name))]
    pub fn ensure(&self, db: &DbClient, schema: &ObsSchema) -> DbResult<()> {
        let columns: Vec<&str> = schema.columns().map(|(_, def)| def.name()).collect();
        db.execute(&create_archive_table_sql(&self.name, columns.iter().copied()), [])?;

        let existing = db.columns_of(&self.name)?;
        for column in columns {
            if !existing.iter().any(|c| c == column) {
                self.add_column(db, column)?;
            }
        }
        Ok(())
    }

    /// Add a column unless it is already present
    pub fn ensure_column(&self, db: &DbClient, column: &str) -> DbResult<()> {
        if db.columns_of(&self.name)?.iter().any(|c| c == column) {
            return Ok(());
        }
        self.add_column(db, column)
    }

    fn add_column(&self, db: &DbClient, column: &str) -> DbResult<()> {
        db.execute(
            &format!(
                "ALTER TABLE {} ADD COLUMN {} REAL",
                quote_ident(&self.name),
                quote_ident(column)
            ),
            [],
        )?;
        info!("Added column {} to {}", column, self.name);
        Ok(())
    }

    /// Insert one record; only its present values are written
    pub fn insert(&self, db: &DbClient, schema: &ObsSchema, record: &Record) -> DbResult<()> {
        let mut columns = vec!["dateTime".to_string(), "usUnits".to_string(), "interval".to_string()];
        let mut values = vec![
            Value::Integer(record.date_time),
            Value::Integer(i64::from(record.unit_system.as_i32())),
            Value::Integer(i64::from(record.interval)),
        ];
        for (id, value) in record.values() {
            columns.push(quote_ident(schema.name(id)));
            values.push(Value::Real(value));
        }

        let placeholders = (1..=values.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        db.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(&self.name),
                columns.join(", "),
                placeholders
            ),
            params_from_iter(values),
        )?;
        debug!("Inserted archive record for timestamp {}", record.date_time);
        Ok(())
    }

    /// Up to `limit` rows with `dateTime > after`, oldest first.
    ///
    /// Keyset paging keeps no statement open between pages, so callers may
    /// commit freely while walking the archive.
    pub fn page_after(
        &self,
        db: &DbClient,
        schema: &ObsSchema,
        after: Timestamp,
        limit: usize,
    ) -> DbResult<Vec<ArchiveRow>> {
        let columns: Vec<(ObsId, &str)> = schema.columns().map(|(id, def)| (id, def.name())).collect();
        let mut select = vec!["dateTime", "usUnits", "interval"]
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        select.extend(columns.iter().map(|(_, name)| quote_ident(name)));

        let sql = format!(
            "SELECT {} FROM {} WHERE dateTime > ?1 ORDER BY dateTime ASC LIMIT ?2",
            select.join(", "),
            quote_ident(&self.name)
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = db.connection().prepare(&sql)?;
        let rows = stmt
            .query_map([after, limit], |row| {
                let mut values = Vec::with_capacity(columns.len());
                for (offset, (id, _)) in columns.iter().enumerate() {
                    values.push((*id, row.get::<_, Option<f64>>(offset + 3)?));
                }
                Ok(ArchiveRow {
                    date_time: row.get(0)?,
                    us_units: row.get(1)?,
                    interval: row.get(2)?,
                    values,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn first_timestamp(&self, db: &DbClient) -> DbResult<Option<Timestamp>> {
        self.scalar_query(db, "MIN(dateTime)")
    }

    pub fn last_timestamp(&self, db: &DbClient) -> DbResult<Option<Timestamp>> {
        self.scalar_query(db, "MAX(dateTime)")
    }

    /// Get count of archive records
    pub fn count(&self, db: &DbClient) -> DbResult<i64> {
        Ok(self.scalar_query(db, "COUNT(*)")?.unwrap_or(0))
    }

    /// Unit system code of the oldest record
    pub fn unit_system(&self, db: &DbClient) -> DbResult<Option<i32>> {
        let sql = format!(
            "SELECT usUnits FROM {} ORDER BY dateTime ASC LIMIT 1",
            quote_ident(&self.name)
        );
        let mut stmt = db.connection().prepare(&sql)?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(None),
        }
    }

    fn scalar_query(&self, db: &DbClient, expr: &str) -> DbResult<Option<i64>> {
        let sql = format!("SELECT {} FROM {}", expr, quote_ident(&self.name));
        Ok(db.connection().query_row(&sql, [], |row| row.get(0))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weex_core::ObsKind;

    fn setup() -> (DbClient, ObsSchema, ArchiveTable) {
        let db = DbClient::open_in_memory().unwrap();
        let schema = ObsSchema::standard();
        let archive = ArchiveTable::new("archive");
        archive.ensure(&db, &schema).unwrap();
        (db, schema, archive)
    }

    #[test]
    fn test_empty_archive() {
        let (db, _, archive) = setup();
        assert_eq!(archive.first_timestamp(&db).unwrap(), None);
        assert_eq!(archive.last_timestamp(&db).unwrap(), None);
        assert_eq!(archive.unit_system(&db).unwrap(), None);
        assert_eq!(archive.count(&db).unwrap(), 0);
    }

    #[test]
    fn test_insert_and_page() {
        let (db, schema, archive) = setup();
        for i in 1..=5 {
            let record = schema
                .record(i * 300, UnitSystem::Us, 300, &[("outTemp", i as f64)])
                .unwrap();
            archive.insert(&db, &schema, &record).unwrap();
        }

        assert_eq!(archive.first_timestamp(&db).unwrap(), Some(300));
        assert_eq!(archive.last_timestamp(&db).unwrap(), Some(1500));
        assert_eq!(archive.unit_system(&db).unwrap(), Some(1));

        let page = archive.page_after(&db, &schema, 300, 2).unwrap();
        assert_eq!(page.iter().map(|r| r.date_time).collect::<Vec<_>>(), vec![600, 900]);

        let out_temp = schema.lookup("outTemp").unwrap();
        let record = page[0].to_record().unwrap();
        assert_eq!(record.get(out_temp), Some(2.0));
        assert_eq!(record.get(schema.lookup("rain").unwrap()), None);
        assert!(archive.page_after(&db, &schema, 1500, 10).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_timestamp_rejected() {
        let (db, schema, archive) = setup();
        let record = schema.record(300, UnitSystem::Us, 300, &[("rain", 0.1)]).unwrap();
        archive.insert(&db, &schema, &record).unwrap();
        assert!(archive.insert(&db, &schema, &record).unwrap_err().is_operational());
    }

    #[test]
    fn test_new_column_added() {
        let (db, mut schema, archive) = setup();
        schema.add("soilTemp1", ObsKind::Scalar).unwrap();
        archive.ensure(&db, &schema).unwrap();
        assert!(db.columns_of("archive").unwrap().contains(&"soilTemp1".to_string()));

        archive.ensure_column(&db, "lightning").unwrap();
        archive.ensure_column(&db, "lightning").unwrap();
        assert!(db.columns_of("archive").unwrap().contains(&"lightning".to_string()));
    }

    #[test]
    fn test_bad_unit_code_surfaces_on_conversion() {
        let (db, schema, archive) = setup();
        db.execute("INSERT INTO archive (dateTime, usUnits, interval) VALUES (300, 2, 300)", [])
            .unwrap();
        let page = archive.page_after(&db, &schema, 0, 10).unwrap();
        assert!(page[0].to_record().is_err());
    }
}
