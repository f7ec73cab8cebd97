//! Persisted per-day rollups

use crate::{DaySumError, DaySumResult};
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};
use weex_core::{
    Accumulator, CoreError, DailySummaryRow, DayClock, ObsId, ObsKind, ObsSchema, Record, Timespan,
    Timestamp, UnitSystem,
};
use weex_db::{meta_keys, tables, ArchiveTable, DbClient, TableLayout, EXPECTED_SCHEMA_VERSION};

/// Settings a store is opened with
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub archive_table: String,
    pub clock: DayClock,
    pub schema: ObsSchema,
    /// Unit system reported before the first record fixes one
    pub default_unit_system: UnitSystem,
    /// Archive rows fetched per query when walking the archive
    pub page_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            archive_table: tables::DEFAULT_ARCHIVE.to_string(),
            clock: DayClock::utc(),
            schema: ObsSchema::standard(),
            default_unit_system: UnitSystem::Us,
            page_size: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct DayTable {
    pub(crate) name: String,
    /// `None` when the table exists but is not a day-summary table
    pub(crate) layout: Option<TableLayout>,
}

/// Result of a [`DailySummaryStore::catch_up`] pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatchUp {
    pub folded: u64,
    pub skipped: u64,
}

/// Durable per-(observation type, day) rollups over one archive table
///
/// All mutation goes through `&mut self`; a store has exactly one writer.
pub struct DailySummaryStore {
    pub(crate) db: DbClient,
    pub(crate) archive: ArchiveTable,
    pub(crate) meta_table: String,
    pub(crate) schema: ObsSchema,
    pub(crate) clock: DayClock,
    pub(crate) unit_system: Option<UnitSystem>,
    default_unit_system: UnitSystem,
    pub(crate) day_tables: HashMap<ObsId, DayTable>,
    pub(crate) page_size: usize,
}

impl std::fmt::Debug for DailySummaryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DailySummaryStore")
            .field("archive", &self.archive.name())
            .field("unit_system", &self.unit_system)
            .field("day_tables", &self.day_tables.len())
            .finish()
    }
}

fn layout_of(db: &DbClient, table: &str) -> DaySumResult<Option<TableLayout>> {
    let columns = db.columns_of(table)?;
    Ok(TableLayout::detect(columns.as_slice()))
}

impl DailySummaryStore {
    /// Open a store, creating whatever tables are missing.
    ///
    /// Existing day tables are introspected rather than trusted: a table whose
    /// layout disagrees with the configured kind is kept as is and reported
    /// as a schema mismatch whenever it is used.
    #[instrument(skip(db, config), fields(archive = %config.archive_table))]
    pub fn open(db: DbClient, config: StoreConfig) -> DaySumResult<Self> {
        let archive = ArchiveTable::new(&config.archive_table);
        let meta_table = tables::metadata(&config.archive_table);
        let schema = config.schema;

        let (day_tables, unit_system) = db.transaction(|db| {
            db.create_metadata_table(&meta_table)?;
            match db.get_metadata(&meta_table, meta_keys::VERSION)? {
                Some(version) if version != EXPECTED_SCHEMA_VERSION => {
                    warn!("Day summary version {} differs from {}", version, EXPECTED_SCHEMA_VERSION);
                }
                Some(_) => {}
                None => db.set_metadata(&meta_table, meta_keys::VERSION, EXPECTED_SCHEMA_VERSION)?,
            }
            archive.ensure(db, &schema)?;

            let mut day_tables = HashMap::new();
            for (id, def) in schema.summarized() {
                let name = tables::day_summary(archive.name(), def.name());
                let wanted = TableLayout::for_vector(def.is_vector());
                let layout = if db.has_table(&name)? {
                    let found = layout_of(db, &name)?;
                    if found != Some(wanted) {
                        warn!(
                            table = %name,
                            expected = wanted.label(),
                            found = found.map(TableLayout::label).unwrap_or("unknown"),
                            "Day table layout does not match observation kind"
                        );
                    }
                    found
                } else {
                    db.create_day_table(&name, wanted)?;
                    Some(wanted)
                };
                day_tables.insert(id, DayTable { name, layout });
            }

            let unit_system = match db.get_metadata(&meta_table, meta_keys::UNIT_SYSTEM)? {
                Some(code) => Some(code.parse::<UnitSystem>()?),
                None => archive
                    .unit_system(db)?
                    .map(UnitSystem::try_from)
                    .transpose()?,
            };
            Ok::<_, DaySumError>((day_tables, unit_system))
        })?;

        info!(
            "Opened daily summaries for {} observation types (unit system {:?})",
            day_tables.len(),
            unit_system
        );
        Ok(Self {
            db,
            archive,
            meta_table,
            schema,
            clock: config.clock,
            unit_system,
            default_unit_system: config.default_unit_system,
            day_tables,
            page_size: config.page_size.max(1),
        })
    }

    pub fn db(&self) -> &DbClient {
        &self.db
    }

    pub fn archive(&self) -> &ArchiveTable {
        &self.archive
    }

    pub fn schema(&self) -> &ObsSchema {
        &self.schema
    }

    pub fn clock(&self) -> &DayClock {
        &self.clock
    }

    /// Unit system fixed by the stored records, if any
    pub fn unit_system(&self) -> Option<UnitSystem> {
        self.unit_system
    }

    /// Unit system values are reported in
    pub fn effective_unit_system(&self) -> UnitSystem {
        self.unit_system.unwrap_or(self.default_unit_system)
    }

    pub fn first_timestamp(&self) -> DaySumResult<Option<Timestamp>> {
        Ok(self.archive.first_timestamp(&self.db)?)
    }

    pub fn last_timestamp(&self) -> DaySumResult<Option<Timestamp>> {
        Ok(self.archive.last_timestamp(&self.db)?)
    }

    pub fn last_update(&self) -> DaySumResult<Option<Timestamp>> {
        self.watermark(meta_keys::LAST_UPDATE)
    }

    /// Newest record covered by the last completed backfill
    pub fn last_backfill(&self) -> DaySumResult<Option<Timestamp>> {
        self.watermark(meta_keys::LAST_BACKFILL)
    }

    fn watermark(&self, key: &str) -> DaySumResult<Option<Timestamp>> {
        let value = self.db.get_metadata(&self.meta_table, key)?;
        Ok(value.and_then(|v| v.parse().ok()))
    }

    pub fn is_summarized(&self, obs_type: &str) -> bool {
        self.schema
            .id(obs_type)
            .is_some_and(|id| self.day_tables.contains_key(&id))
    }

    /// Name and layout of the day table behind `obs_type`
    pub fn day_table(&self, obs_type: &str) -> DaySumResult<(&str, TableLayout)> {
        let id = self.schema.lookup(obs_type)?;
        let table = self
            .day_tables
            .get(&id)
            .ok_or_else(|| CoreError::UnknownType(obs_type.to_string()))?;
        Ok((&table.name, self.checked_layout(id, table)?))
    }

    pub(crate) fn checked_layout(&self, id: ObsId, table: &DayTable) -> DaySumResult<TableLayout> {
        let def = self.schema.def(id);
        let wanted = TableLayout::for_vector(def.is_vector());
        match table.layout {
            Some(layout) if layout == wanted => Ok(layout),
            Some(layout) => Err(DaySumError::SchemaMismatch {
                obs_type: def.name().to_string(),
                detail: format!("{} is a {} table", table.name, layout.label()),
            }),
            None => Err(DaySumError::SchemaMismatch {
                obs_type: def.name().to_string(),
                detail: format!("{} is not a day-summary table", table.name),
            }),
        }
    }

    pub(crate) fn check_units(&self, record: &Record) -> DaySumResult<()> {
        match self.unit_system {
            Some(expected) if expected != record.unit_system => Err(DaySumError::UnitSystemMismatch {
                expected,
                found: record.unit_system,
            }),
            _ => Ok(()),
        }
    }

    /// Per-type accumulators for one record, validated against the tables
    /// they will be merged into. Nothing is written.
    fn contributions(&self, record: &Record) -> DaySumResult<Vec<(ObsId, Accumulator)>> {
        self.check_units(record)?;
        let mut contributions = Vec::new();
        for (id, def) in self.schema.summarized() {
            let Some(table) = self.day_tables.get(&id) else {
                continue;
            };
            let mut acc = Accumulator::for_def(def);
            if acc.add_record(id, def, record)? {
                self.checked_layout(id, table)?;
                contributions.push((id, acc));
            }
        }
        Ok(contributions)
    }

    fn fold(&self, db: &DbClient, record: &Record, contributions: &[(ObsId, Accumulator)]) -> DaySumResult<()> {
        let day = self.clock.archive_day_start(record.date_time);
        for (id, acc) in contributions {
            let table = &self.day_tables[id];
            let layout = self.checked_layout(*id, table)?;
            let mut merged = match db.read_day_row(&table.name, layout, day)? {
                Some(row) => Accumulator::from_row(&row),
                None => Accumulator::for_def(self.schema.def(*id)),
            };
            merged.merge(acc)?;
            db.upsert_day_row(&table.name, layout, &merged.to_row(day))?;
        }

        let last = db
            .get_metadata(&self.meta_table, meta_keys::LAST_UPDATE)?
            .and_then(|v| v.parse::<Timestamp>().ok());
        if last.map_or(true, |last| record.date_time > last) {
            db.set_metadata(&self.meta_table, meta_keys::LAST_UPDATE, &record.date_time.to_string())?;
        }
        if self.unit_system.is_none() {
            db.set_metadata(
                &self.meta_table,
                meta_keys::UNIT_SYSTEM,
                &record.unit_system.as_i32().to_string(),
            )?;
        }
        Ok(())
    }

    /// Merge one record into the summaries of its day.
    ///
    /// Not idempotent: ingesting the same record twice counts it twice. A
    /// record that cannot be folded is rejected before anything is written.
    #[instrument(skip(self, record), fields(date_time = record.date_time))]
    pub fn ingest(&mut self, record: &Record) -> DaySumResult<()> {
        let contributions = self.contributions(record)?;
        self.db.transaction(|db| self.fold(db, record, &contributions))?;
        self.unit_system.get_or_insert(record.unit_system);
        debug!("Folded {} observation types", contributions.len());
        Ok(())
    }

    /// Store a new record in the archive and fold it into the summaries,
    /// both in one transaction.
    #[instrument(skip(self, record), fields(date_time = record.date_time))]
    pub fn add_record(&mut self, record: &Record) -> DaySumResult<()> {
        let contributions = self.contributions(record)?;
        self.db.transaction(|db| -> DaySumResult<()> {
            self.archive.insert(db, &self.schema, record)?;
            self.fold(db, record, &contributions)
        })?;
        self.unit_system.get_or_insert(record.unit_system);
        Ok(())
    }

    /// Rows of `obs_type` for every day from the one containing
    /// `span.start` up to (excluding) `span.stop`, ordered by day
    pub fn range(&self, obs_type: &str, span: Timespan) -> DaySumResult<Vec<DailySummaryRow>> {
        let (table, layout) = self.day_table(obs_type)?;
        let from = self.clock.start_of_day(span.start);
        Ok(self.db.day_rows(table, layout, from, span.stop)?)
    }

    /// Start summarizing a new observation type.
    ///
    /// A scalar type gets an archive column if it lacks one. History is not
    /// populated; run a backfill for that.
    #[instrument(skip(self, kind))]
    pub fn add_obs_type(&mut self, name: &str, kind: ObsKind) -> DaySumResult<ObsId> {
        let mut schema = self.schema.clone();
        let id = schema.add(name, kind)?;
        let is_vector = schema.def(id).is_vector();
        let table = tables::day_summary(self.archive.name(), name);
        let wanted = TableLayout::for_vector(is_vector);

        self.db.transaction(|db| -> DaySumResult<()> {
            if !is_vector {
                self.archive.ensure_column(db, name)?;
            }
            if db.has_table(&table)? {
                let found = layout_of(db, &table)?;
                if found != Some(wanted) {
                    return Err(DaySumError::SchemaMismatch {
                        obs_type: name.to_string(),
                        detail: format!("existing table {} has a different layout", table),
                    });
                }
            } else {
                db.create_day_table(&table, wanted)?;
            }
            Ok(())
        })?;

        self.schema = schema;
        self.day_tables.insert(
            id,
            DayTable {
                name: table,
                layout: Some(wanted),
            },
        );
        info!("Now summarizing {}", name);
        Ok(id)
    }

    /// Stop summarizing a type and drop its day table. The archive column,
    /// and so the raw history, is kept.
    #[instrument(skip(self))]
    pub fn drop_obs_type(&mut self, name: &str) -> DaySumResult<()> {
        let id = self.schema.lookup(name)?;
        let table = tables::day_summary(self.archive.name(), name);
        self.db.drop_table(&table)?;
        self.schema.unsummarize(name)?;
        self.day_tables.remove(&id);
        info!("Dropped daily summary of {}", name);
        Ok(())
    }

    /// Fold archive records newer than the `lastUpdate` watermark.
    ///
    /// Records that cannot be folded are logged and skipped. The watermark
    /// moves past skipped records so later passes do not revisit them.
    #[instrument(skip(self))]
    pub fn catch_up(&mut self) -> DaySumResult<CatchUp> {
        let mut after = self.last_update()?.unwrap_or(Timestamp::MIN);
        let mut outcome = CatchUp::default();
        loop {
            let page = self
                .archive
                .page_after(&self.db, &self.schema, after, self.page_size)?;
            if page.is_empty() {
                break;
            }
            for row in page {
                after = row.date_time;
                let result = row
                    .to_record()
                    .map_err(DaySumError::from)
                    .and_then(|record| self.ingest(&record));
                match result {
                    Ok(()) => outcome.folded += 1,
                    Err(err) if err.is_record_fault() => {
                        warn!(date_time = row.date_time, "Skipping archive record: {}", err);
                        outcome.skipped += 1;
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        let watermark = self.last_update()?;
        if outcome.skipped > 0 && watermark.map_or(true, |last| after > last) {
            self.db
                .set_metadata(&self.meta_table, meta_keys::LAST_UPDATE, &after.to_string())?;
        }
        if outcome.folded > 0 || outcome.skipped > 0 {
            info!(
                "Caught up {} records ({} skipped)",
                outcome.folded, outcome.skipped
            );
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAR_1: Timestamp = 1_709_251_200;

    fn open() -> DailySummaryStore {
        DailySummaryStore::open(DbClient::open_in_memory().unwrap(), StoreConfig::default()).unwrap()
    }

    fn temp(store: &DailySummaryStore, ts: Timestamp, value: f64) -> Record {
        store
            .schema()
            .record(ts, UnitSystem::Us, 300, &[("outTemp", value)])
            .unwrap()
    }

    #[test]
    fn test_open_creates_tables() {
        let store = open();
        let tables = store.db().tables().unwrap();
        assert!(tables.contains(&"archive".to_string()));
        assert!(tables.contains(&"archive_day__metadata".to_string()));
        assert!(tables.contains(&"archive_day_outTemp".to_string()));
        assert_eq!(store.day_table("wind").unwrap().1, TableLayout::Vector);
        assert_eq!(
            store.db().get_metadata("archive_day__metadata", "Version").unwrap().as_deref(),
            Some("4.0")
        );
        assert_eq!(store.unit_system(), None);
        assert_eq!(store.effective_unit_system(), UnitSystem::Us);
    }

    #[test]
    fn test_midnight_record_lands_on_previous_day() {
        let mut store = open();
        let record = temp(&store, MAR_1, 50.0);
        store.add_record(&record).unwrap();

        let span = Timespan::new(MAR_1 - 86_400, MAR_1 + 86_400).unwrap();
        let rows = store.range("outTemp", span).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].date_time, MAR_1 - 86_400);
        assert_eq!(store.last_update().unwrap(), Some(MAR_1));
        assert_eq!(store.unit_system(), Some(UnitSystem::Us));
    }

    #[test]
    fn test_ingest_twice_double_counts() {
        let mut store = open();
        let record = temp(&store, MAR_1 + 300, 50.0);
        store.ingest(&record).unwrap();
        store.ingest(&record).unwrap();

        let rows = store.range("outTemp", store.clock().day_span(MAR_1)).unwrap();
        assert_eq!(rows[0].count, 2);
        assert_eq!(rows[0].sum, 100.0);
    }

    #[test]
    fn test_unit_mismatch_rejects_record_only() {
        let mut store = open();
        store.add_record(&temp(&store, MAR_1 + 300, 50.0)).unwrap();

        let metric = store
            .schema()
            .record(MAR_1 + 600, UnitSystem::Metric, 300, &[("outTemp", 10.0)])
            .unwrap();
        let err = store.add_record(&metric).unwrap_err();
        assert!(matches!(err, DaySumError::UnitSystemMismatch { .. }));
        assert!(err.is_record_fault());
        assert_eq!(store.archive().count(store.db()).unwrap(), 1);

        store.add_record(&temp(&store, MAR_1 + 900, 52.0)).unwrap();
        let rows = store.range("outTemp", store.clock().day_span(MAR_1)).unwrap();
        assert_eq!(rows[0].count, 2);
    }

    #[test]
    fn test_catch_up_skips_faulty_record_once() {
        let mut store = open();
        store.add_record(&temp(&store, MAR_1 + 300, 50.0)).unwrap();
        let metric = store
            .schema()
            .record(MAR_1 + 600, UnitSystem::Metric, 300, &[("outTemp", 10.0)])
            .unwrap();
        store.archive().insert(store.db(), store.schema(), &metric).unwrap();

        assert_eq!(store.catch_up().unwrap(), CatchUp { folded: 0, skipped: 1 });
        assert_eq!(store.last_update().unwrap(), Some(MAR_1 + 600));
        assert_eq!(store.catch_up().unwrap(), CatchUp::default());

        store.archive().insert(store.db(), store.schema(), &temp(&store, MAR_1 + 900, 52.0)).unwrap();
        assert_eq!(store.catch_up().unwrap(), CatchUp { folded: 1, skipped: 0 });
        let rows = store.range("outTemp", store.clock().day_span(MAR_1)).unwrap();
        assert_eq!(rows[0].count, 2);
    }

    #[test]
    fn test_storage_fault_rolls_back() {
        let mut store = open();
        let record = temp(&store, MAR_1 + 300, 50.0);
        store.add_record(&record).unwrap();
        // Duplicate dateTime fails the archive insert; the summary must not move
        let err = store.add_record(&record).unwrap_err();
        assert!(matches!(err, DaySumError::Db(_)));
        let rows = store.range("outTemp", store.clock().day_span(MAR_1)).unwrap();
        assert_eq!(rows[0].count, 1);
    }

    #[test]
    fn test_unknown_type_in_range() {
        let store = open();
        let span = Timespan::new(MAR_1, MAR_1 + 86_400).unwrap();
        assert!(matches!(
            store.range("lightning", span),
            Err(DaySumError::Core(CoreError::UnknownType(_)))
        ));
    }
}
