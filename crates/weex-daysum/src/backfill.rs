//! Rebuild the daily summaries from the raw archive

use crate::{DailySummaryStore, DaySumError, DaySumResult};
use chrono::DateTime;
use tracing::{debug, info, instrument, warn};
use weex_core::{Accumulator, DailySummaryRow, ObsId, Timestamp};
use weex_db::{meta_keys, TableLayout};

/// Days folded into one transaction unless configured otherwise
pub const DEFAULT_TRANS_DAYS: usize = 5;

/// Reported after every committed batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillProgress {
    pub records: u64,
    pub days: u64,
    /// Start of the newest committed day
    pub last_day: Option<Timestamp>,
}

struct Target {
    id: ObsId,
    table: String,
    layout: TableLayout,
}

/// Streams the whole archive through one accumulator per summarized type,
/// writing a row per type for every day that has records.
///
/// Running it twice over an unchanged archive yields identical rows. The
/// `lastBackfill` watermark is only written once a run completes, so an
/// aborted run leaves the summaries marked untrusted.
pub struct BackfillEngine<'a> {
    store: &'a mut DailySummaryStore,
    trans_days: usize,
    progress: Option<Box<dyn FnMut(&BackfillProgress) + 'a>>,
}

impl<'a> BackfillEngine<'a> {
    pub fn new(store: &'a mut DailySummaryStore) -> Self {
        Self {
            store,
            trans_days: DEFAULT_TRANS_DAYS,
            progress: None,
        }
    }

    /// Number of closed days committed per transaction
    pub fn trans_days(mut self, days: usize) -> Self {
        self.trans_days = days.max(1);
        self
    }

    pub fn on_progress(mut self, callback: impl FnMut(&BackfillProgress) + 'a) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Run the rebuild, returning the number of archive records folded
    #[instrument(skip(self), fields(trans_days = self.trans_days))]
    pub fn run(self) -> DaySumResult<u64> {
        let BackfillEngine {
            store,
            trans_days,
            mut progress,
        } = self;

        let targets = targets(store)?;
        reset(store, &targets)?;

        let mut unit_system = store.unit_system;
        let mut accumulators: Vec<Accumulator> = fresh(store, &targets);
        let mut current_day: Option<Timestamp> = None;
        let mut pending: Vec<(Timestamp, Vec<DailySummaryRow>)> = Vec::new();
        let mut state = BackfillProgress::default();
        let mut last_record: Option<Timestamp> = None;
        let mut after = Timestamp::MIN;

        loop {
            let page = store
                .archive
                .page_after(&store.db, &store.schema, after, store.page_size)?;
            if page.is_empty() {
                break;
            }
            for row in page {
                after = row.date_time;
                let record = match row.to_record() {
                    Ok(record) => record,
                    Err(err) => {
                        warn!(date_time = row.date_time, "Skipping archive record: {}", err);
                        continue;
                    }
                };
                match unit_system {
                    Some(expected) if expected != record.unit_system => {
                        warn!(
                            date_time = record.date_time,
                            "Skipping record in {} (store uses {})", record.unit_system, expected
                        );
                        continue;
                    }
                    Some(_) => {}
                    None => unit_system = Some(record.unit_system),
                }

                let day = store.clock.archive_day_start(record.date_time);
                if current_day != Some(day) {
                    if let Some(closed) = current_day {
                        pending.push((closed, close_day(closed, &mut accumulators, store, &targets)));
                        if pending.len() >= trans_days {
                            commit(store, &targets, &mut pending, &mut state)?;
                            if let Some(callback) = progress.as_mut() {
                                callback(&state);
                            }
                        }
                    }
                    current_day = Some(day);
                }

                for (acc, target) in accumulators.iter_mut().zip(&targets) {
                    acc.add_record(target.id, store.schema.def(target.id), &record)?;
                }
                state.records += 1;
                last_record = Some(record.date_time);
            }
        }

        if let Some(closed) = current_day {
            pending.push((closed, close_day(closed, &mut accumulators, store, &targets)));
        }
        if !pending.is_empty() {
            commit(store, &targets, &mut pending, &mut state)?;
            if let Some(callback) = progress.as_mut() {
                callback(&state);
            }
        }

        let meta = store.meta_table.clone();
        let had_units = store.unit_system.is_some();
        store.db.transaction(|db| -> DaySumResult<()> {
            if let Some(last) = last_record {
                db.set_metadata(&meta, meta_keys::LAST_UPDATE, &last.to_string())?;
            }
            if let (false, Some(units)) = (had_units, unit_system) {
                db.set_metadata(&meta, meta_keys::UNIT_SYSTEM, &units.as_i32().to_string())?;
            }
            db.set_metadata(
                &meta,
                meta_keys::LAST_BACKFILL,
                &last_record.unwrap_or(0).to_string(),
            )?;
            Ok(())
        })?;
        store.unit_system = unit_system;

        info!(
            "Backfilled {} records over {} days",
            state.records, state.days
        );
        Ok(state.records)
    }
}

/// Summarized types with a usable day table; a mismatched table aborts
fn targets(store: &DailySummaryStore) -> DaySumResult<Vec<Target>> {
    let mut targets = Vec::new();
    for (id, _) in store.schema.summarized() {
        let Some(table) = store.day_tables.get(&id) else {
            continue;
        };
        let layout = store.checked_layout(id, table)?;
        targets.push(Target {
            id,
            table: table.name.clone(),
            layout,
        });
    }
    Ok(targets)
}

fn reset(store: &DailySummaryStore, targets: &[Target]) -> DaySumResult<()> {
    store.db.transaction(|db| -> DaySumResult<()> {
        db.delete_metadata(&store.meta_table, meta_keys::LAST_BACKFILL)?;
        for target in targets {
            let cleared = db.clear_day_table(&target.table)?;
            debug!("Cleared {} rows from {}", cleared, target.table);
        }
        Ok(())
    })
}

fn fresh(store: &DailySummaryStore, targets: &[Target]) -> Vec<Accumulator> {
    targets
        .iter()
        .map(|t| Accumulator::for_def(store.schema.def(t.id)))
        .collect()
}

fn close_day(
    day: Timestamp,
    accumulators: &mut Vec<Accumulator>,
    store: &DailySummaryStore,
    targets: &[Target],
) -> Vec<DailySummaryRow> {
    let done = std::mem::replace(accumulators, fresh(store, targets));
    done.iter().map(|acc| acc.to_row(day)).collect()
}

fn commit(
    store: &DailySummaryStore,
    targets: &[Target],
    pending: &mut Vec<(Timestamp, Vec<DailySummaryRow>)>,
    state: &mut BackfillProgress,
) -> DaySumResult<()> {
    store.db.transaction(|db| -> Result<(), DaySumError> {
        for (_, rows) in pending.iter() {
            for (target, row) in targets.iter().zip(rows) {
                db.upsert_day_row(&target.table, target.layout, row)?;
            }
        }
        Ok(())
    })?;

    state.days += pending.len() as u64;
    state.last_day = pending.last().map(|(day, _)| *day);
    if let Some(day) = state.last_day.and_then(|d| DateTime::from_timestamp(d, 0)) {
        info!(
            "Committed {} days through {} ({} records so far)",
            pending.len(),
            day.format("%Y-%m-%d"),
            state.records
        );
    }
    pending.clear();
    Ok(())
}
