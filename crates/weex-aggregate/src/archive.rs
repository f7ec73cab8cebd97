//! Aggregates computed directly from the raw archive table

use crate::{AggregateOptions, AggregateProvider, AggregateResult, Outcome};
use rusqlite::types::FromSql;
use rusqlite::OptionalExtension;
use tracing::{debug, instrument};
use weex_core::{bearing, vector_components, AggregateType, Timespan, Timestamp};
use weex_daysum::DailySummaryStore;
use weex_db::{quote_ident, DbClient};

const WINDOW: &str = "dateTime > ?1 AND dateTime <= ?2";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Extremum {
    Min,
    Max,
}

impl Extremum {
    fn function(self) -> &'static str {
        match self {
            Extremum::Min => "MIN",
            Extremum::Max => "MAX",
        }
    }
}

/// Running x/y sums of a stream of vector samples
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VectorTally {
    pub xsum: f64,
    pub ysum: f64,
    /// Samples with a magnitude, with or without a direction
    pub count: i64,
}

impl VectorTally {
    pub fn add(&mut self, magnitude: f64, direction: Option<f64>) {
        if let Some(direction) = direction {
            let (x, y) = vector_components(magnitude, direction);
            self.xsum += x;
            self.ysum += y;
        }
        self.count += 1;
    }

    /// Length of the mean vector
    pub fn mean_magnitude(&self) -> Option<f64> {
        (self.count > 0).then(|| {
            let n = self.count as f64;
            (self.xsum / n).hypot(self.ysum / n)
        })
    }

    /// Length of the summed vector
    pub fn resultant(&self) -> Option<f64> {
        (self.count > 0).then(|| self.xsum.hypot(self.ysum))
    }

    /// Compass bearing of the summed vector; `None` when it has no length
    pub fn direction(&self) -> Option<f64> {
        bearing(self.xsum, self.ysum)
    }
}

/// Records of one archive table with `span.start < dateTime <= span.stop`
pub(crate) struct ArchiveWindow<'s> {
    db: &'s DbClient,
    table: String,
    span: Timespan,
}

impl<'s> ArchiveWindow<'s> {
    pub(crate) fn new(store: &'s DailySummaryStore, span: Timespan) -> Self {
        Self {
            db: store.db(),
            table: quote_ident(store.archive().name()),
            span,
        }
    }

    fn query_one<T: FromSql>(&self, sql: &str) -> AggregateResult<Option<T>> {
        let value = self
            .db
            .connection()
            .query_row(sql, [self.span.start, self.span.stop], |row| row.get::<_, Option<T>>(0))
            .optional()?;
        Ok(value.flatten())
    }

    pub(crate) fn sum(&self, column: &str) -> AggregateResult<Option<f64>> {
        let column = quote_ident(column);
        self.query_one(&format!("SELECT SUM({column}) FROM {} WHERE {WINDOW}", self.table))
    }

    pub(crate) fn count(&self, column: &str) -> AggregateResult<i64> {
        let column = quote_ident(column);
        let count = self.query_one(&format!("SELECT COUNT({column}) FROM {} WHERE {WINDOW}", self.table))?;
        Ok(count.unwrap_or(0))
    }

    /// Average weighted by each record's interval
    pub(crate) fn weighted_avg(&self, column: &str) -> AggregateResult<Option<f64>> {
        let column = quote_ident(column);
        let sql = format!(
            "SELECT SUM({column} * \"interval\"), SUM(\"interval\") FROM {} \
             WHERE {WINDOW} AND {column} IS NOT NULL",
            self.table
        );
        let (wsum, sumtime) = self
            .db
            .connection()
            .query_row(&sql, [self.span.start, self.span.stop], |row| {
                Ok((row.get::<_, Option<f64>>(0)?, row.get::<_, Option<i64>>(1)?))
            })?;
        Ok(match (wsum, sumtime) {
            (Some(wsum), Some(sumtime)) if sumtime != 0 => Some(wsum / sumtime as f64),
            _ => None,
        })
    }

    pub(crate) fn rms(&self, column: &str) -> AggregateResult<Option<f64>> {
        let column = quote_ident(column);
        let sql = format!(
            "SELECT SUM({column} * {column}), COUNT({column}) FROM {} WHERE {WINDOW}",
            self.table
        );
        let (squaresum, count) = self
            .db
            .connection()
            .query_row(&sql, [self.span.start, self.span.stop], |row| {
                Ok((row.get::<_, Option<f64>>(0)?, row.get::<_, i64>(1)?))
            })?;
        Ok(squaresum.filter(|_| count > 0).map(|s| (s / count as f64).sqrt()))
    }

    /// Extreme of `column` and the earliest time it was seen
    pub(crate) fn extreme(&self, column: &str, which: Extremum) -> AggregateResult<Option<(f64, Timestamp)>> {
        self.at_extreme(column, column, which)
    }

    /// `select` of the earliest record holding the extreme of `column`
    pub(crate) fn at_extreme(
        &self,
        select: &str,
        column: &str,
        which: Extremum,
    ) -> AggregateResult<Option<(f64, Timestamp)>> {
        let (select, column) = (quote_ident(select), quote_ident(column));
        let sql = format!(
            "SELECT {select}, dateTime FROM {table} WHERE {WINDOW} AND {column} = \
             (SELECT {func}({column}) FROM {table} WHERE {WINDOW}) \
             ORDER BY dateTime ASC LIMIT 1",
            table = self.table,
            func = which.function(),
        );
        self.value_and_time(&sql)
    }

    /// First (`newest = false`) or last non-null reading of `column`
    pub(crate) fn edge(&self, column: &str, newest: bool) -> AggregateResult<Option<(f64, Timestamp)>> {
        let column = quote_ident(column);
        let sql = format!(
            "SELECT {column}, dateTime FROM {} WHERE {WINDOW} AND {column} IS NOT NULL \
             ORDER BY dateTime {} LIMIT 1",
            self.table,
            if newest { "DESC" } else { "ASC" }
        );
        self.value_and_time(&sql)
    }

    fn value_and_time(&self, sql: &str) -> AggregateResult<Option<(f64, Timestamp)>> {
        let found = self
            .db
            .connection()
            .query_row(sql, [self.span.start, self.span.stop], |row| {
                Ok((row.get::<_, Option<f64>>(0)?, row.get::<_, Timestamp>(1)?))
            })
            .optional()?;
        Ok(found.and_then(|(value, time)| value.map(|v| (v, time))))
    }

    /// Stream every reading of a magnitude/direction pair
    pub(crate) fn vector_tally(&self, magnitude: &str, direction: &str) -> AggregateResult<VectorTally> {
        let (magnitude, direction) = (quote_ident(magnitude), quote_ident(direction));
        let sql = format!(
            "SELECT {magnitude}, {direction} FROM {} WHERE {WINDOW} AND {magnitude} IS NOT NULL \
             ORDER BY dateTime ASC",
            self.table
        );
        let mut stmt = self.db.connection().prepare(&sql)?;
        let mut rows = stmt.query([self.span.start, self.span.stop])?;
        let mut tally = VectorTally::default();
        while let Some(row) = rows.next()? {
            let magnitude: f64 = row.get(0)?;
            let direction: Option<f64> = row.get(1)?;
            tally.add(magnitude, direction.filter(|d| !d.is_nan()));
        }
        Ok(tally)
    }
}

fn value(found: Option<(f64, Timestamp)>) -> Outcome {
    Outcome::Applicable(found.map(|(v, _)| v))
}

fn time(found: Option<(f64, Timestamp)>) -> Outcome {
    Outcome::Applicable(found.map(|(_, t)| t as f64))
}

/// Aggregates over a single column that never need a direction
pub(crate) fn column_aggregate(
    window: &ArchiveWindow<'_>,
    column: &str,
    aggregate: AggregateType,
) -> AggregateResult<Outcome> {
    use AggregateType::*;
    Ok(match aggregate {
        Min => value(window.extreme(column, Extremum::Min)?),
        MinTime => time(window.extreme(column, Extremum::Min)?),
        Max => value(window.extreme(column, Extremum::Max)?),
        MaxTime => time(window.extreme(column, Extremum::Max)?),
        Sum => Outcome::Applicable(window.sum(column)?),
        Count => Outcome::Applicable(Some(window.count(column)? as f64)),
        Avg => Outcome::Applicable(window.weighted_avg(column)?),
        Rms => Outcome::Applicable(window.rms(column)?),
        First => value(window.edge(column, false)?),
        FirstTime => time(window.edge(column, false)?),
        Last => value(window.edge(column, true)?),
        LastTime => time(window.edge(column, true)?),
        _ => Outcome::NotApplicable,
    })
}

/// Last resort: scan the archive records in the span
#[derive(Debug, Clone, Copy, Default)]
pub struct RawArchiveProvider;

impl AggregateProvider for RawArchiveProvider {
    fn name(&self) -> &'static str {
        "raw-archive"
    }

    fn recognizes(&self, store: &DailySummaryStore, obs_type: &str) -> bool {
        store.schema().id(obs_type).is_some()
    }

    #[instrument(skip(self, store, _options), fields(provider = self.name()))]
    fn get_aggregate(
        &self,
        store: &DailySummaryStore,
        obs_type: &str,
        span: Timespan,
        aggregate: AggregateType,
        _options: &AggregateOptions,
    ) -> AggregateResult<Outcome> {
        let schema = store.schema();
        let Some(id) = schema.id(obs_type) else {
            return Ok(Outcome::NotApplicable);
        };
        let window = ArchiveWindow::new(store, span);
        debug!("Scanning {} for {}({})", store.archive().name(), aggregate, obs_type);

        let Some(ids) = schema.def(id).vector_ids() else {
            return column_aggregate(&window, obs_type, aggregate);
        };

        // Vector types: the magnitude for the low side and totals, the peak
        // (gust) for the high side
        let magnitude = schema.name(ids.magnitude);
        let peak = schema.name(ids.peak);
        use AggregateType::*;
        match aggregate {
            Max | MaxTime => column_aggregate(&window, peak, aggregate),
            MaxDir => Ok(value(window.at_extreme(schema.name(ids.peak_dir), peak, Extremum::Max)?)),
            VecAvg => Ok(Outcome::Applicable(
                window.vector_tally(magnitude, schema.name(ids.direction))?.mean_magnitude(),
            )),
            VecDir => Ok(Outcome::Applicable(
                window.vector_tally(magnitude, schema.name(ids.direction))?.direction(),
            )),
            _ => column_aggregate(&window, magnitude, aggregate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_calm_and_empty() {
        let mut tally = VectorTally::default();
        assert_eq!(tally.mean_magnitude(), None);
        assert_eq!(tally.direction(), None);

        tally.add(0.0, Some(90.0));
        assert_eq!(tally.mean_magnitude(), Some(0.0));
        assert_eq!(tally.direction(), None);
    }

    #[test]
    fn test_tally_opposing_winds() {
        let mut tally = VectorTally::default();
        tally.add(10.0, Some(90.0));
        tally.add(10.0, Some(270.0));
        assert!(tally.resultant().unwrap() < 1e-9);

        tally.add(4.0, Some(90.0));
        tally.add(3.0, None);
        assert_eq!(tally.count, 4);
        assert!((tally.mean_magnitude().unwrap() - 1.0).abs() < 1e-9);
        assert!((tally.direction().unwrap() - 90.0).abs() < 1e-9);
    }
}
