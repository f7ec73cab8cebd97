//! Aggregates answered from the per-day summary rows

use crate::{AggregateOptions, AggregateProvider, AggregateResult, Outcome, VectorTally};
use tracing::{debug, instrument, warn};
use weex_core::{get_unit_group, standard_unit, AggregateType, DailySummaryRow, Timespan, Timestamp};
use weex_daysum::{DailySummaryStore, DaySumError};

/// Fast path: reduce one stored row per day instead of scanning records.
///
/// Only applicable when the span's records are exactly those of whole days,
/// which holds when each end falls on a local midnight or lies beyond the
/// archive's data.
#[derive(Debug, Clone, Copy, Default)]
pub struct DailySummaryProvider;

impl DailySummaryProvider {
    /// Whether the day rows from the one containing `span.start` up to
    /// `span.stop` summarize exactly the records in `span`
    pub fn covers(store: &DailySummaryStore, span: Timespan) -> AggregateResult<bool> {
        let clock = store.clock();
        let start_ok = clock.is_midnight(span.start)
            || store.first_timestamp()?.map_or(true, |first| span.start < first);
        if !start_ok {
            return Ok(false);
        }
        Ok(clock.is_midnight(span.stop) || store.last_timestamp()?.map_or(true, |last| span.stop >= last))
    }
}

impl AggregateProvider for DailySummaryProvider {
    fn name(&self) -> &'static str {
        "daily-summary"
    }

    fn recognizes(&self, store: &DailySummaryStore, obs_type: &str) -> bool {
        store.is_summarized(obs_type)
    }

    #[instrument(skip(self, store, options), fields(provider = self.name()))]
    fn get_aggregate(
        &self,
        store: &DailySummaryStore,
        obs_type: &str,
        span: Timespan,
        aggregate: AggregateType,
        options: &AggregateOptions,
    ) -> AggregateResult<Outcome> {
        use AggregateType::*;
        if !store.is_summarized(obs_type) || matches!(aggregate, First | FirstTime | Last | LastTime) {
            return Ok(Outcome::NotApplicable);
        }
        if !Self::covers(store, span)? {
            debug!("Span {} is not day aligned", span);
            return Ok(Outcome::NotApplicable);
        }

        let layout = match store.day_table(obs_type) {
            Ok((_, layout)) => layout,
            Err(DaySumError::SchemaMismatch { detail, .. }) => {
                warn!("Day table for {} unusable: {}", obs_type, detail);
                return Ok(Outcome::NotApplicable);
            }
            Err(err) => return Err(err.into()),
        };
        let rows = store.range(obs_type, span)?;

        let threshold = if aggregate.is_day_count() {
            let unit = get_unit_group(obs_type).map(|g| standard_unit(store.effective_unit_system(), g));
            Some(options.threshold(aggregate, unit)?)
        } else {
            None
        };
        debug!("Reducing {} day rows", rows.len());
        Ok(reduce(&rows, layout.is_vector(), aggregate, threshold))
    }
}

/// Extreme value over the rows with its time and, for vector rows, direction
#[derive(Debug, Clone, Copy)]
struct Pick {
    value: f64,
    time: Timestamp,
    dir: Option<f64>,
}

fn pick(candidates: impl Iterator<Item = Pick>, lowest: bool) -> Option<Pick> {
    candidates.fold(None, |best: Option<Pick>, next| match best {
        Some(best) if !beats(&next, &best, lowest) => Some(best),
        _ => Some(next),
    })
}

fn beats(next: &Pick, best: &Pick, lowest: bool) -> bool {
    if next.value == best.value {
        next.time < best.time
    } else if lowest {
        next.value < best.value
    } else {
        next.value > best.value
    }
}

fn lows(rows: &[DailySummaryRow]) -> impl Iterator<Item = Pick> + '_ {
    rows.iter().filter_map(|r| {
        Some(Pick {
            value: r.min?,
            time: r.mintime?,
            dir: None,
        })
    })
}

fn highs(rows: &[DailySummaryRow]) -> impl Iterator<Item = Pick> + '_ {
    rows.iter().filter_map(|r| {
        Some(Pick {
            value: r.max?,
            time: r.maxtime?,
            dir: r.vector.and_then(|v| v.max_dir),
        })
    })
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (total, n) = values.fold((0.0, 0usize), |(total, n), v| (total + v, n + 1));
    (n > 0).then(|| total / n as f64)
}

fn days_where(rows: &[DailySummaryRow], test: impl Fn(&DailySummaryRow) -> bool) -> Option<f64> {
    Some(rows.iter().filter(|r| r.count > 0 && test(r)).count() as f64)
}

/// Combine day rows into one aggregate value
fn reduce(rows: &[DailySummaryRow], vector: bool, aggregate: AggregateType, threshold: Option<f64>) -> Outcome {
    use AggregateType::*;
    let count: i64 = rows.iter().map(|r| r.count).sum();
    let val = threshold.unwrap_or(f64::NAN);

    let value = match aggregate {
        Min => pick(lows(rows), true).map(|p| p.value),
        MinTime => pick(lows(rows), true).map(|p| p.time as f64),
        Max => pick(highs(rows), false).map(|p| p.value),
        MaxTime => pick(highs(rows), false).map(|p| p.time as f64),
        MaxDir if vector => pick(highs(rows), false).and_then(|p| p.dir),
        Sum => (count > 0).then(|| rows.iter().map(|r| r.sum).sum()),
        Count => Some(count as f64),
        Avg => {
            let sumtime: i64 = rows.iter().map(|r| r.sumtime).sum();
            let wsum: f64 = rows.iter().map(|r| r.wsum).sum();
            (sumtime != 0).then(|| wsum / sumtime as f64)
        }
        Rms if vector => {
            let (squaresum, squarecount) = rows
                .iter()
                .filter_map(|r| r.vector)
                .fold((0.0, 0i64), |(s, c), v| (s + v.squaresum, c + v.squarecount));
            (squarecount > 0).then(|| (squaresum / squarecount as f64).sqrt())
        }
        VecAvg | VecDir if vector => {
            let tally = rows.iter().fold(VectorTally::default(), |mut tally, r| {
                if let Some(v) = r.vector {
                    tally.xsum += v.xsum;
                    tally.ysum += v.ysum;
                }
                tally.count += r.count;
                tally
            });
            if aggregate == VecAvg {
                tally.mean_magnitude()
            } else {
                tally.direction()
            }
        }
        MaxGe => days_where(rows, |r| r.max.is_some_and(|m| m >= val)),
        MaxLe => days_where(rows, |r| r.max.is_some_and(|m| m <= val)),
        MinGe => days_where(rows, |r| r.min.is_some_and(|m| m >= val)),
        MinLe => days_where(rows, |r| r.min.is_some_and(|m| m <= val)),
        SumGe => days_where(rows, |r| r.sum >= val),
        SumLe => days_where(rows, |r| r.sum <= val),
        AvgGe => days_where(rows, |r| r.avg().is_some_and(|a| a >= val)),
        AvgLe => days_where(rows, |r| r.avg().is_some_and(|a| a <= val)),
        MeanMax => mean(rows.iter().filter_map(|r| r.max)),
        MeanMin => mean(rows.iter().filter_map(|r| r.min)),
        _ => return Outcome::NotApplicable,
    };
    Outcome::Applicable(value)
}
