//! Shared fixtures for the daily-summary integration tests

#![allow(dead_code)]

use weex_core::{ArchiveRecord, DailySummaryRow, ObsSchema, Record, Timestamp};

/// 2024-03-01 00:00:00 UTC
pub const MAR_1: Timestamp = 1_709_251_200;
pub const DAY: i64 = 86_400;

/// Six US-unit records: four on 2024-03-01 (the last stamped exactly at
/// midnight) and two on 2024-03-02
pub fn two_days(schema: &ObsSchema) -> Vec<Record> {
    let raw: Vec<ArchiveRecord> =
        serde_json::from_str(include_str!("../fixtures/two_days.json")).expect("fixture parses");
    raw.iter()
        .map(|r| schema.resolve(r).expect("fixture matches the standard schema"))
        .collect()
}

fn opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn at(time: Option<Timestamp>) -> String {
    time.map_or_else(|| "-".to_string(), |t| t.to_string())
}

/// One line per row, for snapshots
pub fn render(rows: &[DailySummaryRow]) -> String {
    rows.iter()
        .map(|r| {
            format!(
                "{} min={}@{} max={}@{} sum={} count={} avg={}",
                r.date_time,
                opt(r.min),
                at(r.mintime),
                opt(r.max),
                at(r.maxtime),
                r.sum,
                r.count,
                opt(r.avg())
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
