//! Stores with generated hourly history

#![allow(dead_code)]

use weex_core::{Timestamp, UnitSystem};
use weex_daysum::{DailySummaryStore, StoreConfig};
use weex_db::DbClient;

/// 2024-03-01 00:00:00 UTC
pub const MAR_1: Timestamp = 1_709_251_200;
pub const DAY: i64 = 86_400;
pub const HOUR: i64 = 3_600;

pub fn empty_store() -> DailySummaryStore {
    DailySummaryStore::open(DbClient::open_in_memory().unwrap(), StoreConfig::default()).unwrap()
}

/// Hourly records from 01:00 on 2024-03-01 through midnight ending
/// 2024-03-03, with temperature, wind and rain that vary by the hour
pub fn three_days() -> DailySummaryStore {
    let mut store = empty_store();
    let schema = store.schema().clone();
    for h in 1..=72i64 {
        let speed = (h % 5) as f64;
        let dir = ((h * 37) % 360) as f64;
        let mut values = vec![
            ("outTemp", 40.0 + ((h * 7) % 23) as f64),
            ("windSpeed", speed),
            ("windGust", speed + 2.0 + (h % 3) as f64),
            ("windGustDir", (dir + 5.0) % 360.0),
            ("rain", if h % 6 == 0 { 0.01 } else { 0.0 }),
        ];
        if speed > 0.0 {
            values.push(("windDir", dir));
        }
        let record = schema
            .record(MAR_1 + h * HOUR, UnitSystem::Us, 3600, &values)
            .unwrap();
        store.add_record(&record).unwrap();
    }
    store
}

/// Hourly constant temperatures: `first` all of day one, `second` all of day two
pub fn steady_days(system: UnitSystem, first: f64, second: f64) -> DailySummaryStore {
    let mut store = empty_store();
    let schema = store.schema().clone();
    for h in 1..=48i64 {
        let temp = if h <= 24 { first } else { second };
        let record = schema
            .record(MAR_1 + h * HOUR, system, 3600, &[("outTemp", temp)])
            .unwrap();
        store.add_record(&record).unwrap();
    }
    store
}

pub fn close(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).abs() <= 1e-6 * a.abs().max(1.0),
        (None, None) => true,
        _ => false,
    }
}
