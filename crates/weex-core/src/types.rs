//! Core data types for weather observations

use crate::obs::{ObsId, VectorIds};
use crate::rollups::VectorSample;
use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Timestamp type (Unix epoch seconds)
pub type Timestamp = i64;

/// Observation interval in seconds
pub type Interval = i32;

/// Unit system of a record or a store (values must match Python WeeWX)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum UnitSystem {
    Us = 1,
    Metric = 16,
    MetricWx = 17,
}

impl UnitSystem {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for UnitSystem {
    type Error = CoreError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(UnitSystem::Us),
            16 => Ok(UnitSystem::Metric),
            17 => Ok(UnitSystem::MetricWx),
            other => Err(CoreError::UnknownUnitSystem(other.to_string())),
        }
    }
}

impl From<UnitSystem> for i32 {
    fn from(value: UnitSystem) -> Self {
        value.as_i32()
    }
}

impl FromStr for UnitSystem {
    type Err = CoreError;

    /// Accepts either the WeeWX name (`US`, `METRIC`, `METRICWX`) or its code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "US" => Ok(UnitSystem::Us),
            "METRIC" => Ok(UnitSystem::Metric),
            "METRICWX" => Ok(UnitSystem::MetricWx),
            other => other
                .parse::<i32>()
                .map_err(|_| CoreError::UnknownUnitSystem(s.to_string()))
                .and_then(UnitSystem::try_from),
        }
    }
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnitSystem::Us => "US",
            UnitSystem::Metric => "METRIC",
            UnitSystem::MetricWx => "METRICWX",
        };
        f.write_str(name)
    }
}

/// Aggregation type for rollup queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AggregateType {
    Min,
    MinTime,
    Max,
    MaxTime,
    MaxDir,
    Sum,
    Count,
    Avg,
    Rms,
    First,
    FirstTime,
    Last,
    LastTime,
    VecAvg,
    VecDir,
    MaxGe,
    MaxLe,
    MinGe,
    MinLe,
    SumGe,
    SumLe,
    AvgGe,
    AvgLe,
    MeanMax,
    MeanMin,
}

impl AggregateType {
    pub const ALL: [AggregateType; 25] = [
        AggregateType::Min,
        AggregateType::MinTime,
        AggregateType::Max,
        AggregateType::MaxTime,
        AggregateType::MaxDir,
        AggregateType::Sum,
        AggregateType::Count,
        AggregateType::Avg,
        AggregateType::Rms,
        AggregateType::First,
        AggregateType::FirstTime,
        AggregateType::Last,
        AggregateType::LastTime,
        AggregateType::VecAvg,
        AggregateType::VecDir,
        AggregateType::MaxGe,
        AggregateType::MaxLe,
        AggregateType::MinGe,
        AggregateType::MinLe,
        AggregateType::SumGe,
        AggregateType::SumLe,
        AggregateType::AvgGe,
        AggregateType::AvgLe,
        AggregateType::MeanMax,
        AggregateType::MeanMin,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AggregateType::Min => "min",
            AggregateType::MinTime => "mintime",
            AggregateType::Max => "max",
            AggregateType::MaxTime => "maxtime",
            AggregateType::MaxDir => "max_dir",
            AggregateType::Sum => "sum",
            AggregateType::Count => "count",
            AggregateType::Avg => "avg",
            AggregateType::Rms => "rms",
            AggregateType::First => "first",
            AggregateType::FirstTime => "firsttime",
            AggregateType::Last => "last",
            AggregateType::LastTime => "lasttime",
            AggregateType::VecAvg => "vecavg",
            AggregateType::VecDir => "vecdir",
            AggregateType::MaxGe => "max_ge",
            AggregateType::MaxLe => "max_le",
            AggregateType::MinGe => "min_ge",
            AggregateType::MinLe => "min_le",
            AggregateType::SumGe => "sum_ge",
            AggregateType::SumLe => "sum_le",
            AggregateType::AvgGe => "avg_ge",
            AggregateType::AvgLe => "avg_le",
            AggregateType::MeanMax => "meanmax",
            AggregateType::MeanMin => "meanmin",
        }
    }

    /// Aggregates whose result is a timestamp rather than an observation value
    pub fn is_time(self) -> bool {
        matches!(
            self,
            AggregateType::MinTime
                | AggregateType::MaxTime
                | AggregateType::FirstTime
                | AggregateType::LastTime
        )
    }

    /// Aggregates that count days meeting a threshold
    pub fn is_day_count(self) -> bool {
        matches!(
            self,
            AggregateType::MaxGe
                | AggregateType::MaxLe
                | AggregateType::MinGe
                | AggregateType::MinLe
                | AggregateType::SumGe
                | AggregateType::SumLe
                | AggregateType::AvgGe
                | AggregateType::AvgLe
        )
    }
}

impl FromStr for AggregateType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "gustdir" {
            return Ok(AggregateType::MaxDir);
        }
        AggregateType::ALL
            .iter()
            .copied()
            .find(|agg| agg.as_str() == s)
            .ok_or_else(|| CoreError::UnknownAggregation(s.to_string()))
    }
}

impl TryFrom<String> for AggregateType {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AggregateType> for String {
    fn from(value: AggregateType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for AggregateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of every aggregate query: a value tagged with its unit and unit group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueTuple {
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub group: Option<String>,
}

impl ValueTuple {
    pub fn new(value: Option<f64>, unit: Option<&str>, group: Option<&str>) -> Self {
        Self {
            value,
            unit: unit.map(str::to_string),
            group: group.map(str::to_string),
        }
    }

    /// A bare value in the given unit, group unresolved
    pub fn in_unit(value: f64, unit: &str) -> Self {
        Self::new(Some(value), Some(unit), None)
    }
}

/// Archive record wire format (JSON), as exchanged with drivers and fixtures
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchiveRecord {
    /// Unix timestamp (end of interval)
    #[serde(rename = "dateTime")]
    pub date_time: Timestamp,

    /// Observation interval (seconds)
    pub interval: Interval,

    /// Unit system (1=US, 16=Metric, 17=MetricWX)
    #[serde(rename = "usUnits")]
    pub us_units: i32,

    /// Observations keyed by type name; `null` marks a missing reading
    #[serde(flatten)]
    pub values: BTreeMap<String, Option<f64>>,
}

/// A raw archive record resolved against an [`ObsSchema`](crate::ObsSchema)
///
/// Values live in a sparse array indexed by [`ObsId`]; types the record does
/// not mention read as `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub date_time: Timestamp,
    pub unit_system: UnitSystem,
    pub interval: Interval,
    values: Vec<Option<f64>>,
}

impl Record {
    pub fn new(date_time: Timestamp, unit_system: UnitSystem, interval: Interval) -> Self {
        Self {
            date_time,
            unit_system,
            interval,
            values: Vec::new(),
        }
    }

    pub fn get(&self, id: ObsId) -> Option<f64> {
        self.values
            .get(id.index())
            .copied()
            .flatten()
            .filter(|v| !v.is_nan())
    }

    pub fn set(&mut self, id: ObsId, value: Option<f64>) {
        let idx = id.index();
        if self.values.len() <= idx {
            self.values.resize(idx + 1, None);
        }
        self.values[idx] = value;
    }

    pub fn with(mut self, id: ObsId, value: f64) -> Self {
        self.set(id, Some(value));
        self
    }

    /// Present (non-null) values
    pub fn values(&self) -> impl Iterator<Item = (ObsId, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(idx, v)| v.filter(|v| !v.is_nan()).map(|v| (ObsId::from_index(idx), v)))
    }

    /// Sampling weight of this record (its interval in seconds)
    pub fn weight(&self) -> i64 {
        i64::from(self.interval)
    }

    pub fn vector_sample(&self, ids: VectorIds) -> VectorSample {
        VectorSample {
            magnitude: self.get(ids.magnitude),
            direction: self.get(ids.direction),
            peak: self.get(ids.peak),
            peak_dir: self.get(ids.peak_dir),
        }
    }
}

/// Vector-only columns of a daily summary row
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VectorColumns {
    pub max_dir: Option<f64>,
    pub xsum: f64,
    pub ysum: f64,
    pub squaresum: f64,
    pub squarecount: i64,
}

/// One persisted rollup for one observation type and one archive day
#[derive(Debug, Clone, PartialEq)]
pub struct DailySummaryRow {
    /// Local midnight starting the day
    pub date_time: Timestamp,
    pub min: Option<f64>,
    pub mintime: Option<Timestamp>,
    pub max: Option<f64>,
    pub maxtime: Option<Timestamp>,
    pub sum: f64,
    pub count: i64,
    pub wsum: f64,
    pub sumtime: i64,
    pub vector: Option<VectorColumns>,
}

impl DailySummaryRow {
    pub fn is_vector(&self) -> bool {
        self.vector.is_some()
    }

    /// Time-weighted average for the day, `None` when nothing was sampled
    pub fn avg(&self) -> Option<f64> {
        (self.sumtime != 0).then(|| self.wsum / self.sumtime as f64)
    }
}
