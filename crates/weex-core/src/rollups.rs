//! Daily rollup accumulator
//!
//! An [`Accumulator`] tallies one observation type over one bounded interval
//! (an archive day). Accumulators form a commutative monoid under
//! [`Accumulator::merge`]: the empty accumulator is the identity, and the
//! result does not depend on the order samples or partial tallies arrive in.
//! Equal extrema resolve to the earliest timestamp.

use crate::obs::{ObsDef, ObsId};
use crate::types::{DailySummaryRow, Record, Timestamp, VectorColumns};
use crate::{CoreError, CoreResult};

/// x/y components of a magnitude blowing from compass `bearing` degrees
pub fn vector_components(magnitude: f64, bearing: f64) -> (f64, f64) {
    let theta = (90.0 - bearing).to_radians();
    (magnitude * theta.cos(), magnitude * theta.sin())
}

/// Compass bearing of an x/y vector in `[0, 360)`; `None` for the zero vector
pub fn bearing(x: f64, y: f64) -> Option<f64> {
    if x == 0.0 && y == 0.0 {
        return None;
    }
    Some((90.0 - y.atan2(x).to_degrees()).rem_euclid(360.0))
}

/// One reading of a vector observation
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VectorSample {
    pub magnitude: Option<f64>,
    pub direction: Option<f64>,
    /// High-side reading (gust) and its direction
    pub peak: Option<f64>,
    pub peak_dir: Option<f64>,
}

impl VectorSample {
    pub fn is_empty(&self) -> bool {
        self.magnitude.is_none() && self.peak.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Extreme {
    value: f64,
    time: Timestamp,
    dir: Option<f64>,
}

impl Extreme {
    fn below(&self, other: &Extreme) -> bool {
        self.value < other.value || (self.value == other.value && self.time < other.time)
    }

    fn above(&self, other: &Extreme) -> bool {
        self.value > other.value || (self.value == other.value && self.time < other.time)
    }
}

fn keep_low(slot: &mut Option<Extreme>, candidate: Extreme) {
    match slot {
        Some(current) if !candidate.below(current) => {}
        _ => *slot = Some(candidate),
    }
}

fn keep_high(slot: &mut Option<Extreme>, candidate: Extreme) {
    match slot {
        Some(current) if !candidate.above(current) => {}
        _ => *slot = Some(candidate),
    }
}

fn present(value: Option<f64>) -> Option<f64> {
    value.filter(|v| !v.is_nan())
}

/// Running statistics for one observation type over one day
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulator {
    low: Option<Extreme>,
    high: Option<Extreme>,
    sum: f64,
    count: i64,
    wsum: f64,
    sumtime: i64,
    vector: Option<VectorColumns>,
}

impl Accumulator {
    fn empty(vector: Option<VectorColumns>) -> Self {
        Self {
            low: None,
            high: None,
            sum: 0.0,
            count: 0,
            wsum: 0.0,
            sumtime: 0,
            vector,
        }
    }

    pub fn scalar() -> Self {
        Self::empty(None)
    }

    pub fn vector() -> Self {
        Self::empty(Some(VectorColumns::default()))
    }

    /// Empty accumulator of the kind `def` needs
    pub fn for_def(def: &ObsDef) -> Self {
        if def.is_vector() {
            Self::vector()
        } else {
            Self::scalar()
        }
    }

    pub fn is_vector(&self) -> bool {
        self.vector.is_some()
    }

    /// Feed the reading of type `id` carried by `record`.
    ///
    /// Returns `false` when the record has nothing for this type.
    pub fn add_record(&mut self, id: ObsId, def: &ObsDef, record: &Record) -> CoreResult<bool> {
        match def.vector_ids() {
            Some(ids) => {
                let sample = record.vector_sample(ids);
                if sample.is_empty() {
                    return Ok(false);
                }
                self.add_vector(record.date_time, sample, record.weight())?;
                Ok(true)
            }
            None => {
                if self.is_vector() {
                    return Err(CoreError::KindMismatch {
                        expected: "vector",
                        found: "scalar",
                    });
                }
                let value = record.get(id);
                self.add_sample(record.date_time, value, record.weight());
                Ok(value.is_some())
            }
        }
    }

    fn kind(&self) -> &'static str {
        if self.is_vector() {
            "vector"
        } else {
            "scalar"
        }
    }

    /// Add one scalar reading; a null reading is ignored entirely.
    pub fn add_sample(&mut self, time: Timestamp, value: Option<f64>, weight: i64) {
        let Some(value) = present(value) else {
            return;
        };
        self.count += 1;
        self.sum += value;
        self.wsum += value * weight as f64;
        self.sumtime += weight;
        let extreme = Extreme {
            value,
            time,
            dir: None,
        };
        keep_low(&mut self.low, extreme);
        keep_high(&mut self.high, extreme);
    }

    /// Add one vector reading. The magnitude feeds the scalar statistics and
    /// the x/y sums; the peak feeds the daily high and its direction.
    pub fn add_vector(&mut self, time: Timestamp, sample: VectorSample, weight: i64) -> CoreResult<()> {
        let Some(sums) = self.vector.as_mut() else {
            return Err(CoreError::KindMismatch {
                expected: "scalar",
                found: "vector",
            });
        };

        if let Some(magnitude) = present(sample.magnitude) {
            sums.squaresum += magnitude * magnitude;
            sums.squarecount += 1;
            if let Some(direction) = present(sample.direction) {
                let (x, y) = vector_components(magnitude, direction);
                sums.xsum += x;
                sums.ysum += y;
            }
            self.count += 1;
            self.sum += magnitude;
            self.wsum += magnitude * weight as f64;
            self.sumtime += weight;
            keep_low(
                &mut self.low,
                Extreme {
                    value: magnitude,
                    time,
                    dir: None,
                },
            );
        }

        if let Some(peak) = present(sample.peak) {
            keep_high(
                &mut self.high,
                Extreme {
                    value: peak,
                    time,
                    dir: present(sample.peak_dir),
                },
            );
        }
        Ok(())
    }

    /// Fold another accumulator over a disjoint sample set into this one.
    ///
    /// Fails without modifying `self` when the kinds differ.
    pub fn merge(&mut self, other: &Accumulator) -> CoreResult<()> {
        match (self.vector.as_mut(), other.vector.as_ref()) {
            (Some(mine), Some(theirs)) => {
                mine.xsum += theirs.xsum;
                mine.ysum += theirs.ysum;
                mine.squaresum += theirs.squaresum;
                mine.squarecount += theirs.squarecount;
            }
            (None, None) => {}
            _ => {
                return Err(CoreError::KindMismatch {
                    expected: self.kind(),
                    found: other.kind(),
                })
            }
        }
        if let Some(low) = other.low {
            keep_low(&mut self.low, low);
        }
        if let Some(high) = other.high {
            keep_high(&mut self.high, high);
        }
        self.sum += other.sum;
        self.count += other.count;
        self.wsum += other.wsum;
        self.sumtime += other.sumtime;
        Ok(())
    }

    pub fn to_row(&self, day_start: Timestamp) -> DailySummaryRow {
        DailySummaryRow {
            date_time: day_start,
            min: self.low.map(|e| e.value),
            mintime: self.low.map(|e| e.time),
            max: self.high.map(|e| e.value),
            maxtime: self.high.map(|e| e.time),
            sum: self.sum,
            count: self.count,
            wsum: self.wsum,
            sumtime: self.sumtime,
            vector: self.vector.map(|sums| VectorColumns {
                max_dir: self.high.and_then(|e| e.dir),
                ..sums
            }),
        }
    }

    pub fn from_row(row: &DailySummaryRow) -> Self {
        let extreme = |value: Option<f64>, time: Option<Timestamp>, dir: Option<f64>| match (value, time) {
            (Some(value), Some(time)) => Some(Extreme { value, time, dir }),
            _ => None,
        };
        Self {
            low: extreme(row.min, row.mintime, None),
            high: extreme(row.max, row.maxtime, row.vector.and_then(|v| v.max_dir)),
            sum: row.sum,
            count: row.count,
            wsum: row.wsum,
            sumtime: row.sumtime,
            vector: row.vector.map(|v| VectorColumns { max_dir: None, ..v }),
        }
    }

    pub fn count(&self) -> i64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0 && self.high.is_none()
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn min(&self) -> Option<(f64, Timestamp)> {
        self.low.map(|e| (e.value, e.time))
    }

    pub fn max(&self) -> Option<(f64, Timestamp)> {
        self.high.map(|e| (e.value, e.time))
    }

    /// Time-weighted average, `None` when nothing was sampled
    pub fn avg(&self) -> Option<f64> {
        (self.sumtime != 0).then(|| self.wsum / self.sumtime as f64)
    }

    /// Direction of the summed vector, `None` for scalar or calm tallies
    pub fn vector_direction(&self) -> Option<f64> {
        self.vector.and_then(|v| bearing(v.xsum, v.ysum))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: Timestamp = 1_709_251_500;

    fn scalar_of(samples: &[(Timestamp, f64)]) -> Accumulator {
        let mut acc = Accumulator::scalar();
        for (t, v) in samples {
            acc.add_sample(*t, Some(*v), 300);
        }
        acc
    }

    #[test]
    fn test_three_out_temp_samples() {
        let acc = scalar_of(&[(T0, 10.0), (T0 + 3600, 20.0), (T0 + 7200, 5.0)]);
        assert_eq!(acc.min(), Some((5.0, T0 + 7200)));
        assert_eq!(acc.max(), Some((20.0, T0 + 3600)));
        assert_eq!(acc.count(), 3);
        assert_eq!(acc.sum(), 35.0);

        let row = acc.to_row(T0 - 300);
        assert_eq!(row.sumtime, 900);
        assert_eq!(row.wsum, 35.0 * 300.0);
        assert!(row.vector.is_none());
    }

    #[test]
    fn test_null_sample_ignored() {
        let mut acc = Accumulator::scalar();
        acc.add_sample(T0, None, 300);
        acc.add_sample(T0 + 300, Some(f64::NAN), 300);
        assert_eq!(acc, Accumulator::scalar());
        assert_eq!(acc.avg(), None);
        assert!(acc.is_empty());
    }

    #[test]
    fn test_ties_keep_earliest_regardless_of_order() {
        let forward = scalar_of(&[(T0, 7.0), (T0 + 300, 7.0)]);
        let backward = scalar_of(&[(T0 + 300, 7.0), (T0, 7.0)]);
        assert_eq!(forward.min(), Some((7.0, T0)));
        assert_eq!(forward.max(), Some((7.0, T0)));
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_merge_commutative_and_associative() {
        let a = scalar_of(&[(T0, 3.0), (T0 + 300, 9.0)]);
        let b = scalar_of(&[(T0 + 600, 9.0), (T0 + 900, -1.5)]);
        let c = scalar_of(&[(T0 + 1200, -1.5), (T0 + 1500, 4.25)]);

        let mut ab = a.clone();
        ab.merge(&b).unwrap();
        let mut ba = b.clone();
        ba.merge(&a).unwrap();
        assert_eq!(ab, ba);

        let mut ab_c = ab.clone();
        ab_c.merge(&c).unwrap();
        let mut bc = b.clone();
        bc.merge(&c).unwrap();
        let mut a_bc = a.clone();
        a_bc.merge(&bc).unwrap();
        assert_eq!(ab_c, a_bc);

        let all = scalar_of(&[
            (T0, 3.0),
            (T0 + 300, 9.0),
            (T0 + 600, 9.0),
            (T0 + 900, -1.5),
            (T0 + 1200, -1.5),
            (T0 + 1500, 4.25),
        ]);
        assert_eq!(ab_c, all);
        assert_eq!(all.max(), Some((9.0, T0 + 300)));
        assert_eq!(all.min(), Some((-1.5, T0 + 900)));
    }

    #[test]
    fn test_empty_is_identity() {
        let a = scalar_of(&[(T0, 3.0)]);
        let mut merged = Accumulator::scalar();
        merged.merge(&a).unwrap();
        assert_eq!(merged, a);

        let mut v = Accumulator::vector();
        v.merge(&Accumulator::vector()).unwrap();
        assert_eq!(v, Accumulator::vector());
    }

    #[test]
    fn test_vector_sample_components() {
        let mut acc = Accumulator::vector();
        let sample = VectorSample {
            magnitude: Some(10.0),
            direction: Some(90.0),
            peak: Some(15.0),
            peak_dir: Some(80.0),
        };
        acc.add_vector(T0, sample, 300).unwrap();

        let row = acc.to_row(0);
        let v = row.vector.unwrap();
        assert!((v.xsum - 10.0).abs() < 1e-9);
        assert!(v.ysum.abs() < 1e-9);
        assert_eq!(v.squaresum, 100.0);
        assert_eq!(v.squarecount, 1);
        assert_eq!(v.max_dir, Some(80.0));
        assert_eq!(row.max, Some(15.0));
        assert_eq!(row.min, Some(10.0));
        assert!((acc.vector_direction().unwrap() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_calm_vector_has_no_direction() {
        let mut acc = Accumulator::vector();
        let calm = VectorSample {
            magnitude: Some(0.0),
            direction: None,
            peak: Some(0.0),
            peak_dir: None,
        };
        acc.add_vector(T0, calm, 300).unwrap();
        assert_eq!(acc.count(), 1);
        assert_eq!(acc.vector_direction(), None);
    }

    #[test]
    fn test_bearing_conversion() {
        let (x, y) = vector_components(1.0, 0.0);
        assert!((bearing(x, y).unwrap() - 0.0).abs() < 1e-9 || (bearing(x, y).unwrap() - 360.0).abs() < 1e-9);
        let (x, y) = vector_components(2.0, 270.0);
        assert!((bearing(x, y).unwrap() - 270.0).abs() < 1e-9);
        assert_eq!(bearing(0.0, 0.0), None);
    }

    #[test]
    fn test_add_record_by_kind() {
        use crate::{ObsSchema, UnitSystem};

        let schema = ObsSchema::standard();
        let out_temp = schema.lookup("outTemp").unwrap();
        let wind = schema.lookup("wind").unwrap();
        let record = schema
            .record(T0, UnitSystem::Us, 300, &[("outTemp", 41.0), ("windSpeed", 3.0), ("windDir", 180.0)])
            .unwrap();

        let mut temp = Accumulator::for_def(schema.def(out_temp));
        assert!(temp.add_record(out_temp, schema.def(out_temp), &record).unwrap());
        assert_eq!(temp.max(), Some((41.0, T0)));

        let mut vec = Accumulator::for_def(schema.def(wind));
        assert!(vec.is_vector());
        assert!(vec.add_record(wind, schema.def(wind), &record).unwrap());
        assert_eq!(vec.count(), 1);
        // no gust reported, so no daily high
        assert_eq!(vec.max(), None);

        let rain = schema.lookup("rain").unwrap();
        let mut empty = Accumulator::for_def(schema.def(rain));
        assert!(!empty.add_record(rain, schema.def(rain), &record).unwrap());
        assert!(empty.is_empty());
    }

    #[test]
    fn test_kind_mismatch() {
        let mut scalar = Accumulator::scalar();
        let err = scalar.add_vector(T0, VectorSample::default(), 300);
        assert!(matches!(err, Err(CoreError::KindMismatch { .. })));

        let a = scalar_of(&[(T0, 1.0)]);
        let mut v = Accumulator::vector();
        assert!(v.merge(&a).is_err());
        assert_eq!(v, Accumulator::vector());
    }

    #[test]
    fn test_row_round_trip_keeps_gust_direction() {
        let mut acc = Accumulator::vector();
        acc.add_vector(
            T0,
            VectorSample {
                magnitude: Some(4.0),
                direction: Some(180.0),
                peak: Some(9.0),
                peak_dir: Some(200.0),
            },
            300,
        )
        .unwrap();
        let row = acc.to_row(T0 - 300);
        let restored = Accumulator::from_row(&row);
        assert_eq!(restored.to_row(T0 - 300), row);

        let mut later = Accumulator::vector();
        later
            .add_vector(
                T0 + 300,
                VectorSample {
                    magnitude: Some(2.0),
                    direction: Some(0.0),
                    peak: Some(12.0),
                    peak_dir: Some(10.0),
                },
                300,
            )
            .unwrap();
        let mut merged = restored;
        merged.merge(&later).unwrap();
        let merged_row = merged.to_row(T0 - 300);
        assert_eq!(merged_row.max, Some(12.0));
        assert_eq!(merged_row.vector.unwrap().max_dir, Some(10.0));
        assert_eq!(merged_row.count, 2);
    }
}
