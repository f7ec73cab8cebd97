//! Timespans and station-local day boundaries
//!
//! Records are stamped with the *end* of their sampling interval, so a record
//! at `t` belongs to a span when `start < t <= stop`, and a record stamped at
//! exactly local midnight closes out the previous day.

use crate::types::Timestamp;
use crate::{CoreError, CoreResult};
use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt;

/// Half-open interval `[start, stop)` of unix seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timespan {
    pub start: Timestamp,
    pub stop: Timestamp,
}

impl Timespan {
    pub fn new(start: Timestamp, stop: Timestamp) -> CoreResult<Self> {
        if start > stop {
            return Err(CoreError::InvalidTimespan { start, stop });
        }
        Ok(Self { start, stop })
    }

    /// Whether a record stamped `date_time` falls inside this span
    pub fn includes_record(&self, date_time: Timestamp) -> bool {
        self.start < date_time && date_time <= self.stop
    }

    pub fn length(&self) -> i64 {
        self.stop - self.start
    }
}

impl fmt::Display for Timespan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.stop)
    }
}

/// Day-boundary arithmetic in the station's time zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayClock {
    tz: Tz,
}

impl Default for DayClock {
    fn default() -> Self {
        Self::utc()
    }
}

impl DayClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn utc() -> Self {
        Self::new(Tz::UTC)
    }

    /// Clock for an IANA zone name such as `America/Los_Angeles`
    pub fn from_name(name: &str) -> CoreResult<Self> {
        name.parse::<Tz>()
            .map(Self::new)
            .map_err(|_| CoreError::UnknownTimeZone(name.to_string()))
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    fn local_date(&self, ts: Timestamp) -> NaiveDate {
        DateTime::<Utc>::from_timestamp(ts, 0)
            .unwrap_or_default()
            .with_timezone(&self.tz)
            .date_naive()
    }

    /// First instant of a local calendar date.
    ///
    /// An ambiguous midnight resolves to the earlier instant; a midnight
    /// skipped by a DST jump moves forward to the first local minute that exists.
    fn midnight(&self, date: NaiveDate) -> Timestamp {
        let naive = date.and_time(NaiveTime::MIN);
        for minutes in 0..=120 {
            let candidate: NaiveDateTime = naive + TimeDelta::minutes(minutes);
            match self.tz.from_local_datetime(&candidate) {
                LocalResult::Single(t) => return t.timestamp(),
                LocalResult::Ambiguous(earliest, _) => return earliest.timestamp(),
                LocalResult::None => continue,
            }
        }
        // No zone in the tz database skips more than two hours at midnight
        naive.and_utc().timestamp()
    }

    /// Start of the local day containing `ts`
    pub fn start_of_day(&self, ts: Timestamp) -> Timestamp {
        self.midnight(self.local_date(ts))
    }

    /// Start of the archive day a record stamped `ts` belongs to
    pub fn archive_day_start(&self, ts: Timestamp) -> Timestamp {
        self.start_of_day(ts - 1)
    }

    pub fn is_midnight(&self, ts: Timestamp) -> bool {
        self.start_of_day(ts) == ts
    }

    /// Start of the day after the one starting at (or containing) `ts`
    pub fn next_day_start(&self, ts: Timestamp) -> Timestamp {
        let date = self.local_date(ts);
        match date.succ_opt() {
            Some(next) => self.midnight(next),
            None => ts + 86_400,
        }
    }

    /// The whole archive day starting at `day_start`
    pub fn day_span(&self, day_start: Timestamp) -> Timespan {
        Timespan {
            start: day_start,
            stop: self.next_day_start(day_start),
        }
    }

    /// Whole local days overlapping `span`, in order
    pub fn day_spans(&self, span: Timespan) -> DaySpans {
        DaySpans {
            clock: *self,
            next: self.start_of_day(span.start),
            stop: span.stop,
        }
    }
}

/// Iterator over whole days, see [`DayClock::day_spans`]
#[derive(Debug, Clone)]
pub struct DaySpans {
    clock: DayClock,
    next: Timestamp,
    stop: Timestamp,
}

impl Iterator for DaySpans {
    type Item = Timespan;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.stop {
            return None;
        }
        let day = self.clock.day_span(self.next);
        self.next = day.stop;
        Some(day)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-03-01 00:00:00 UTC
    const MAR_1: Timestamp = 1_709_251_200;
    const DAY: i64 = 86_400;

    #[test]
    fn test_midnight_belongs_to_previous_day() {
        let clock = DayClock::utc();
        assert_eq!(clock.archive_day_start(MAR_1 + 300), MAR_1);
        assert_eq!(clock.archive_day_start(MAR_1 + DAY), MAR_1);
        assert_eq!(clock.archive_day_start(MAR_1), MAR_1 - DAY);
        assert_eq!(clock.start_of_day(MAR_1), MAR_1);
    }

    #[test]
    fn test_is_midnight() {
        let clock = DayClock::utc();
        assert!(clock.is_midnight(MAR_1));
        assert!(!clock.is_midnight(MAR_1 + 1));
    }

    #[test]
    fn test_local_midnight_in_zone() {
        // Los Angeles is UTC-8 on 2024-03-01
        let clock = DayClock::from_name("America/Los_Angeles").unwrap();
        let local_midnight = MAR_1 + 8 * 3600;
        assert_eq!(clock.start_of_day(MAR_1 + 10 * 3600), local_midnight);
        assert!(clock.is_midnight(local_midnight));
        assert!(!clock.is_midnight(MAR_1));
    }

    #[test]
    fn test_dst_day_is_23_hours() {
        // 2024-03-10 is the spring-forward day in New York
        let clock = DayClock::from_name("America/New_York").unwrap();
        let mar_10 = MAR_1 + 9 * DAY + 5 * 3600;
        assert!(clock.is_midnight(mar_10));
        let span = clock.day_span(mar_10);
        assert_eq!(span.length(), 23 * 3600);
    }

    #[test]
    fn test_day_spans_cover_partial_days() {
        let clock = DayClock::utc();
        let span = Timespan::new(MAR_1 + 3600, MAR_1 + 2 * DAY + 60).unwrap();
        let days: Vec<_> = clock.day_spans(span).collect();
        assert_eq!(days.len(), 3);
        assert_eq!(days[0], Timespan::new(MAR_1, MAR_1 + DAY).unwrap());
        assert_eq!(days[2].start, MAR_1 + 2 * DAY);

        let aligned = Timespan::new(MAR_1, MAR_1 + 2 * DAY).unwrap();
        assert_eq!(clock.day_spans(aligned).count(), 2);
    }

    #[test]
    fn test_timespan_membership() {
        let span = Timespan::new(MAR_1, MAR_1 + DAY).unwrap();
        assert!(!span.includes_record(MAR_1));
        assert!(span.includes_record(MAR_1 + 1));
        assert!(span.includes_record(MAR_1 + DAY));
        assert!(Timespan::new(10, 5).is_err());
    }

    #[test]
    fn test_unknown_zone() {
        assert!(matches!(
            DayClock::from_name("Mars/Olympus_Mons"),
            Err(CoreError::UnknownTimeZone(_))
        ));
    }
}
