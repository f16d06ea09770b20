//! Time sources and local-time helpers.
//!
//! Every computation in this crate takes an explicit reference instant. The
//! `Clock` trait is the single place the wall clock is read, so the controller
//! and the engine can be driven by a `ManualClock` for replay and tests.

use crate::error::{Result, ScheduleError};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Mutex;

/// A source of "now" in the configured zone.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Tz>;

    /// The calendar date of `now()`.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Reads the operating system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    timezone: Tz,
}

impl SystemClock {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.timezone)
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Tz>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Tz>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Tz>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Tz> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Maps a naive local time onto `tz`, taking the earlier instant when the
/// local time is ambiguous (DST fall-back).
pub fn localize(tz: &Tz, local: NaiveDateTime) -> Result<DateTime<Tz>> {
    tz.from_local_datetime(&local)
        .earliest()
        .ok_or(ScheduleError::NonexistentLocalTime { local })
}

/// Combines a calendar day and a clock time in `tz`.
pub fn at(tz: &Tz, date: NaiveDate, time: NaiveTime) -> Result<DateTime<Tz>> {
    localize(tz, date.and_time(time))
}

/// Converts a fractional hour count into a `Duration`, at millisecond precision.
pub fn hours(value: f64) -> Duration {
    Duration::milliseconds((value * 3_600_000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::Toronto;

    fn local(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn fractional_hours_convert_to_minutes() {
        assert_eq!(hours(1.5), Duration::minutes(90));
        assert_eq!(hours(0.0), Duration::zero());
        assert_eq!(hours(3.0), Duration::hours(3));
    }

    #[test]
    fn dst_gap_is_rejected() {
        // 2022-03-13 02:30 never happens in Toronto.
        let err = localize(&Toronto, local("2022-03-13 02:30:00")).unwrap_err();
        assert!(matches!(err, ScheduleError::NonexistentLocalTime { .. }));
    }

    #[test]
    fn ambiguous_local_time_takes_the_earlier_instant() {
        let first = localize(&Toronto, local("2022-11-06 01:30:00")).unwrap();
        // EDT is UTC-4.
        assert_eq!(first.naive_utc().to_string(), "2022-11-06 05:30:00");
    }

    #[test]
    fn manual_clock_advances() {
        let start = localize(&Toronto, local("2022-01-05 06:00:00")).unwrap();
        let clock = ManualClock::new(start);
        clock.advance(Duration::hours(2));
        assert_eq!(clock.now(), start + Duration::hours(2));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2022, 1, 5).unwrap());
    }
}
