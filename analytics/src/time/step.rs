//! Bucket steps: a unit, its calendar delta, its display format and its
//! bucket column name.

use super::{TimeError, TimeUnit};
use chrono::{DateTime, Days, Months, NaiveDateTime, TimeDelta, TimeZone};
use serde::Serialize;

/// A calendar-aware span: whole months, whole days and an exact duration.
///
/// Month arithmetic clamps to the end of shorter months, so one month after
/// January 31st is the last day of February. Days move the local date and
/// keep the wall-clock time, so a day across a DST change lasts 23 or 25
/// hours. Wall-clock times resolve through [`from_local`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarDelta {
    months: u32,
    days: u64,
    duration: TimeDelta,
}

impl CalendarDelta {
    /// Returns the span covering `value` units.
    #[must_use]
    pub fn of(unit: TimeUnit, value: u32) -> Self {
        let v = i64::from(value);
        let exact = |duration| Self {
            months: 0,
            days: 0,
            duration,
        };
        match unit {
            TimeUnit::Year => Self {
                months: value.saturating_mul(12),
                days: 0,
                duration: TimeDelta::zero(),
            },
            TimeUnit::Month => Self {
                months: value,
                days: 0,
                duration: TimeDelta::zero(),
            },
            TimeUnit::Day => Self {
                months: 0,
                days: u64::from(value),
                duration: TimeDelta::zero(),
            },
            TimeUnit::Hour => exact(TimeDelta::hours(v)),
            TimeUnit::Minute => exact(TimeDelta::minutes(v)),
            TimeUnit::Second => exact(TimeDelta::seconds(v)),
            TimeUnit::Millisecond => exact(TimeDelta::milliseconds(v)),
            TimeUnit::Microsecond => exact(TimeDelta::microseconds(v)),
        }
    }

    /// Adds the span to `dt`.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::OutOfRange`] on calendar overflow.
    pub fn add_to<Tz: TimeZone>(&self, dt: DateTime<Tz>) -> Result<DateTime<Tz>, TimeError> {
        let mut dt = dt;
        if self.months > 0 {
            dt = shift_local(&dt, |n| n.checked_add_months(Months::new(self.months)))?;
        }
        if self.days > 0 {
            dt = shift_local(&dt, |n| n.checked_add_days(Days::new(self.days)))?;
        }
        dt.checked_add_signed(self.duration).ok_or(TimeError::OutOfRange)
    }

    /// Subtracts the span from `dt`.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::OutOfRange`] on calendar overflow.
    pub fn sub_from<Tz: TimeZone>(&self, dt: DateTime<Tz>) -> Result<DateTime<Tz>, TimeError> {
        let mut dt = dt;
        if self.months > 0 {
            dt = shift_local(&dt, |n| n.checked_sub_months(Months::new(self.months)))?;
        }
        if self.days > 0 {
            dt = shift_local(&dt, |n| n.checked_sub_days(Days::new(self.days)))?;
        }
        dt.checked_sub_signed(self.duration).ok_or(TimeError::OutOfRange)
    }
}

fn shift_local<Tz: TimeZone>(
    dt: &DateTime<Tz>,
    shift: impl FnOnce(NaiveDateTime) -> Option<NaiveDateTime>,
) -> Result<DateTime<Tz>, TimeError> {
    shift(dt.naive_local())
        .and_then(|naive| from_local(&dt.timezone(), naive))
        .ok_or(TimeError::OutOfRange)
}

/// Resolves a wall-clock time in `zone`: the earlier instant when the time
/// is ambiguous, one hour later when a DST change skips it.
pub(super) fn from_local<Tz: TimeZone>(zone: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    zone.from_local_datetime(&naive).earliest().or_else(|| {
        let later = naive.checked_add_signed(TimeDelta::hours(1))?;
        zone.from_local_datetime(&later).earliest()
    })
}

/// A bucket step derived from a [`TimeUnit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    /// The bucket granularity.
    pub unit: TimeUnit,
    /// Number of units per bucket.
    pub value: u32,
    /// Span of one bucket.
    #[serde(skip)]
    pub delta: CalendarDelta,
    /// `strftime` format used to label buckets.
    pub unit_format: &'static str,
    /// Bucket column name in the query contract.
    pub dbunit: &'static str,
}

impl Step {
    /// Creates the step covering `value` units of `unit`.
    #[must_use]
    pub fn new(unit: TimeUnit, value: u32) -> Self {
        Self {
            unit,
            value,
            delta: CalendarDelta::of(unit, value),
            unit_format: label_format(unit),
            dbunit: unit.dbunit(),
        }
    }
}

const fn label_format(unit: TimeUnit) -> &'static str {
    match unit {
        TimeUnit::Year => "%Y",
        TimeUnit::Month => "%m/%Y",
        TimeUnit::Day => "%m/%d/%Y",
        TimeUnit::Hour => "%m/%d/%Y %Hh",
        TimeUnit::Minute => "%Hh%M",
        TimeUnit::Second => "%Hh%M:%S",
        TimeUnit::Millisecond => "%H:%M:%S%.3f",
        TimeUnit::Microsecond => "%H:%M:%S%.6f",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_step_fields() {
        let step = Step::new(TimeUnit::Year, 2);
        assert_eq!(step.unit_format, "%Y");
        assert_eq!(step.dbunit, "year");

        let step = Step::new(TimeUnit::Day, 1);
        assert_eq!(step.unit_format, "%m/%d/%Y");
        assert_eq!(step.dbunit, "mday");

        let step = Step::new(TimeUnit::Minute, 1);
        assert_eq!(step.unit_format, "%Hh%M");
        assert_eq!(step.dbunit, "min");
    }

    #[test]
    fn test_month_delta_clamps() {
        let jan31 = Utc.with_ymd_and_hms(2023, 1, 31, 10, 0, 0).unwrap();
        let next = CalendarDelta::of(TimeUnit::Month, 1).add_to(jan31).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2023, 2, 28, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_year_delta_is_twelve_months() {
        let dt = Utc.with_ymd_and_hms(2020, 2, 29, 0, 0, 0).unwrap();
        let back = CalendarDelta::of(TimeUnit::Year, 1).sub_from(dt).unwrap();
        assert_eq!(back, Utc.with_ymd_and_hms(2019, 2, 28, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_day_delta_keeps_wall_clock_across_dst() {
        let paris = chrono_tz::Europe::Paris;
        let before = paris.with_ymd_and_hms(2024, 3, 30, 12, 0, 0).unwrap();
        let after = CalendarDelta::of(TimeUnit::Day, 1).add_to(before).unwrap();
        assert_eq!(after, paris.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap());
        assert_eq!(after - before, TimeDelta::hours(23));
    }

    #[test]
    fn test_month_delta_into_ambiguous_hour_picks_earlier() {
        let paris = chrono_tz::Europe::Paris;
        let dt = paris.with_ymd_and_hms(2024, 9, 27, 2, 30, 0).unwrap();
        let next = CalendarDelta::of(TimeUnit::Month, 1).add_to(dt).unwrap();
        assert_eq!(next.fixed_offset().to_rfc3339(), "2024-10-27T02:30:00+02:00");
    }

    #[test]
    fn test_exact_delta() {
        let dt = Utc.with_ymd_and_hms(2020, 1, 1, 23, 0, 0).unwrap();
        let next = CalendarDelta::of(TimeUnit::Hour, 2).add_to(dt).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2020, 1, 2, 1, 0, 0).unwrap());
    }
}
