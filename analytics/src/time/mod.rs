//! Time units, bucket steps and the active time period.
//!
//! A request's `timeline_*` parameters resolve into a [`TimePeriod`]: a
//! concrete window plus the helpers needed to pick a bucket [`Step`], build
//! the time criteria and produce bucket-aligned zoom links.
//!
//! # Example
//!
//! ```
//! use analytics::time::{PeriodParameters, TimePeriod, TimeUnit, TimelineUnit, Timezone};
//! use chrono::{TimeZone, Utc};
//!
//! let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 30, 0).unwrap();
//! let params = PeriodParameters::relative(1, TimelineUnit::Unit(TimeUnit::Day));
//! let period = TimePeriod::new(params, Timezone::utc(), now).unwrap();
//!
//! let step = period.get_step(None).unwrap();
//! assert_eq!(step.unit, TimeUnit::Hour);
//! ```

mod period;
mod step;
mod timezone;
mod unit;

pub use period::{round_up, truncate, PeriodParameters, TimePeriod, TimelineMode, TimelineUnit};
pub use step::{CalendarDelta, Step};
pub use timezone::Timezone;
pub use unit::TimeUnit;

use thiserror::Error;

/// Errors raised while resolving units and periods.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeError {
    /// Unknown unit name or out-of-range unit index.
    #[error("Invalid time unit: '{0}'")]
    InvalidUnit(String),

    /// Unknown timeline mode.
    #[error("Invalid timeline mode: '{0}'")]
    InvalidMode(String),

    /// Unparseable timezone.
    #[error("Invalid timezone: '{0}'")]
    InvalidTimezone(String),

    /// Epoch timestamp outside the supported range.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),

    /// The operation needs a bound the period does not have.
    #[error("Time period has no {0} bound")]
    Unbounded(&'static str),

    /// Calendar arithmetic overflowed.
    #[error("Time arithmetic out of range")]
    OutOfRange,
}
