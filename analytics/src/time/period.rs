//! The active time window of a request.

use super::step::from_local;
use super::{CalendarDelta, Step, TimeError, TimeUnit, Timezone};
use crate::context::RequestParameters;
use crate::criteria::{Criterion, Operator, Path};
use crate::error::AnalyticsError;
use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, SubsecRound, TimeDelta, TimeZone,
    Timelike, Utc,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How the window bounds are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimelineMode {
    /// The window ends now.
    #[default]
    Relative,
    /// The window ends at the unit boundary enclosing now.
    Absolute,
    /// Explicit start and end timestamps.
    Custom,
}

impl TimelineMode {
    /// Returns the parameter value for this mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Relative => "relative",
            Self::Absolute => "absolute",
            Self::Custom => "custom",
        }
    }
}

impl FromStr for TimelineMode {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relative" => Ok(Self::Relative),
            "absolute" => Ok(Self::Absolute),
            "custom" => Ok(Self::Custom),
            other => Err(TimeError::InvalidMode(other.to_string())),
        }
    }
}

/// The unit a period is measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineUnit {
    /// A calendar unit.
    Unit(TimeUnit),
    /// Everything since the epoch.
    Unlimited,
}

impl std::fmt::Display for TimelineUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unit(unit) => write!(f, "{unit}"),
            Self::Unlimited => f.write_str("unlimited"),
        }
    }
}

impl FromStr for TimelineUnit {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "unlimited" {
            Ok(Self::Unlimited)
        } else {
            s.parse().map(Self::Unit)
        }
    }
}

/// The `timeline_*` request parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodParameters {
    /// `timeline_mode`.
    pub mode: TimelineMode,
    /// `timeline_value`: number of units.
    pub value: u32,
    /// `timeline_unit`.
    pub unit: TimelineUnit,
    /// `timeline_start`, epoch seconds.
    pub start: Option<i64>,
    /// `timeline_end`, epoch seconds.
    pub end: Option<i64>,
}

impl Default for PeriodParameters {
    fn default() -> Self {
        Self::relative(1, TimelineUnit::Unit(TimeUnit::Hour))
    }
}

impl PeriodParameters {
    /// A relative window of `value` units ending now.
    #[must_use]
    pub const fn relative(value: u32, unit: TimelineUnit) -> Self {
        Self {
            mode: TimelineMode::Relative,
            value,
            unit,
            start: None,
            end: None,
        }
    }

    /// An absolute window of `value` whole units ending at the boundary
    /// after now.
    #[must_use]
    pub const fn absolute(value: u32, unit: TimelineUnit) -> Self {
        Self {
            mode: TimelineMode::Absolute,
            value,
            unit,
            start: None,
            end: None,
        }
    }

    /// A custom window between two epoch timestamps.
    #[must_use]
    pub const fn custom(start: Option<i64>, end: Option<i64>) -> Self {
        Self {
            mode: TimelineMode::Custom,
            value: 1,
            unit: TimelineUnit::Unit(TimeUnit::Hour),
            start,
            end,
        }
    }

    /// Reads and validates the `timeline_*` parameters.
    ///
    /// A `timeline_start` or `timeline_end` without an explicit mode
    /// selects the custom mode.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::InvalidParameterValue`] naming the first
    /// malformed parameter.
    pub fn from_request(params: &RequestParameters) -> Result<Self, AnalyticsError> {
        let mut out = Self::default();

        if let Some(value) = params.get("timeline_value") {
            out.value = value
                .trim()
                .parse()
                .map_err(|_| AnalyticsError::invalid_value("timeline_value", value))?;
        }
        if let Some(unit) = params.get("timeline_unit") {
            out.unit = unit
                .parse()
                .map_err(|_| AnalyticsError::invalid_value("timeline_unit", unit))?;
        }
        out.start = parse_timestamp(params, "timeline_start")?;
        out.end = parse_timestamp(params, "timeline_end")?;

        out.mode = match params.get("timeline_mode") {
            Some(mode) => mode
                .parse()
                .map_err(|_| AnalyticsError::invalid_value("timeline_mode", mode))?,
            None if out.start.is_some() || out.end.is_some() => TimelineMode::Custom,
            None => TimelineMode::Relative,
        };

        Ok(out)
    }

    /// Returns the parameters as request pairs, for link building.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("timeline_mode", self.mode.as_str().to_string()),
            ("timeline_value", self.value.to_string()),
            ("timeline_unit", self.unit.to_string()),
        ];
        if let Some(start) = self.start {
            pairs.push(("timeline_start", start.to_string()));
        }
        if let Some(end) = self.end {
            pairs.push(("timeline_end", end.to_string()));
        }
        pairs
    }
}

fn parse_timestamp(
    params: &RequestParameters,
    name: &str,
) -> Result<Option<i64>, AnalyticsError> {
    params
        .get(name)
        .map(|raw| {
            raw.trim()
                .parse::<i64>()
                .map_err(|_| AnalyticsError::invalid_value(name, raw))
        })
        .transpose()
}

/// A resolved time window, in the viewer's timezone.
///
/// Built fresh for every request. Relative and absolute windows always
/// have both bounds; a custom window has the bounds it was given.
#[derive(Debug, Clone)]
pub struct TimePeriod {
    parameters: PeriodParameters,
    timezone: Timezone,
    start: Option<DateTime<FixedOffset>>,
    end: Option<DateTime<FixedOffset>>,
}

impl TimePeriod {
    /// Resolves `parameters` against `now`.
    ///
    /// # Errors
    ///
    /// Returns an error for out-of-range timestamps or calendar overflow.
    pub fn new(
        parameters: PeriodParameters,
        timezone: Timezone,
        now: DateTime<Utc>,
    ) -> Result<Self, TimeError> {
        let now = timezone.localize(&now.trunc_subsecs(6));
        let epoch = timezone.localize(&epoch()?);

        let (start, end) = match (parameters.mode, parameters.unit) {
            (TimelineMode::Custom, _) => {
                let start = parameters
                    .start
                    .map(|ts| from_timestamp(ts, &timezone))
                    .transpose()?;
                let end = parameters
                    .end
                    .map(|ts| {
                        from_timestamp(ts, &timezone)
                            .map(|dt| dt + TimeDelta::microseconds(999_999))
                    })
                    .transpose()?;
                (start, end)
            }
            (TimelineMode::Relative, TimelineUnit::Unlimited) => (Some(epoch), Some(now)),
            (TimelineMode::Relative, TimelineUnit::Unit(unit)) => {
                let start = timezone.sub(&now, CalendarDelta::of(unit, parameters.value))?;
                (Some(start), Some(now))
            }
            (TimelineMode::Absolute, TimelineUnit::Unlimited) => {
                (Some(epoch), Some(timezone.round_up(&now, TimeUnit::Year)?))
            }
            (TimelineMode::Absolute, TimelineUnit::Unit(unit)) => {
                let end = timezone.round_up(&now, unit)?;
                let start = timezone.sub(&end, CalendarDelta::of(unit, parameters.value))?;
                (Some(start), Some(end))
            }
        };

        tracing::debug!(
            mode = parameters.mode.as_str(),
            start = ?start,
            end = ?end,
            "Resolved time period"
        );

        Ok(Self {
            parameters,
            timezone,
            start,
            end,
        })
    }

    /// Resolves `parameters` against the current time.
    ///
    /// # Errors
    ///
    /// See [`TimePeriod::new`].
    pub fn now(parameters: PeriodParameters, timezone: Timezone) -> Result<Self, TimeError> {
        Self::new(parameters, timezone, Utc::now())
    }

    /// The window start, if bounded.
    #[must_use]
    pub const fn start(&self) -> Option<&DateTime<FixedOffset>> {
        self.start.as_ref()
    }

    /// The window end, if bounded.
    #[must_use]
    pub const fn end(&self) -> Option<&DateTime<FixedOffset>> {
        self.end.as_ref()
    }

    /// Both bounds.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::Unbounded`] naming the missing bound.
    pub fn bounds(&self) -> Result<(DateTime<FixedOffset>, DateTime<FixedOffset>), TimeError> {
        let start = self.start.ok_or(TimeError::Unbounded("start"))?;
        let end = self.end.ok_or(TimeError::Unbounded("end"))?;
        Ok((start, end))
    }

    /// The parameters this period was built from.
    #[must_use]
    pub const fn parameters(&self) -> &PeriodParameters {
        &self.parameters
    }

    /// The viewer timezone.
    #[must_use]
    pub const fn timezone(&self) -> &Timezone {
        &self.timezone
    }

    /// Criteria restricting `time_path` to the window.
    ///
    /// Unset bounds are omitted; an unbounded period yields the empty
    /// criterion.
    #[must_use]
    pub fn get_criteria(&self, time_path: &Path) -> Criterion {
        let lower = self.start.map_or(Criterion::Empty, |start| {
            Criterion::compare(time_path.clone(), Operator::GtEq, start)
        });
        let upper = self.end.map_or(Criterion::Empty, |end| {
            Criterion::compare(time_path.clone(), Operator::LtEq, end)
        });
        lower & upper
    }

    /// Picks the bucket step for the window.
    ///
    /// With a target point count, the unit among minute, hour, day and month
    /// whose bucket count is nearest the target wins. Without one, a pinned
    /// unit with a value above one steps one unit finer, and otherwise the
    /// window length selects from a fixed ladder.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::Unbounded`] when the window lacks a bound.
    pub fn get_step(&self, target: Option<u32>) -> Result<Step, TimeError> {
        let (start, end) = self.bounds()?;
        #[allow(clippy::cast_precision_loss)]
        let seconds = (end - start).num_milliseconds() as f64 / 1000.0;

        let unit = if let Some(target) = target {
            let target = f64::from(target);
            let distance = |unit: &TimeUnit| (seconds / unit.approx_seconds() - target).abs();
            [TimeUnit::Minute, TimeUnit::Hour, TimeUnit::Day, TimeUnit::Month]
                .into_iter()
                .min_by(|a, b| distance(a).total_cmp(&distance(b)))
                .unwrap_or(TimeUnit::Hour)
        } else {
            match self.parameters.unit {
                TimelineUnit::Unit(unit)
                    if self.parameters.mode != TimelineMode::Custom
                        && self.parameters.value > 1 =>
                {
                    unit.finer().unwrap_or(unit)
                }
                _ => ladder(seconds),
            }
        };

        Ok(Step::new(unit, 1))
    }

    /// Epoch seconds of `dt` with every calendar field past `precision`
    /// floored (month and day to 1, the others to 0).
    ///
    /// Fields are counted year, month, day, hour, minute, second, so a
    /// precision of 2 keeps the year and month. `None` keeps everything but
    /// the sub-second part.
    #[must_use]
    pub fn mktime_param<Tz: TimeZone>(dt: &DateTime<Tz>, precision: Option<usize>) -> i64 {
        let Some(precision) = precision else {
            return dt.timestamp();
        };

        let local = dt.naive_local();
        let keep = |idx: usize, value: u32, floor: u32| if idx < precision { value } else { floor };
        let floored = NaiveDate::from_ymd_opt(
            local.year(),
            keep(1, local.month(), 1),
            keep(2, local.day(), 1),
        )
        .and_then(|date| {
            date.and_hms_opt(
                keep(3, local.hour(), 0),
                keep(4, local.minute(), 0),
                keep(5, local.second(), 0),
            )
        });

        floored
            .and_then(|naive| dt.timezone().from_local_datetime(&naive).earliest())
            .map_or_else(|| dt.timestamp(), |floored| floored.timestamp())
    }

    /// The request pairs describing this period, for link building.
    #[must_use]
    pub fn get_parameters(&self) -> Vec<(&'static str, String)> {
        self.parameters.to_pairs()
    }

    /// Custom-mode parameters for the window of the same length right after
    /// this one, or `None` for unlimited or unbounded periods.
    #[must_use]
    pub fn next_window(&self) -> Option<PeriodParameters> {
        self.adjacent_window(true)
    }

    /// Custom-mode parameters for the window of the same length right
    /// before this one, or `None` for unlimited or unbounded periods.
    #[must_use]
    pub fn previous_window(&self) -> Option<PeriodParameters> {
        self.adjacent_window(false)
    }

    fn adjacent_window(&self, forward: bool) -> Option<PeriodParameters> {
        let TimelineUnit::Unit(unit) = self.parameters.unit else {
            return None;
        };
        let (start, end) = self.bounds().ok()?;
        let delta = CalendarDelta::of(unit, self.parameters.value);

        let (from, to) = if forward {
            (end, self.timezone.add(&end, delta).ok()?)
        } else {
            (self.timezone.sub(&start, delta).ok()?, start)
        };

        let mut params = PeriodParameters::custom(Some(from.timestamp()), Some(to.timestamp()));
        params.value = self.parameters.value;
        params.unit = self.parameters.unit;
        Some(params)
    }
}

fn ladder(seconds: f64) -> TimeUnit {
    const DAY: f64 = 86_400.0;

    if seconds > 365.0 * DAY {
        TimeUnit::Year
    } else if seconds > 30.0 * DAY {
        TimeUnit::Month
    } else if seconds > DAY {
        TimeUnit::Day
    } else if seconds > 3_600.0 {
        TimeUnit::Hour
    } else if seconds > 60.0 {
        TimeUnit::Minute
    } else {
        TimeUnit::Second
    }
}

fn epoch() -> Result<DateTime<Utc>, TimeError> {
    DateTime::from_timestamp(0, 0).ok_or(TimeError::OutOfRange)
}

fn from_timestamp(ts: i64, timezone: &Timezone) -> Result<DateTime<FixedOffset>, TimeError> {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| timezone.localize(&dt))
        .ok_or(TimeError::InvalidTimestamp(ts))
}

/// Floors `dt` to the start of its enclosing `unit`.
///
/// # Errors
///
/// A floored local time skipped by a DST change moves one hour later.
/// Returns [`TimeError::OutOfRange`] when that does not exist either.
pub fn truncate<Tz: TimeZone>(dt: &DateTime<Tz>, unit: TimeUnit) -> Result<DateTime<Tz>, TimeError> {
    let local = dt.naive_local();
    let date = local.date();
    let nanos = local.nanosecond();

    let floored: Option<NaiveDateTime> = match unit {
        TimeUnit::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0)),
        TimeUnit::Month => {
            NaiveDate::from_ymd_opt(date.year(), date.month(), 1).and_then(|d| d.and_hms_opt(0, 0, 0))
        }
        TimeUnit::Day => date.and_hms_opt(0, 0, 0),
        TimeUnit::Hour => date.and_hms_opt(local.hour(), 0, 0),
        TimeUnit::Minute => date.and_hms_opt(local.hour(), local.minute(), 0),
        TimeUnit::Second => local.with_nanosecond(0),
        TimeUnit::Millisecond => local.with_nanosecond(nanos - nanos % 1_000_000),
        TimeUnit::Microsecond => local.with_nanosecond(nanos - nanos % 1_000),
    };

    floored
        .and_then(|naive| from_local(&dt.timezone(), naive))
        .ok_or(TimeError::OutOfRange)
}

/// The boundary of the unit after the one enclosing `dt`.
///
/// # Errors
///
/// Returns [`TimeError::OutOfRange`] on calendar overflow.
pub fn round_up<Tz: TimeZone>(dt: &DateTime<Tz>, unit: TimeUnit) -> Result<DateTime<Tz>, TimeError> {
    CalendarDelta::of(unit, 1).add_to(truncate(dt, unit)?)
}
