//! Calendar granularities.

use super::TimeError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

/// A calendar granularity, indexed from the coarsest (`Year`, index 0) to
/// the finest (`Microsecond`, index 7).
///
/// Ordering follows granularity: a coarser unit compares greater, so
/// `Year > Hour` and `Microsecond` is the minimum. [`TimeUnit::index`]
/// exposes the raw index for callers that need positional arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    /// Calendar year.
    Year,
    /// Calendar month.
    Month,
    /// Day of month.
    Day,
    /// Hour.
    Hour,
    /// Minute.
    Minute,
    /// Second.
    Second,
    /// Millisecond.
    Millisecond,
    /// Microsecond.
    Microsecond,
}

impl TimeUnit {
    /// All units, coarsest first.
    pub const ALL: [Self; 8] = [
        Self::Year,
        Self::Month,
        Self::Day,
        Self::Hour,
        Self::Minute,
        Self::Second,
        Self::Millisecond,
        Self::Microsecond,
    ];

    /// Returns the position of the unit, `Year` being 0.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Year => 0,
            Self::Month => 1,
            Self::Day => 2,
            Self::Hour => 3,
            Self::Minute => 4,
            Self::Second => 5,
            Self::Millisecond => 6,
            Self::Microsecond => 7,
        }
    }

    /// Builds a unit from its index.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::InvalidUnit`] when `index` is out of range.
    pub fn from_index(index: usize) -> Result<Self, TimeError> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or_else(|| TimeError::InvalidUnit(index.to_string()))
    }

    /// Returns the unit name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Month => "month",
            Self::Day => "day",
            Self::Hour => "hour",
            Self::Minute => "minute",
            Self::Second => "second",
            Self::Millisecond => "millisecond",
            Self::Microsecond => "microsecond",
        }
    }

    /// Returns the name of the matching bucket column in the query contract.
    #[must_use]
    pub const fn dbunit(self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Month => "month",
            Self::Day => "mday",
            Self::Hour => "hour",
            Self::Minute => "min",
            Self::Second => "sec",
            Self::Millisecond => "msec",
            Self::Microsecond => "usec",
        }
    }

    /// Moves `steps` positions along the index; positive steps go finer.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::InvalidUnit`] when the result leaves the range.
    pub fn shift(self, steps: isize) -> Result<Self, TimeError> {
        let target = self
            .index()
            .checked_add_signed(steps)
            .ok_or_else(|| TimeError::InvalidUnit(format!("{}{steps:+}", self.index())))?;
        Self::from_index(target)
    }

    /// Returns the next finer unit, if any.
    #[must_use]
    pub fn finer(self) -> Option<Self> {
        self.shift(1).ok()
    }

    /// Returns the next coarser unit, if any.
    #[must_use]
    pub fn coarser(self) -> Option<Self> {
        self.shift(-1).ok()
    }

    /// Approximate length of one unit in seconds, used to estimate bucket
    /// counts. Months count 31 days and years 365.
    #[must_use]
    pub const fn approx_seconds(self) -> f64 {
        match self {
            Self::Year => 365.0 * 86_400.0,
            Self::Month => 31.0 * 86_400.0,
            Self::Day => 86_400.0,
            Self::Hour => 3_600.0,
            Self::Minute => 60.0,
            Self::Second => 1.0,
            Self::Millisecond => 0.001,
            Self::Microsecond => 0.000_001,
        }
    }
}

impl PartialOrd for TimeUnit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeUnit {
    fn cmp(&self, other: &Self) -> Ordering {
        other.index().cmp(&self.index())
    }
}

impl std::fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeUnit {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|unit| unit.as_str() == s)
            .ok_or_else(|| TimeError::InvalidUnit(s.to_string()))
    }
}

impl TryFrom<usize> for TimeUnit {
    type Error = TimeError;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        Self::from_index(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_from_index_and_name() {
        assert_eq!(TimeUnit::from_index(0).unwrap(), TimeUnit::Year);
        assert_eq!(TimeUnit::from_index(3).unwrap(), TimeUnit::Hour);
        assert_eq!("year".parse::<TimeUnit>().unwrap(), TimeUnit::Year);
        assert!(TimeUnit::from_index(8).is_err());
        assert!(TimeUnit::from_index(10_101_010).is_err());
        assert!("seconds".parse::<TimeUnit>().is_err());
    }

    #[test]
    fn test_shift() {
        assert_eq!(TimeUnit::Year.shift(1).unwrap().index(), 1);
        assert_eq!(TimeUnit::Hour.shift(-1).unwrap().index(), 2);
        assert!(TimeUnit::Year.shift(-1).is_err());
        assert!(TimeUnit::Microsecond.shift(1).is_err());
        assert_eq!(TimeUnit::Day.finer(), Some(TimeUnit::Hour));
        assert_eq!(TimeUnit::Day.coarser(), Some(TimeUnit::Month));
    }

    #[test]
    fn test_coarser_compares_greater() {
        let year = TimeUnit::Year;
        let hour = TimeUnit::Hour;

        assert_ne!(year, hour);
        assert!(year > hour);
        assert!(year >= hour);
        assert!(hour < year);
        assert!(hour <= year);
        assert!(TimeUnit::Hour > TimeUnit::Minute);
        assert_eq!(TimeUnit::ALL.iter().min(), Some(&TimeUnit::Microsecond));
    }

    #[test]
    fn test_dbunit() {
        assert_eq!(TimeUnit::Year.dbunit(), "year");
        assert_eq!(TimeUnit::Day.dbunit(), "mday");
        assert_eq!(TimeUnit::Minute.dbunit(), "min");
        assert_eq!(TimeUnit::Microsecond.dbunit(), "usec");
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&TimeUnit::Millisecond).unwrap();
        assert_eq!(json, "\"millisecond\"");
        let back: TimeUnit = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TimeUnit::Millisecond);
    }

    proptest! {
        #[test]
        fn prop_shift_round_trip(index in 0usize..7) {
            let unit = TimeUnit::from_index(index).unwrap();
            prop_assert_eq!(unit.shift(1).unwrap().shift(-1).unwrap(), unit);
        }

        #[test]
        fn prop_name_round_trip(index in 0usize..8) {
            let unit = TimeUnit::from_index(index).unwrap();
            prop_assert_eq!(unit.to_string().parse::<TimeUnit>().unwrap(), unit);
        }

        #[test]
        fn prop_order_inverts_index(a in 0usize..8, b in 0usize..8) {
            let ua = TimeUnit::from_index(a).unwrap();
            let ub = TimeUnit::from_index(b).unwrap();
            prop_assert_eq!(ua.cmp(&ub), b.cmp(&a));
        }
    }
}
