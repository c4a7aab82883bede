//! Selection expressions of the query contract.
//!
//! ```text
//! alert.classification.text/group_by
//! count(1)/order_desc
//! timezone(alert.create_time, 'UTC'):hour/order_asc,group_by
//! count(distinct(alert.messageid))
//! ```

use super::path::path;
use super::token::{quoted_string, word};
use super::{ParseError, Path};
use crate::time::TimeUnit;
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit1, multispace0},
    combinator::{all_consuming, map, map_res, opt, recognize},
    multi::separated_list1,
    sequence::{delimited, preceded},
    IResult, Parser,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending.
    Asc,
    /// Descending.
    #[default]
    Desc,
}

/// Aggregate function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregate {
    /// `count`
    Count,
    /// `min`
    Min,
    /// `max`
    Max,
    /// `sum`
    Sum,
    /// `avg`
    Avg,
}

impl Aggregate {
    /// Function name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Min => "min",
            Self::Max => "max",
            Self::Sum => "sum",
            Self::Avg => "avg",
        }
    }
}

/// Argument of an aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    /// A field.
    Path(Path),
    /// Distinct values of a field.
    Distinct(Path),
    /// A constant, as in `count(1)`.
    Constant(i64),
}

/// Calendar field extracted from a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extract {
    /// `year`
    Year,
    /// `quarter`
    Quarter,
    /// `month`
    Month,
    /// `yday`
    Yday,
    /// `mday`
    Mday,
    /// `wday`
    Wday,
    /// `hour`
    Hour,
    /// `min`
    Min,
    /// `sec`
    Sec,
    /// `msec`
    Msec,
    /// `usec`
    Usec,
}

impl Extract {
    const ALL: [Self; 11] = [
        Self::Year,
        Self::Quarter,
        Self::Month,
        Self::Yday,
        Self::Mday,
        Self::Wday,
        Self::Hour,
        Self::Min,
        Self::Sec,
        Self::Msec,
        Self::Usec,
    ];

    /// Name in the selection syntax.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Quarter => "quarter",
            Self::Month => "month",
            Self::Yday => "yday",
            Self::Mday => "mday",
            Self::Wday => "wday",
            Self::Hour => "hour",
            Self::Min => "min",
            Self::Sec => "sec",
            Self::Msec => "msec",
            Self::Usec => "usec",
        }
    }
}

impl From<TimeUnit> for Extract {
    fn from(unit: TimeUnit) -> Self {
        match unit {
            TimeUnit::Year => Self::Year,
            TimeUnit::Month => Self::Month,
            TimeUnit::Day => Self::Mday,
            TimeUnit::Hour => Self::Hour,
            TimeUnit::Minute => Self::Min,
            TimeUnit::Second => Self::Sec,
            TimeUnit::Millisecond => Self::Msec,
            TimeUnit::Microsecond => Self::Usec,
        }
    }
}

impl FromStr for Extract {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| ParseError::InvalidSelection(s.to_string()))
    }
}

/// Post-processing command of a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// `group_by`
    GroupBy,
    /// `order_asc`
    OrderAsc,
    /// `order_desc`
    OrderDesc,
}

impl Command {
    /// Command name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GroupBy => "group_by",
            Self::OrderAsc => "order_asc",
            Self::OrderDesc => "order_desc",
        }
    }
}

/// What a selection reads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SelectionTarget {
    /// A plain field.
    Path(Path),
    /// A timestamp field converted to a timezone.
    Timezone {
        /// Timestamp field.
        path: Path,
        /// Timezone name.
        zone: String,
    },
    /// An aggregate.
    Aggregate {
        /// Function.
        function: Aggregate,
        /// Argument.
        operand: Operand,
    },
}

/// One column of a query.
///
/// # Examples
///
/// ```
/// use analytics::criteria::{Selection, Extract};
///
/// let s: Selection = "timezone(alert.create_time, 'UTC'):hour/order_asc,group_by".parse().unwrap();
/// assert_eq!(s.extract, Some(Extract::Hour));
/// assert!(s.is_grouped());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selection {
    /// What is read.
    pub target: SelectionTarget,
    /// Calendar field extracted from the target.
    pub extract: Option<Extract>,
    /// Grouping and ordering.
    pub commands: Vec<Command>,
}

impl Selection {
    /// Selects a field.
    #[must_use]
    pub fn path(path: Path) -> Self {
        Self::of(SelectionTarget::Path(path))
    }

    /// Selects an aggregate over a field.
    #[must_use]
    pub fn aggregate(function: Aggregate, path: Path) -> Self {
        Self::of(SelectionTarget::Aggregate {
            function,
            operand: Operand::Path(path),
        })
    }

    /// `count(1)`
    #[must_use]
    pub fn count_all() -> Self {
        Self::of(SelectionTarget::Aggregate {
            function: Aggregate::Count,
            operand: Operand::Constant(1),
        })
    }

    /// `timezone(path, 'zone')`
    #[must_use]
    pub fn timezone(path: Path, zone: impl Into<String>) -> Self {
        Self::of(SelectionTarget::Timezone {
            path,
            zone: zone.into(),
        })
    }

    const fn of(target: SelectionTarget) -> Self {
        Self {
            target,
            extract: None,
            commands: Vec::new(),
        }
    }

    /// Adds an extraction.
    #[must_use]
    pub fn with_extract(mut self, extract: Extract) -> Self {
        self.extract = Some(extract);
        self
    }

    /// Adds `group_by`.
    #[must_use]
    pub fn group_by(mut self) -> Self {
        self.commands.push(Command::GroupBy);
        self
    }

    /// Adds `order_asc` or `order_desc`.
    #[must_use]
    pub fn order(mut self, order: SortOrder) -> Self {
        self.commands.push(match order {
            SortOrder::Asc => Command::OrderAsc,
            SortOrder::Desc => Command::OrderDesc,
        });
        self
    }

    /// True when the selection carries `group_by`.
    #[must_use]
    pub fn is_grouped(&self) -> bool {
        self.commands.contains(&Command::GroupBy)
    }

    /// True for aggregate selections.
    #[must_use]
    pub const fn is_aggregate(&self) -> bool {
        matches!(self.target, SelectionTarget::Aggregate { .. })
    }

    /// The ordering requested, if any.
    #[must_use]
    pub fn sort_order(&self) -> Option<SortOrder> {
        self.commands.iter().rev().find_map(|c| match c {
            Command::OrderAsc => Some(SortOrder::Asc),
            Command::OrderDesc => Some(SortOrder::Desc),
            Command::GroupBy => None,
        })
    }

    /// The field read, if there is one.
    #[must_use]
    pub fn field(&self) -> Option<&Path> {
        match &self.target {
            SelectionTarget::Path(path)
            | SelectionTarget::Timezone { path, .. }
            | SelectionTarget::Aggregate {
                operand: Operand::Path(path) | Operand::Distinct(path),
                ..
            } => Some(path),
            SelectionTarget::Aggregate {
                operand: Operand::Constant(_),
                ..
            } => None,
        }
    }

    /// Parses a selection.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidSelection`] on malformed input.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        all_consuming(selection)
            .parse(input.trim())
            .map(|(_, s)| s)
            .map_err(|_| ParseError::InvalidSelection(input.to_string()))
    }
}

impl FromStr for Selection {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Path> for Selection {
    fn from(path: Path) -> Self {
        Self::path(path)
    }
}

impl std::fmt::Display for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.target {
            SelectionTarget::Path(path) => write!(f, "{path}")?,
            SelectionTarget::Timezone { path, zone } => write!(f, "timezone({path}, '{zone}')")?,
            SelectionTarget::Aggregate { function, operand } => match operand {
                Operand::Path(path) => write!(f, "{}({path})", function.as_str())?,
                Operand::Distinct(path) => write!(f, "{}(distinct({path}))", function.as_str())?,
                Operand::Constant(c) => write!(f, "{}({c})", function.as_str())?,
            },
        }
        if let Some(extract) = self.extract {
            write!(f, ":{}", extract.as_str())?;
        }
        if !self.commands.is_empty() {
            let commands: Vec<_> = self.commands.iter().map(|c| c.as_str()).collect();
            write!(f, "/{}", commands.join(","))?;
        }
        Ok(())
    }
}

// ============================================================================
// Grammar
// ============================================================================

fn aggregate_name(input: &str) -> IResult<&str, Aggregate> {
    alt((
        map(tag("count"), |_| Aggregate::Count),
        map(tag("min"), |_| Aggregate::Min),
        map(tag("max"), |_| Aggregate::Max),
        map(tag("sum"), |_| Aggregate::Sum),
        map(tag("avg"), |_| Aggregate::Avg),
    ))
    .parse(input)
}

fn ws<'a, O, P>(inner: P) -> impl Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>
where
    P: Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>,
{
    delimited(multispace0, inner, multispace0)
}

fn operand(input: &str) -> IResult<&str, Operand> {
    alt((
        map(
            preceded(tag("distinct"), delimited(char('('), ws(path), char(')'))),
            Operand::Distinct,
        ),
        map_res(recognize((opt(char('-')), digit1)), |s: &str| {
            s.parse().map(Operand::Constant)
        }),
        map(path, Operand::Path),
    ))
    .parse(input)
}

fn target(input: &str) -> IResult<&str, SelectionTarget> {
    alt((
        map(
            preceded(
                tag("timezone"),
                delimited(
                    char('('),
                    (ws(path), char(','), ws(quoted_string)),
                    char(')'),
                ),
            ),
            |(path, _, zone)| SelectionTarget::Timezone { path, zone },
        ),
        map(
            (aggregate_name, delimited(char('('), ws(operand), char(')'))),
            |(function, operand)| SelectionTarget::Aggregate { function, operand },
        ),
        map(path, SelectionTarget::Path),
    ))
    .parse(input)
}

fn command(input: &str) -> IResult<&str, Command> {
    map_res(word, |w: &str| match w {
        "group_by" => Ok(Command::GroupBy),
        "order_asc" => Ok(Command::OrderAsc),
        "order_desc" => Ok(Command::OrderDesc),
        other => Err(ParseError::InvalidSelection(other.to_string())),
    })
    .parse(input)
}

fn selection(input: &str) -> IResult<&str, Selection> {
    map(
        (
            target,
            opt(preceded(char(':'), map_res(word, str::parse::<Extract>))),
            opt(preceded(char('/'), separated_list1(char(','), ws(command)))),
        ),
        |(target, extract, commands)| Selection {
            target,
            extract,
            commands: commands.unwrap_or_default(),
        },
    )
    .parse(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_grouped() {
        let s = Selection::parse("alert.classification.text/group_by").unwrap();
        assert_eq!(
            s.target,
            SelectionTarget::Path(Path::new("alert.classification.text"))
        );
        assert!(s.is_grouped());
        assert_eq!(s.sort_order(), None);
    }

    #[test]
    fn test_parse_count_constant() {
        let s = Selection::parse("count(1)/order_desc").unwrap();
        assert_eq!(s, Selection::count_all().order(SortOrder::Desc));
        assert!(s.is_aggregate());
        assert_eq!(s.field(), None);
    }

    #[test]
    fn test_parse_distinct() {
        let s = Selection::parse("count(distinct(alert.messageid))").unwrap();
        match s.target {
            SelectionTarget::Aggregate {
                function: Aggregate::Count,
                operand: Operand::Distinct(path),
            } => assert_eq!(path.to_string(), "alert.messageid"),
            _ => panic!("Expected distinct count"),
        }
    }

    #[test]
    fn test_parse_timezone_extract() {
        let s = Selection::parse("timezone(alert.create_time, 'UTC'):hour/order_asc,group_by")
            .unwrap();
        assert_eq!(
            s.target,
            SelectionTarget::Timezone {
                path: Path::new("alert.create_time"),
                zone: "UTC".into()
            }
        );
        assert_eq!(s.extract, Some(Extract::Hour));
        assert_eq!(s.commands, vec![Command::OrderAsc, Command::GroupBy]);
        assert_eq!(s.sort_order(), Some(SortOrder::Asc));
    }

    #[test]
    fn test_display_round_trip() {
        for text in [
            "alert.analyzer(-1).name/group_by",
            "max(alert.create_time)/order_desc",
            "count(distinct(alert.messageid))",
            "timezone(alert.create_time, '+02:00'):mday/order_asc,group_by",
            "alert.create_time:year",
        ] {
            let s = Selection::parse(text).unwrap();
            assert_eq!(s.to_string(), text);
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(Selection::parse("count(").is_err());
        assert!(Selection::parse("alert.x/sort_by").is_err());
        assert!(Selection::parse("alert.x:fortnight").is_err());
        assert!(Selection::parse("").is_err());
    }

    #[test]
    fn test_extract_from_unit() {
        assert_eq!(Extract::from(TimeUnit::Day), Extract::Mday);
        assert_eq!(Extract::from(TimeUnit::Minute).as_str(), TimeUnit::Minute.dbunit());
    }
}
