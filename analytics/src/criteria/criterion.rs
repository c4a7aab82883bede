//! The criterion tree and its operators.

use super::{ParseError, Path};
use crate::value::Value;
use serde::Serialize;
use std::ops::{Add, BitAnd, BitOr};
use std::str::FromStr;

/// Comparison operator of a criterion leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `==` (also written `=`)
    Eq,
    /// `=*`, case-insensitive equality
    EqNoCase,
    /// `!=`
    NotEq,
    /// `!=*`
    NotEqNoCase,
    /// `<>`, substring match
    Substr,
    /// `<>*`
    SubstrNoCase,
    /// `!<>`
    NotSubstr,
    /// `!<>*`
    NotSubstrNoCase,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `~`, regular expression
    Regex,
    /// `~*`
    RegexNoCase,
    /// `!~`
    NotRegex,
    /// `!~*`
    NotRegexNoCase,
}

impl Operator {
    /// Every operator.
    pub const ALL: [Self; 16] = [
        Self::Eq,
        Self::EqNoCase,
        Self::NotEq,
        Self::NotEqNoCase,
        Self::Substr,
        Self::SubstrNoCase,
        Self::NotSubstr,
        Self::NotSubstrNoCase,
        Self::Lt,
        Self::LtEq,
        Self::Gt,
        Self::GtEq,
        Self::Regex,
        Self::RegexNoCase,
        Self::NotRegex,
        Self::NotRegexNoCase,
    ];

    /// Canonical spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::EqNoCase => "=*",
            Self::NotEq => "!=",
            Self::NotEqNoCase => "!=*",
            Self::Substr => "<>",
            Self::SubstrNoCase => "<>*",
            Self::NotSubstr => "!<>",
            Self::NotSubstrNoCase => "!<>*",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Regex => "~",
            Self::RegexNoCase => "~*",
            Self::NotRegex => "!~",
            Self::NotRegexNoCase => "!~*",
        }
    }

    /// True for the `!`-prefixed operators.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        matches!(
            self,
            Self::NotEq
                | Self::NotEqNoCase
                | Self::NotSubstr
                | Self::NotSubstrNoCase
                | Self::NotRegex
                | Self::NotRegexNoCase
        )
    }

    /// True for the `*`-suffixed operators.
    #[must_use]
    pub const fn is_case_insensitive(self) -> bool {
        matches!(
            self,
            Self::EqNoCase
                | Self::NotEqNoCase
                | Self::SubstrNoCase
                | Self::NotSubstrNoCase
                | Self::RegexNoCase
                | Self::NotRegexNoCase
        )
    }

    /// The logical complement: `==` and `!=`, `<` and `>=`, and so on.
    #[must_use]
    pub const fn negate(self) -> Self {
        match self {
            Self::Eq => Self::NotEq,
            Self::NotEq => Self::Eq,
            Self::EqNoCase => Self::NotEqNoCase,
            Self::NotEqNoCase => Self::EqNoCase,
            Self::Substr => Self::NotSubstr,
            Self::NotSubstr => Self::Substr,
            Self::SubstrNoCase => Self::NotSubstrNoCase,
            Self::NotSubstrNoCase => Self::SubstrNoCase,
            Self::Regex => Self::NotRegex,
            Self::NotRegex => Self::Regex,
            Self::RegexNoCase => Self::NotRegexNoCase,
            Self::NotRegexNoCase => Self::RegexNoCase,
            Self::Lt => Self::GtEq,
            Self::GtEq => Self::Lt,
            Self::LtEq => Self::Gt,
            Self::Gt => Self::LtEq,
        }
    }

    /// The operator with its negation removed.
    #[must_use]
    pub const fn positive(self) -> Self {
        if self.is_negative() {
            self.negate()
        } else {
            self
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "=" {
            return Ok(Self::Eq);
        }
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| ParseError::UnknownOperator(s.to_string()))
    }
}

impl Serialize for Operator {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Boolean connective of a combined criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOp {
    /// `&&`
    And,
    /// `||`
    Or,
}

impl LogicalOp {
    /// Criterion syntax spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

/// An immutable boolean filter.
///
/// Combining never mutates: `a & b` and `a | b` build new trees, and
/// [`Criterion::Empty`] is the identity of both.
///
/// # Examples
///
/// ```
/// use analytics::criteria::{Criterion, Path};
///
/// let c = Criterion::eq(Path::new("alert.messageid"), "1") | Criterion::Empty;
/// assert_eq!(c.to_string(), "alert.messageid == '1'");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Criterion {
    /// Matches everything.
    #[default]
    Empty,
    /// `path operator value`
    Compare {
        /// Left operand.
        path: Path,
        /// Comparison.
        operator: Operator,
        /// Right operand, `Null` for presence tests.
        value: Value,
    },
    /// `(left && right)` or `(left || right)`
    Combined {
        /// Left branch.
        left: Box<Criterion>,
        /// Connective.
        operator: LogicalOp,
        /// Right branch.
        right: Box<Criterion>,
    },
}

/// Path of the pseudo field carrying a query the backend parses itself.
pub(crate) const RAW_QUERY_FIELD: &str = "_raw_query";

impl Criterion {
    /// A comparison leaf.
    #[must_use]
    pub fn compare(path: Path, operator: Operator, value: impl Into<Value>) -> Self {
        Self::Compare {
            path,
            operator,
            value: value.into(),
        }
    }

    /// `path == value`
    #[must_use]
    pub fn eq(path: Path, value: impl Into<Value>) -> Self {
        Self::compare(path, Operator::Eq, value)
    }

    /// `!path`: the field is absent.
    #[must_use]
    pub fn is_null(path: Path) -> Self {
        Self::compare(path, Operator::Eq, Value::Null)
    }

    /// `path`: the field is present.
    #[must_use]
    pub fn is_set(path: Path) -> Self {
        Self::compare(path, Operator::NotEq, Value::Null)
    }

    /// Hands `query` to the backend of `datatype` unparsed.
    #[must_use]
    pub fn raw_query(datatype: &str, query: &str) -> Self {
        let path = Path::from_segments(vec![
            super::Segment::new(datatype),
            super::Segment::new(RAW_QUERY_FIELD),
        ]);
        Self::eq(path, query)
    }

    /// The raw query carried by this criterion, if it is one.
    #[must_use]
    pub fn as_raw_query(&self) -> Option<&str> {
        match self {
            Self::Compare {
                path,
                operator: Operator::Eq,
                value,
            } if path.leaf() == RAW_QUERY_FIELD => value.as_str(),
            _ => None,
        }
    }

    /// True for [`Criterion::Empty`].
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Joins every criterion with `&&`.
    pub fn and_all(criteria: impl IntoIterator<Item = Self>) -> Self {
        criteria.into_iter().fold(Self::Empty, |acc, c| acc & c)
    }

    /// Joins every criterion with `||`.
    pub fn or_all(criteria: impl IntoIterator<Item = Self>) -> Self {
        criteria.into_iter().fold(Self::Empty, |acc, c| acc | c)
    }

    /// Every path compared in the tree, left to right.
    #[must_use]
    pub fn paths(&self) -> Vec<&Path> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a Path>) {
        match self {
            Self::Empty => {}
            Self::Compare { path, .. } => out.push(path),
            Self::Combined { left, right, .. } => {
                left.collect_paths(out);
                right.collect_paths(out);
            }
        }
    }

    fn combine(self, operator: LogicalOp, other: Self) -> Self {
        match (self, other) {
            (Self::Empty, c) | (c, Self::Empty) => c,
            (left, right) => Self::Combined {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            },
        }
    }
}

impl BitAnd for Criterion {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.combine(LogicalOp::And, rhs)
    }
}

impl BitOr for Criterion {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.combine(LogicalOp::Or, rhs)
    }
}

impl Add for Criterion {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self & rhs
    }
}

impl std::fmt::Display for Criterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Compare {
                path,
                operator,
                value: Value::Null,
            } => match operator {
                Operator::Eq => write!(f, "!{path}"),
                Operator::NotEq => write!(f, "{path}"),
                other => write!(f, "{path} {other} ''"),
            },
            Self::Compare {
                path,
                operator,
                value,
            } => write!(f, "{path} {operator} {}", value.to_literal()),
            Self::Combined {
                left,
                operator,
                right,
            } => write!(f, "({left} {} {right})", operator.as_str()),
        }
    }
}
