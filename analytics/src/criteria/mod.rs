//! Filter expressions.
//!
//! Two surface syntaxes compile into one [`Criterion`] tree:
//!
//! ```text
//! alert.classification.text == 'ssh brute force' && !alert.source.node.name
//! classification:"ssh brute force" -source:10.0.0.1
//! ```
//!
//! Both front ends first parse into an [`Expr`], which is then compiled
//! through a [`CriterionCompiler`]. The compiler decides what a path means:
//! [`PlainCompiler`] keeps paths verbatim, [`QueryCompiler`] roots them in a
//! datatype, expands virtual paths and downgrades operators a path does
//! not support.
//!
//! # Example
//!
//! ```
//! use analytics::criteria::{parse_criteria, Criterion, Operator, Path, PlainCompiler};
//!
//! let criterion = parse_criteria("alert.messageid == 'x' && alert.type != 'y'", &PlainCompiler).unwrap();
//! assert_eq!(
//!     criterion,
//!     Criterion::eq(Path::new("alert.messageid"), "x")
//!         & Criterion::compare(Path::new("alert.type"), Operator::NotEq, "y")
//! );
//! ```

mod compile;
mod criterion;
mod expr;
pub mod lucene;
mod parser;
mod path;
mod selection;
mod token;

pub use compile::{CriterionCompiler, PathTranslations, PlainCompiler, QueryCompiler};
pub use criterion::{Criterion, LogicalOp, Operator};
pub use expr::{Expr, RangeBound};
pub use lucene::{format_criterion, parse_lucene};
pub use parser::{parse_criteria, parse_criterion_expr};
pub use path::{Path, PathIndex, Segment};
pub use selection::{Aggregate, Command, Extract, Operand, Selection, SelectionTarget, SortOrder};

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while parsing filters, paths and selections.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The expression is empty.
    #[error("Empty expression")]
    Empty,

    /// The expression does not follow the syntax.
    #[error("Invalid {mode} syntax: {message}")]
    Syntax {
        /// Which syntax was being parsed.
        mode: QueryMode,
        /// What went wrong.
        message: String,
    },

    /// Malformed path.
    #[error("Invalid path: '{0}'")]
    InvalidPath(String),

    /// Unknown comparison operator.
    #[error("Unknown operator: '{0}'")]
    UnknownOperator(String),

    /// Malformed selection.
    #[error("Invalid selection: '{0}'")]
    InvalidSelection(String),

    /// A free-text term was given but the datatype declares no default
    /// paths to search.
    #[error("No default path to search '{0}'")]
    NoDefaultPaths(String),
}

/// The syntax a query string is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// `path op value` joined by `&&` and `||`.
    #[default]
    Criterion,
    /// `path:value` free text.
    Lucene,
}

impl QueryMode {
    /// Returns the parameter value of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Criterion => "criterion",
            Self::Lucene => "lucene",
        }
    }

    /// Returns the conjunction keyword of the syntax.
    #[must_use]
    pub const fn and_keyword(self) -> &'static str {
        match self {
            Self::Criterion => "&&",
            Self::Lucene => "AND",
        }
    }
}

impl std::fmt::Display for QueryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "criterion" => Ok(Self::Criterion),
            "lucene" => Ok(Self::Lucene),
            other => Err(ParseError::Syntax {
                mode: Self::Criterion,
                message: format!("unknown query mode '{other}'"),
            }),
        }
    }
}
