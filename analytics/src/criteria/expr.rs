//! Parsed filter before path resolution.

use super::{Criterion, CriterionCompiler, Operator, ParseError, Path};
use crate::error::AnalyticsError;
use crate::value::Value;

/// One end of a range term.
#[derive(Debug, Clone, PartialEq)]
pub enum RangeBound {
    /// `*`
    Unbounded,
    /// `[value` or `value]`
    Inclusive(Value),
    /// `{value` or `value}`
    Exclusive(Value),
}

/// A filter as written by the user.
///
/// Paths are still unresolved; a term without path searches the default
/// paths of the datatype.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `path op value`
    Compare {
        /// Field, or `None` for free text.
        path: Option<Path>,
        /// Comparison.
        operator: Operator,
        /// Operand.
        value: Value,
    },
    /// `path:[lower TO upper]`
    Range {
        /// Field, or `None` for free text.
        path: Option<Path>,
        /// Lower end.
        lower: RangeBound,
        /// Upper end.
        upper: RangeBound,
        /// True when the range is excluded.
        negated: bool,
    },
    /// Both branches hold.
    And(Box<Expr>, Box<Expr>),
    /// Either branch holds.
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// The logical complement, pushed down to the leaves.
    #[must_use]
    pub fn negate(self) -> Self {
        match self {
            Self::Compare {
                path,
                operator,
                value,
            } => Self::Compare {
                path,
                operator: operator.negate(),
                value,
            },
            Self::Range {
                path,
                lower,
                upper,
                negated,
            } => Self::Range {
                path,
                lower,
                upper,
                negated: !negated,
            },
            Self::And(l, r) => Self::Or(Box::new(l.negate()), Box::new(r.negate())),
            Self::Or(l, r) => Self::And(Box::new(l.negate()), Box::new(r.negate())),
        }
    }

    /// Resolves paths through `compiler`.
    ///
    /// # Errors
    ///
    /// Propagates compiler errors, and returns
    /// [`ParseError::NoDefaultPaths`] for free text the compiler cannot
    /// place.
    pub fn compile(&self, compiler: &dyn CriterionCompiler) -> Result<Criterion, AnalyticsError> {
        match self {
            Self::And(l, r) => Ok(l.compile(compiler)? & r.compile(compiler)?),
            Self::Or(l, r) => Ok(l.compile(compiler)? | r.compile(compiler)?),
            Self::Compare {
                path,
                operator,
                value,
            } => {
                let negative = operator.is_negative();
                for_each_path(compiler, path.as_ref(), value, negative, |p| {
                    compiler.compile(p, *operator, value.clone())
                })
            }
            Self::Range {
                path,
                lower,
                upper,
                negated,
            } => {
                let placeholder = Value::String("*".to_string());
                for_each_path(compiler, path.as_ref(), &placeholder, *negated, |p| {
                    compile_range(compiler, p, lower, upper, *negated)
                })
            }
        }
    }
}

fn for_each_path(
    compiler: &dyn CriterionCompiler,
    path: Option<&Path>,
    value: &Value,
    negative: bool,
    mut compile: impl FnMut(&Path) -> Result<Criterion, AnalyticsError>,
) -> Result<Criterion, AnalyticsError> {
    if let Some(path) = path {
        return compile(path);
    }

    let defaults = compiler.default_paths();
    if defaults.is_empty() {
        return Err(ParseError::NoDefaultPaths(value.to_string()).into());
    }
    let parts = defaults.iter().map(compile).collect::<Result<Vec<_>, _>>()?;
    Ok(if negative {
        Criterion::and_all(parts)
    } else {
        Criterion::or_all(parts)
    })
}

fn compile_range(
    compiler: &dyn CriterionCompiler,
    path: &Path,
    lower: &RangeBound,
    upper: &RangeBound,
    negated: bool,
) -> Result<Criterion, AnalyticsError> {
    if matches!((lower, upper), (RangeBound::Unbounded, RangeBound::Unbounded)) {
        let operator = if negated { Operator::Eq } else { Operator::NotEq };
        return compiler.compile(path, operator, Value::Null);
    }

    let bound = |bound: &RangeBound, inclusive: Operator, exclusive: Operator| {
        let (operator, value) = match bound {
            RangeBound::Unbounded => return Ok(Criterion::Empty),
            RangeBound::Inclusive(v) => (inclusive, v),
            RangeBound::Exclusive(v) => (exclusive, v),
        };
        let operator = if negated { operator.negate() } else { operator };
        compiler.compile(path, operator, value.clone())
    };
    let lower = bound(lower, Operator::GtEq, Operator::Gt)?;
    let upper = bound(upper, Operator::LtEq, Operator::Lt)?;

    Ok(if negated { lower | upper } else { lower & upper })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::PlainCompiler;

    fn cmp(path: &str, operator: Operator, value: &str) -> Expr {
        Expr::Compare {
            path: Some(Path::new(path)),
            operator,
            value: value.into(),
        }
    }

    #[test]
    fn test_negate_de_morgan() {
        let e = Expr::And(
            Box::new(cmp("a.b", Operator::Eq, "1")),
            Box::new(cmp("a.c", Operator::Lt, "2")),
        );
        assert_eq!(
            e.negate(),
            Expr::Or(
                Box::new(cmp("a.b", Operator::NotEq, "1")),
                Box::new(cmp("a.c", Operator::GtEq, "2")),
            )
        );
    }

    #[test]
    fn test_compile_range() {
        let e = Expr::Range {
            path: Some(Path::new("a.n")),
            lower: RangeBound::Inclusive(Value::Integer(1)),
            upper: RangeBound::Exclusive(Value::Integer(5)),
            negated: false,
        };
        assert_eq!(e.compile(&PlainCompiler).unwrap().to_string(), "(a.n >= 1 && a.n < 5)");

        let negated = e.negate();
        assert_eq!(
            negated.compile(&PlainCompiler).unwrap().to_string(),
            "(a.n < 1 || a.n >= 5)"
        );
    }

    #[test]
    fn test_compile_open_range_is_presence() {
        let e = Expr::Range {
            path: Some(Path::new("a.n")),
            lower: RangeBound::Unbounded,
            upper: RangeBound::Unbounded,
            negated: true,
        };
        assert_eq!(e.compile(&PlainCompiler).unwrap().to_string(), "!a.n");
    }

    #[test]
    fn test_free_text_needs_default_paths() {
        let e = Expr::Compare {
            path: None,
            operator: Operator::SubstrNoCase,
            value: "ssh".into(),
        };
        match e.compile(&PlainCompiler) {
            Err(AnalyticsError::Parse(ParseError::NoDefaultPaths(v))) => assert_eq!(v, "ssh"),
            _ => panic!("Expected NoDefaultPaths"),
        }
    }
}
