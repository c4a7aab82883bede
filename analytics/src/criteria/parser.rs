//! Parser for the criterion syntax.
//!
//! ```text
//! alert.classification.text == 'x' && (alert.severity = 'high' || !alert.correlation_alert)
//! ```

use super::path::path;
use super::token::quoted_string;
use super::{Criterion, CriterionCompiler, Expr, Operator, ParseError, QueryMode};
use crate::error::AnalyticsError;
use crate::value::Value;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, multispace0},
    combinator::{map, map_res},
    multi::many0,
    sequence::preceded,
    IResult, Parser,
};

/// Parses criterion syntax into an expression.
///
/// # Errors
///
/// Returns [`ParseError::Empty`] for blank input and
/// [`ParseError::Syntax`] otherwise.
pub fn parse_criterion_expr(input: &str) -> Result<Expr, ParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ParseError::Empty);
    }

    let syntax = |message: String| ParseError::Syntax {
        mode: QueryMode::Criterion,
        message,
    };
    match or_expression(input) {
        Ok((remaining, expr)) => {
            let remaining = remaining.trim();
            if remaining.is_empty() {
                Ok(expr)
            } else {
                Err(syntax(format!("Unexpected trailing content: '{remaining}'")))
            }
        }
        Err(e) => Err(syntax(format!("{e}"))),
    }
}

/// Parses criterion syntax and compiles it through `compiler`.
///
/// # Errors
///
/// Returns parse errors and compiler errors.
///
/// # Examples
///
/// ```
/// use analytics::criteria::{parse_criteria, PlainCompiler};
///
/// let c = parse_criteria("!alert.correlation_alert || alert.x >= 3", &PlainCompiler).unwrap();
/// assert_eq!(c.to_string(), "(!alert.correlation_alert || alert.x >= 3)");
/// ```
pub fn parse_criteria(
    input: &str,
    compiler: &dyn CriterionCompiler,
) -> Result<Criterion, AnalyticsError> {
    let expr = parse_criterion_expr(input).inspect_err(|e| {
        tracing::debug!(query = input, error = %e, "Rejected criterion query");
    })?;
    expr.compile(compiler)
}

// ============================================================================
// Boolean structure
// ============================================================================

fn or_expression(input: &str) -> IResult<&str, Expr> {
    let (input, first) = and_expression(input)?;
    let (input, rest) = many0(preceded(
        (multispace0, tag("||"), multispace0),
        and_expression,
    ))
    .parse(input)?;

    let result = rest
        .into_iter()
        .fold(first, |left, right| Expr::Or(Box::new(left), Box::new(right)));

    Ok((input, result))
}

fn and_expression(input: &str) -> IResult<&str, Expr> {
    let (input, first) = term(input)?;
    let (input, rest) = many0(preceded(
        (multispace0, tag("&&"), multispace0),
        term,
    ))
    .parse(input)?;

    let result = rest
        .into_iter()
        .fold(first, |left, right| Expr::And(Box::new(left), Box::new(right)));

    Ok((input, result))
}

fn term(input: &str) -> IResult<&str, Expr> {
    alt((grouped, absent, comparison, present)).parse(input)
}

fn grouped(input: &str) -> IResult<&str, Expr> {
    let (input, _) = char('(').parse(input)?;
    let (input, _) = multispace0(input)?;
    let (input, expr) = or_expression(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char(')').parse(input)?;

    Ok((input, expr))
}

fn absent(input: &str) -> IResult<&str, Expr> {
    let (input, _) = char('!').parse(input)?;
    let (input, _) = multispace0(input)?;
    let (input, path) = path(input)?;

    Ok((
        input,
        Expr::Compare {
            path: Some(path),
            operator: Operator::Eq,
            value: Value::Null,
        },
    ))
}

fn present(input: &str) -> IResult<&str, Expr> {
    map(path, |path| Expr::Compare {
        path: Some(path),
        operator: Operator::NotEq,
        value: Value::Null,
    })
    .parse(input)
}

fn comparison(input: &str) -> IResult<&str, Expr> {
    let (input, path) = path(input)?;
    let (input, _) = multispace0(input)?;
    let (input, operator) = operator(input)?;
    let (input, _) = multispace0(input)?;
    let (input, value) = operand(input)?;

    Ok((
        input,
        Expr::Compare {
            path: Some(path),
            operator,
            value,
        },
    ))
}

// ============================================================================
// Operators and operands
// ============================================================================

fn operator(input: &str) -> IResult<&str, Operator> {
    map_res(
        alt((
            tag("!<>*"),
            tag("!<>"),
            tag("!=*"),
            tag("!="),
            tag("!~*"),
            tag("!~"),
            tag("<>*"),
            tag("<>"),
            tag("<="),
            tag(">="),
            tag("=="),
            tag("=*"),
            tag("="),
            tag("~*"),
            tag("~"),
            tag("<"),
            tag(">"),
        )),
        str::parse::<Operator>,
    )
    .parse(input)
}

fn operand(input: &str) -> IResult<&str, Value> {
    alt((map(quoted_string, Value::String), map(bare_word, classify))).parse(input)
}

fn bare_word(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace() && !matches!(c, '&' | '|' | '(' | ')' | '\'' | '"'))
        .parse(input)
}

fn classify(word: &str) -> Value {
    if let Ok(i) = word.parse::<i64>() {
        Value::Integer(i)
    } else if let Ok(f) = word.parse::<f64>() {
        if f.is_finite() {
            Value::Float(f)
        } else {
            Value::String(word.to_string())
        }
    } else {
        Value::String(word.to_string())
    }
}
