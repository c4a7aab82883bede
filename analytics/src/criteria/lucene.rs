//! The Lucene-like free-text syntax.
//!
//! ```text
//! classification:"ssh brute force" -source:10.0.0.1 severity:high OR severity:medium
//! port:[1024 TO *] host:web* /^admin.+/
//! ```
//!
//! A term without field searches the datatype's default paths. Juxtaposed
//! clauses are ANDed and `OR` binds loosest.

use super::path::path;
use super::token::quoted_string;
use super::{Criterion, CriterionCompiler, Expr, Operator, ParseError, Path, QueryMode, RangeBound};
use crate::error::AnalyticsError;
use crate::value::Value;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, multispace0, multispace1},
    combinator::{map, opt, value},
    error::{Error, ErrorKind},
    multi::many0,
    sequence::preceded,
    IResult, Parser,
};

/// Characters that must be quoted or escaped in a Lucene value.
const RESERVED: &[char] = &[
    '/', '+', '-', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?', ':', '\\',
];

/// Parses a Lucene query into an expression.
///
/// # Errors
///
/// Returns [`ParseError::Empty`] for blank input and
/// [`ParseError::Syntax`] otherwise.
pub fn parse_lucene_expr(input: &str) -> Result<Expr, ParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ParseError::Empty);
    }

    let syntax = |message: String| ParseError::Syntax {
        mode: QueryMode::Lucene,
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

/// Parses a Lucene query and compiles it through `compiler`.
///
/// # Errors
///
/// Returns parse errors and compiler errors.
///
/// # Examples
///
/// ```
/// use analytics::criteria::{parse_lucene, PlainCompiler};
///
/// let c = parse_lucene(r#"alert.messageid:"1" -alert.analyzer.name:snort"#, &PlainCompiler).unwrap();
/// assert_eq!(c.to_string(), "(alert.messageid == '1' && alert.analyzer.name != 'snort')");
/// ```
pub fn parse_lucene(input: &str, compiler: &dyn CriterionCompiler) -> Result<Criterion, AnalyticsError> {
    let expr = parse_lucene_expr(input).inspect_err(|e| {
        tracing::debug!(query = input, error = %e, "Rejected lucene query");
    })?;
    expr.compile(compiler)
}

/// Renders `path == value` in the given syntax, for inline filter links.
///
/// Lucene values holding reserved characters or whitespace are quoted. An
/// empty value selects records where the field is absent.
///
/// # Examples
///
/// ```
/// use analytics::criteria::{format_criterion, Path, QueryMode};
/// use analytics::Value;
///
/// let path = Path::new("alert.classification.text");
/// assert_eq!(
///     format_criterion(&path, &Value::from("a b"), QueryMode::Lucene),
///     r#"alert.classification.text:"a b""#
/// );
/// assert_eq!(
///     format_criterion(&path, &Value::Null, QueryMode::Lucene),
///     "-alert.classification.text:[* TO *]"
/// );
/// ```
#[must_use]
pub fn format_criterion(path: &Path, value: &Value, mode: QueryMode) -> String {
    let text = value.to_string();
    match mode {
        QueryMode::Lucene if text.is_empty() => format!("-{path}:[* TO *]"),
        QueryMode::Lucene => format!("{path}:{}", escape(&text)),
        QueryMode::Criterion if text.is_empty() => Criterion::is_null(path.clone()).to_string(),
        QueryMode::Criterion => Criterion::eq(path.clone(), value.clone()).to_string(),
    }
}

/// Quotes `value` when Lucene would otherwise read it as syntax.
#[must_use]
pub fn escape(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value.contains("&&")
        || value.contains("||")
        || value
            .chars()
            .any(|c| c.is_whitespace() || RESERVED.contains(&c));
    if !needs_quotes {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

// ============================================================================
// Boolean structure
// ============================================================================

fn or_expression(input: &str) -> IResult<&str, Expr> {
    let (input, first) = and_expression(input)?;
    let (input, rest) = many0(preceded(
        alt((
            (multispace1, tag("OR"), multispace1),
            (multispace0, tag("||"), multispace0),
        )),
        and_expression,
    ))
    .parse(input)?;

    let result = rest
        .into_iter()
        .fold(first, |left, right| Expr::Or(Box::new(left), Box::new(right)));

    Ok((input, result))
}

fn and_expression(input: &str) -> IResult<&str, Expr> {
    let (input, first) = clause(input)?;
    let (input, rest) = many0(alt((
        preceded((multispace1, tag("AND"), multispace1), clause),
        preceded((multispace0, tag("&&"), multispace0), clause),
        preceded(multispace1, clause),
    )))
    .parse(input)?;

    let result = rest
        .into_iter()
        .fold(first, |left, right| Expr::And(Box::new(left), Box::new(right)));

    Ok((input, result))
}

fn clause(input: &str) -> IResult<&str, Expr> {
    let (input, negated) = opt(modifier).parse(input)?;
    let (input, expr) = alt((grouped, field_term, free_term)).parse(input)?;

    Ok((input, if negated == Some(true) { expr.negate() } else { expr }))
}

/// `NOT `, `-` and `!` negate; `+` only marks the clause as required.
fn modifier(input: &str) -> IResult<&str, bool> {
    alt((
        value(true, (tag("NOT"), multispace1)),
        value(true, char('-')),
        value(true, char('!')),
        value(false, char('+')),
    ))
    .parse(input)
}

fn grouped(input: &str) -> IResult<&str, Expr> {
    let (input, _) = char('(').parse(input)?;
    let (input, _) = multispace0(input)?;
    let (input, expr) = or_expression(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char(')').parse(input)?;

    Ok((input, expr))
}

fn field_term(input: &str) -> IResult<&str, Expr> {
    let (input, field) = path(input)?;
    let (input, _) = char(':').parse(input)?;
    let (input, _) = multispace0(input)?;

    if let Ok((input, (lower, upper))) = range(input) {
        return Ok((
            input,
            Expr::Range {
                path: Some(field),
                lower,
                upper,
                negated: false,
            },
        ));
    }

    map(term, move |t| t.into_expr(Some(field.clone()))).parse(input)
}

fn free_term(input: &str) -> IResult<&str, Expr> {
    map(term, |t| t.into_expr(None)).parse(input)
}

// ============================================================================
// Values
// ============================================================================

#[derive(Debug, PartialEq)]
enum Term {
    Quoted(String),
    Plain(String),
    /// Anchored regex built from a `*`/`?` pattern.
    Wildcard(String),
    Regex(String),
}

impl Term {
    fn into_expr(self, path: Option<Path>) -> Expr {
        let fielded = path.is_some();
        let (operator, value) = match self {
            Self::Quoted(s) | Self::Plain(s) if fielded => (Operator::Eq, s),
            Self::Quoted(s) | Self::Plain(s) => (Operator::SubstrNoCase, s),
            Self::Wildcard(re) if fielded => (Operator::Regex, re),
            Self::Wildcard(re) => (Operator::RegexNoCase, re),
            Self::Regex(re) => (Operator::Regex, re),
        };
        Expr::Compare {
            path,
            operator,
            value: Value::String(value),
        }
    }
}

fn term(input: &str) -> IResult<&str, Term> {
    alt((
        map(quoted_string, Term::Quoted),
        map(regex_literal, Term::Regex),
        unquoted,
    ))
    .parse(input)
}

fn regex_literal(input: &str) -> IResult<&str, String> {
    let Some(body) = input.strip_prefix('/') else {
        return Err(nom::Err::Error(Error::new(input, ErrorKind::Char)));
    };

    let mut out = String::new();
    let mut chars = body.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, '/')) => out.push('/'),
                Some((_, other)) => {
                    out.push('\\');
                    out.push(other);
                }
                None => break,
            },
            '/' => return Ok((&body[i + 1..], out)),
            _ => out.push(c),
        }
    }

    Err(nom::Err::Error(Error::new(input, ErrorKind::Char)))
}

fn is_term_end(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            '(' | ')' | '[' | ']' | '{' | '}' | '"' | '^' | '~' | ':' | '&' | '|'
        )
}

/// A bare word with backslash escapes; unescaped `*` and `?` make it a
/// wildcard.
fn unquoted(input: &str) -> IResult<&str, Term> {
    let mut literal = String::new();
    let mut pattern = String::new();
    let mut wildcard = false;
    let mut escaped_any = false;
    let mut end = input.len();

    let mut chars = input.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                let Some((_, next)) = chars.next() else {
                    end = i;
                    break;
                };
                escaped_any = true;
                literal.push(next);
                pattern.push_str(&regex::escape(&next.to_string()));
            }
            '*' => {
                wildcard = true;
                literal.push(c);
                pattern.push_str(".*");
            }
            '?' => {
                wildcard = true;
                literal.push(c);
                pattern.push('.');
            }
            c if is_term_end(c) => {
                end = i;
                break;
            }
            c => {
                literal.push(c);
                pattern.push_str(&regex::escape(&c.to_string()));
            }
        }
    }

    if literal.is_empty() {
        return Err(nom::Err::Error(Error::new(input, ErrorKind::TakeWhile1)));
    }
    if !escaped_any && matches!(literal.as_str(), "AND" | "OR" | "NOT") {
        return Err(nom::Err::Error(Error::new(input, ErrorKind::Tag)));
    }

    let term = if wildcard {
        Term::Wildcard(format!("^{pattern}$"))
    } else {
        Term::Plain(literal)
    };
    Ok((&input[end..], term))
}

// ============================================================================
// Ranges
// ============================================================================

fn range(input: &str) -> IResult<&str, (RangeBound, RangeBound)> {
    let (input, open) = alt((char('['), char('{'))).parse(input)?;
    let (input, _) = multispace0(input)?;
    let (input, lower) = bound(input)?;
    let (input, _) = (multispace1, tag("TO"), multispace1).parse(input)?;
    let (input, upper) = bound(input)?;
    let (input, _) = multispace0(input)?;
    let (input, close) = alt((char(']'), char('}'))).parse(input)?;

    let make = |value: Option<String>, inclusive: bool| match value {
        None => RangeBound::Unbounded,
        Some(v) if inclusive => RangeBound::Inclusive(Value::String(v)),
        Some(v) => RangeBound::Exclusive(Value::String(v)),
    };
    Ok((input, (make(lower, open == '['), make(upper, close == ']'))))
}

fn bound(input: &str) -> IResult<&str, Option<String>> {
    alt((
        map(quoted_string, Some),
        map(
            take_while1(|c: char| !c.is_whitespace() && c != ']' && c != '}'),
            |s: &str| (s != "*").then(|| s.to_string()),
        ),
    ))
    .parse(input)
}
