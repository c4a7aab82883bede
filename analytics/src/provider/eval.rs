//! Criteria evaluation for the in-memory provider.
//!
//! A leaf matches when any value reached by its path satisfies the
//! comparison; negative operators match when no value satisfies the
//! positive form, so an absent field satisfies `!=`.

use super::{ProviderError, Record};
use crate::criteria::{Criterion, LogicalOp, Operator, Path};
use crate::value::Value;
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;

/// A criterion with its patterns compiled.
#[derive(Debug)]
pub(crate) enum Filter {
    All,
    Leaf {
        path: Path,
        operator: Operator,
        value: Value,
        pattern: Option<Regex>,
    },
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
}

impl Filter {
    pub(crate) fn compile(criterion: &Criterion) -> Result<Self, ProviderError> {
        Ok(match criterion {
            Criterion::Empty => Self::All,
            Criterion::Combined {
                left,
                operator,
                right,
            } => {
                let left = Box::new(Self::compile(left)?);
                let right = Box::new(Self::compile(right)?);
                match operator {
                    LogicalOp::And => Self::And(left, right),
                    LogicalOp::Or => Self::Or(left, right),
                }
            }
            Criterion::Compare {
                path,
                operator,
                value,
            } => Self::Leaf {
                path: path.clone(),
                operator: *operator,
                value: value.clone(),
                pattern: pattern(*operator, value)?,
            },
        })
    }

    pub(crate) fn matches(&self, record: &Record) -> bool {
        match self {
            Self::All => true,
            Self::And(l, r) => l.matches(record) && r.matches(record),
            Self::Or(l, r) => l.matches(record) || r.matches(record),
            Self::Leaf {
                path,
                operator,
                value,
                pattern,
            } => {
                let values = record.values(path);
                if value.is_null() {
                    return match operator {
                        Operator::Eq => values.is_empty(),
                        Operator::NotEq => !values.is_empty(),
                        _ => false,
                    };
                }

                let positive = operator.positive();
                let any = values
                    .iter()
                    .any(|v| test(positive, v, value, pattern.as_ref()));
                any != operator.is_negative()
            }
        }
    }
}

fn pattern(operator: Operator, value: &Value) -> Result<Option<Regex>, ProviderError> {
    let text = value.to_string();
    let source = match operator.positive() {
        Operator::Regex | Operator::RegexNoCase => text,
        Operator::Substr | Operator::SubstrNoCase if has_wildcard(&text) => glob(&text),
        _ => return Ok(None),
    };

    RegexBuilder::new(&source)
        .case_insensitive(operator.is_case_insensitive())
        .build()
        .map(Some)
        .map_err(|e| ProviderError::InvalidQuery(format!("bad pattern '{source}': {e}")))
}

/// True when `text` holds a `*` not preceded by a backslash.
pub(crate) fn has_wildcard(text: &str) -> bool {
    let mut escaped = false;
    for c in text.chars() {
        match c {
            '\\' if !escaped => escaped = true,
            '*' if !escaped => return true,
            _ => escaped = false,
        }
    }
    false
}

fn glob(text: &str) -> String {
    let mut out = String::from("^");
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push_str(&regex::escape(&next.to_string()));
                }
            }
            '*' => out.push_str(".*"),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    out
}

fn test(operator: Operator, candidate: &Value, operand: &Value, pattern: Option<&Regex>) -> bool {
    if let Some(re) = pattern {
        return re.is_match(&candidate.to_string());
    }

    let ordering = || candidate.compare(operand);
    match operator {
        Operator::Eq => ordering() == Some(Ordering::Equal),
        Operator::EqNoCase => {
            candidate.to_string().to_lowercase() == operand.to_string().to_lowercase()
        }
        Operator::Substr => candidate.to_string().contains(&operand.to_string()),
        Operator::SubstrNoCase => candidate
            .to_string()
            .to_lowercase()
            .contains(&operand.to_string().to_lowercase()),
        Operator::Lt => ordering() == Some(Ordering::Less),
        Operator::LtEq => matches!(ordering(), Some(Ordering::Less | Ordering::Equal)),
        Operator::Gt => ordering() == Some(Ordering::Greater),
        Operator::GtEq => matches!(ordering(), Some(Ordering::Greater | Ordering::Equal)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> Record {
        Record::new(
            "alert",
            json!({
                "classification": {"text": "SSH Brute Force"},
                "source": [
                    {"node": {"address": [{"address": "10.0.0.1"}]}},
                    {"node": {"address": [{"address": "192.168.1.1"}]}}
                ],
                "target": [{"service": {"port": 22}}],
                "create_time": "2024-05-10T12:00:00+00:00"
            }),
        )
    }

    fn check(criterion: &Criterion) -> bool {
        Filter::compile(criterion).unwrap().matches(&record())
    }

    fn leaf(path: &str, operator: Operator, value: impl Into<Value>) -> Criterion {
        Criterion::compare(Path::new(path), operator, value)
    }

    #[test]
    fn test_equality_is_existential() {
        assert!(check(&leaf("alert.source.node.address.address", Operator::Eq, "192.168.1.1")));
        assert!(!check(&leaf("alert.source.node.address.address", Operator::Eq, "10.9.9.9")));
    }

    #[test]
    fn test_negation_is_universal() {
        assert!(!check(&leaf("alert.source.node.address.address", Operator::NotEq, "10.0.0.1")));
        assert!(check(&leaf("alert.source.node.address.address", Operator::NotEq, "10.9.9.9")));
        assert!(check(&leaf("alert.analyzer.name", Operator::NotEq, "x")));
    }

    #[test]
    fn test_presence() {
        assert!(check(&Criterion::is_set(Path::new("alert.classification.text"))));
        assert!(check(&Criterion::is_null(Path::new("alert.correlation_alert"))));
        assert!(!check(&Criterion::is_null(Path::new("alert.source"))));
    }

    #[test]
    fn test_text_operators() {
        assert!(check(&leaf("alert.classification.text", Operator::EqNoCase, "ssh brute force")));
        assert!(check(&leaf("alert.classification.text", Operator::Substr, "Brute")));
        assert!(!check(&leaf("alert.classification.text", Operator::Substr, "brute")));
        assert!(check(&leaf("alert.classification.text", Operator::SubstrNoCase, "brute")));
        assert!(check(&leaf("alert.classification.text", Operator::NotSubstr, "telnet")));
        assert!(check(&leaf("alert.classification.text", Operator::SubstrNoCase, "*brute*")));
        assert!(!check(&leaf("alert.classification.text", Operator::SubstrNoCase, "brute*")));
        assert!(check(&leaf("alert.classification.text", Operator::Regex, "^SSH")));
        assert!(check(&leaf("alert.classification.text", Operator::RegexNoCase, "^ssh")));
        assert!(check(&leaf("alert.classification.text", Operator::NotRegex, "^ssh")));
    }

    #[test]
    fn test_ordering_operators() {
        assert!(check(&leaf("alert.target.service.port", Operator::Lt, 1024i64)));
        assert!(check(&leaf("alert.target.service.port", Operator::GtEq, "22")));
        assert!(check(&leaf(
            "alert.create_time",
            Operator::LtEq,
            "2024-05-10T12:00:00+00:00"
        )));
        assert!(!check(&leaf(
            "alert.create_time",
            Operator::Gt,
            "2024-05-10T12:00:00+00:00"
        )));
    }

    #[test]
    fn test_boolean_structure() {
        let yes = leaf("alert.target.service.port", Operator::Eq, 22i64);
        let no = leaf("alert.target.service.port", Operator::Eq, 23i64);
        assert!(!check(&(yes.clone() & no.clone())));
        assert!(check(&(yes | no)));
        assert!(check(&Criterion::Empty));
    }

    #[test]
    fn test_bad_regex_is_rejected() {
        let err = Filter::compile(&leaf("alert.classification.text", Operator::Regex, "(")).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidQuery(_)));
    }

    #[test]
    fn test_has_wildcard() {
        assert!(has_wildcard("*a"));
        assert!(!has_wildcard(r"a\*"));
        assert!(has_wildcard(r"a\\*"));
        assert!(!has_wildcard("plain"));
    }
}
