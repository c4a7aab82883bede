//! Typed data paths such as `alert.source(0).node.address(-1).address`.

use super::token::{quoted_string, word};
use super::ParseError;
use nom::{
    branch::alt,
    character::complete::{char, digit1},
    combinator::{all_consuming, map, map_res, opt, recognize},
    multi::many0,
    sequence::{delimited, preceded},
    IResult, Parser,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

/// Index of a list element inside a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathIndex {
    /// Position in a list; negative positions count from the end.
    Position(i64),
    /// Key of a keyed element.
    Key(String),
}

/// One dot-separated element of a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Segment {
    /// Element name.
    pub name: String,
    /// Optional list index.
    pub index: Option<PathIndex>,
}

impl Segment {
    /// A segment without index.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: None,
        }
    }
}

/// A path into a structured record.
///
/// The first segment is the datatype root (`alert`, `heartbeat`, `log`).
/// A segment without index on a list field addresses every element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    /// Parses a path strictly.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidPath`] when the input is not a path.
    ///
    /// # Examples
    ///
    /// ```
    /// use analytics::criteria::{Path, PathIndex};
    ///
    /// let path = Path::parse("alert.analyzer(-1).name").unwrap();
    /// assert_eq!(path.segments()[1].index, Some(PathIndex::Position(-1)));
    /// ```
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        all_consuming(path)
            .parse(input.trim())
            .map(|(_, path)| path)
            .map_err(|_| ParseError::InvalidPath(input.to_string()))
    }

    /// Builds a path from trusted text.
    ///
    /// Text that does not parse is split on the dots found outside
    /// parentheses and kept without indexes.
    #[must_use]
    pub fn new(input: &str) -> Self {
        Self::parse(input).unwrap_or_else(|_| Self {
            segments: split_outside_parens(input.trim())
                .into_iter()
                .map(Segment::new)
                .collect(),
        })
    }

    /// Builds a path from its segments.
    #[must_use]
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// The segments of the path.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Name of the first segment.
    #[must_use]
    pub fn root(&self) -> &str {
        self.segments.first().map_or("", |s| s.name.as_str())
    }

    /// Name of the last segment.
    #[must_use]
    pub fn leaf(&self) -> &str {
        self.segments.last().map_or("", |s| s.name.as_str())
    }

    /// True when any segment carries an index.
    #[must_use]
    pub fn has_index(&self) -> bool {
        self.segments.iter().any(|s| s.index.is_some())
    }

    /// The same path with every index removed.
    #[must_use]
    pub fn without_indexes(&self) -> Self {
        Self {
            segments: self
                .segments
                .iter()
                .map(|s| Segment::new(s.name.clone()))
                .collect(),
        }
    }

    /// Dotted names without indexes, the key used for schema lookups.
    #[must_use]
    pub fn key(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Prefixes the path with `root` unless it already starts there.
    #[must_use]
    pub fn with_root(&self, root: &str) -> Self {
        if self.root() == root {
            return self.clone();
        }
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.push(Segment::new(root));
        segments.extend(self.segments.iter().cloned());
        Self { segments }
    }

    /// True when the path lies under `prefix`. A prefix segment without
    /// index matches any index.
    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        prefix.segments.len() <= self.segments.len()
            && prefix.segments.iter().zip(&self.segments).all(|(p, s)| {
                p.name == s.name && (p.index.is_none() || p.index == s.index)
            })
    }

    /// Appends `child` to the path.
    #[must_use]
    pub fn join(&self, child: &Self) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(child.segments.iter().cloned());
        Self { segments }
    }
}

fn split_outside_parens(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in input.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            '.' if depth == 0 => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(&segment.name)?;
            match &segment.index {
                Some(PathIndex::Position(pos)) => write!(f, "({pos})")?,
                Some(PathIndex::Key(key)) => {
                    write!(f, "('{}')", key.replace('\\', "\\\\").replace('\'', "\\'"))?;
                }
                None => {}
            }
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Grammar
// ============================================================================

fn index(input: &str) -> IResult<&str, PathIndex> {
    delimited(
        char('('),
        alt((
            map_res(recognize((opt(char('-')), digit1)), |s: &str| {
                s.parse::<i64>().map(PathIndex::Position)
            }),
            map(quoted_string, PathIndex::Key),
        )),
        char(')'),
    )
    .parse(input)
}

fn segment(input: &str) -> IResult<&str, Segment> {
    map((word, opt(index)), |(name, index)| Segment {
        name: name.to_string(),
        index,
    })
    .parse(input)
}

/// A path, leaving any trailing input untouched.
pub(crate) fn path(input: &str) -> IResult<&str, Path> {
    map((segment, many0(preceded(char('.'), segment))), |(first, rest)| {
        let mut segments = Vec::with_capacity(rest.len() + 1);
        segments.push(first);
        segments.extend(rest);
        Path { segments }
    })
    .parse(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let path = Path::parse("alert.classification.text").unwrap();
        assert_eq!(path.segments().len(), 3);
        assert_eq!(path.root(), "alert");
        assert_eq!(path.leaf(), "text");
        assert!(!path.has_index());
    }

    #[test]
    fn test_parse_indexes() {
        let path = Path::parse("alert.source(0).node.address(-1).address").unwrap();
        assert_eq!(path.segments()[1].index, Some(PathIndex::Position(0)));
        assert_eq!(path.segments()[3].index, Some(PathIndex::Position(-1)));
        assert_eq!(path.to_string(), "alert.source(0).node.address(-1).address");

        let path = Path::parse("alert.additional_data('x y').data").unwrap();
        assert_eq!(
            path.segments()[1].index,
            Some(PathIndex::Key("x y".to_string()))
        );
        assert_eq!(path.to_string(), "alert.additional_data('x y').data");
    }

    #[test]
    fn test_parse_errors() {
        assert!(Path::parse("").is_err());
        assert!(Path::parse("alert.").is_err());
        assert!(Path::parse("alert..x").is_err());
        assert!(Path::parse("alert.x(").is_err());
        assert!(Path::parse("alert x").is_err());
        assert!(Path::parse("1alert").is_err());
    }

    #[test]
    fn test_parse_trims() {
        assert_eq!(
            Path::parse("  alert.messageid ").unwrap(),
            Path::new("alert.messageid")
        );
    }

    #[test]
    fn test_without_indexes_and_key() {
        let path = Path::new("alert.source(0).node.address(0).address");
        assert_eq!(
            path.without_indexes().to_string(),
            "alert.source.node.address.address"
        );
        assert_eq!(path.key(), "alert.source.node.address.address");
    }

    #[test]
    fn test_with_root() {
        let path = Path::new("classification.text");
        assert_eq!(path.with_root("alert").to_string(), "alert.classification.text");
        let rooted = Path::new("alert.messageid");
        assert_eq!(rooted.with_root("alert"), rooted);
    }

    #[test]
    fn test_starts_with() {
        let path = Path::new("alert.source(0).node.address(1).address");
        assert!(path.starts_with(&Path::new("alert.source")));
        assert!(path.starts_with(&Path::new("alert.source(0).node")));
        assert!(!path.starts_with(&Path::new("alert.source(1)")));
        assert!(!path.starts_with(&Path::new("alert.target")));
        assert!(!Path::new("alert.source").starts_with(&path));
    }

    #[test]
    fn test_lenient_new() {
        let path = Path::new("alert.weird-name.x");
        assert_eq!(path.segments().len(), 3);
        assert_eq!(path.segments()[1].name, "weird-name");
    }

    #[test]
    fn test_serde_as_string() {
        let path = Path::new("alert.analyzer(-1).name");
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"alert.analyzer(-1).name\"");
        let back: Path = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
    }
}
