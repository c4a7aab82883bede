//! Path-addressable records.

use crate::criteria::{Path, PathIndex, Segment};
use crate::value::Value;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// One stored record of a datatype.
///
/// The document holds the fields below the datatype root: an alert record
/// is `{"messageid": ..., "classification": {...}}` and is addressed with
/// `alert.messageid`. Timestamps are RFC 3339 strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    datatype: String,
    data: Json,
}

impl Record {
    /// Wraps a JSON document.
    #[must_use]
    pub fn new(datatype: impl Into<String>, data: Json) -> Self {
        Self {
            datatype: datatype.into(),
            data,
        }
    }

    /// The datatype of the record.
    #[must_use]
    pub fn datatype(&self) -> &str {
        &self.datatype
    }

    /// The raw document.
    #[must_use]
    pub const fn data(&self) -> &Json {
        &self.data
    }

    /// Every value reached by `path`.
    ///
    /// A segment without index on a list reaches every element; `(n)`
    /// picks one element, negative positions counting from the end. A
    /// quoted key looks up an entry of a map. Nulls are skipped, so an
    /// absent field yields an empty list.
    ///
    /// # Examples
    ///
    /// ```
    /// use analytics::criteria::Path;
    /// use analytics::provider::Record;
    /// use serde_json::json;
    ///
    /// let record = Record::new("alert", json!({
    ///     "source": [{"node": {"name": "a"}}, {"node": {"name": "b"}}]
    /// }));
    /// assert_eq!(record.values(&Path::new("alert.source.node.name")).len(), 2);
    /// assert_eq!(record.first(&Path::new("alert.source(-1).node.name")).to_string(), "b");
    /// ```
    #[must_use]
    pub fn values(&self, path: &Path) -> Vec<Value> {
        self.nodes(path)
            .into_iter()
            .flat_map(|node| match node {
                Json::Array(items) => items.iter().collect(),
                other => vec![other],
            })
            .filter(|node| !node.is_null())
            .map(json_to_value)
            .collect()
    }

    /// The first value reached by `path`, or `Null`.
    #[must_use]
    pub fn first(&self, path: &Path) -> Value {
        self.values(path).into_iter().next().unwrap_or_default()
    }

    /// True when `path` reaches at least one value.
    #[must_use]
    pub fn has(&self, path: &Path) -> bool {
        !self.nodes(path).into_iter().all(Json::is_null)
    }

    /// The JSON nodes reached by `path`, for sub-object access.
    #[must_use]
    pub fn nodes(&self, path: &Path) -> Vec<&Json> {
        let segments = match path.segments().split_first() {
            Some((root, rest)) if root.name == self.datatype && root.index.is_none() => rest,
            _ => path.segments(),
        };

        segments.iter().fold(vec![&self.data], |current, segment| {
            current
                .into_iter()
                .flat_map(|node| step(node, segment))
                .collect()
        })
    }
}

fn step<'a>(node: &'a Json, segment: &Segment) -> Vec<&'a Json> {
    let parents: Vec<&Json> = match node {
        Json::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    parents
        .into_iter()
        .filter_map(|parent| parent.get(&segment.name))
        .flat_map(|field| select(field, segment.index.as_ref()))
        .collect()
}

fn select<'a>(field: &'a Json, index: Option<&PathIndex>) -> Vec<&'a Json> {
    match (field, index) {
        (_, None) => vec![field],
        (Json::Array(items), Some(PathIndex::Position(pos))) => position(items, *pos)
            .and_then(|i| items.get(i))
            .into_iter()
            .collect(),
        (_, Some(PathIndex::Position(0 | -1))) => vec![field],
        (_, Some(PathIndex::Position(_))) => Vec::new(),
        (Json::Array(items), Some(PathIndex::Key(key))) => {
            items.iter().filter_map(|item| item.get(key)).collect()
        }
        (_, Some(PathIndex::Key(key))) => field.get(key).into_iter().collect(),
    }
}

fn position(items: &[Json], pos: i64) -> Option<usize> {
    let len = i64::try_from(items.len()).ok()?;
    let idx = if pos < 0 { len + pos } else { pos };
    usize::try_from(idx).ok().filter(|i| *i < items.len())
}

/// Converts a JSON leaf into a [`Value`].
///
/// Strings holding an RFC 3339 timestamp become timestamps; objects and
/// arrays are kept as their JSON text.
pub(crate) fn json_to_value(json: &Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Boolean(*b),
        Json::Number(n) => n
            .as_i64()
            .map(Value::Integer)
            .or_else(|| n.as_f64().map(Value::Float))
            .unwrap_or_default(),
        Json::String(s) => DateTime::parse_from_rfc3339(s)
            .map_or_else(|_| Value::String(s.clone()), Value::DateTime),
        other => Value::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn alert() -> Record {
        Record::new(
            "alert",
            json!({
                "messageid": "m1",
                "create_time": "2024-05-10T12:00:00+00:00",
                "source": [
                    {"node": {"address": [{"address": "10.0.0.1"}, {"address": "10.0.0.2"}]}},
                    {"node": {"name": "host-b"}}
                ],
                "analyzer": [{"name": "a0"}, {"name": "a1"}],
                "additional_data": {"ports": 3},
                "correlation_alert": {"name": "corr"},
                "nothing": null
            }),
        )
    }

    #[test]
    fn test_scalar_and_datetime() {
        let r = alert();
        assert_eq!(r.first(&Path::new("alert.messageid")), Value::from("m1"));
        assert!(matches!(
            r.first(&Path::new("alert.create_time")),
            Value::DateTime(_)
        ));
    }

    #[test]
    fn test_implicit_lists() {
        let r = alert();
        let values = r.values(&Path::new("alert.source.node.address.address"));
        assert_eq!(values, vec![Value::from("10.0.0.1"), Value::from("10.0.0.2")]);
    }

    #[test]
    fn test_indexes() {
        let r = alert();
        assert_eq!(
            r.values(&Path::new("alert.source(0).node.address(-1).address")),
            vec![Value::from("10.0.0.2")]
        );
        assert_eq!(
            r.first(&Path::new("alert.analyzer(-1).name")),
            Value::from("a1")
        );
        assert!(r.values(&Path::new("alert.analyzer(5).name")).is_empty());
        assert_eq!(
            r.first(&Path::new("alert.correlation_alert(0).name")),
            Value::from("corr")
        );
        assert_eq!(
            r.first(&Path::new("alert.additional_data('ports')")),
            Value::Integer(3)
        );
    }

    #[test]
    fn test_absent_and_null() {
        let r = alert();
        assert!(r.values(&Path::new("alert.nothing")).is_empty());
        assert!(!r.has(&Path::new("alert.nothing")));
        assert!(!r.has(&Path::new("alert.tool_alert")));
        assert!(r.has(&Path::new("alert.correlation_alert")));
        assert_eq!(r.first(&Path::new("alert.target.node.name")), Value::Null);
    }

    #[test]
    fn test_relative_path() {
        let r = alert();
        assert_eq!(r.first(&Path::new("messageid")), Value::from("m1"));
    }
}
