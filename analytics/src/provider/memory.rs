//! In-memory data provider.

use super::eval::Filter;
use super::{
    DataProvider, GetRequest, PathInfo, ProviderError, QueryRequest, Record, Row, Schema,
};
use crate::criteria::{
    parse_lucene, Aggregate, Criterion, Extract, Operand, Path, PathTranslations, QueryCompiler,
    QueryMode, Selection, SelectionTarget, SortOrder,
};
use crate::time::Timezone;
use crate::value::Value;
use chrono::{DateTime, Datelike, FixedOffset, Timelike};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// In-memory data provider.
///
/// Records are stored as JSON documents per datatype behind a `RwLock`.
/// Suitable for development, testing and the command line tool.
///
/// **Note:** Data is not persisted.
///
/// # Example
///
/// ```
/// use analytics::criteria::{Path, Selection};
/// use analytics::provider::{DataProvider, InMemoryDataProvider, QueryRequest, Schema};
/// use serde_json::json;
///
/// let provider = InMemoryDataProvider::new(Schema::alert());
/// provider.insert("alert", json!({"classification": {"text": "ssh"}})).unwrap();
/// provider.insert("alert", json!({"classification": {"text": "ssh"}})).unwrap();
///
/// let request = QueryRequest::new("alert", vec![
///     Selection::path(Path::new("alert.classification.text")).group_by(),
///     Selection::count_all(),
/// ]);
/// let rows = provider.query(&request).unwrap();
/// assert_eq!(rows, vec![vec!["ssh".into(), 2i64.into()]]);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryDataProvider {
    schema: Schema,
    records: Arc<RwLock<HashMap<String, Vec<Record>>>>,
    denied: HashSet<String>,
}

impl InMemoryDataProvider {
    /// Creates an empty provider serving the datatypes of `schema`.
    #[must_use]
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            records: Arc::new(RwLock::new(HashMap::new())),
            denied: HashSet::new(),
        }
    }

    /// Refuses every read of `datatype` with
    /// [`ProviderError::PermissionDenied`].
    #[must_use]
    pub fn deny(mut self, datatype: &str) -> Self {
        self.denied.insert(datatype.to_string());
        self
    }

    /// Sets the native query syntax of `datatype`.
    #[must_use]
    pub fn with_query_mode(mut self, datatype: &str, mode: QueryMode) -> Self {
        if let Some(schema) = self.schema.datatype_mut(datatype) {
            schema.set_query_mode(mode);
        }
        self
    }

    /// Stores one record.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NoBackend`] for datatypes outside the
    /// schema.
    pub fn insert(&self, datatype: &str, data: serde_json::Value) -> Result<(), ProviderError> {
        self.insert_batch(datatype, vec![data])
    }

    /// Stores several records.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NoBackend`] for datatypes outside the
    /// schema.
    pub fn insert_batch(
        &self,
        datatype: &str,
        data: Vec<serde_json::Value>,
    ) -> Result<(), ProviderError> {
        if self.schema.datatype(datatype).is_none() {
            return Err(ProviderError::NoBackend(datatype.to_string()));
        }
        let mut records = self.records.write().map_err(|_| ProviderError::LockError)?;
        records
            .entry(datatype.to_string())
            .or_default()
            .extend(data.into_iter().map(|d| Record::new(datatype, d)));
        Ok(())
    }

    /// Number of records of `datatype`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn count(&self, datatype: &str) -> Result<usize, ProviderError> {
        let records = self.records.read().map_err(|_| ProviderError::LockError)?;
        Ok(records.get(datatype).map_or(0, Vec::len))
    }

    /// Removes every record.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn clear(&self) -> Result<(), ProviderError> {
        let mut records = self.records.write().map_err(|_| ProviderError::LockError)?;
        records.clear();
        Ok(())
    }

    fn check_access(&self, datatype: &str) -> Result<(), ProviderError> {
        if self.denied.contains(datatype) {
            return Err(ProviderError::PermissionDenied(datatype.to_string()));
        }
        if self.schema.datatype(datatype).is_none() {
            return Err(ProviderError::NoBackend(datatype.to_string()));
        }
        Ok(())
    }

    /// Records of `datatype` matching `criteria`, in insertion order.
    fn matching(&self, datatype: &str, criteria: &Criterion) -> Result<Vec<Record>, ProviderError> {
        self.check_access(datatype)?;
        let criteria = self.resolve_raw_queries(datatype, criteria)?;
        let filter = Filter::compile(&criteria)?;

        let records = self.records.read().map_err(|_| ProviderError::LockError)?;
        Ok(records
            .get(datatype)
            .map(|all| all.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default())
    }

    /// Replaces pass-through queries with their compiled Lucene form.
    fn resolve_raw_queries(
        &self,
        datatype: &str,
        criteria: &Criterion,
    ) -> Result<Criterion, ProviderError> {
        if let Some(raw) = criteria.as_raw_query() {
            let translations = PathTranslations::new();
            let compiler = QueryCompiler::new(self, &translations, datatype);
            return parse_lucene(raw, &compiler)
                .map_err(|e| ProviderError::InvalidQuery(e.to_string()));
        }

        match criteria {
            Criterion::Combined {
                left,
                operator,
                right,
            } => Ok(Criterion::Combined {
                left: Box::new(self.resolve_raw_queries(datatype, left)?),
                operator: *operator,
                right: Box::new(self.resolve_raw_queries(datatype, right)?),
            }),
            other => Ok(other.clone()),
        }
    }
}

impl DataProvider for InMemoryDataProvider {
    fn query(&self, request: &QueryRequest) -> Result<Vec<Row>, ProviderError> {
        let records = self.matching(&request.datatype, &request.criteria)?;
        let columns = request
            .selection
            .iter()
            .map(Column::new)
            .collect::<Result<Vec<_>, _>>()?;

        let grouped = request
            .selection
            .iter()
            .any(|s| s.is_grouped() || s.is_aggregate());
        let mut rows = if grouped {
            grouped_rows(&columns, &records)
        } else {
            records
                .iter()
                .map(|record| {
                    columns
                        .iter()
                        .map(|c| c.values(record).into_iter().next().unwrap_or_default())
                        .collect()
                })
                .collect()
        };

        let order: Vec<(usize, SortOrder)> = request
            .selection
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.sort_order().map(|o| (i, o)))
            .collect();
        if !order.is_empty() {
            rows.sort_by(|a, b| {
                order
                    .iter()
                    .map(|&(i, o)| directed(compare_values(&a[i], &b[i]), o))
                    .find(|ord| *ord != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }

        let rows: Vec<Row> = rows
            .into_iter()
            .skip(request.offset)
            .take(request.limit.unwrap_or(usize::MAX))
            .collect();

        tracing::debug!(
            datatype = %request.datatype,
            matched = records.len(),
            rows = rows.len(),
            "Executed query"
        );
        Ok(rows)
    }

    fn get(&self, request: &GetRequest) -> Result<Vec<Record>, ProviderError> {
        let mut records = self.matching(&request.datatype, &request.criteria)?;
        let time_field = self.time_field(&request.datatype)?;

        records.sort_by(|a, b| {
            directed(
                compare_values(&a.first(&time_field), &b.first(&time_field)),
                request.order,
            )
        });

        Ok(records
            .into_iter()
            .skip(request.offset)
            .take(request.limit.unwrap_or(usize::MAX))
            .collect())
    }

    fn path_info(&self, datatype: &str, path: &Path) -> Result<PathInfo, ProviderError> {
        let schema = self
            .schema
            .datatype(datatype)
            .ok_or_else(|| ProviderError::NoBackend(datatype.to_string()))?;
        schema
            .value_type(path)
            .cloned()
            .map(PathInfo::new)
            .ok_or_else(|| ProviderError::InvalidPath(path.to_string()))
    }

    fn time_field(&self, datatype: &str) -> Result<Path, ProviderError> {
        self.schema
            .datatype(datatype)
            .map(|d| d.time_field().clone())
            .ok_or_else(|| ProviderError::NoBackend(datatype.to_string()))
    }

    fn is_continuous(&self, datatype: &str) -> bool {
        self.schema
            .datatype(datatype)
            .is_some_and(super::DatatypeSchema::is_continuous)
    }

    fn default_query_mode(&self, datatype: &str) -> QueryMode {
        self.schema
            .datatype(datatype)
            .map_or(QueryMode::Criterion, super::DatatypeSchema::native_query_mode)
    }

    fn default_paths(&self, datatype: &str) -> Vec<Path> {
        self.schema
            .datatype(datatype)
            .map(|d| d.search_paths().to_vec())
            .unwrap_or_default()
    }
}

// ============================================================================
// Columns
// ============================================================================

/// A selection with its timezone resolved.
struct Column<'a> {
    selection: &'a Selection,
    zone: Option<Timezone>,
}

impl<'a> Column<'a> {
    fn new(selection: &'a Selection) -> Result<Self, ProviderError> {
        let zone = match &selection.target {
            SelectionTarget::Timezone { zone, .. } => {
                Some(Timezone::parse(zone).map_err(|e| ProviderError::InvalidQuery(e.to_string()))?)
            }
            _ => None,
        };
        Ok(Self { selection, zone })
    }

    /// Values of the column's field in `record`, localized and extracted;
    /// a single `Null` when the field is absent.
    fn values(&self, record: &Record) -> Vec<Value> {
        let raw = match self.selection.field() {
            Some(path) => record.values(path),
            None => Vec::new(),
        };
        let converted: Vec<Value> = raw.into_iter().map(|v| self.convert(v)).collect();
        if converted.is_empty() {
            vec![Value::Null]
        } else {
            converted
        }
    }

    fn convert(&self, value: Value) -> Value {
        if self.zone.is_none() && self.selection.extract.is_none() {
            return value;
        }
        let Some(dt) = value.as_datetime() else {
            return value;
        };
        let dt = self.zone.as_ref().map_or(dt, |zone| zone.localize(&dt));
        match self.selection.extract {
            Some(extract) => Value::Integer(extract_field(&dt, extract)),
            None => Value::DateTime(dt),
        }
    }
}

fn extract_field(dt: &DateTime<FixedOffset>, extract: Extract) -> i64 {
    let field = match extract {
        Extract::Year => return i64::from(dt.year()),
        Extract::Quarter => (dt.month() - 1) / 3 + 1,
        Extract::Month => dt.month(),
        Extract::Yday => dt.ordinal(),
        Extract::Mday => dt.day(),
        Extract::Wday => dt.weekday().num_days_from_sunday(),
        Extract::Hour => dt.hour(),
        Extract::Min => dt.minute(),
        Extract::Sec => dt.second(),
        Extract::Msec => dt.nanosecond() / 1_000_000,
        Extract::Usec => dt.nanosecond() / 1_000,
    };
    i64::from(field)
}

// ============================================================================
// Grouping and aggregates
// ============================================================================

struct Group {
    key: Vec<Value>,
    records: Vec<usize>,
}

fn grouped_rows(columns: &[Column<'_>], records: &[Record]) -> Vec<Row> {
    let key_columns: Vec<usize> = columns
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.selection.is_aggregate())
        .map(|(i, _)| i)
        .collect();

    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    if key_columns.is_empty() {
        groups.push(Group {
            key: Vec::new(),
            records: (0..records.len()).collect(),
        });
    } else {
        for (ri, record) in records.iter().enumerate() {
            let per_column: Vec<Vec<Value>> = key_columns
                .iter()
                .map(|&ci| columns[ci].values(record))
                .collect();

            for key in product(per_column) {
                let id = key.iter().map(Value::to_literal).collect::<Vec<_>>().join("\u{1f}");
                let gi = *index.entry(id).or_insert_with(|| {
                    groups.push(Group {
                        key,
                        records: Vec::new(),
                    });
                    groups.len() - 1
                });
                if groups[gi].records.last() != Some(&ri) {
                    groups[gi].records.push(ri);
                }
            }
        }
    }

    groups
        .into_iter()
        .map(|group| {
            let mut key = group.key.into_iter();
            columns
                .iter()
                .map(|column| match &column.selection.target {
                    SelectionTarget::Aggregate { function, operand } => {
                        aggregate(column, *function, operand, &group.records, records)
                    }
                    _ => key.next().unwrap_or_default(),
                })
                .collect()
        })
        .collect()
}

fn product(columns: Vec<Vec<Value>>) -> Vec<Vec<Value>> {
    columns.into_iter().fold(vec![Vec::new()], |acc, column| {
        acc.into_iter()
            .flat_map(|prefix| {
                column.iter().map(move |v| {
                    let mut key = prefix.clone();
                    key.push(v.clone());
                    key
                })
            })
            .collect()
    })
}

#[allow(clippy::cast_precision_loss)]
fn aggregate(
    column: &Column<'_>,
    function: Aggregate,
    operand: &Operand,
    members: &[usize],
    records: &[Record],
) -> Value {
    let count = |n: usize| Value::Integer(i64::try_from(n).unwrap_or(i64::MAX));

    if let Operand::Constant(c) = operand {
        return match function {
            Aggregate::Count => count(members.len()),
            _ => Value::Integer(*c),
        };
    }

    let values: Vec<Value> = members
        .iter()
        .flat_map(|&i| column.values(&records[i]))
        .filter(|v| !v.is_null())
        .collect();

    match (function, operand) {
        (Aggregate::Count, Operand::Distinct(_)) => {
            let distinct: BTreeSet<String> = values.iter().map(Value::to_literal).collect();
            count(distinct.len())
        }
        (Aggregate::Count, _) => count(values.len()),
        (Aggregate::Min, _) => extreme(values, Ordering::Less),
        (Aggregate::Max, _) => extreme(values, Ordering::Greater),
        (Aggregate::Sum, _) => sum(&values),
        (Aggregate::Avg, _) => {
            let n = values.len();
            match sum(&values).as_f64() {
                Some(total) if n > 0 => Value::Float(total / n as f64),
                _ => Value::Null,
            }
        }
    }
}

fn extreme(values: Vec<Value>, wanted: Ordering) -> Value {
    values
        .into_iter()
        .reduce(|best, v| {
            if v.compare(&best) == Some(wanted) {
                v
            } else {
                best
            }
        })
        .unwrap_or_default()
}

fn sum(values: &[Value]) -> Value {
    if values.iter().all(|v| matches!(v, Value::Integer(_))) {
        Value::Integer(values.iter().filter_map(Value::as_i64).sum())
    } else {
        Value::Float(values.iter().filter_map(Value::as_f64).sum())
    }
}

// ============================================================================
// Ordering
// ============================================================================

/// Orders values, unset values first and incomparable values as equal.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a
            .compare(b)
            .unwrap_or_else(|| a.to_string().cmp(&b.to_string())),
    }
}

fn directed(ordering: Ordering, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{Extract, Operator};
    use serde_json::json;

    fn provider() -> InMemoryDataProvider {
        let provider = InMemoryDataProvider::new(Schema::alert());
        provider
            .insert_batch(
                "alert",
                vec![
                    json!({
                        "messageid": "1",
                        "create_time": "2024-05-10T10:15:00+00:00",
                        "classification": {"text": "ssh"},
                        "source": [{"node": {"address": [{"address": "10.0.0.1"}]}}],
                        "assessment": {"impact": {"severity": "high"}}
                    }),
                    json!({
                        "messageid": "2",
                        "create_time": "2024-05-10T11:45:00+00:00",
                        "classification": {"text": "ssh"},
                        "source": [{"node": {"address": [{"address": "10.0.0.2"}]}}],
                        "assessment": {"impact": {"severity": "low"}}
                    }),
                    json!({
                        "messageid": "3",
                        "create_time": "2024-05-10T11:50:00+00:00",
                        "classification": {"text": "ping"}
                    }),
                ],
            )
            .unwrap();
        provider
    }

    fn path(p: &str) -> Path {
        Path::new(p)
    }

    #[test]
    fn test_group_by_with_count_order() {
        let request = QueryRequest::new(
            "alert",
            vec![
                Selection::count_all().order(SortOrder::Desc),
                Selection::path(path("alert.classification.text")).group_by(),
            ],
        );
        let rows = provider().query(&request).unwrap();
        assert_eq!(
            rows,
            vec![
                vec![Value::Integer(2), Value::from("ssh")],
                vec![Value::Integer(1), Value::from("ping")],
            ]
        );
    }

    #[test]
    fn test_group_by_absent_field_is_null() {
        let request = QueryRequest::new(
            "alert",
            vec![
                Selection::path(path("alert.source.node.address.address")).group_by(),
                Selection::count_all(),
            ],
        );
        let rows = provider().query(&request).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.contains(&vec![Value::Null, Value::Integer(1)]));
    }

    #[test]
    fn test_scalar_aggregates_without_group() {
        let request = QueryRequest::new(
            "alert",
            vec![
                Selection::count_all(),
                Selection::aggregate(Aggregate::Min, path("alert.create_time")),
                Selection::aggregate(Aggregate::Max, path("alert.messageid")),
                Selection::parse("count(distinct(alert.classification.text))").unwrap(),
            ],
        );
        let rows = provider().query(&request).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], Value::Integer(3));
        assert_eq!(rows[0][1].to_string(), "2024-05-10T10:15:00+00:00");
        assert_eq!(rows[0][2], Value::from("3"));
        assert_eq!(rows[0][3], Value::Integer(2));
    }

    #[test]
    fn test_empty_match_still_counts() {
        let request = QueryRequest::new("alert", vec![Selection::count_all()]).with_criteria(
            Criterion::eq(path("alert.classification.text"), "nothing"),
        );
        assert_eq!(provider().query(&request).unwrap(), vec![vec![Value::Integer(0)]]);
    }

    #[test]
    fn test_timezone_extract_buckets() {
        let request = QueryRequest::new(
            "alert",
            vec![
                Selection::timezone(path("alert.create_time"), "+02:00")
                    .with_extract(Extract::Hour)
                    .order(SortOrder::Asc)
                    .group_by(),
                Selection::count_all(),
            ],
        );
        let rows = provider().query(&request).unwrap();
        assert_eq!(
            rows,
            vec![
                vec![Value::Integer(12), Value::Integer(1)],
                vec![Value::Integer(13), Value::Integer(2)],
            ]
        );
    }

    #[test]
    fn test_named_timezone_extract_follows_summer_time() {
        let request = QueryRequest::new(
            "alert",
            vec![
                Selection::timezone(path("alert.create_time"), "Europe/Paris")
                    .with_extract(Extract::Hour)
                    .order(SortOrder::Asc)
                    .group_by(),
                Selection::count_all(),
            ],
        );
        let rows = provider().query(&request).unwrap();
        assert_eq!(rows[0], vec![Value::Integer(12), Value::Integer(1)]);
        assert_eq!(rows[1], vec![Value::Integer(13), Value::Integer(2)]);
    }

    #[test]
    fn test_limit_and_offset() {
        let request = QueryRequest::new(
            "alert",
            vec![Selection::path(path("alert.messageid")).order(SortOrder::Desc)],
        )
        .with_offset(1)
        .with_limit(1);
        assert_eq!(
            provider().query(&request).unwrap(),
            vec![vec![Value::from("2")]]
        );
    }

    #[test]
    fn test_get_orders_by_time() {
        let provider = provider();
        let records = provider
            .get(&GetRequest::new("alert").with_order(SortOrder::Asc).with_limit(2))
            .unwrap();
        let ids: Vec<String> = records
            .iter()
            .map(|r| r.first(&path("alert.messageid")).to_string())
            .collect();
        assert_eq!(ids, vec!["1", "2"]);

        let filtered = provider
            .get(&GetRequest::new("alert").with_criteria(Criterion::compare(
                path("alert.assessment.impact.severity"),
                Operator::Eq,
                "low",
            )))
            .unwrap();
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn test_denied_and_unknown_datatypes() {
        let provider = provider().deny("alert");
        let err = provider
            .query(&QueryRequest::new("alert", vec![Selection::count_all()]))
            .unwrap_err();
        assert!(matches!(err, ProviderError::PermissionDenied(_)));

        let err = provider.get(&GetRequest::new("netflow")).unwrap_err();
        assert!(matches!(err, ProviderError::NoBackend(_)));
    }

    #[test]
    fn test_raw_query_is_evaluated_as_lucene() {
        let provider = provider().with_query_mode("alert", QueryMode::Lucene);
        let request = QueryRequest::new("alert", vec![Selection::count_all()])
            .with_criteria(Criterion::raw_query("alert", "classification.text:ssh"));
        assert_eq!(provider.query(&request).unwrap(), vec![vec![Value::Integer(2)]]);
    }

    #[test]
    fn test_path_info() {
        let provider = provider();
        let info = provider
            .path_info("alert", &path("alert.source(0).service.port"))
            .unwrap();
        assert!(info.supports(Operator::Lt));
        assert!(matches!(
            provider.path_info("alert", &path("alert.bogus")),
            Err(ProviderError::InvalidPath(_))
        ));
        assert_eq!(provider.time_field("alert").unwrap(), path("alert.create_time"));
        assert!(!provider.is_continuous("alert"));
        assert_eq!(provider.default_paths("alert").len(), 4);
    }
}
