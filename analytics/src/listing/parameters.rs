//! Request parameters of the alert listing.

use crate::config::AnalyticsConfig;
use crate::context::RequestParameters;
use crate::criteria::{Criterion, Operator, Path};
use crate::error::AnalyticsError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Severity checkbox values.
pub const SEVERITIES: [&str; 5] = ["info", "low", "medium", "high", "n/a"];

/// Completion checkbox values.
pub const COMPLETIONS: [&str; 3] = ["succeeded", "failed", "n/a"];

/// Alert type checkbox values; the first one stands for plain alerts.
pub const ALERT_TYPES: [&str; 4] = [
    "alert.create_time",
    "alert.correlation_alert.name",
    "alert.overflow_alert.program",
    "alert.tool_alert.name",
];

pub(crate) const SEVERITY_PARAM: &str = "alert.assessment.impact.severity";
pub(crate) const COMPLETION_PARAM: &str = "alert.assessment.impact.completion";
pub(crate) const ALERT_TYPE_PARAM: &str = "alert.type";

const DEFAULT_SOURCE: &str = "alert.source(0).node.address(0).address";
const DEFAULT_TARGET: &str = "alert.target(0).node.address(0).address";

/// A filterable column of the listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Column {
    /// Classification, references and completion.
    Classification,
    /// Attack sources.
    Source,
    /// Attack targets.
    Target,
    /// Reporting sensors.
    Analyzer,
}

impl Column {
    /// Every column, in display order.
    pub const ALL: [Self; 4] = [Self::Classification, Self::Source, Self::Target, Self::Analyzer];

    /// The column name used in parameter names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Classification => "classification",
            Self::Source => "source",
            Self::Target => "target",
            Self::Analyzer => "analyzer",
        }
    }

    /// The column a path belongs to, if any.
    #[must_use]
    pub fn of_path(path: &Path) -> Option<Self> {
        match path.segments().get(1).map(|s| s.name.as_str()) {
            Some("source") => Some(Self::Source),
            Some("target") => Some(Self::Target),
            Some("analyzer") => Some(Self::Analyzer),
            Some("classification" | "assessment") => Some(Self::Classification),
            _ => None,
        }
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordering of the listing rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingOrder {
    /// Newest first.
    #[default]
    TimeDesc,
    /// Oldest first.
    TimeAsc,
    /// Largest groups first.
    CountDesc,
    /// Smallest groups first.
    CountAsc,
}

impl ListingOrder {
    /// Parameter value of the order.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TimeDesc => "time_desc",
            Self::TimeAsc => "time_asc",
            Self::CountDesc => "count_desc",
            Self::CountAsc => "count_asc",
        }
    }
}

impl FromStr for ListingOrder {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "time_desc" => Ok(Self::TimeDesc),
            "time_asc" => Ok(Self::TimeAsc),
            "count_desc" => Ok(Self::CountDesc),
            "count_asc" => Ok(Self::CountAsc),
            other => Err(AnalyticsError::invalid_value("orderby", other)),
        }
    }
}

/// Timezone alert times are displayed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimezoneMode {
    /// The viewer's timezone.
    #[default]
    FrontendLocaltime,
    /// The offset the sensor reported.
    SensorLocaltime,
    /// UTC.
    Utc,
}

impl FromStr for TimezoneMode {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "frontend_localtime" => Ok(Self::FrontendLocaltime),
            "sensor_localtime" => Ok(Self::SensorLocaltime),
            "utc" => Ok(Self::Utc),
            other => Err(AnalyticsError::invalid_value("timezone", other)),
        }
    }
}

/// Operator of a column filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FilterOperator {
    /// `=`
    Equal,
    /// `<`
    Lower,
    /// `>`
    Greater,
    /// `<=`
    LowerEqual,
    /// `>=`
    GreaterEqual,
    /// `~`
    Regex,
    /// `~*`
    RegexNoCase,
    /// `<>`
    Substr,
    /// `<>*`
    SubstrNoCase,
    /// `!`: the field is absent.
    Absent,
}

impl FilterOperator {
    /// Parameter spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::Lower => "<",
            Self::Greater => ">",
            Self::LowerEqual => "<=",
            Self::GreaterEqual => ">=",
            Self::Regex => "~",
            Self::RegexNoCase => "~*",
            Self::Substr => "<>",
            Self::SubstrNoCase => "<>*",
            Self::Absent => "!",
        }
    }

    /// The criterion operator, `None` for [`FilterOperator::Absent`].
    #[must_use]
    pub const fn operator(self) -> Option<Operator> {
        match self {
            Self::Equal => Some(Operator::Eq),
            Self::Lower => Some(Operator::Lt),
            Self::Greater => Some(Operator::Gt),
            Self::LowerEqual => Some(Operator::LtEq),
            Self::GreaterEqual => Some(Operator::GtEq),
            Self::Regex => Some(Operator::Regex),
            Self::RegexNoCase => Some(Operator::RegexNoCase),
            Self::Substr => Some(Operator::Substr),
            Self::SubstrNoCase => Some(Operator::SubstrNoCase),
            Self::Absent => None,
        }
    }
}

impl FromStr for FilterOperator {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "=" => Self::Equal,
            "<" => Self::Lower,
            ">" => Self::Greater,
            "<=" => Self::LowerEqual,
            ">=" => Self::GreaterEqual,
            "~" => Self::Regex,
            "~*" => Self::RegexNoCase,
            "<>" => Self::Substr,
            "<>*" => Self::SubstrNoCase,
            "!" => Self::Absent,
            other => return Err(AnalyticsError::invalid_value("operator", other)),
        })
    }
}

/// What a column filter applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterField {
    /// `__all__`: every searchable field of the column.
    Any,
    /// One field.
    Path(Path),
}

impl std::fmt::Display for FilterField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => f.write_str("__all__"),
            Self::Path(path) => write!(f, "{path}"),
        }
    }
}

/// One `{column}_object_N` / `_operator_N` / `_value_N` triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnFilter {
    /// The `N` of the parameter names.
    pub index: usize,
    /// Filtered field.
    pub field: FilterField,
    /// Comparison.
    pub operator: FilterOperator,
    /// Compared value, empty for [`FilterOperator::Absent`].
    pub value: String,
}

impl ColumnFilter {
    /// True when this filter tests `path` with `operator` against `value`.
    #[must_use]
    pub fn is(&self, path: &Path, operator: FilterOperator, value: &str) -> bool {
        matches!(&self.field, FilterField::Path(p) if p.without_indexes() == path.without_indexes())
            && self.operator == operator
            && self.value == value
    }
}

/// Normalized and validated listing request.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingParameters {
    /// First row shown.
    pub offset: usize,
    /// Rows per page.
    pub limit: usize,
    /// Row ordering.
    pub orderby: ListingOrder,
    /// Time display.
    pub timezone: TimezoneMode,
    /// Checked severities.
    pub severities: Vec<String>,
    /// Checked completions.
    pub completions: Vec<String>,
    /// Checked alert types.
    pub alert_types: Vec<String>,
    /// Restricts the listing to the alerts referenced by this correlation
    /// or tool alert.
    pub aggregated_alert_id: Option<String>,
    /// The next free filter index.
    pub max_index: usize,
    aggregated: BTreeMap<Column, Vec<Path>>,
    filters: BTreeMap<Column, Vec<ColumnFilter>>,
}

impl ListingParameters {
    /// Reads and validates the listing parameters.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::InvalidParameterValue`] naming the first
    /// malformed parameter.
    pub fn from_request(
        params: &RequestParameters,
        config: &AnalyticsConfig,
    ) -> Result<Self, AnalyticsError> {
        let offset = parse_number(params, "offset")?.unwrap_or(0);
        let limit = params
            .get("limit")
            .map(|raw| {
                raw.trim()
                    .parse::<i64>()
                    .map_err(|_| AnalyticsError::invalid_value("limit", raw))
            })
            .transpose()?
            .and_then(|limit| usize::try_from(limit).ok())
            .filter(|limit| *limit > 0)
            .unwrap_or(config.listing_limit);

        let orderby: ListingOrder = params
            .get("orderby")
            .map(str::parse)
            .transpose()?
            .unwrap_or_default();
        let timezone: TimezoneMode = params
            .get("timezone")
            .map(str::parse)
            .transpose()?
            .unwrap_or_default();

        let mut aggregated = BTreeMap::new();
        for column in Column::ALL {
            aggregated.insert(column, aggregated_paths(params, column)?);
        }

        let mut out = Self {
            offset: usize::try_from(offset).map_err(|_| {
                AnalyticsError::invalid_value("offset", offset.to_string())
            })?,
            limit,
            orderby,
            timezone,
            severities: checked(params, SEVERITY_PARAM, &SEVERITIES)?,
            completions: checked(params, COMPLETION_PARAM, &COMPLETIONS)?,
            alert_types: checked(params, ALERT_TYPE_PARAM, &ALERT_TYPES)?,
            aggregated_alert_id: params.get("aggregated_alert_id").map(str::to_string),
            max_index: 0,
            aggregated,
            filters: BTreeMap::new(),
        };

        for column in Column::ALL {
            let filters = out.column_filters(params, column)?;
            out.filters.insert(column, filters);
        }

        tracing::debug!(
            offset = out.offset,
            limit = out.limit,
            orderby = out.orderby.as_str(),
            max_index = out.max_index,
            "Normalized listing parameters"
        );
        Ok(out)
    }

    fn column_filters(
        &mut self,
        params: &RequestParameters,
        column: Column,
    ) -> Result<Vec<ColumnFilter>, AnalyticsError> {
        let prefix = format!("{column}_object_");
        let mut out: Vec<ColumnFilter> = Vec::new();

        for (name, object) in params.iter() {
            let Some(num) = name.strip_prefix(prefix.as_str()) else {
                continue;
            };
            let index: usize = num
                .parse()
                .map_err(|_| AnalyticsError::invalid_value(name, num))?;
            self.max_index = self.max_index.max(index + 1);

            let operator: FilterOperator = params
                .get(&format!("{column}_operator_{index}"))
                .unwrap_or("=")
                .parse()?;
            let value = match params.get(&format!("{column}_value_{index}")) {
                Some(value) => value.to_string(),
                None if operator == FilterOperator::Absent => String::new(),
                None => continue,
            };
            let field = if object == "__all__" {
                FilterField::Any
            } else {
                FilterField::Path(
                    Path::parse(object).map_err(|_| AnalyticsError::invalid_value(name, object))?,
                )
            };

            let duplicate = out
                .iter()
                .any(|f| f.field == field && f.operator == operator && f.value == value);
            if !duplicate {
                out.push(ColumnFilter {
                    index,
                    field,
                    operator,
                    value,
                });
            }
        }

        out.sort_by_key(|f| f.index);
        Ok(out)
    }

    /// Active aggregation paths of `column`.
    #[must_use]
    pub fn aggregated(&self, column: Column) -> &[Path] {
        self.aggregated.get(&column).map_or(&[], Vec::as_slice)
    }

    /// Filters of `column`, ordered by index.
    #[must_use]
    pub fn filters(&self, column: Column) -> &[ColumnFilter] {
        self.filters.get(&column).map_or(&[], Vec::as_slice)
    }

    /// True when any column is aggregated.
    #[must_use]
    pub fn is_aggregated(&self) -> bool {
        self.aggregated.values().any(|paths| !paths.is_empty())
    }

    /// Appends a filter, as done when a listing is restricted to one
    /// sensor.
    pub fn push_filter(&mut self, column: Column, path: Path, value: &str) {
        let filter = ColumnFilter {
            index: self.max_index,
            field: FilterField::Path(path),
            operator: FilterOperator::Equal,
            value: value.to_string(),
        };
        self.max_index += 1;
        self.filters.entry(column).or_default().insert(0, filter);
    }
}

fn parse_number(params: &RequestParameters, name: &str) -> Result<Option<i64>, AnalyticsError> {
    params
        .get(name)
        .map(|raw| {
            raw.trim()
                .parse::<i64>()
                .map_err(|_| AnalyticsError::invalid_value(name, raw))
        })
        .transpose()
}

fn aggregated_paths(params: &RequestParameters, column: Column) -> Result<Vec<Path>, AnalyticsError> {
    let name = format!("aggregated_{column}");
    let raw = params.get_all(&name);
    if raw.is_empty() {
        return Ok(match column {
            Column::Source => vec![Path::new(DEFAULT_SOURCE)],
            Column::Target => vec![Path::new(DEFAULT_TARGET)],
            Column::Classification | Column::Analyzer => Vec::new(),
        });
    }

    let mut out: Vec<Path> = Vec::new();
    for value in raw {
        let value = value.strip_prefix('!').unwrap_or(value);
        if value == "none" || value.is_empty() {
            continue;
        }
        let path = Path::parse(value).map_err(|_| AnalyticsError::invalid_value(&name, value))?;
        if !out.contains(&path) {
            out.push(path);
        }
    }
    Ok(out)
}

fn checked(
    params: &RequestParameters,
    name: &str,
    allowed: &[&str],
) -> Result<Vec<String>, AnalyticsError> {
    let values = params.get_all(name);
    if values.is_empty() {
        return Ok(allowed.iter().map(|v| (*v).to_string()).collect());
    }

    values
        .into_iter()
        .map(|value| {
            if allowed.contains(&value) {
                Ok(value.to_string())
            } else {
                Err(AnalyticsError::invalid_value(name, value))
            }
        })
        .collect()
}

/// Criterion of a checkbox list: nothing when every value is checked,
/// else the OR of the checked values, `n/a` standing for an absent field.
pub(crate) fn checkbox_criteria(path: &str, checked: &[String], all: &[&str]) -> Criterion {
    let same = checked.len() == all.len() && all.iter().all(|v| checked.iter().any(|c| c == v));
    if same {
        return Criterion::Empty;
    }

    Criterion::or_all(all.iter().filter(|v| checked.iter().any(|c| c == *v)).map(|value| {
        if *value == "n/a" {
            Criterion::is_null(Path::new(path))
        } else {
            Criterion::eq(Path::new(path), *value)
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(pairs: &[(&str, &str)]) -> Result<ListingParameters, AnalyticsError> {
        let params: RequestParameters = pairs.iter().copied().collect();
        ListingParameters::from_request(&params, &AnalyticsConfig::default())
    }

    #[test]
    fn test_defaults() {
        let p = parse(&[]).unwrap();
        assert_eq!(p.offset, 0);
        assert_eq!(p.limit, 50);
        assert_eq!(p.orderby, ListingOrder::TimeDesc);
        assert_eq!(p.timezone, TimezoneMode::FrontendLocaltime);
        assert_eq!(p.aggregated(Column::Source), &[Path::new(DEFAULT_SOURCE)]);
        assert!(p.aggregated(Column::Classification).is_empty());
        assert_eq!(p.severities.len(), 5);
        assert!(p.is_aggregated());
    }

    #[test]
    fn test_non_positive_limit_is_ignored() {
        assert_eq!(parse(&[("limit", "0")]).unwrap().limit, 50);
        assert_eq!(parse(&[("limit", "-3")]).unwrap().limit, 50);
        assert_eq!(parse(&[("limit", "20")]).unwrap().limit, 20);
        assert!(parse(&[("limit", "many")]).is_err());
    }

    #[test]
    fn test_aggregated_lists_are_normalized() {
        let p = parse(&[
            ("aggregated_source", "none"),
            ("aggregated_target", "!alert.target.node.name"),
            ("aggregated_target", "alert.target.node.name"),
            ("aggregated_classification", "alert.classification.text"),
        ])
        .unwrap();
        assert!(p.aggregated(Column::Source).is_empty());
        assert_eq!(p.aggregated(Column::Target), &[Path::new("alert.target.node.name")]);
        assert_eq!(
            p.aggregated(Column::Classification),
            &[Path::new("alert.classification.text")]
        );
    }

    #[test]
    fn test_checkbox_values_are_validated() {
        let p = parse(&[(SEVERITY_PARAM, "high"), (SEVERITY_PARAM, "n/a")]).unwrap();
        assert_eq!(p.severities, vec!["high", "n/a"]);

        let err = parse(&[(SEVERITY_PARAM, "critical")]).unwrap_err();
        assert!(err.to_string().contains("critical"));
        assert!(parse(&[(ALERT_TYPE_PARAM, "alert.bogus")]).is_err());
    }

    #[test]
    fn test_column_filters() {
        let p = parse(&[
            ("source_object_3", "alert.source.node.address.address"),
            ("source_operator_3", "<>*"),
            ("source_value_3", "10.0"),
            ("source_object_1", "__all__"),
            ("source_value_1", "ssh"),
            ("source_object_5", "alert.source.node.address.address"),
            ("source_operator_5", "<>*"),
            ("source_value_5", "10.0"),
            ("target_object_0", "alert.target.node.name"),
            ("target_operator_0", "!"),
            ("analyzer_object_2", "alert.analyzer.name"),
        ])
        .unwrap();

        let source = p.filters(Column::Source);
        assert_eq!(source.len(), 2);
        assert_eq!(source[0].field, FilterField::Any);
        assert_eq!(source[0].operator, FilterOperator::Equal);
        assert_eq!(source[1].operator, FilterOperator::SubstrNoCase);

        let target = p.filters(Column::Target);
        assert_eq!(target[0].operator, FilterOperator::Absent);
        assert_eq!(target[0].value, "");

        assert!(p.filters(Column::Analyzer).is_empty());
        assert_eq!(p.max_index, 6);
    }

    #[test]
    fn test_unknown_filter_operator_is_rejected() {
        let err = parse(&[
            ("source_object_0", "alert.source.node.name"),
            ("source_operator_0", "=="),
            ("source_value_0", "x"),
        ])
        .unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidParameterValue { ref name, .. } if name == "operator"));
    }

    #[test]
    fn test_checkbox_criteria() {
        let all = ["info", "low", "n/a"];
        let everything: Vec<String> = all.iter().map(|v| (*v).to_string()).collect();
        assert!(checkbox_criteria("alert.x", &everything, &all).is_empty());

        let some = vec!["n/a".to_string(), "low".to_string()];
        assert_eq!(
            checkbox_criteria("alert.x", &some, &all).to_string(),
            "(alert.x == 'low' || !alert.x)"
        );
    }
}
