//! Criteria built from the listing filters.

use super::parameters::{
    checkbox_criteria, Column, FilterField, FilterOperator, ListingParameters, ALERT_TYPES,
    COMPLETIONS, COMPLETION_PARAM, SEVERITIES, SEVERITY_PARAM,
};
use crate::context::RequestContext;
use crate::criteria::{Criterion, Operator, Path};
use crate::error::AnalyticsError;
use crate::provider::{has_wildcard, json_to_value, DataProvider, GetRequest};
use crate::value::Value;
use serde_json::Value as Json;

const CLASSIFICATION_SEARCH: &[&str] = &[
    "alert.classification.text",
    "alert.classification.reference.name",
    "alert.classification.reference.origin",
    "alert.assessment.impact.completion",
];

const SOURCE_SEARCH: &[&str] = &[
    "alert.source.node.address.address",
    "alert.source.user.user_id.name",
    "alert.source.user.user_id.number",
    "alert.source.process.name",
    "alert.source.process.pid",
    "alert.source.service.protocol",
    "alert.source.service.iana_protocol_name",
    "alert.source.service.iana_protocol_number",
    "alert.source.service.port",
];

const TARGET_SEARCH: &[&str] = &[
    "alert.target.node.address.address",
    "alert.target.user.user_id.name",
    "alert.target.user.user_id.number",
    "alert.target.process.name",
    "alert.target.process.pid",
    "alert.target.service.protocol",
    "alert.target.service.iana_protocol_name",
    "alert.target.service.iana_protocol_number",
    "alert.target.service.port",
];

const ANALYZER_SEARCH: &[&str] = &["alert.analyzer.name", "alert.analyzer.node.name"];

/// Fields searched by a `__all__` filter on `column`.
#[must_use]
pub const fn generic_search_fields(column: Column) -> &'static [&'static str] {
    match column {
        Column::Classification => CLASSIFICATION_SEARCH,
        Column::Source => SOURCE_SEARCH,
        Column::Target => TARGET_SEARCH,
        Column::Analyzer => ANALYZER_SEARCH,
    }
}

/// Every restriction of the listing: the request's time window and
/// extension filters, the column filters, the checkbox lists, the
/// free-form `query` and the referenced-alerts restriction.
pub(crate) fn listing_criteria(
    ctx: &RequestContext,
    params: &ListingParameters,
) -> Result<Criterion, AnalyticsError> {
    let provider = ctx.provider();
    let mut criteria = ctx.base_criteria("alert")?;

    criteria = criteria & column_criteria(provider, params, Column::Classification)?;
    criteria = criteria
        & alert_type_criteria(&params.alert_types)
        & checkbox_criteria(SEVERITY_PARAM, &params.severities, &SEVERITIES)
        & checkbox_criteria(COMPLETION_PARAM, &params.completions, &COMPLETIONS);
    for column in [Column::Source, Column::Target, Column::Analyzer] {
        criteria = criteria & column_criteria(provider, params, column)?;
    }

    if let Some(query) = ctx.parameters().get("query") {
        criteria = criteria & ctx.compile_query("alert", query, ctx.query_mode()?)?;
    }

    if let Some(id) = &params.aggregated_alert_id {
        criteria = criteria & linked_alerts_criteria(provider, id)?;
    }

    tracing::debug!(criteria = %criteria, "Built listing criteria");
    Ok(criteria)
}

/// Filters of one column: filters on the same field are ORed, distinct
/// fields are ANDed, and a generic search ORs over every searchable field.
pub(crate) fn column_criteria(
    provider: &dyn DataProvider,
    params: &ListingParameters,
    column: Column,
) -> Result<Criterion, AnalyticsError> {
    let mut generic = Criterion::Empty;
    let mut merged: Vec<(Path, Criterion)> = Vec::new();

    for filter in params.filters(column) {
        match &filter.field {
            FilterField::Any => {
                let paths = generic_search_fields(column)
                    .iter()
                    .map(|p| Path::new(p))
                    .chain(params.aggregated(column).iter().cloned());
                for path in paths {
                    if let Some(operator) = operator_for_path(provider, &path, &filter.value) {
                        generic = generic | filter_criterion(&path, operator, &filter.value);
                    }
                }
            }
            FilterField::Path(path) => {
                provider.path_info("alert", path)?;
                let criterion = filter_criterion(path, filter.operator, &filter.value);
                match merged.iter_mut().find(|(p, _)| p == path) {
                    Some((_, existing)) => *existing = existing.clone() | criterion,
                    None => merged.push((path.clone(), criterion)),
                }
            }
        }
    }

    Ok(generic & Criterion::and_all(merged.into_iter().map(|(_, c)| c)))
}

/// The operator a generic search uses on `path`: case-insensitive
/// substring when supported, equality when the value fits the field, or
/// nothing when the field cannot hold the value.
fn operator_for_path(provider: &dyn DataProvider, path: &Path, value: &str) -> Option<FilterOperator> {
    let info = provider.path_info("alert", path).ok()?;
    if info.supports(Operator::SubstrNoCase) {
        Some(FilterOperator::SubstrNoCase)
    } else if info.value_type.accepts(&Value::from(value)) {
        Some(FilterOperator::Equal)
    } else {
        None
    }
}

pub(crate) fn filter_criterion(path: &Path, operator: FilterOperator, value: &str) -> Criterion {
    match operator.operator() {
        None => Criterion::is_null(path.clone()),
        Some(op) => Criterion::compare(path.clone(), op, adjust_value(operator, value)),
    }
}

/// Substring values are wrapped in `*` unless they hold a wildcard.
fn adjust_value(operator: FilterOperator, value: &str) -> String {
    if !matches!(operator, FilterOperator::Substr | FilterOperator::SubstrNoCase) {
        return value.to_string();
    }

    let value = value.trim();
    if has_wildcard(value) {
        value.to_string()
    } else {
        format!("*{value}*")
    }
}

/// With plain alerts checked, the unchecked special types are excluded;
/// otherwise one of the checked special types is required.
pub(crate) fn alert_type_criteria(checked: &[String]) -> Criterion {
    let is_checked = |t: &str| checked.iter().any(|c| c == t);
    let plain = is_checked(ALERT_TYPES[0]);

    let parts = ALERT_TYPES[1..].iter().copied().filter_map(|t| {
        match (plain, is_checked(t)) {
            (true, false) => Some(Criterion::is_null(Path::new(t))),
            (false, true) => Some(Criterion::is_set(Path::new(t))),
            _ => None,
        }
    });

    if plain {
        Criterion::and_all(parts)
    } else {
        Criterion::or_all(parts)
    }
}

/// The alerts referenced by the correlation or tool alert `id`.
///
/// A reference without analyzer belongs to the referencing alert's
/// analyzer.
fn linked_alerts_criteria(provider: &dyn DataProvider, id: &str) -> Result<Criterion, AnalyticsError> {
    let invalid = || AnalyticsError::invalid_value("aggregated_alert_id", id);
    let records = provider.get(
        &GetRequest::new("alert")
            .with_criteria(Criterion::eq(Path::new("alert.messageid"), id))
            .with_limit(1),
    )?;
    let alert = records.first().ok_or_else(invalid)?;

    let kind = ["correlation_alert", "tool_alert"]
        .into_iter()
        .find(|kind| alert.has(&Path::new(&format!("alert.{kind}"))))
        .ok_or_else(invalid)?;
    let own_analyzer = alert.first(&Path::new("alert.analyzer.analyzerid"));

    let idents: Vec<&Json> = alert
        .nodes(&Path::new(&format!("alert.{kind}.alertident")))
        .into_iter()
        .flat_map(|node| match node {
            Json::Array(items) => items.iter().collect(),
            other => vec![other],
        })
        .collect();

    let criteria = Criterion::or_all(idents.into_iter().filter_map(|ident| {
        let messageid = json_to_value(ident.get("alertident")?);
        let analyzer = ident
            .get("analyzerid")
            .map(json_to_value)
            .filter(|v| !v.is_null())
            .unwrap_or_else(|| own_analyzer.clone());

        let referenced = Criterion::eq(Path::new("alert.messageid"), messageid);
        Some(if analyzer.is_null() {
            referenced
        } else {
            referenced & Criterion::eq(Path::new("alert.analyzer.analyzerid"), analyzer)
        })
    }));

    if criteria.is_empty() {
        return Err(invalid());
    }
    Ok(criteria)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyticsConfig;
    use crate::context::RequestParameters;
    use crate::provider::{InMemoryDataProvider, Schema};
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> ListingParameters {
        let request: RequestParameters = pairs.iter().copied().collect();
        ListingParameters::from_request(&request, &AnalyticsConfig::default()).unwrap()
    }

    fn provider() -> InMemoryDataProvider {
        InMemoryDataProvider::new(Schema::alert())
    }

    #[test]
    fn test_same_field_is_ored_distinct_fields_anded() {
        let p = params(&[
            ("source_object_0", "alert.source.node.address.address"),
            ("source_value_0", "10.0.0.1"),
            ("source_object_1", "alert.source.node.address.address"),
            ("source_value_1", "10.0.0.2"),
            ("source_object_2", "alert.source.service.port"),
            ("source_operator_2", ">"),
            ("source_value_2", "1024"),
        ]);
        let c = column_criteria(&provider(), &p, Column::Source).unwrap();
        assert_eq!(
            c.to_string(),
            "((alert.source.node.address.address == '10.0.0.1' || \
             alert.source.node.address.address == '10.0.0.2') && alert.source.service.port > '1024')"
        );
    }

    #[test]
    fn test_substring_values_are_wrapped() {
        assert_eq!(adjust_value(FilterOperator::SubstrNoCase, " ssh "), "*ssh*");
        assert_eq!(adjust_value(FilterOperator::Substr, "ss*h"), "ss*h");
        assert_eq!(adjust_value(FilterOperator::Substr, "ss\\*h"), "*ss\\*h*");
        assert_eq!(adjust_value(FilterOperator::Equal, " ssh "), " ssh ");
    }

    #[test]
    fn test_generic_search_skips_incompatible_paths() {
        let p = params(&[("analyzer_object_0", "__all__"), ("analyzer_value_0", "snort")]);
        let c = column_criteria(&provider(), &p, Column::Analyzer).unwrap();
        assert_eq!(
            c.to_string(),
            "(alert.analyzer.name <>* '*snort*' || alert.analyzer.node.name <>* '*snort*')"
        );

        let p = params(&[
            ("aggregated_source", "none"),
            ("source_object_0", "__all__"),
            ("source_value_0", "abc"),
        ]);
        let c = column_criteria(&provider(), &p, Column::Source).unwrap();
        let paths: Vec<String> = c.paths().iter().map(ToString::to_string).collect();
        assert!(paths.contains(&"alert.source.process.name".to_string()));
        assert!(!paths.contains(&"alert.source.service.port".to_string()));
    }

    #[test]
    fn test_unknown_filter_path_fails() {
        let p = params(&[("source_object_0", "alert.source.bogus"), ("source_value_0", "x")]);
        assert!(column_criteria(&provider(), &p, Column::Source).is_err());
    }

    #[test]
    fn test_alert_type_criteria() {
        let all: Vec<String> = ALERT_TYPES.iter().map(|t| (*t).to_string()).collect();
        assert!(alert_type_criteria(&all).is_empty());

        let plain = vec!["alert.create_time".to_string(), "alert.tool_alert.name".to_string()];
        assert_eq!(
            alert_type_criteria(&plain).to_string(),
            "(!alert.correlation_alert.name && !alert.overflow_alert.program)"
        );

        let special = vec!["alert.correlation_alert.name".to_string()];
        assert_eq!(alert_type_criteria(&special).to_string(), "alert.correlation_alert.name");
    }

    #[test]
    fn test_linked_alerts() {
        let provider = provider();
        provider
            .insert(
                "alert",
                json!({
                    "messageid": "c1",
                    "analyzer": [{"analyzerid": "a9"}],
                    "correlation_alert": {
                        "name": "scan",
                        "alertident": [
                            {"alertident": "1", "analyzerid": "a1"},
                            {"alertident": "2"}
                        ]
                    }
                }),
            )
            .unwrap();

        let c = linked_alerts_criteria(&provider, "c1").unwrap();
        assert_eq!(
            c.to_string(),
            "((alert.messageid == '1' && alert.analyzer.analyzerid == 'a1') || \
             (alert.messageid == '2' && alert.analyzer.analyzerid == 'a9'))"
        );
        assert!(linked_alerts_criteria(&provider, "missing").is_err());
    }
}
