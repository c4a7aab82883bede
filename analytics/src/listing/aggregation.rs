//! Aggregated listing rows.
//!
//! The listing groups alerts on the aggregated paths of every column. Each
//! group becomes one row breaking its alerts down by classification,
//! severity and completion.

use super::alert::{alert_row, ClassificationInfo, ListedAlert};
use super::fields::{DirectionDataset, DirectionSummary, FieldBuilder, Sensor};
use super::parameters::{Column, ListingOrder, COMPLETION_PARAM, SEVERITY_PARAM};
use crate::criteria::{Aggregate, Criterion, Operator, Path, Selection, SortOrder};
use crate::error::AnalyticsError;
use crate::provider::{GetRequest, QueryRequest, Row, ValueType};
use crate::value::Value;
use std::collections::HashSet;

const CLASSIFICATION: &str = "alert.classification.text";
const ANALYZER_NODE: &str = "alert.analyzer(-1).node.name";
const ANALYZER_NAME: &str = "alert.analyzer(-1).name";
const ANALYZER_MODEL: &str = "alert.analyzer(-1).model";

/// Fields every row breaks its alerts down on, unless grouped already.
const BREAKDOWN: [&str; 6] = [
    CLASSIFICATION,
    ANALYZER_NODE,
    ANALYZER_NAME,
    ANALYZER_MODEL,
    SEVERITY_PARAM,
    COMPLETION_PARAM,
];

/// Column order of the grouped query.
const COLUMNS: [Column; 4] = [Column::Source, Column::Target, Column::Classification, Column::Analyzer];

/// Groups the alerts matching `criteria` on the aggregated paths.
///
/// Returns the rows of the page and the number of groups.
pub(crate) fn aggregated_rows(
    fields: &mut FieldBuilder<'_>,
    criteria: &Criterion,
) -> Result<(Vec<ListedAlert>, usize), AnalyticsError> {
    let params = fields.params();
    let grouped: Vec<(Column, Path)> = COLUMNS
        .into_iter()
        .flat_map(|column| params.aggregated(column).iter().map(move |p| (column, p.clone())))
        .collect();

    let create_time = Path::new("alert.create_time");
    let count = Selection::aggregate(Aggregate::Count, create_time.clone());
    let max = Selection::aggregate(Aggregate::Max, create_time.clone());
    let (count, max) = match params.orderby {
        ListingOrder::TimeAsc => (count, max.order(SortOrder::Asc)),
        ListingOrder::TimeDesc => (count, max.order(SortOrder::Desc)),
        ListingOrder::CountDesc => (count.order(SortOrder::Desc), max),
        ListingOrder::CountAsc => (count.order(SortOrder::Asc), max),
    };
    let mut selection: Vec<Selection> = grouped
        .iter()
        .map(|(_, path)| Selection::path(path.clone()).group_by())
        .collect();
    selection.extend([count, max, Selection::aggregate(Aggregate::Min, create_time)]);

    let ctx = fields.ctx();
    let groups = ctx
        .provider()
        .query(&QueryRequest::new("alert", selection).with_criteria(criteria.clone()))?;
    let total = groups.len();
    tracing::debug!(groups = total, paths = grouped.len(), "Aggregated alerts");

    let mut rows = Vec::new();
    for group in groups.iter().skip(params.offset).take(params.limit) {
        rows.push(group_row(fields, criteria, &grouped, group)?);
    }
    Ok((rows, total))
}

fn group_row(
    fields: &mut FieldBuilder<'_>,
    criteria: &Criterion,
    grouped: &[(Column, Path)],
    group: &Row,
) -> Result<ListedAlert, AnalyticsError> {
    let ctx = fields.ctx();
    let n = grouped.len();
    let count = group
        .get(n)
        .and_then(Value::as_i64)
        .and_then(|c| usize::try_from(c).ok())
        .unwrap_or_default();
    let time_max = group.get(n + 1).cloned().unwrap_or_default();
    let time_min = group.get(n + 2).cloned().unwrap_or_default();

    let mut row = ListedAlert::empty(true);
    row.count = count;
    let mut select = Vec::new();
    let mut source = DirectionDataset::default();
    let mut target = DirectionDataset::default();

    for ((column, path), value) in grouped.iter().zip(group) {
        let criterion = if value.is_null() {
            let info = ctx.provider().path_info("alert", path)?;
            if info.value_type == ValueType::String {
                Criterion::is_null(path.clone()) | Criterion::eq(path.clone(), "")
            } else {
                Criterion::is_null(path.clone())
            }
        } else {
            Criterion::eq(path.clone(), value.clone())
        };
        select.push(criterion);

        match column {
            Column::Source => fields.aggregated_value(&mut source, *column, path, value.clone()),
            Column::Target => fields.aggregated_value(&mut target, *column, path, value.clone()),
            Column::Classification | Column::Analyzer => {}
        }
    }
    for (summary, dataset, column) in [(&mut row.source, source, Column::Source), (&mut row.target, target, Column::Target)] {
        if !fields.params().aggregated(column).is_empty() {
            *summary = DirectionSummary {
                datasets: vec![dataset],
                total: 1,
                hidden: 0,
                expand: None,
            };
        }
    }

    let group_criteria = Criterion::and_all(select.iter().cloned());
    let aggregation = aggregation_parameters(fields, grouped, group);

    let mut removed = vec!["aggregated_source", "aggregated_target", "aggregated_analyzer"];
    let mut extra = aggregation.clone();
    extra.push(("aggregated_classification".to_string(), CLASSIFICATION.to_string()));
    row.aggregated_classifications_total = count;
    row.aggregated_classifications_hidden = count;
    row.aggregated_classifications_hidden_expand = Some(fields.link(&removed, &extra));
    removed.push("aggregated_classification");

    let grouped_paths: Vec<String> = grouped.iter().map(|(_, p)| p.to_string()).collect();
    let known: Vec<(&str, Value)> = grouped_paths
        .iter()
        .map(String::as_str)
        .zip(group.iter().cloned())
        .collect();
    breakdown(fields, &mut row, criteria.clone() & group_criteria, &known, &aggregation, &removed)?;

    row.time = fields.time(&time_max);
    row.time_min = Some(fields.time(&time_min));
    row.time_max = Some(fields.time(&time_max));
    if row.aggregated {
        select.push(Criterion::compare(Path::new("alert.create_time"), Operator::GtEq, time_min));
        select.push(Criterion::compare(Path::new("alert.create_time"), Operator::LtEq, time_max));
        row.selection = Criterion::and_all(select).to_string();
    }
    Ok(row)
}

/// Column filters reproducing the group values, one index per value
/// starting at the next free index of each column.
fn aggregation_parameters(
    fields: &FieldBuilder<'_>,
    grouped: &[(Column, Path)],
    group: &Row,
) -> Vec<(String, String)> {
    let start = fields.params().max_index;
    let mut out = Vec::new();
    for column in COLUMNS {
        let values = grouped
            .iter()
            .zip(group)
            .filter(|((c, _), _)| *c == column);
        for (i, ((_, path), value)) in values.enumerate() {
            let index = start + i;
            let operator = if value.is_null() { "!" } else { "=" };
            out.push((format!("{column}_object_{index}"), path.without_indexes().to_string()));
            out.push((format!("{column}_operator_{index}"), operator.to_string()));
            out.push((format!("{column}_value_{index}"), value.to_string()));
        }
    }
    out
}

/// One entry of the breakdown of a group.
struct Entry {
    classification: Value,
    severity: Value,
    completion: Value,
    count: usize,
    messageid: Value,
}

fn severity_rank(severity: &Value) -> u8 {
    match severity.as_str() {
        Some("high") => 4,
        Some("medium") => 3,
        Some("low") => 2,
        Some("info") => 1,
        _ => 0,
    }
}

/// Breaks the alerts of a group down by classification, severity and
/// completion, and collects the sensors that reported them.
fn breakdown(
    fields: &mut FieldBuilder<'_>,
    row: &mut ListedAlert,
    criteria: Criterion,
    known: &[(&str, Value)],
    aggregation: &[(String, String)],
    removed: &[&str],
) -> Result<(), AnalyticsError> {
    let ctx = fields.ctx();
    let missing: Vec<&str> = BREAKDOWN
        .into_iter()
        .filter(|path| !known.iter().any(|(k, _)| k == path))
        .collect();

    let mut selection: Vec<Selection> = missing
        .iter()
        .map(|path| Selection::path(Path::new(path)).group_by())
        .collect();
    let messageid = Path::new("alert.messageid");
    selection.push(Selection::aggregate(Aggregate::Max, messageid.clone()));
    selection.push(Selection::aggregate(Aggregate::Count, messageid));

    let rows = ctx
        .provider()
        .query(&QueryRequest::new("alert", selection).with_criteria(criteria))?;

    let mut entries: Vec<Entry> = Vec::new();
    let mut sensors = HashSet::new();
    for values in &rows {
        let value_of = |path: &str| {
            known
                .iter()
                .find(|(k, _)| *k == path)
                .map(|(_, v)| v.clone())
                .or_else(|| missing.iter().position(|m| *m == path).and_then(|i| values.get(i).cloned()))
                .unwrap_or_default()
        };
        let n = missing.len();
        let max_messageid = values.get(n).cloned().unwrap_or_default();
        let count = values
            .get(n + 1)
            .and_then(Value::as_i64)
            .and_then(|c| usize::try_from(c).ok())
            .unwrap_or_default();

        let (classification, severity, completion) =
            (value_of(CLASSIFICATION), value_of(SEVERITY_PARAM), value_of(COMPLETION_PARAM));
        match entries.iter_mut().find(|e| {
            e.classification == classification && e.severity == severity && e.completion == completion
        }) {
            Some(entry) => entry.count += count,
            None => entries.push(Entry {
                classification,
                severity,
                completion,
                count,
                messageid: max_messageid,
            }),
        }

        let name = Some(value_of(ANALYZER_NAME))
            .filter(|v| !v.is_null())
            .unwrap_or_else(|| value_of(ANALYZER_MODEL));
        let node = value_of(ANALYZER_NODE);
        if sensors.insert((name.to_string(), node.to_string())) {
            let name_path = if value_of(ANALYZER_NAME).is_null() && !name.is_null() {
                ANALYZER_MODEL
            } else {
                ANALYZER_NAME
            };
            row.sensors.push(Sensor {
                name: fields.single(Some(Column::Analyzer), name_path, name),
                node_name: fields.single(Some(Column::Analyzer), ANALYZER_NODE, node),
            });
        }
    }

    entries.sort_by(|a, b| severity_rank(&b.severity).cmp(&severity_rank(&a.severity)));

    let cap = ctx.env().config().max_aggregated_classification;
    let group_count = row.count;
    for entry in entries.into_iter().take(cap) {
        row.aggregated_classifications_hidden = row.aggregated_classifications_hidden.saturating_sub(entry.count);

        if entry.count == 1 && group_count == 1 {
            let id = entry.messageid.to_string();
            let record = ctx
                .provider()
                .get(&GetRequest::new("alert").with_criteria(Criterion::eq(Path::new("alert.messageid"), id.as_str())).with_limit(1))?
                .into_iter()
                .next();
            if let Some(record) = record {
                let flat = alert_row(fields, &record);
                *row = ListedAlert {
                    count: 1,
                    aggregated_classifications_total: 1,
                    aggregated_classifications_hidden: 0,
                    aggregated_classifications_hidden_expand: row.aggregated_classifications_hidden_expand.take(),
                    ..flat
                };
                return Ok(());
            }
        }

        let info = entry_info(fields, &entry, aggregation, removed);
        row.infos.push(info);
    }
    Ok(())
}

fn entry_info(
    fields: &mut FieldBuilder<'_>,
    entry: &Entry,
    aggregation: &[(String, String)],
    removed: &[&str],
) -> ClassificationInfo {
    let display = if entry.count == 1 {
        fields.summary_link(&entry.messageid.to_string())
    } else {
        let index = fields.params().max_index;
        let mut extra = aggregation.to_vec();
        if !entry.classification.is_null() {
            extra.push((format!("classification_object_{index}"), CLASSIFICATION.to_string()));
            extra.push((format!("classification_operator_{index}"), "=".to_string()));
            extra.push((format!("classification_value_{index}"), entry.classification.to_string()));
        }
        extra.push((SEVERITY_PARAM.to_string(), entry.severity.to_label()));
        extra.push((COMPLETION_PARAM.to_string(), entry.completion.to_label()));
        for column in COLUMNS {
            extra.push((format!("aggregated_{column}"), "none".to_string()));
        }
        let mut removed = removed.to_vec();
        removed.extend([SEVERITY_PARAM, COMPLETION_PARAM]);
        fields.link(&removed, &extra)
    };

    ClassificationInfo {
        count: entry.count,
        classification: fields.single(Some(Column::Classification), CLASSIFICATION, entry.classification.clone()),
        references: Vec::new(),
        severity: entry.severity.as_str().map(str::to_string),
        completion: fields.single(None, COMPLETION_PARAM, entry.completion.clone()),
        display: Some(display),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::ListingParameters;
    use crate::testing::{alert, context, env, provider};

    fn rows(alerts: Vec<serde_json::Value>, pairs: &[(&str, &str)]) -> (Vec<ListedAlert>, usize) {
        let ctx = context(env(provider(alerts)), pairs);
        let params = ListingParameters::from_request(ctx.parameters(), ctx.env().config()).unwrap();
        let mut fields = FieldBuilder::new(&ctx, &params, "/alerts");
        aggregated_rows(&mut fields, &Criterion::Empty).unwrap()
    }

    #[test]
    fn test_group_breakdown_by_classification() {
        let (rows, total) = rows(
            vec![alert("m1", 10, "ssh", "10.0.0.1"), alert("m2", 20, "scan", "10.0.0.1")],
            &[],
        );
        assert_eq!(total, 1);
        let row = &rows[0];
        assert!(row.aggregated);
        assert_eq!(row.count, 2);
        assert_eq!(row.infos.len(), 2);
        assert!(row.infos.iter().all(|i| i.count == 1));
        assert_eq!(row.aggregated_classifications_hidden, 0);
        assert_eq!(row.source.datasets[0].addresses[0].hostname, "10.0.0.1");
        assert_eq!(row.time_max.as_deref(), Some("2024-05-10 11:50:00"));
        assert_eq!(row.time_min.as_deref(), Some("2024-05-10 11:40:00"));
        assert_eq!(row.sensors.len(), 1);
        assert!(row.selection.contains("alert.create_time >= "));

        let display = row.infos[0].display.as_ref().unwrap();
        assert!(display.get("messageid").is_some());
    }

    #[test]
    fn test_single_alert_group_renders_flat() {
        let (rows, total) = rows(vec![alert("m1", 10, "ssh", "10.0.0.1")], &[]);
        assert_eq!(total, 1);
        let row = &rows[0];
        assert!(!row.aggregated);
        assert_eq!(row.selection, "alert.messageid == 'm1'");
        assert_eq!(row.aggregated_classifications_total, 1);
    }

    #[test]
    fn test_entries_ordered_by_severity() {
        let mut unset = alert("m1", 10, "a", "10.0.0.1");
        unset["assessment"]["impact"] = serde_json::json!({"completion": "failed"});
        let mut low = alert("m2", 20, "b", "10.0.0.1");
        low["assessment"]["impact"]["severity"] = "low".into();
        let high = alert("m3", 30, "c", "10.0.0.1");

        let (rows, _) = rows(vec![unset, low, high], &[]);
        let severities: Vec<Option<&str>> = rows[0].infos.iter().map(|i| i.severity.as_deref()).collect();
        assert_eq!(severities, vec![Some("high"), Some("low"), None]);
    }

    #[test]
    fn test_same_classification_is_merged() {
        let alerts = vec![
            alert("m1", 10, "ssh", "10.0.0.1"),
            alert("m2", 20, "ssh", "10.0.0.1"),
            alert("m3", 30, "ssh", "10.0.0.2"),
        ];
        let (rows, total) = rows(alerts, &[("orderby", "count_desc")]);
        assert_eq!(total, 2);
        assert_eq!(rows[0].count, 2);
        let info = &rows[0].infos[0];
        assert_eq!(info.count, 2);
        let display = info.display.as_ref().unwrap();
        assert_eq!(display.get("classification_value_0"), Some("ssh"));
        assert_eq!(display.get("alert.assessment.impact.severity"), Some("high"));
        assert_eq!(display.get("aggregated_source"), Some("none"));
        assert_eq!(display.get("source_object_0"), Some("alert.source.node.address.address"));
        assert_eq!(display.get("source_value_0"), Some("10.0.0.1"));
    }

    #[test]
    fn test_hidden_entries_beyond_cap() {
        let alerts: Vec<_> = (0..12)
            .map(|i| alert(&format!("m{i}"), i, &format!("class {i}"), "10.0.0.1"))
            .collect();
        let (rows, _) = rows(alerts, &[]);
        let row = &rows[0];
        let listed: usize = row.infos.iter().map(|i| i.count).sum();
        assert_eq!(row.infos.len(), 10);
        assert_eq!(row.aggregated_classifications_hidden, row.aggregated_classifications_total - listed);
        assert_eq!(row.aggregated_classifications_hidden, 2);
        let expand = row.aggregated_classifications_hidden_expand.as_ref().unwrap();
        assert_eq!(expand.get("aggregated_classification"), Some("alert.classification.text"));
    }

    #[test]
    fn test_unset_group_value_matches_empty_string() {
        let mut data = alert("m1", 10, "ssh", "10.0.0.1");
        data["source"] = serde_json::json!([]);
        let mut other = alert("m2", 20, "scan", "10.0.0.1");
        other["source"] = serde_json::json!([]);
        let (rows, _) = rows(vec![data, other], &[]);
        let row = &rows[0];
        assert_eq!(row.count, 2);
        assert!(row.selection.contains("!alert.source(0).node.address(0).address"));
        assert_eq!(row.source.datasets[0].addresses[0].hostname, "n/a");
    }
}
