//! Listed alert rows.

use super::fields::{DirectionDataset, DirectionSummary, DirectionValues, FieldBuilder, InlineField, Reference, Sensor};
use super::parameters::{Column, ListingOrder, COMPLETION_PARAM};
use crate::criteria::{Criterion, Path, Selection, SortOrder};
use crate::error::AnalyticsError;
use crate::provider::{GetRequest, QueryRequest, Record};
use crate::url::Link;
use crate::value::Value;
use serde::Serialize;
use serde_json::Value as Json;

/// Parameters a sub-alert listing drops before narrowing on the alerts it
/// references.
const SUB_ALERT_RESET: &[&str] = &[
    "timeline_mode",
    "timeline_value",
    "timeline_unit",
    "timeline_start",
    "timeline_end",
    "aggregated_source",
    "aggregated_target",
    "aggregated_classification",
    "aggregated_analyzer",
    "aggregated_alert_id",
];

/// Classification cell of a row; aggregated rows carry one per distinct
/// classification, severity and completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationInfo {
    /// Alerts behind this entry.
    pub count: usize,
    /// Classification text and filter link.
    pub classification: InlineField,
    /// Classification references.
    pub references: Vec<Reference>,
    /// Severity, `None` when unset.
    pub severity: Option<String>,
    /// Completion and filter link.
    pub completion: InlineField,
    /// Where to see the alerts: their summary when single, a narrowed
    /// listing otherwise.
    pub display: Option<Link>,
}

/// The correlation or tool alert a row stands for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubAlert {
    /// `correlation_alert` or `tool_alert`.
    pub kind: String,
    /// Correlation rule or tool name.
    pub name: Option<String>,
    /// Referenced alerts.
    pub count: usize,
    /// Summary of the correlation or tool alert.
    pub link: Link,
    /// Listing of the referenced alerts.
    pub display: Link,
}

/// One row of the alert listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListedAlert {
    /// True for a row grouping several alerts.
    pub aggregated: bool,
    /// Criteria selecting the alerts of the row.
    pub selection: String,
    /// Row count: 1 for a single alert.
    pub count: usize,
    /// Creation time; the newest one for aggregated rows.
    pub time: String,
    /// Analyzer time, when more than a minute away from the creation time.
    pub analyzer_time: Option<String>,
    /// Oldest creation time of an aggregated row.
    pub time_min: Option<String>,
    /// Newest creation time of an aggregated row.
    pub time_max: Option<String>,
    /// Reporting sensors.
    pub sensors: Vec<Sensor>,
    /// Classification entries.
    pub infos: Vec<ClassificationInfo>,
    /// Sources.
    pub source: DirectionSummary,
    /// Targets.
    pub target: DirectionSummary,
    /// Correlation or tool alert details.
    pub sub_alert: Option<SubAlert>,
    /// Alerts in an aggregated row.
    pub aggregated_classifications_total: usize,
    /// Alerts of an aggregated row not covered by a listed entry.
    pub aggregated_classifications_hidden: usize,
    /// Where to see the hidden entries.
    pub aggregated_classifications_hidden_expand: Option<Link>,
    /// Cells of the extension columns, in registration order.
    pub extra_columns: Vec<Value>,
}

impl ListedAlert {
    pub(crate) fn empty(aggregated: bool) -> Self {
        Self {
            aggregated,
            selection: String::new(),
            count: 1,
            time: "n/a".to_string(),
            analyzer_time: None,
            time_min: None,
            time_max: None,
            sensors: Vec::new(),
            infos: Vec::new(),
            source: DirectionSummary::default(),
            target: DirectionSummary::default(),
            sub_alert: None,
            aggregated_classifications_total: 0,
            aggregated_classifications_hidden: 0,
            aggregated_classifications_hidden_expand: None,
            extra_columns: Vec::new(),
        }
    }
}

// ============================================================================
// Flat rows
// ============================================================================

/// Lists every alert matching `criteria`, one row per alert.
///
/// Count orders do not apply to single alerts and fall back to oldest
/// first. Only the records of the page are fetched; the number of matches
/// comes from a separate count. Returns the rows of the page and that
/// number.
pub(crate) fn flat_rows(
    fields: &mut FieldBuilder<'_>,
    criteria: Criterion,
) -> Result<(Vec<ListedAlert>, usize), AnalyticsError> {
    let params = fields.params();
    let (offset, limit) = (params.offset, params.limit);
    let order = match params.orderby {
        ListingOrder::TimeDesc => SortOrder::Desc,
        ListingOrder::TimeAsc | ListingOrder::CountAsc | ListingOrder::CountDesc => SortOrder::Asc,
    };

    let provider = fields.ctx().provider();
    let count = provider.query(
        &QueryRequest::new("alert", vec![Selection::count_all()]).with_criteria(criteria.clone()),
    )?;
    let total = count
        .first()
        .and_then(|row| row.first())
        .and_then(Value::as_i64)
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0);
    if total <= offset {
        return Ok((Vec::new(), total));
    }

    let records = provider.get(
        &GetRequest::new("alert")
            .with_criteria(criteria)
            .with_order(order)
            .with_offset(offset)
            .with_limit(limit),
    )?;

    let rows = records.iter().map(|record| alert_row(fields, record)).collect();
    Ok((rows, total))
}

/// Renders one alert.
pub(crate) fn alert_row(fields: &mut FieldBuilder<'_>, record: &Record) -> ListedAlert {
    let messageid = record.first(&Path::new("alert.messageid")).to_string();
    let mut row = ListedAlert::empty(false);
    row.selection = Criterion::eq(Path::new("alert.messageid"), messageid.as_str()).to_string();

    let created = record.first(&Path::new("alert.create_time"));
    row.time = fields.time(&created);
    let analyzer_time = record.first(&Path::new("alert.analyzer_time"));
    if let (Some(a), Some(c)) = (analyzer_time.as_datetime(), created.as_datetime()) {
        if (a - c).num_seconds().abs() > 60 {
            row.analyzer_time = Some(fields.time(&analyzer_time));
        }
    }

    row.sensors.push(sensor(fields, record));
    row.infos.push(classification_info(fields, record, &messageid));
    row.sub_alert = sub_alert(fields, record, &messageid);

    let expand = row
        .sub_alert
        .as_ref()
        .map_or_else(|| fields.summary_link(&messageid), |sub| sub.display.clone());
    row.source = direction_summary(fields, record, Column::Source, Some(expand.clone()));
    row.target = direction_summary(fields, record, Column::Target, Some(expand));

    row.extra_columns = fields
        .ctx()
        .env()
        .extensions()
        .columns()
        .iter()
        .map(|column| column.cell(record))
        .collect();
    row
}

/// The last analyzer of the alert, named after its model when unnamed.
pub(crate) fn sensor(fields: &mut FieldBuilder<'_>, record: &Record) -> Sensor {
    let name_path = ["alert.analyzer(-1).name", "alert.analyzer(-1).model"]
        .into_iter()
        .map(|path| (path, record.first(&Path::new(path))))
        .find(|(_, value)| !value.is_null());

    let name = match name_path {
        Some((path, value)) => fields.single(Some(Column::Analyzer), path, value),
        None => fields.single(Some(Column::Analyzer), "alert.analyzer(-1).name", Value::Null),
    };
    let node = record.first(&Path::new("alert.analyzer(-1).node.name"));
    Sensor {
        name,
        node_name: fields.single(Some(Column::Analyzer), "alert.analyzer(-1).node.name", node),
    }
}

fn classification_info(fields: &mut FieldBuilder<'_>, record: &Record, messageid: &str) -> ClassificationInfo {
    let text = record.first(&Path::new("alert.classification.text"));
    let severity = record.first(&Path::new("alert.assessment.impact.severity"));
    let completion = record.first(&Path::new("alert.assessment.impact.completion"));

    ClassificationInfo {
        count: 1,
        classification: fields.single(Some(Column::Classification), "alert.classification.text", text),
        references: references(fields, record),
        severity: severity.as_str().map(str::to_string),
        completion: fields.single(None, COMPLETION_PARAM, completion),
        display: Some(fields.summary_link(messageid)),
    }
}

fn references(fields: &mut FieldBuilder<'_>, record: &Record) -> Vec<Reference> {
    let mut out = Vec::new();
    for reference in record.nodes(&Path::new("alert.classification.reference")) {
        let items: Vec<&Json> = match reference {
            Json::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        for item in items {
            let text = |key: &str| item.get(key).and_then(Json::as_str).map(str::to_string);
            let mut pairs = Vec::new();
            let mut display = String::new();
            if let Some(origin) = text("origin") {
                pairs.push((Path::new("alert.classification.reference.origin"), Value::from(origin.as_str())));
                display.push_str(&origin);
            }
            if let Some(name) = text("name") {
                pairs.push((Path::new("alert.classification.reference.name"), Value::from(name.as_str())));
                display.push(':');
                display.push_str(&name);
            }
            out.push(Reference {
                field: fields.inline(Some(Column::Classification), &pairs, Some(display)),
                url: text("url"),
            });
        }
    }
    out
}

fn sub_alert(fields: &FieldBuilder<'_>, record: &Record, messageid: &str) -> Option<SubAlert> {
    let kind = ["correlation_alert", "tool_alert"]
        .into_iter()
        .find(|kind| record.has(&Path::new(&format!("alert.{kind}"))))?;

    let name = record.first(&Path::new(&format!("alert.{kind}.name")));
    let count = record.values(&Path::new(&format!("alert.{kind}.alertident.alertident"))).len();
    let extra: Vec<(String, String)> = [
        ("timeline_unit", "unlimited"),
        ("aggregated_source", "none"),
        ("aggregated_target", "none"),
        ("aggregated_classification", "none"),
        ("aggregated_analyzer", "none"),
        ("aggregated_alert_id", messageid),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    Some(SubAlert {
        kind: kind.to_string(),
        name: name.as_str().map(str::to_string),
        count,
        link: fields.summary_link(messageid),
        display: fields.link(SUB_ALERT_RESET, &extra),
    })
}

/// Lists the distinct sources or targets of the alert up to the display
/// cap, with an `n/a` placeholder when it has none.
fn direction_summary(
    fields: &mut FieldBuilder<'_>,
    record: &Record,
    column: Column,
    expand: Option<Link>,
) -> DirectionSummary {
    let config = fields.ctx().env().config();
    let cap = match column {
        Column::Target => config.max_aggregated_target,
        _ => config.max_aggregated_source,
    };

    let mut distinct: Vec<DirectionValues> = Vec::new();
    for node in record.nodes(&Path::new(&format!("alert.{column}"))) {
        let objects: Vec<&Json> = match node {
            Json::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        for object in objects {
            let values = DirectionValues::read(column, object);
            if !distinct.contains(&values) {
                distinct.push(values);
            }
        }
    }

    let total = distinct.len();
    let mut datasets: Vec<DirectionDataset> = distinct
        .iter()
        .take(cap)
        .map(|values| fields.dataset(column, values))
        .collect();
    if datasets.is_empty() {
        let path = format!("alert.{column}(0).node.address(0).address");
        datasets.push(DirectionDataset {
            addresses: vec![fields.host(column, &path, None, None, false)],
            ..DirectionDataset::default()
        });
    }

    DirectionSummary {
        hidden: total - total.min(cap),
        datasets,
        total,
        expand,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::ListingParameters;
    use crate::testing::{alert, context, env, provider};
    use serde_json::json;

    fn render_single(data: Json) -> ListedAlert {
        let ctx = context(env(provider(vec![])), &[]);
        let params = ListingParameters::from_request(ctx.parameters(), ctx.env().config()).unwrap();
        let mut fields = FieldBuilder::new(&ctx, &params, "/alerts");
        alert_row(&mut fields, &Record::new("alert", data))
    }

    #[test]
    fn test_alert_row() {
        let row = render_single(alert("m1", 30, "ssh brute force", "10.0.0.1"));

        assert!(!row.aggregated);
        assert_eq!(row.selection, "alert.messageid == 'm1'");
        assert_eq!(row.time, "2024-05-10 11:30:00");
        assert_eq!(row.analyzer_time, None);
        assert_eq!(row.sensors[0].name.value.as_deref(), Some("snort"));
        assert_eq!(row.sensors[0].node_name.value.as_deref(), Some("sensor-1"));

        let info = &row.infos[0];
        assert_eq!(info.count, 1);
        assert_eq!(info.classification.value.as_deref(), Some("ssh brute force"));
        assert_eq!(info.severity.as_deref(), Some("high"));
        assert_eq!(info.completion.value.as_deref(), Some("failed"));
        assert_eq!(info.display.as_ref().and_then(|l| l.get("messageid")), Some("m1"));

        assert_eq!(row.source.total, 1);
        assert_eq!(row.source.datasets[0].addresses[0].hostname, "10.0.0.1");
        assert_eq!(row.target.datasets[0].addresses[0].hostname, "192.168.0.10");
        assert!(row.sub_alert.is_none());
    }

    #[test]
    fn test_missing_source_gets_placeholder() {
        let mut data = alert("m1", 30, "ssh", "10.0.0.1");
        data["source"] = json!([]);
        let row = render_single(data);
        assert_eq!(row.source.total, 0);
        assert_eq!(row.source.datasets.len(), 1);
        assert_eq!(row.source.datasets[0].addresses[0].hostname, "n/a");
    }

    #[test]
    fn test_duplicate_sources_and_cap() {
        let mut data = alert("m1", 30, "ssh", "10.0.0.1");
        let sources: Vec<Json> = (1..=12)
            .chain([1, 2])
            .map(|i| json!({"node": {"address": [{"address": format!("10.0.0.{i}")}]}}))
            .collect();
        data["source"] = Json::Array(sources);
        let row = render_single(data);

        assert_eq!(row.source.total, 12);
        assert_eq!(row.source.datasets.len(), 3);
        assert_eq!(row.source.hidden, 9);
    }

    #[test]
    fn test_analyzer_time_shown_when_far_from_create_time() {
        let mut data = alert("m1", 30, "ssh", "10.0.0.1");
        data["analyzer_time"] = json!("2024-05-10T11:25:00+00:00");
        assert_eq!(render_single(data).analyzer_time.as_deref(), Some("2024-05-10 11:25:00"));

        let mut data = alert("m1", 30, "ssh", "10.0.0.1");
        data["analyzer_time"] = json!("2024-05-10T11:30:30+00:00");
        assert_eq!(render_single(data).analyzer_time, None);
    }

    #[test]
    fn test_correlation_alert_row() {
        let mut data = alert("c1", 5, "correlated scan", "10.0.0.1");
        data["correlation_alert"] = json!({
            "name": "scan rule",
            "alertident": [{"alertident": "m1"}, {"alertident": "m2"}]
        });
        let row = render_single(data);

        let sub = row.sub_alert.unwrap();
        assert_eq!(sub.kind, "correlation_alert");
        assert_eq!(sub.name.as_deref(), Some("scan rule"));
        assert_eq!(sub.count, 2);
        assert_eq!(sub.display.get("aggregated_alert_id"), Some("c1"));
        assert_eq!(sub.display.get("timeline_unit"), Some("unlimited"));
        assert_eq!(sub.display.get("aggregated_source"), Some("none"));
        assert_eq!(row.source.expand, Some(sub.display));
    }

    #[test]
    fn test_references() {
        let mut data = alert("m1", 30, "ssh", "10.0.0.1");
        data["classification"]["reference"] = json!([{"origin": "cve", "name": "CVE-2024-0001", "url": "https://cve.example/1"}]);
        let row = render_single(data);
        let reference = &row.infos[0].references[0];
        assert_eq!(reference.field.value.as_deref(), Some("cve:CVE-2024-0001"));
        assert_eq!(reference.url.as_deref(), Some("https://cve.example/1"));
        // Indexes 0 to 2 went to the sensor and classification cells.
        let link = reference.field.inline_filter.as_ref().unwrap();
        assert_eq!(link.get("classification_object_3"), Some("alert.classification.reference.origin"));
        assert_eq!(link.get("classification_object_4"), Some("alert.classification.reference.name"));
        assert_eq!(link.get("classification_value_4"), Some("CVE-2024-0001"));
    }
}
