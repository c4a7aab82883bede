//! Cells of a listed alert and the links they carry.

use super::parameters::{Column, FilterOperator, ListingParameters, TimezoneMode};
use crate::context::{RequestContext, RequestParameters};
use crate::criteria::Path;
use crate::provider::{json_to_value, Record};
use crate::time::Timezone;
use crate::url::Link;
use crate::value::Value;
use regex::Regex;
use serde::Serialize;
use serde_json::Value as Json;
use std::sync::LazyLock;

static IPV4: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}$").ok());

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A displayed value and the link filtering the listing on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InlineField {
    /// Displayed text; `None` renders as `n/a`.
    pub value: Option<String>,
    /// The listing narrowed to this value.
    pub inline_filter: Option<Link>,
    /// True when the listing is already narrowed to this value.
    pub already_filtered: bool,
}

/// An address or node name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostField {
    /// Value and filter link.
    #[serde(flatten)]
    pub field: InlineField,
    /// Address category, given or guessed.
    pub category: Option<String>,
    /// Display name: the address itself, `n/a` when unset.
    pub hostname: String,
    /// True when the front end may resolve the address.
    pub resolve: bool,
}

/// A secondary value of a source or target (user, process, file).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListedValue {
    /// Label, e.g. `Process name`.
    pub name: String,
    /// Value and filter link.
    #[serde(flatten)]
    pub field: InlineField,
    /// Companion value, e.g. the pid of a process.
    pub extra: Option<String>,
}

/// One source or target of an alert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectionDataset {
    /// Interface name.
    pub interface: Option<String>,
    /// Addresses and node names.
    pub addresses: Vec<HostField>,
    /// `port/protocol` and its filter link.
    pub service: InlineField,
    /// Protocol name.
    pub protocol: Option<String>,
    /// Port.
    pub port: Option<i64>,
    /// Users, processes and files.
    pub listed_values: Vec<ListedValue>,
}

/// The sources or targets of a row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectionSummary {
    /// Datasets shown.
    pub datasets: Vec<DirectionDataset>,
    /// Distinct datasets.
    pub total: usize,
    /// Distinct datasets beyond the display cap.
    pub hidden: usize,
    /// Where to see them all.
    pub expand: Option<Link>,
}

/// A reporting sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sensor {
    /// Analyzer name, or model when unnamed.
    pub name: InlineField,
    /// Node name.
    pub node_name: InlineField,
}

/// A classification reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    /// `origin:name` and its filter link.
    #[serde(flatten)]
    pub field: InlineField,
    /// Reference URL.
    pub url: Option<String>,
}

// ============================================================================
// Raw source/target values
// ============================================================================

/// The displayed values of one source or target, compared before any link
/// is built so that equal datasets of one alert are listed once.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct DirectionValues {
    interface: Option<String>,
    node_name: Option<String>,
    addresses: Vec<(String, Option<String>)>,
    users: Vec<(Value, Value)>,
    process: (Value, Value),
    protocol: Option<(&'static str, Value, String)>,
    port: Option<i64>,
    files: Vec<String>,
}

impl DirectionValues {
    /// Reads one source or target object.
    pub(crate) fn read(column: Column, object: &Json) -> Self {
        let name = column.as_str();
        let record = Record::new(name, object.clone());
        let at = |field: &str| Path::new(&format!("{name}.{field}"));
        let text = |field: &str| record.first(&at(field)).as_str().map(str::to_string);

        let addresses = record
            .nodes(&at("node.address"))
            .into_iter()
            .flat_map(items)
            .filter_map(|addr| {
                let address = addr.get("address")?.as_str()?.to_string();
                let category = addr
                    .get("category")
                    .and_then(Json::as_str)
                    .map(str::to_string);
                Some((address, category))
            })
            .collect();

        let users = record
            .nodes(&at("user.user_id"))
            .into_iter()
            .flat_map(items)
            .map(|user| {
                let field = |key: &str| user.get(key).map(json_to_value).unwrap_or_default();
                (field("name"), field("number"))
            })
            .collect();

        let protocol = if let Some(proto) = text("service.iana_protocol_name") {
            Some(("iana_protocol_name", Value::from(proto.as_str()), proto))
        } else if let Some(num) = record.first(&at("service.iana_protocol_number")).as_i64() {
            Some(("iana_protocol_number", Value::Integer(num), protocol_name(num)))
        } else {
            text("service.protocol").map(|p| ("protocol", Value::from(p.as_str()), p))
        };

        let mut files: Vec<String> = Vec::new();
        if column == Column::Target {
            for path in record.values(&at("file.path")) {
                let path = path.to_string();
                if !files.contains(&path) {
                    files.push(path);
                }
            }
        }

        Self {
            interface: text("interface"),
            node_name: text("node.name"),
            addresses,
            users,
            process: (record.first(&at("process.name")), record.first(&at("process.pid"))),
            protocol,
            port: record.first(&at("service.port")).as_i64(),
            files,
        }
    }
}

fn items(node: &Json) -> Vec<&Json> {
    match node {
        Json::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

/// Name of a common IANA protocol number.
#[must_use]
pub fn protocol_name(number: i64) -> String {
    match number {
        1 => "icmp".to_string(),
        6 => "tcp".to_string(),
        17 => "udp".to_string(),
        58 => "ipv6-icmp".to_string(),
        132 => "sctp".to_string(),
        other => other.to_string(),
    }
}

/// Guesses the category of an address from its shape.
///
/// # Examples
///
/// ```
/// use analytics::listing::guess_address_category;
///
/// assert_eq!(guess_address_category("10.0.0.1"), Some("ipv4-addr"));
/// assert_eq!(guess_address_category("root@example.org"), Some("e-mail"));
/// assert_eq!(guess_address_category("fe80::1"), Some("ipv6-addr"));
/// assert_eq!(guess_address_category("host"), None);
/// ```
#[must_use]
pub fn guess_address_category(address: &str) -> Option<&'static str> {
    if IPV4.as_ref().is_some_and(|re| re.is_match(address)) {
        Some("ipv4-addr")
    } else if address.contains('@') {
        Some("e-mail")
    } else if address.matches(':').count() > 1 {
        Some("ipv6-addr")
    } else {
        None
    }
}

// ============================================================================
// Field builder
// ============================================================================

/// Builds cells and their links against the current request.
///
/// Each column filter link takes a fresh filter index so that following it
/// adds a filter instead of replacing one.
pub(crate) struct FieldBuilder<'a> {
    ctx: &'a RequestContext,
    endpoint: &'a str,
    summary: &'a str,
    request: &'a RequestParameters,
    params: &'a ListingParameters,
    viewer: &'a Timezone,
    next_index: usize,
}

impl<'a> FieldBuilder<'a> {
    pub(crate) fn new(ctx: &'a RequestContext, params: &'a ListingParameters, endpoint: &'a str) -> Self {
        Self {
            ctx,
            endpoint,
            summary: ctx.env().endpoints().summary(),
            request: ctx.parameters(),
            params,
            viewer: ctx.timezone(),
            next_index: params.max_index,
        }
    }

    pub(crate) const fn ctx(&self) -> &'a RequestContext {
        self.ctx
    }

    pub(crate) const fn params(&self) -> &'a ListingParameters {
        self.params
    }

    /// The listing with `removed` dropped and `extra` set.
    pub(crate) fn link(&self, removed: &[&str], extra: &[(String, String)]) -> Link {
        let mut request = self.request.clone();
        request.remove("offset");
        for name in removed {
            request.remove(name);
        }
        for (name, value) in extra {
            request.set(name, value);
        }
        Link::new(self.endpoint).params(request.iter())
    }

    /// The summary page of one alert.
    pub(crate) fn summary_link(&self, messageid: &str) -> Link {
        Link::new(self.summary).param("messageid", messageid)
    }

    /// Reserves a filter index.
    pub(crate) fn take_index(&mut self) -> usize {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    /// A field filtering on every `(path, value)` pair.
    ///
    /// With a column, each pair becomes a column filter (`!` for unset
    /// values); without, each path becomes a checkbox parameter.
    pub(crate) fn inline(
        &mut self,
        column: Option<Column>,
        pairs: &[(Path, Value)],
        display: Option<String>,
    ) -> InlineField {
        if pairs.is_empty() {
            return InlineField::default();
        }

        let mut extra = Vec::new();
        let mut already_filtered = true;
        for (path, value) in pairs {
            let text = if value.is_null() { String::new() } else { value.to_string() };
            match column {
                Some(column) => {
                    let operator = if value.is_null() {
                        FilterOperator::Absent
                    } else {
                        FilterOperator::Equal
                    };
                    already_filtered &= self
                        .params
                        .filters(column)
                        .iter()
                        .any(|f| f.is(path, operator, &text));

                    let index = self.take_index();
                    extra.push((format!("{column}_object_{index}"), path.without_indexes().to_string()));
                    extra.push((format!("{column}_operator_{index}"), operator.as_str().to_string()));
                    extra.push((format!("{column}_value_{index}"), text));
                }
                None => {
                    let name = path.to_string();
                    already_filtered &= self.request.get_all(&name) == [text.as_str()];
                    extra.push((name, text));
                }
            }
        }

        let value = display.or_else(|| {
            pairs
                .first()
                .filter(|(_, v)| !v.is_null())
                .map(|(_, v)| v.to_string())
        });
        InlineField {
            value,
            inline_filter: Some(self.link(&[], &extra)),
            already_filtered,
        }
    }

    /// A single-path field.
    pub(crate) fn single(&mut self, column: Option<Column>, path: &str, value: Value) -> InlineField {
        self.inline(column, &[(Path::new(path), value)], None)
    }

    /// An address or node name field.
    pub(crate) fn host(
        &mut self,
        column: Column,
        path: &str,
        value: Option<&str>,
        category: Option<String>,
        resolve: bool,
    ) -> HostField {
        let category = match (category.as_deref(), value) {
            (None | Some("unknown"), Some(address)) => guess_address_category(address).map(str::to_string),
            _ => category,
        };
        HostField {
            field: self.single(Some(column), path, Value::from(value)),
            category,
            hostname: value.unwrap_or("n/a").to_string(),
            resolve: resolve && value.is_some(),
        }
    }

    /// Displays a timestamp in the listing's timezone mode.
    pub(crate) fn time(&self, value: &Value) -> String {
        let Some(dt) = value.as_datetime() else {
            return "n/a".to_string();
        };
        match self.params.timezone {
            TimezoneMode::Utc => dt.with_timezone(&chrono::Utc).format(TIME_FORMAT).to_string(),
            TimezoneMode::FrontendLocaltime => self.viewer.localize(&dt).format(TIME_FORMAT).to_string(),
            TimezoneMode::SensorLocaltime => {
                format!("{} ({})", dt.format(TIME_FORMAT), dt.format("%:z"))
            }
        }
    }

    /// Turns raw values into a dataset with links.
    pub(crate) fn dataset(&mut self, column: Column, values: &DirectionValues) -> DirectionDataset {
        let name = column.as_str();
        let mut out = DirectionDataset {
            interface: values.interface.clone(),
            ..DirectionDataset::default()
        };

        for (user, number) in &values.users {
            self.listed_value(
                &mut out,
                column,
                (&format!("alert.{name}.user.user_id.name"), user),
                Some((&format!("alert.{name}.user.user_id.number"), number)),
            );
        }

        if let Some(node) = &values.node_name {
            let field = self.host(column, &format!("alert.{name}.node.name"), Some(node), None, false);
            out.addresses.push(field);
        }
        let resolve = values.node_name.is_none();
        for (address, category) in &values.addresses {
            let path = format!("alert.{name}(0).node.address(0).address");
            let field = self.host(column, &path, Some(address), category.clone(), resolve);
            out.addresses.push(field);
        }

        let (process, pid) = &values.process;
        self.listed_value(
            &mut out,
            column,
            (&format!("alert.{name}.process.name"), process),
            Some((&format!("alert.{name}.process.pid"), pid)),
        );

        let mut pairs = Vec::new();
        if let Some((field, value, _)) = &values.protocol {
            pairs.push((Path::new(&format!("alert.{name}.service.{field}")), value.clone()));
        }
        if let Some(port) = values.port {
            pairs.push((Path::new(&format!("alert.{name}.service.port")), Value::Integer(port)));
        }
        let proto = values.protocol.as_ref().map(|(_, _, p)| p.clone());
        let display = match (values.port, &proto) {
            (Some(port), Some(proto)) => Some(format!("{port}/{proto}")),
            (Some(port), None) => Some(port.to_string()),
            (None, proto) => proto.clone(),
        };
        out.service = self.inline(Some(column), &pairs, display);
        out.protocol = proto;
        out.port = values.port;

        for file in &values.files {
            let value = Value::from(file.as_str());
            self.listed_value(&mut out, column, (&format!("alert.{name}.file.path"), &value), None);
        }

        out
    }

    /// Places a grouped value of an aggregated row in its dataset.
    pub(crate) fn aggregated_value(&mut self, out: &mut DirectionDataset, column: Column, path: &Path, value: Value) {
        let name = column.as_str();
        let key = path.without_indexes().to_string();
        let field = key.strip_prefix(&format!("alert.{name}.")).unwrap_or_default();
        let path = path.to_string();

        match field {
            "node.address.address" | "node.name" => {
                let resolve = field != "node.name";
                out.addresses.push(self.host(column, &path, value.as_str(), None, resolve));
            }
            "interface" => out.interface = value.as_str().map(str::to_string),
            "service.port" => {
                out.port = value.as_i64();
                out.service = self.single(Some(column), &path, value);
            }
            _ => {
                let item = ListedValue {
                    name: listed_name(column, &path),
                    field: self.single(Some(column), &path, value),
                    extra: None,
                };
                out.listed_values.push(item);
            }
        }
    }

    /// Lists `value`, falling back to `extra` when unset.
    fn listed_value(
        &mut self,
        out: &mut DirectionDataset,
        column: Column,
        (path, value): (&str, &Value),
        extra: Option<(&str, &Value)>,
    ) {
        let extra = extra.filter(|(_, v)| !v.is_null());
        let (path, value, extra) = match extra {
            _ if !value.is_null() => (path, value, extra.map(|(_, v)| v)),
            Some((extra_path, extra_value)) => (extra_path, extra_value, None),
            None => return,
        };

        let item = ListedValue {
            name: listed_name(column, path),
            field: self.single(Some(column), path, value.clone()),
            extra: extra.map(ToString::to_string),
        };
        if !out
            .listed_values
            .iter()
            .any(|v| v.name == item.name && v.field.value == item.field.value)
        {
            out.listed_values.push(item);
        }
    }
}

/// `alert.source.process.name` reads `Process name`; a field right under
/// the column reads as its own name.
fn listed_name(column: Column, path: &str) -> String {
    let path = Path::new(path).without_indexes().to_string();
    let mut parts = path.rsplit('.');
    let leaf = parts.next().unwrap_or_default();
    match parts.next() {
        Some(parent) if parent != column.as_str() => {
            let parent: String = parent
                .split('_')
                .map(|word| {
                    let mut chars = word.chars();
                    chars.next().map_or_else(String::new, |first| {
                        first.to_uppercase().chain(chars).collect()
                    })
                })
                .collect();
            format!("{parent} {leaf}")
        }
        _ => leaf.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, env, provider};
    use serde_json::json;

    fn builder_params(pairs: &[(&str, &str)]) -> (RequestContext, ListingParameters) {
        let ctx = context(env(provider(vec![])), pairs);
        let params = ListingParameters::from_request(ctx.parameters(), ctx.env().config()).unwrap();
        (ctx, params)
    }

    #[test]
    fn test_inline_field_link_adds_column_filter() {
        let (ctx, params) = builder_params(&[("offset", "50"), ("source_object_0", "alert.source.node.name"), ("source_value_0", "web")]);
        let mut builder = FieldBuilder::new(&ctx, &params, "/alerts");

        let field = builder.single(Some(Column::Source), "alert.source(0).node.name", Value::from("web"));
        assert_eq!(field.value.as_deref(), Some("web"));
        assert!(field.already_filtered);

        let link = field.inline_filter.unwrap();
        assert_eq!(link.get("offset"), None);
        assert_eq!(link.get("source_object_1"), Some("alert.source.node.name"));
        assert_eq!(link.get("source_operator_1"), Some("="));
        assert_eq!(link.get("source_value_1"), Some("web"));

        let next = builder.single(Some(Column::Source), "alert.source.node.name", Value::Null);
        assert!(!next.already_filtered);
        let link = next.inline_filter.unwrap();
        assert_eq!(link.get("source_operator_2"), Some("!"));
    }

    #[test]
    fn test_inline_field_without_column_sets_parameter() {
        let (ctx, params) = builder_params(&[]);
        let mut builder = FieldBuilder::new(&ctx, &params, "/alerts");
        let field = builder.single(None, "alert.assessment.impact.completion", Value::from("failed"));
        let link = field.inline_filter.unwrap();
        assert_eq!(link.get("alert.assessment.impact.completion"), Some("failed"));
        assert!(!field.already_filtered);
    }

    #[test]
    fn test_direction_dataset() {
        let (ctx, params) = builder_params(&[]);
        let mut builder = FieldBuilder::new(&ctx, &params, "/alerts");
        let values = DirectionValues::read(
            Column::Target,
            &json!({
                "node": {"address": [{"address": "192.168.0.10"}, {"address": "a@b.c", "category": "e-mail"}]},
                "service": {"port": 22, "iana_protocol_number": 6},
                "process": {"pid": 42},
                "user": {"user_id": [{"name": "root", "number": 0}]},
                "file": [{"path": "/etc/passwd"}, {"path": "/etc/passwd"}]
            }),
        );
        let dataset = builder.dataset(Column::Target, &values);

        let categories: Vec<Option<&str>> = dataset.addresses.iter().map(|a| a.category.as_deref()).collect();
        assert_eq!(categories, vec![Some("ipv4-addr"), Some("e-mail")]);
        assert!(dataset.addresses[0].resolve);
        assert_eq!(dataset.service.value.as_deref(), Some("22/tcp"));
        assert_eq!(dataset.port, Some(22));

        let listed: Vec<(&str, Option<&str>, Option<&str>)> = dataset
            .listed_values
            .iter()
            .map(|v| (v.name.as_str(), v.field.value.as_deref(), v.extra.as_deref()))
            .collect();
        assert_eq!(
            listed,
            vec![
                ("UserId name", Some("root"), Some("0")),
                ("Process pid", Some("42"), None),
                ("File path", Some("/etc/passwd"), None),
            ]
        );
    }

    #[test]
    fn test_equal_datasets_compare_equal() {
        let a = DirectionValues::read(Column::Source, &json!({"node": {"address": [{"address": "10.0.0.1"}]}}));
        let b = DirectionValues::read(Column::Source, &json!({"node": {"address": [{"address": "10.0.0.1"}]}}));
        let c = DirectionValues::read(Column::Source, &json!({"node": {"address": [{"address": "10.0.0.2"}]}}));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_time_display_modes() {
        let value = Value::from(chrono::DateTime::parse_from_rfc3339("2024-05-10T14:00:00+02:00").unwrap());
        let (ctx, params) = builder_params(&[("timezone", "sensor_localtime")]);
        assert_eq!(FieldBuilder::new(&ctx, &params, "/alerts").time(&value), "2024-05-10 14:00:00 (+02:00)");

        let (ctx, params) = builder_params(&[("timezone", "utc")]);
        assert_eq!(FieldBuilder::new(&ctx, &params, "/alerts").time(&value), "2024-05-10 12:00:00");
        assert_eq!(FieldBuilder::new(&ctx, &params, "/alerts").time(&Value::Null), "n/a");
    }

    #[test]
    fn test_listed_name() {
        assert_eq!(listed_name(Column::Source, "alert.source(0).process.name"), "Process name");
        assert_eq!(listed_name(Column::Source, "alert.source.interface"), "interface");
    }
}
