//! Field types and supported operators per datatype.

use crate::criteria::{Operator, Path, QueryMode};
use crate::value::Value;
use serde::Serialize;
use std::collections::HashMap;

/// Type of the values stored under a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Free text.
    String,
    /// Integer.
    Integer,
    /// Floating point number.
    Float,
    /// Timestamp.
    DateTime,
    /// One of a fixed set of keywords.
    Enum(Vec<String>),
    /// A structured element, only tested for presence.
    Object,
}

impl ValueType {
    fn operators(&self) -> Vec<Operator> {
        use Operator::{Eq, EqNoCase, Gt, GtEq, Lt, LtEq, NotEq, NotEqNoCase};
        match self {
            Self::String => Operator::ALL.to_vec(),
            Self::Enum(_) => vec![Eq, EqNoCase, NotEq, NotEqNoCase],
            Self::Integer | Self::Float | Self::DateTime => vec![Eq, NotEq, Lt, LtEq, Gt, GtEq],
            Self::Object => vec![Eq, NotEq],
        }
    }

    /// True when `value` can be compared against values of this type.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => true,
            Self::Integer => match value {
                Value::Integer(_) => true,
                Value::String(s) => s.trim().parse::<i64>().is_ok(),
                _ => false,
            },
            Self::Float => value.as_f64().is_some(),
            Self::DateTime => value.as_datetime().is_some(),
            Self::Enum(choices) => {
                let text = value.to_string();
                choices.iter().any(|c| c.eq_ignore_ascii_case(&text))
            }
            Self::Object => value.is_null(),
        }
    }
}

/// What [`super::DataProvider::path_info`] reports about a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathInfo {
    /// Type of the stored values.
    pub value_type: ValueType,
    /// Operators the backend evaluates for the path.
    pub operators: Vec<Operator>,
}

impl PathInfo {
    /// Info for a path of type `value_type`.
    #[must_use]
    pub fn new(value_type: ValueType) -> Self {
        let operators = value_type.operators();
        Self {
            value_type,
            operators,
        }
    }

    /// True when the backend evaluates `operator` on the path.
    #[must_use]
    pub fn supports(&self, operator: Operator) -> bool {
        self.operators.contains(&operator)
    }
}

/// Layout of one datatype.
#[derive(Debug, Clone)]
pub struct DatatypeSchema {
    time_field: Path,
    fields: HashMap<String, ValueType>,
    default_paths: Vec<Path>,
    continuous: bool,
    query_mode: QueryMode,
}

impl DatatypeSchema {
    /// A datatype whose records are timestamped by `time_field`.
    #[must_use]
    pub fn new(time_field: &str) -> Self {
        let time_field = Path::new(time_field);
        let mut fields = HashMap::new();
        fields.insert(time_field.key(), ValueType::DateTime);
        Self {
            time_field,
            fields,
            default_paths: Vec::new(),
            continuous: false,
            query_mode: QueryMode::Criterion,
        }
    }

    /// Declares a field.
    #[must_use]
    pub fn field(mut self, path: &str, value_type: ValueType) -> Self {
        self.fields.insert(Path::new(path).key(), value_type);
        self
    }

    /// Declares several fields of one type.
    #[must_use]
    pub fn fields(self, paths: &[&str], value_type: &ValueType) -> Self {
        paths
            .iter()
            .fold(self, |schema, path| schema.field(path, value_type.clone()))
    }

    /// Sets the free-text search paths.
    #[must_use]
    pub fn default_paths(mut self, paths: &[&str]) -> Self {
        self.default_paths = paths.iter().map(|p| Path::new(p)).collect();
        self
    }

    /// Marks the datatype as holding continuous measurements.
    #[must_use]
    pub const fn continuous(mut self, continuous: bool) -> Self {
        self.continuous = continuous;
        self
    }

    /// Sets the native query syntax.
    #[must_use]
    pub const fn query_mode(mut self, mode: QueryMode) -> Self {
        self.query_mode = mode;
        self
    }

    pub(crate) fn set_query_mode(&mut self, mode: QueryMode) {
        self.query_mode = mode;
    }

    /// The timestamp path.
    #[must_use]
    pub const fn time_field(&self) -> &Path {
        &self.time_field
    }

    /// True for continuous measurements.
    #[must_use]
    pub const fn is_continuous(&self) -> bool {
        self.continuous
    }

    /// Native query syntax.
    #[must_use]
    pub const fn native_query_mode(&self) -> QueryMode {
        self.query_mode
    }

    /// Free-text search paths.
    #[must_use]
    pub fn search_paths(&self) -> &[Path] {
        &self.default_paths
    }

    /// Type of the values under `path`, ignoring indexes.
    #[must_use]
    pub fn value_type(&self, path: &Path) -> Option<&ValueType> {
        self.fields.get(&path.key())
    }
}

/// Every datatype a provider serves.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    datatypes: HashMap<String, DatatypeSchema>,
}

const ADDRESS_FIELDS: &[&str] = &[
    "node.name",
    "node.location",
    "node.address.address",
    "node.address.category",
    "node.address.vlan_name",
    "user.user_id.name",
    "process.name",
    "process.path",
    "service.name",
    "service.protocol",
    "service.iana_protocol_name",
    "interface",
];

const ADDRESS_NUMBERS: &[&str] = &[
    "user.user_id.number",
    "process.pid",
    "service.iana_protocol_number",
    "service.port",
];

impl Schema {
    /// An empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a datatype.
    #[must_use]
    pub fn with_datatype(mut self, name: &str, datatype: DatatypeSchema) -> Self {
        self.datatypes.insert(name.to_string(), datatype);
        self
    }

    /// The datatype named `name`.
    #[must_use]
    pub fn datatype(&self, name: &str) -> Option<&DatatypeSchema> {
        self.datatypes.get(name)
    }

    pub(crate) fn datatype_mut(&mut self, name: &str) -> Option<&mut DatatypeSchema> {
        self.datatypes.get_mut(name)
    }

    /// The alert and heartbeat layouts read by the listing and the charts.
    #[must_use]
    pub fn alert() -> Self {
        let severity = ValueType::Enum(
            ["info", "low", "medium", "high"].map(String::from).to_vec(),
        );
        let completion = ValueType::Enum(["failed", "succeeded"].map(String::from).to_vec());

        let mut alert = DatatypeSchema::new("alert.create_time")
            .fields(
                &[
                    "alert.messageid",
                    "alert.classification.text",
                    "alert.classification.ident",
                    "alert.classification.reference.name",
                    "alert.classification.reference.origin",
                    "alert.classification.reference.url",
                    "alert.classification.reference.meaning",
                    "alert.assessment.impact.type",
                    "alert.assessment.impact.description",
                    "alert.analyzer.analyzerid",
                    "alert.analyzer.name",
                    "alert.analyzer.model",
                    "alert.analyzer.manufacturer",
                    "alert.analyzer.class",
                    "alert.analyzer.version",
                    "alert.analyzer.ostype",
                    "alert.analyzer.osversion",
                    "alert.analyzer.node.name",
                    "alert.analyzer.node.location",
                    "alert.analyzer.node.address.address",
                    "alert.correlation_alert.name",
                    "alert.correlation_alert.alertident.alertident",
                    "alert.correlation_alert.alertident.analyzerid",
                    "alert.overflow_alert.program",
                    "alert.overflow_alert.buffer",
                    "alert.tool_alert.name",
                    "alert.tool_alert.command",
                    "alert.tool_alert.alertident.alertident",
                    "alert.tool_alert.alertident.analyzerid",
                    "alert.additional_data.meaning",
                    "alert.additional_data.data",
                    "alert.target.file.name",
                    "alert.target.file.path",
                ],
                &ValueType::String,
            )
            .fields(
                &["alert.detect_time", "alert.analyzer_time"],
                &ValueType::DateTime,
            )
            .fields(&["alert.overflow_alert.size"], &ValueType::Integer)
            .fields(
                &[
                    "alert.source",
                    "alert.target",
                    "alert.correlation_alert",
                    "alert.overflow_alert",
                    "alert.tool_alert",
                ],
                &ValueType::Object,
            )
            .field("alert.assessment.impact.severity", severity)
            .field("alert.assessment.impact.completion", completion)
            .default_paths(&[
                "alert.classification.text",
                "alert.source.node.address.address",
                "alert.target.node.address.address",
                "alert.analyzer.name",
            ]);

        for direction in ["source", "target"] {
            for field in ADDRESS_FIELDS {
                alert = alert.field(&format!("alert.{direction}.{field}"), ValueType::String);
            }
            for field in ADDRESS_NUMBERS {
                alert = alert.field(&format!("alert.{direction}.{field}"), ValueType::Integer);
            }
        }

        let heartbeat = DatatypeSchema::new("heartbeat.create_time")
            .fields(
                &[
                    "heartbeat.messageid",
                    "heartbeat.analyzer.analyzerid",
                    "heartbeat.analyzer.name",
                    "heartbeat.analyzer.model",
                    "heartbeat.analyzer.node.name",
                    "heartbeat.analyzer.node.address.address",
                ],
                &ValueType::String,
            )
            .field("heartbeat.heartbeat_interval", ValueType::Integer)
            .default_paths(&["heartbeat.analyzer.name", "heartbeat.analyzer.node.name"]);

        Self::new()
            .with_datatype("alert", alert)
            .with_datatype("heartbeat", heartbeat)
    }
}
