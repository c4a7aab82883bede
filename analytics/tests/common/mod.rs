//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use analytics::config::AnalyticsConfig;
use analytics::context::{Environment, RequestContext, RequestParameters};
use analytics::provider::{InMemoryDataProvider, Schema};
use analytics::time::Timezone;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;

/// The instant every test request is evaluated at.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
}

/// An alert created `minutes_ago` before [`now`].
pub fn alert(id: &str, minutes_ago: i64, classification: &str, source: &str) -> Value {
    json!({
        "messageid": id,
        "create_time": (now() - TimeDelta::minutes(minutes_ago)).to_rfc3339(),
        "classification": {"text": classification},
        "source": [{"node": {"address": [{"address": source}]}}],
        "target": [{"node": {"address": [{"address": "192.168.0.10"}]}}],
        "analyzer": [{"name": "snort", "analyzerid": "a1", "node": {"name": "sensor-1"}}],
        "assessment": {"impact": {"severity": "high", "completion": "failed"}}
    })
}

/// Sets the severity of an alert, or clears it with `None`.
pub fn with_severity(mut alert: Value, severity: Option<&str>) -> Value {
    match severity {
        Some(s) => alert["assessment"]["impact"]["severity"] = json!(s),
        None => {
            if let Some(impact) = alert["assessment"]["impact"].as_object_mut() {
                impact.remove("severity");
            }
        }
    }
    alert
}

/// A store holding `alerts`.
pub fn store(alerts: Vec<Value>) -> InMemoryDataProvider {
    let provider = InMemoryDataProvider::new(Schema::alert());
    provider.insert_batch("alert", alerts).unwrap();
    provider
}

/// An environment over `provider` with the default configuration.
pub fn environment(provider: InMemoryDataProvider) -> Arc<Environment> {
    Arc::new(Environment::new(Arc::new(provider), AnalyticsConfig::default()))
}

/// A UTC request over the last day with the extra `params`.
pub fn request(env: Arc<Environment>, params: &[(&str, &str)]) -> RequestContext {
    let mut parameters: RequestParameters = params.iter().copied().collect();
    if !parameters.contains("timeline_unit") {
        parameters.insert("timeline_unit", "day");
    }
    RequestContext::new(env, parameters, Timezone::utc(), now()).unwrap()
}
