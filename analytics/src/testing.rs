//! Fixtures shared by the unit tests.

use crate::config::AnalyticsConfig;
use crate::context::{Environment, RequestContext, RequestParameters};
use crate::provider::{InMemoryDataProvider, Schema};
use crate::time::Timezone;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value as Json};
use std::sync::Arc;

/// 2024-05-10 12:00:00 UTC.
pub(crate) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
}

/// An alert created `minutes_ago` before [`now`].
pub(crate) fn alert(id: &str, minutes_ago: i64, classification: &str, source: &str) -> Json {
    let created = now() - chrono::TimeDelta::minutes(minutes_ago);
    json!({
        "messageid": id,
        "create_time": created.to_rfc3339(),
        "classification": {"text": classification},
        "source": [{"node": {"address": [{"address": source}]}}],
        "target": [{"node": {"address": [{"address": "192.168.0.10"}]}}],
        "analyzer": [{"name": "snort", "analyzerid": "a1", "node": {"name": "sensor-1"}}],
        "assessment": {"impact": {"severity": "high", "completion": "failed"}}
    })
}

pub(crate) fn provider(alerts: Vec<Json>) -> Arc<InMemoryDataProvider> {
    let provider = InMemoryDataProvider::new(Schema::alert());
    provider.insert_batch("alert", alerts).unwrap();
    Arc::new(provider)
}

pub(crate) fn env(provider: Arc<InMemoryDataProvider>) -> Arc<Environment> {
    Arc::new(Environment::new(provider, AnalyticsConfig::default()))
}

/// A request over the day before [`now`] with `params`.
pub(crate) fn context(env: Arc<Environment>, params: &[(&str, &str)]) -> RequestContext {
    let mut parameters: RequestParameters = params.iter().copied().collect();
    if !parameters.contains("timeline_unit") {
        parameters.insert("timeline_unit", "day");
    }
    RequestContext::new(env, parameters, Timezone::utc(), now()).unwrap()
}
