//! Explicit request context.
//!
//! [`Environment`] carries what is populated once at startup (the data
//! provider, path translations, renderers, extensions and configuration);
//! [`RequestContext`] adds what belongs to one request (parameters, viewer
//! timezone, resolved time period). Every chart and listing operation takes
//! its context as an argument.

use crate::config::AnalyticsConfig;
use crate::criteria::{Criterion, PathTranslations, QueryCompiler, QueryMode};
use crate::error::AnalyticsError;
use crate::extension::ExtensionRegistry;
use crate::provider::DataProvider;
use crate::render::RendererRegistry;
use crate::time::{PeriodParameters, TimePeriod, Timezone};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// The request parameter bag: an ordered multimap of strings.
///
/// String parsing of parameters stays at this boundary; the typed
/// structures ([`PeriodParameters`], listing parameters) are read from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestParameters {
    entries: Vec<(String, String)>,
}

impl RequestParameters {
    /// An empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an `a=1&b=2` query string, percent-decoding names and values.
    ///
    /// Pairs that fail to decode are kept raw.
    #[must_use]
    pub fn from_query_string(query: &str) -> Self {
        let decode = |s: &str| {
            let s = s.replace('+', " ");
            urlencoding::decode(&s).map_or_else(|_| s.clone(), |d| d.into_owned())
        };

        query
            .trim_start_matches('?')
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) => (decode(k), decode(v)),
                None => (decode(pair), String::new()),
            })
            .collect()
    }

    /// Appends a value.
    pub fn insert(&mut self, name: &str, value: &str) {
        self.entries.push((name.to_string(), value.to_string()));
    }

    /// Replaces every value of `name` with `value`.
    pub fn set(&mut self, name: &str, value: &str) {
        self.remove(name);
        self.insert(name, value);
    }

    /// Builder form of [`RequestParameters::insert`].
    #[must_use]
    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.insert(name, value);
        self
    }

    /// The first value of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Every value of `name`, in insertion order.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// True when `name` has at least one value.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == name)
    }

    /// Removes every value of `name`.
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(k, _)| k != name);
    }

    /// Iterates over the pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the bag holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RequestParameters {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// URLs the generated links point to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    listings: HashMap<String, String>,
    summary: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new("/alerts/summary")
            .with_listing("alert", "/alerts")
            .with_listing("heartbeat", "/heartbeats")
    }
}

impl Endpoints {
    /// Endpoints with only a single-alert summary URL.
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            listings: HashMap::new(),
            summary: summary.into(),
        }
    }

    /// Registers the listing URL of a datatype.
    #[must_use]
    pub fn with_listing(mut self, datatype: &str, url: impl Into<String>) -> Self {
        self.listings.insert(datatype.to_string(), url.into());
        self
    }

    /// The listing URL of a datatype.
    #[must_use]
    pub fn listing(&self, datatype: &str) -> Option<&str> {
        self.listings.get(datatype).map(String::as_str)
    }

    /// The single-alert summary URL.
    #[must_use]
    pub fn summary(&self) -> &str {
        &self.summary
    }
}

/// Startup-populated collaborators shared by every request.
pub struct Environment {
    provider: Arc<dyn DataProvider>,
    translations: PathTranslations,
    renderers: RendererRegistry,
    extensions: ExtensionRegistry,
    endpoints: Endpoints,
    config: AnalyticsConfig,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("renderers", &self.renderers)
            .field("extensions", &self.extensions)
            .field("endpoints", &self.endpoints)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Environment {
    /// An environment over `provider` with the IDMEF translations, the
    /// built-in renderers and no extensions.
    #[must_use]
    pub fn new(provider: Arc<dyn DataProvider>, config: AnalyticsConfig) -> Self {
        Self {
            provider,
            translations: PathTranslations::idmef(),
            renderers: RendererRegistry::with_defaults(),
            extensions: ExtensionRegistry::new(),
            endpoints: Endpoints::default(),
            config,
        }
    }

    /// Replaces the path translations.
    #[must_use]
    pub fn with_translations(mut self, translations: PathTranslations) -> Self {
        self.translations = translations;
        self
    }

    /// Replaces the renderer registry.
    #[must_use]
    pub fn with_renderers(mut self, renderers: RendererRegistry) -> Self {
        self.renderers = renderers;
        self
    }

    /// Replaces the extension registry.
    #[must_use]
    pub fn with_extensions(mut self, extensions: ExtensionRegistry) -> Self {
        self.extensions = extensions;
        self
    }

    /// Replaces the link endpoints.
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// The data provider.
    #[must_use]
    pub fn provider(&self) -> &dyn DataProvider {
        self.provider.as_ref()
    }

    /// The virtual path table.
    #[must_use]
    pub const fn translations(&self) -> &PathTranslations {
        &self.translations
    }

    /// The renderers.
    #[must_use]
    pub const fn renderers(&self) -> &RendererRegistry {
        &self.renderers
    }

    /// The extension points.
    #[must_use]
    pub const fn extensions(&self) -> &ExtensionRegistry {
        &self.extensions
    }

    /// The link endpoints.
    #[must_use]
    pub const fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// The configuration.
    #[must_use]
    pub const fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// A query compiler for `datatype`.
    #[must_use]
    pub fn compiler<'a>(&'a self, datatype: &'a str) -> QueryCompiler<'a> {
        QueryCompiler::new(self.provider.as_ref(), &self.translations, datatype)
    }
}

/// Everything one request needs.
#[derive(Debug, Clone)]
pub struct RequestContext {
    env: Arc<Environment>,
    parameters: RequestParameters,
    period: TimePeriod,
    now: DateTime<Utc>,
}

impl RequestContext {
    /// Builds the context of a request, resolving the `timeline_*`
    /// parameters against `now` in the viewer `timezone`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::InvalidParameterValue`] for malformed
    /// timeline parameters.
    pub fn new(
        env: Arc<Environment>,
        parameters: RequestParameters,
        timezone: Timezone,
        now: DateTime<Utc>,
    ) -> Result<Self, AnalyticsError> {
        let period = TimePeriod::new(PeriodParameters::from_request(&parameters)?, timezone, now)?;
        Ok(Self::with_period(env, parameters, period, now))
    }

    /// Builds a context around an already resolved period.
    #[must_use]
    pub const fn with_period(
        env: Arc<Environment>,
        parameters: RequestParameters,
        period: TimePeriod,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            env,
            parameters,
            period,
            now,
        }
    }

    /// The instant the request is evaluated at.
    #[must_use]
    pub const fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// The shared environment.
    #[must_use]
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// A handle on the shared environment.
    #[must_use]
    pub fn env_handle(&self) -> Arc<Environment> {
        Arc::clone(&self.env)
    }

    /// The data provider.
    #[must_use]
    pub fn provider(&self) -> &dyn DataProvider {
        self.env.provider()
    }

    /// The request parameters.
    #[must_use]
    pub const fn parameters(&self) -> &RequestParameters {
        &self.parameters
    }

    /// The active time period.
    #[must_use]
    pub const fn period(&self) -> &TimePeriod {
        &self.period
    }

    /// The viewer timezone.
    #[must_use]
    pub const fn timezone(&self) -> &Timezone {
        self.period.timezone()
    }

    /// The query syntax of the request: `query_mode` when given, else the
    /// configured default.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::InvalidParameterValue`] for unknown modes.
    pub fn query_mode(&self) -> Result<QueryMode, AnalyticsError> {
        self.parameters
            .get("query_mode")
            .map_or(Ok(self.env.config().default_query_mode), |mode| {
                mode.parse()
                    .map_err(|_| AnalyticsError::invalid_value("query_mode", mode))
            })
    }

    /// Compiles a user query against `datatype`.
    ///
    /// # Errors
    ///
    /// Returns parse and path resolution errors.
    pub fn compile_query(
        &self,
        datatype: &str,
        query: &str,
        mode: QueryMode,
    ) -> Result<Criterion, AnalyticsError> {
        self.env.compiler(datatype).compile_query(query, mode)
    }

    /// The time window of the request on `datatype`, ANDed with every
    /// registered criteria filter.
    ///
    /// # Errors
    ///
    /// Returns provider errors for unknown datatypes and extension errors.
    pub fn base_criteria(&self, datatype: &str) -> Result<Criterion, AnalyticsError> {
        let time_field = self.provider().time_field(datatype)?;
        let extra = self
            .env
            .extensions()
            .filter_criteria(datatype, &self.parameters)?;
        Ok(self.period.get_criteria(&time_field) & extra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{InMemoryDataProvider, Schema};
    use crate::time::{TimeUnit, TimelineMode};
    use chrono::TimeZone;

    fn env() -> Arc<Environment> {
        Arc::new(Environment::new(
            Arc::new(InMemoryDataProvider::new(Schema::alert())),
            AnalyticsConfig::default(),
        ))
    }

    #[test]
    fn test_parameters_multimap() {
        let mut params = RequestParameters::new()
            .with("aggregated_source", "a")
            .with("aggregated_source", "b")
            .with("limit", "10");
        assert_eq!(params.get("aggregated_source"), Some("a"));
        assert_eq!(params.get_all("aggregated_source"), vec!["a", "b"]);

        params.set("aggregated_source", "c");
        assert_eq!(params.get_all("aggregated_source"), vec!["c"]);
        params.remove("limit");
        assert!(!params.contains("limit"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_from_query_string() {
        let params = RequestParameters::from_query_string(
            "?query=alert.classification.text%20%3D%3D%20%27x%27&query_mode=criterion&flag",
        );
        assert_eq!(params.get("query"), Some("alert.classification.text == 'x'"));
        assert_eq!(params.get("query_mode"), Some("criterion"));
        assert_eq!(params.get("flag"), Some(""));
    }

    #[test]
    fn test_context_resolves_period() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        let params = RequestParameters::new()
            .with("timeline_mode", "relative")
            .with("timeline_value", "2")
            .with("timeline_unit", "hour");
        let ctx = RequestContext::new(env(), params, Timezone::utc(), now).unwrap();

        assert_eq!(ctx.period().parameters().mode, TimelineMode::Relative);
        let (start, end) = ctx.period().bounds().unwrap();
        assert_eq!(end - start, chrono::TimeDelta::hours(2));
        assert_eq!(ctx.period().get_step(None).unwrap().unit, TimeUnit::Minute);
    }

    #[test]
    fn test_context_rejects_bad_timeline() {
        let params = RequestParameters::new().with("timeline_unit", "fortnight");
        let err = RequestContext::new(env(), params, Timezone::utc(), Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            AnalyticsError::InvalidParameterValue { ref name, .. } if name == "timeline_unit"
        ));
    }

    #[test]
    fn test_query_mode_parameter() {
        let params = RequestParameters::new().with("query_mode", "lucene");
        let ctx = RequestContext::new(env(), params, Timezone::utc(), Utc::now()).unwrap();
        assert_eq!(ctx.query_mode().unwrap(), QueryMode::Lucene);

        let params = RequestParameters::new().with("query_mode", "sql");
        let ctx = RequestContext::new(env(), params, Timezone::utc(), Utc::now()).unwrap();
        assert!(ctx.query_mode().is_err());
    }

    #[test]
    fn test_base_criteria_bounds_time_field() {
        let ctx = RequestContext::new(env(), RequestParameters::new(), Timezone::utc(), Utc::now())
            .unwrap();
        let criteria = ctx.base_criteria("alert").unwrap();
        let paths: Vec<String> = criteria.paths().iter().map(ToString::to_string).collect();
        assert_eq!(paths, vec!["alert.create_time", "alert.create_time"]);
    }

    #[test]
    fn test_endpoints() {
        let endpoints = Endpoints::default();
        assert_eq!(endpoints.listing("alert"), Some("/alerts"));
        assert_eq!(endpoints.listing("netflow"), None);
        assert_eq!(endpoints.summary(), "/alerts/summary");
    }
}
