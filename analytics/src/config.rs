//! Analytics configuration.
//!
//! Values can be set via environment variables:
//! - `ALERTLENS_MAX_AGGREGATED_SOURCE`: source rows shown per aggregated alert (default: 3)
//! - `ALERTLENS_MAX_AGGREGATED_TARGET`: target rows shown per aggregated alert (default: 3)
//! - `ALERTLENS_MAX_AGGREGATED_CLASSIFICATION`: classification sub-rows shown per aggregated alert (default: 10)
//! - `ALERTLENS_LISTING_LIMIT`: listing page size (default: 50)
//! - `ALERTLENS_CHART_POINTS`: target point count of chronology charts (default: 100)
//! - `ALERTLENS_DEFAULT_QUERY_MODE`: `criterion` or `lucene` (default: `criterion`)

use crate::criteria::QueryMode;
use crate::error::AnalyticsError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use validator::Validate;

/// Limits and defaults of the listing and chart engines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct AnalyticsConfig {
    /// Maximum number of distinct sources shown per alert row.
    #[validate(range(min = 1, max = 1000))]
    pub max_aggregated_source: usize,
    /// Maximum number of distinct targets shown per alert row.
    #[validate(range(min = 1, max = 1000))]
    pub max_aggregated_target: usize,
    /// Maximum number of classification sub-rows per aggregated row.
    #[validate(range(min = 1, max = 1000))]
    pub max_aggregated_classification: usize,
    /// Default listing page size.
    #[validate(range(min = 1, max = 10000))]
    pub listing_limit: usize,
    /// Target point count of chronology charts.
    #[validate(range(min = 2, max = 10000))]
    pub chart_points: u32,
    /// Query syntax assumed when a request does not name one.
    pub default_query_mode: QueryMode,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            max_aggregated_source: 3,
            max_aggregated_target: 3,
            max_aggregated_classification: 10,
            listing_limit: 50,
            chart_points: 100,
            default_query_mode: QueryMode::Criterion,
        }
    }
}

impl AnalyticsConfig {
    /// Loads the configuration from `ALERTLENS_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::InvalidParameterValue`] naming the first
    /// variable that cannot be parsed.
    pub fn from_env() -> Result<Self, AnalyticsError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads the configuration through `lookup`, which maps a variable name
    /// to its value.
    ///
    /// # Errors
    ///
    /// See [`AnalyticsConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AnalyticsError> {
        let defaults = Self::default();
        Ok(Self {
            max_aggregated_source: read(&lookup, "ALERTLENS_MAX_AGGREGATED_SOURCE")?
                .unwrap_or(defaults.max_aggregated_source),
            max_aggregated_target: read(&lookup, "ALERTLENS_MAX_AGGREGATED_TARGET")?
                .unwrap_or(defaults.max_aggregated_target),
            max_aggregated_classification: read(&lookup, "ALERTLENS_MAX_AGGREGATED_CLASSIFICATION")?
                .unwrap_or(defaults.max_aggregated_classification),
            listing_limit: read(&lookup, "ALERTLENS_LISTING_LIMIT")?
                .unwrap_or(defaults.listing_limit),
            chart_points: read(&lookup, "ALERTLENS_CHART_POINTS")?
                .unwrap_or(defaults.chart_points),
            default_query_mode: read(&lookup, "ALERTLENS_DEFAULT_QUERY_MODE")?
                .unwrap_or(defaults.default_query_mode),
        })
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error describing every out-of-range field.
    pub fn validate(&self) -> Result<(), String> {
        Validate::validate(self).map_err(|e| format!("Invalid analytics configuration: {e}"))
    }
}

fn read<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, AnalyticsError> {
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| AnalyticsError::invalid_value(name, raw.as_str()))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = AnalyticsConfig::default();
        assert_eq!(config.max_aggregated_source, 3);
        assert_eq!(config.max_aggregated_target, 3);
        assert_eq!(config.max_aggregated_classification, 10);
        assert_eq!(config.chart_points, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = AnalyticsConfig::from_lookup(lookup(&[
            ("ALERTLENS_MAX_AGGREGATED_SOURCE", "5"),
            ("ALERTLENS_DEFAULT_QUERY_MODE", "lucene"),
        ]))
        .unwrap();
        assert_eq!(config.max_aggregated_source, 5);
        assert_eq!(config.max_aggregated_target, 3);
        assert_eq!(config.default_query_mode, QueryMode::Lucene);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = AnalyticsConfig::from_lookup(lookup(&[("ALERTLENS_LISTING_LIMIT", "many")]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid value 'many' for parameter 'ALERTLENS_LISTING_LIMIT'"
        );
    }

    #[test]
    fn test_validate_ranges() {
        let config = AnalyticsConfig {
            max_aggregated_classification: 0,
            ..AnalyticsConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("max_aggregated_classification"));
    }
}
