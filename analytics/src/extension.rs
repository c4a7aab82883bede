//! Typed extension points.
//!
//! Extensions are registered once at startup in an [`ExtensionRegistry`]
//! and consulted at fixed points: every chart and listing query ANDs the
//! criteria of the registered [`CriteriaFilterProvider`]s, and the flat
//! alert listing asks every [`ColumnProvider`] for one extra cell per alert.

use crate::context::RequestParameters;
use crate::criteria::Criterion;
use crate::error::AnalyticsError;
use crate::provider::Record;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Contributes criteria to every query on a datatype.
pub trait CriteriaFilterProvider: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Criteria to AND into queries on `datatype` for this request, or
    /// [`Criterion::Empty`] to leave them unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error when the request selects an unusable filter.
    fn criteria(
        &self,
        datatype: &str,
        parameters: &RequestParameters,
    ) -> Result<Criterion, AnalyticsError>;
}

/// Adds one column to the flat alert listing.
pub trait ColumnProvider: Send + Sync {
    /// Column title.
    fn name(&self) -> &str;

    /// The cell of `record`, `Null` when there is nothing to show.
    fn cell(&self, record: &Record) -> Value;
}

/// The registered extensions.
#[derive(Default, Clone)]
pub struct ExtensionRegistry {
    filters: Vec<Arc<dyn CriteriaFilterProvider>>,
    columns: Vec<Arc<dyn ColumnProvider>>,
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("filters", &self.filters.iter().map(|p| p.name()).collect::<Vec<_>>())
            .field("columns", &self.column_names())
            .finish()
    }
}

impl ExtensionRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a criteria filter.
    #[must_use]
    pub fn with_filter(mut self, provider: Arc<dyn CriteriaFilterProvider>) -> Self {
        self.filters.push(provider);
        self
    }

    /// Registers a listing column.
    #[must_use]
    pub fn with_column(mut self, provider: Arc<dyn ColumnProvider>) -> Self {
        self.columns.push(provider);
        self
    }

    /// The conjunction of every filter's criteria for `datatype`.
    ///
    /// # Errors
    ///
    /// Returns the first filter error.
    pub fn filter_criteria(
        &self,
        datatype: &str,
        parameters: &RequestParameters,
    ) -> Result<Criterion, AnalyticsError> {
        self.filters.iter().try_fold(Criterion::Empty, |acc, provider| {
            let criteria = provider.criteria(datatype, parameters)?;
            if !criteria.is_empty() {
                tracing::debug!(filter = provider.name(), datatype, %criteria, "Applying extension filter");
            }
            Ok(acc & criteria)
        })
    }

    /// The registered columns.
    #[must_use]
    pub fn columns(&self) -> &[Arc<dyn ColumnProvider>] {
        &self.columns
    }

    /// Titles of the registered columns.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name().to_string()).collect()
    }
}

/// Named filters selected with the `filter` request parameter.
///
/// Each filter holds criteria per datatype; a request naming a filter gets
/// its criteria for the queried datatype.
#[derive(Debug, Clone, Default)]
pub struct SavedFilters {
    filters: HashMap<String, HashMap<String, Criterion>>,
}

impl SavedFilters {
    /// No saved filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Saves `criteria` for `datatype` under `name`.
    #[must_use]
    pub fn with(mut self, name: &str, datatype: &str, criteria: Criterion) -> Self {
        self.filters
            .entry(name.to_string())
            .or_default()
            .insert(datatype.to_string(), criteria);
        self
    }
}

impl CriteriaFilterProvider for SavedFilters {
    fn name(&self) -> &str {
        "saved-filters"
    }

    fn criteria(
        &self,
        datatype: &str,
        parameters: &RequestParameters,
    ) -> Result<Criterion, AnalyticsError> {
        let Some(name) = parameters.get("filter") else {
            return Ok(Criterion::Empty);
        };
        let filter = self
            .filters
            .get(name)
            .ok_or_else(|| AnalyticsError::invalid_value("filter", name))?;
        Ok(filter.get(datatype).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::Path;
    use serde_json::json;

    struct Analyzer;

    impl ColumnProvider for Analyzer {
        fn name(&self) -> &str {
            "Analyzer"
        }

        fn cell(&self, record: &Record) -> Value {
            record.first(&Path::new("alert.analyzer(-1).name"))
        }
    }

    fn saved() -> SavedFilters {
        SavedFilters::new().with(
            "ssh",
            "alert",
            Criterion::eq(Path::new("alert.classification.text"), "ssh"),
        )
    }

    #[test]
    fn test_saved_filter_applies_to_its_datatype() {
        let registry = ExtensionRegistry::new().with_filter(Arc::new(saved()));
        let params = RequestParameters::new().with("filter", "ssh");

        let criteria = registry.filter_criteria("alert", &params).unwrap();
        assert_eq!(criteria.to_string(), "alert.classification.text == 'ssh'");
        assert!(registry.filter_criteria("heartbeat", &params).unwrap().is_empty());
        assert!(registry
            .filter_criteria("alert", &RequestParameters::new())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_unknown_saved_filter_is_rejected() {
        let registry = ExtensionRegistry::new().with_filter(Arc::new(saved()));
        let params = RequestParameters::new().with("filter", "nope");
        assert!(matches!(
            registry.filter_criteria("alert", &params),
            Err(AnalyticsError::InvalidParameterValue { .. })
        ));
    }

    #[test]
    fn test_columns() {
        let registry = ExtensionRegistry::new().with_column(Arc::new(Analyzer));
        assert_eq!(registry.column_names(), vec!["Analyzer"]);

        let record = Record::new("alert", json!({"analyzer": [{"name": "a"}, {"name": "b"}]}));
        assert_eq!(registry.columns()[0].cell(&record), Value::from("b"));
    }
}
