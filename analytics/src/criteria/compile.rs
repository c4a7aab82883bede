//! Path resolution for parsed filters.

use super::{parse_criteria, parse_lucene, Criterion, Operator, Path, QueryMode};
use crate::error::AnalyticsError;
use crate::provider::DataProvider;
use crate::value::Value;
use std::collections::HashMap;

/// Turns one `path op value` term into a criterion.
pub trait CriterionCompiler {
    /// Compiles one comparison.
    ///
    /// # Errors
    ///
    /// Returns an error when the path cannot be resolved.
    fn compile(&self, path: &Path, operator: Operator, value: Value)
        -> Result<Criterion, AnalyticsError>;

    /// Paths searched by free-text terms.
    fn default_paths(&self) -> Vec<Path> {
        Vec::new()
    }
}

/// Keeps every path as written.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainCompiler;

impl CriterionCompiler for PlainCompiler {
    fn compile(
        &self,
        path: &Path,
        operator: Operator,
        value: Value,
    ) -> Result<Criterion, AnalyticsError> {
        Ok(Criterion::compare(path.clone(), operator, value))
    }
}

/// Virtual paths per datatype and the concrete paths they stand for.
#[derive(Debug, Clone, Default)]
pub struct PathTranslations {
    entries: HashMap<(String, String), Vec<Path>>,
}

impl PathTranslations {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The alert and heartbeat shortcuts.
    #[must_use]
    pub fn idmef() -> Self {
        fn paths(list: &[&str]) -> Vec<Path> {
            list.iter().map(|p| Path::new(p)).collect()
        }

        Self::new()
            .with("alert", "classification", paths(&["alert.classification.text"]))
            .with(
                "alert",
                "source",
                paths(&["alert.source.node.address.address", "alert.source.node.name"]),
            )
            .with(
                "alert",
                "target",
                paths(&["alert.target.node.address.address", "alert.target.node.name"]),
            )
            .with(
                "alert",
                "analyzer",
                paths(&["alert.analyzer.name", "alert.analyzer.node.name"]),
            )
            .with(
                "alert",
                "analyzer(-1)",
                paths(&["alert.analyzer(-1).name", "alert.analyzer(-1).node.name"]),
            )
            .with(
                "alert",
                "severity",
                paths(&["alert.assessment.impact.severity"]),
            )
            .with(
                "heartbeat",
                "analyzer(-1)",
                paths(&["heartbeat.analyzer(-1).name", "heartbeat.analyzer(-1).node.name"]),
            )
    }

    /// Adds a translation.
    #[must_use]
    pub fn with(mut self, datatype: &str, name: &str, targets: Vec<Path>) -> Self {
        self.insert(datatype, name, targets);
        self
    }

    /// Adds or replaces a translation.
    pub fn insert(&mut self, datatype: &str, name: &str, targets: Vec<Path>) {
        self.entries
            .insert((datatype.to_string(), name.to_string()), targets);
    }

    /// The concrete paths behind `path`, if it is virtual.
    #[must_use]
    pub fn get(&self, datatype: &str, path: &Path) -> Option<&[Path]> {
        self.entries
            .get(&(datatype.to_string(), path.to_string()))
            .map(Vec::as_slice)
    }
}

/// Compiles user queries against one datatype of a provider.
///
/// Paths are rooted in the datatype, virtual paths expand through the
/// translation table, and operators the provider does not support for a
/// path degrade to `==` or `!=`.
pub struct QueryCompiler<'a> {
    provider: &'a dyn DataProvider,
    translations: &'a PathTranslations,
    datatype: &'a str,
}

impl<'a> QueryCompiler<'a> {
    /// Creates a compiler for `datatype`.
    #[must_use]
    pub fn new(
        provider: &'a dyn DataProvider,
        translations: &'a PathTranslations,
        datatype: &'a str,
    ) -> Self {
        Self {
            provider,
            translations,
            datatype,
        }
    }

    /// Compiles `query` written in `mode`.
    ///
    /// Lucene queries against a datatype whose backend speaks Lucene are
    /// handed over unparsed as `{datatype}._raw_query == query`.
    ///
    /// # Errors
    ///
    /// Returns parse errors and path resolution errors.
    pub fn compile_query(&self, query: &str, mode: QueryMode) -> Result<Criterion, AnalyticsError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Criterion::Empty);
        }

        let criterion = match mode {
            QueryMode::Lucene
                if self.provider.default_query_mode(self.datatype) == QueryMode::Lucene =>
            {
                Criterion::raw_query(self.datatype, query)
            }
            QueryMode::Lucene => parse_lucene(query, self)?,
            QueryMode::Criterion => parse_criteria(query, self)?,
        };
        tracing::debug!(datatype = self.datatype, %mode, criteria = %criterion, "Compiled query");
        Ok(criterion)
    }

    fn supported_operator(&self, path: &Path, operator: Operator) -> Result<Operator, AnalyticsError> {
        let info = self.provider.path_info(self.datatype, path)?;
        if info.supports(operator) {
            Ok(operator)
        } else if operator.is_negative() {
            Ok(Operator::NotEq)
        } else {
            Ok(Operator::Eq)
        }
    }
}

/// True when every expansion must hold rather than any one of them.
fn is_universal(operator: Operator, value: &Value) -> bool {
    if value.is_null() {
        operator == Operator::Eq
    } else {
        operator.is_negative()
    }
}

impl CriterionCompiler for QueryCompiler<'_> {
    fn compile(
        &self,
        path: &Path,
        operator: Operator,
        value: Value,
    ) -> Result<Criterion, AnalyticsError> {
        let Some(targets) = self.translations.get(self.datatype, path) else {
            let path = path.with_root(self.datatype);
            let operator = self.supported_operator(&path, operator)?;
            return Ok(Criterion::compare(path, operator, value));
        };

        let parts = targets
            .iter()
            .map(|target| {
                let operator = self.supported_operator(target, operator)?;
                Ok(Criterion::compare(target.clone(), operator, value.clone()))
            })
            .collect::<Result<Vec<_>, AnalyticsError>>()?;

        Ok(if is_universal(operator, &value) {
            Criterion::and_all(parts)
        } else {
            Criterion::or_all(parts)
        })
    }

    fn default_paths(&self) -> Vec<Path> {
        self.provider.default_paths(self.datatype)
    }
}
