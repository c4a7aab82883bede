//! The path-based data-access contract and its in-memory implementation.
//!
//! Every chart and listing talks to storage through [`DataProvider`]:
//! `query` returns rows of selected values (optionally grouped and
//! aggregated), `get` returns whole records. Fields are addressed with
//! [`Path`]s rooted at the datatype, and repeated fields have implicit list
//! semantics: a path without index reaches every element.

mod eval;
mod memory;
mod record;
mod schema;

pub(crate) use eval::has_wildcard;
pub use memory::InMemoryDataProvider;
pub(crate) use record::json_to_value;
pub use record::Record;
pub use schema::{DatatypeSchema, PathInfo, Schema, ValueType};

use crate::criteria::{Criterion, Path, QueryMode, Selection, SortOrder};
use crate::value::Value;
use thiserror::Error;

/// One result row of [`DataProvider::query`], in selection order.
pub type Row = Vec<Value>;

/// Errors that can occur while querying a data provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Failed to acquire lock on the store.
    #[error("Failed to acquire lock on data store")]
    LockError,

    /// The user may not read this datatype.
    #[error("Permission denied on datatype '{0}'")]
    PermissionDenied(String),

    /// No backend serves this datatype.
    #[error("No backend for datatype '{0}'")]
    NoBackend(String),

    /// The path does not exist in the datatype.
    #[error("Invalid path: '{0}'")]
    InvalidPath(String),

    /// The backend rejected the criteria.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Generic storage error.
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Parameters of [`DataProvider::query`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    /// Datatype queried.
    pub datatype: String,
    /// Selected columns.
    pub selection: Vec<Selection>,
    /// Row filter.
    pub criteria: Criterion,
    /// Maximum number of rows.
    pub limit: Option<usize>,
    /// Rows skipped before the first returned one.
    pub offset: usize,
}

impl QueryRequest {
    /// A request selecting `selection` from every record of `datatype`.
    #[must_use]
    pub fn new(datatype: impl Into<String>, selection: Vec<Selection>) -> Self {
        Self {
            datatype: datatype.into(),
            selection,
            criteria: Criterion::Empty,
            limit: None,
            offset: 0,
        }
    }

    /// Sets the row filter.
    #[must_use]
    pub fn with_criteria(mut self, criteria: Criterion) -> Self {
        self.criteria = criteria;
        self
    }

    /// Sets the maximum number of rows.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the number of rows to skip.
    #[must_use]
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// Parameters of [`DataProvider::get`].
#[derive(Debug, Clone, PartialEq)]
pub struct GetRequest {
    /// Datatype read.
    pub datatype: String,
    /// Record filter.
    pub criteria: Criterion,
    /// Maximum number of records.
    pub limit: Option<usize>,
    /// Records skipped before the first returned one.
    pub offset: usize,
    /// Ordering on the datatype's time field.
    pub order: SortOrder,
}

impl GetRequest {
    /// Newest-first request for every record of `datatype`.
    #[must_use]
    pub fn new(datatype: impl Into<String>) -> Self {
        Self {
            datatype: datatype.into(),
            criteria: Criterion::Empty,
            limit: None,
            offset: 0,
            order: SortOrder::Desc,
        }
    }

    /// Sets the record filter.
    #[must_use]
    pub fn with_criteria(mut self, criteria: Criterion) -> Self {
        self.criteria = criteria;
        self
    }

    /// Sets the maximum number of records.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the number of records to skip.
    #[must_use]
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Sets the time ordering.
    #[must_use]
    pub const fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }
}

/// Access to stored records.
///
/// Implementations must be thread-safe (Send + Sync).
pub trait DataProvider: Send + Sync {
    /// Selects columns from the records matching the request criteria.
    ///
    /// Selections carrying `group_by` or an aggregate make the query
    /// grouped: one row per distinct combination of the non-aggregate
    /// columns.
    ///
    /// # Errors
    ///
    /// Returns an error if the datatype is not readable or the criteria are
    /// rejected.
    fn query(&self, request: &QueryRequest) -> Result<Vec<Row>, ProviderError>;

    /// Fetches whole records, ordered on the time field.
    ///
    /// # Errors
    ///
    /// Returns an error if the datatype is not readable or the criteria are
    /// rejected.
    fn get(&self, request: &GetRequest) -> Result<Vec<Record>, ProviderError>;

    /// Describes a path: its value type and supported operators.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidPath`] for unknown paths.
    fn path_info(&self, datatype: &str, path: &Path) -> Result<PathInfo, ProviderError>;

    /// The timestamp path of a datatype.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NoBackend`] for unknown datatypes.
    fn time_field(&self, datatype: &str) -> Result<Path, ProviderError>;

    /// True when the datatype holds continuous measurements rather than
    /// countable events.
    fn is_continuous(&self, datatype: &str) -> bool;

    /// The query syntax the datatype's backend understands natively.
    fn default_query_mode(&self, datatype: &str) -> QueryMode;

    /// Paths searched by free-text terms.
    fn default_paths(&self, datatype: &str) -> Vec<Path>;
}
