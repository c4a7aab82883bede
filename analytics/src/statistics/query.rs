use crate::criteria::{Criterion, Path, Selection, SortOrder};

/// One series request of a chart.
///
/// `paths` are the grouping dimensions; `aggregation` (defaulting to the
/// chart's, `count(1)`) is the value plotted for each group.
///
/// # Examples
///
/// ```
/// use analytics::criteria::Path;
/// use analytics::statistics::Query;
///
/// let query = Query::new("alert")
///     .path(Path::new("alert.classification.text"))
///     .with_limit(5);
/// assert_eq!(query.limit, Some(5));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Datatype queried.
    pub datatype: String,
    /// Grouping dimensions.
    pub paths: Vec<Path>,
    /// Aggregate selection; the chart default when unset.
    pub aggregation: Option<Selection>,
    /// Number of groups kept; the chart limit when unset.
    pub limit: Option<usize>,
    /// Ordering of the aggregate.
    pub order: SortOrder,
    /// Extra criteria.
    pub criteria: Criterion,
}

impl Query {
    /// An ungrouped query on `datatype`.
    #[must_use]
    pub fn new(datatype: impl Into<String>) -> Self {
        Self {
            datatype: datatype.into(),
            paths: Vec::new(),
            aggregation: None,
            limit: None,
            order: SortOrder::Desc,
            criteria: Criterion::Empty,
        }
    }

    /// Adds a grouping dimension.
    #[must_use]
    pub fn path(mut self, path: Path) -> Self {
        self.paths.push(path);
        self
    }

    /// Sets the aggregate.
    #[must_use]
    pub fn with_aggregation(mut self, aggregation: Selection) -> Self {
        self.aggregation = Some(aggregation);
        self
    }

    /// Sets the group limit.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the ordering.
    #[must_use]
    pub const fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    /// ANDs extra criteria.
    #[must_use]
    pub fn with_criteria(mut self, criteria: Criterion) -> Self {
        self.criteria = self.criteria & criteria;
        self
    }

    /// The equality criteria pinning every dimension to the matching value
    /// of `values`.
    pub(crate) fn group_criteria(&self, values: &[crate::value::Value]) -> Criterion {
        Criterion::and_all(
            self.paths
                .iter()
                .zip(values)
                .map(|(path, value)| Criterion::eq(path.clone(), value.clone())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_group_criteria() {
        let query = Query::new("alert")
            .path(Path::new("alert.classification.text"))
            .path(Path::new("alert.source.node.address.address"));
        let criteria = query.group_criteria(&[Value::from("ssh"), Value::Null]);
        assert_eq!(
            criteria.to_string(),
            "(alert.classification.text == 'ssh' && !alert.source.node.address.address)"
        );
    }

    #[test]
    fn test_with_criteria_accumulates() {
        let query = Query::new("alert")
            .with_criteria(Criterion::eq(Path::new("alert.messageid"), "1"))
            .with_criteria(Criterion::Empty);
        assert_eq!(query.criteria.to_string(), "alert.messageid == '1'");
    }
}
