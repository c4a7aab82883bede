use super::chart::{ChartBase, ChartOptions, ChartOutput, LinkMode};
use super::Query;
use crate::context::RequestContext;
use crate::criteria::{Criterion, Selection};
use crate::error::AnalyticsError;
use crate::render::{ChartData, RendererItem};
use crate::value::Value;

/// Chart types a diagram can be drawn as.
pub const DIAGRAM_TYPES: [&str; 8] = [
    "pie",
    "bar",
    "horizontal-bar",
    "radar",
    "polar",
    "doughnut",
    "line",
    "table",
];

/// A categorical chart: one point per group of the first query.
///
/// With a second query, every group of the first one becomes a sub-chart
/// of the second query restricted to that group.
pub struct DiagramChart<'a> {
    base: ChartBase<'a>,
    queries: Vec<Query>,
}

struct Category {
    value: Value,
    labels: Vec<String>,
    criteria: Criterion,
}

impl<'a> DiagramChart<'a> {
    /// Builds a diagram over one or two queries.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::MissingParameter`] without a query and
    /// [`AnalyticsError::InvalidParameterValue`] for a chart type that is
    /// not a diagram type.
    pub fn new(
        ctx: &'a RequestContext,
        queries: Vec<Query>,
        options: ChartOptions,
    ) -> Result<Self, AnalyticsError> {
        if queries.is_empty() {
            return Err(AnalyticsError::MissingParameter("query".into()));
        }
        let base = ChartBase::new(ctx, options, &DIAGRAM_TYPES, "bar", LinkMode::Immediate)?;
        Ok(Self { base, queries })
    }

    fn categories(&self, query: &Query) -> Result<Vec<Category>, AnalyticsError> {
        let query = with_default_aggregation(query);
        let (selection, criteria) = self.base.prepare_query(&query)?;
        let rows = self
            .base
            .run(&query.datatype, selection, criteria, self.base.limit(&query))?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let (value, groups) = row.split_first()?;
                Some(Category {
                    value: value.clone(),
                    labels: groups.iter().map(Value::to_label).collect(),
                    criteria: query.group_criteria(groups),
                })
            })
            .collect())
    }

    fn series(&self, query: &Query) -> Result<Vec<RendererItem>, AnalyticsError> {
        let categories = ChartBase::tolerate(self.categories(query))?;
        Ok(categories
            .into_iter()
            .map(|category| {
                let link = self.base.make_link(
                    &query.datatype,
                    false,
                    &(category.criteria & query.criteria.clone()),
                    self.base.period.get_parameters(),
                );
                RendererItem::point(category.value, category.labels, link)
            })
            .collect())
    }

    /// The chart points, and the sub-chart titles of a two-level diagram.
    ///
    /// # Errors
    ///
    /// Returns query errors other than permission or backend denial.
    pub fn get_data(&self) -> Result<(ChartData, Vec<String>), AnalyticsError> {
        let first = &self.queries[0];
        let Some(second) = self.queries.get(1) else {
            return Ok((ChartData::Diagram(vec![self.series(first)?]), Vec::new()));
        };

        let mut groups = Vec::new();
        let mut subtitles = Vec::new();
        for category in ChartBase::tolerate(self.categories(first))? {
            let label = category.labels.join(", ");
            let subquery = second.clone().with_criteria(category.criteria);
            groups.push(self.series(&subquery)?);
            subtitles.push(label);
        }

        Ok((ChartData::Diagram(groups), subtitles))
    }

    /// Queries and renders the chart.
    ///
    /// # Errors
    ///
    /// See [`DiagramChart::get_data`].
    pub fn render(self) -> Result<ChartOutput, AnalyticsError> {
        let (data, subtitles) = self.get_data()?;
        self.base.finish(data, subtitles, Vec::new())
    }
}

pub(super) fn with_default_aggregation(query: &Query) -> Query {
    let mut query = query.clone();
    if query.aggregation.is_none() {
        query.aggregation = Some(Selection::count_all());
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::Path;
    use crate::testing::{alert, context, env, provider};
    use crate::time::{PeriodParameters, TimeUnit, TimelineUnit};

    fn alerts() -> Vec<serde_json::Value> {
        vec![
            alert("1", 10, "ssh", "10.0.0.1"),
            alert("2", 20, "ssh", "10.0.0.2"),
            alert("3", 30, "ssh", "10.0.0.1"),
            alert("4", 40, "ping", "10.0.0.1"),
            alert("5", 60 * 48, "old", "10.0.0.9"),
        ]
    }

    fn classification() -> Query {
        Query::new("alert").path(Path::new("alert.classification.text"))
    }

    #[test]
    fn test_single_query_points() {
        let ctx = context(env(provider(alerts())), &[]);
        let chart = DiagramChart::new(&ctx, vec![classification()], ChartOptions::titled("Top"))
            .unwrap();
        let (data, subtitles) = chart.get_data().unwrap();
        assert!(subtitles.is_empty());

        let ChartData::Diagram(groups) = data else {
            panic!("Expected diagram data");
        };
        assert_eq!(groups.len(), 1);
        let points: Vec<(Value, String)> = groups[0].iter().map(|i| (i.value(), i.label())).collect();
        assert_eq!(
            points,
            vec![
                (Value::Integer(3), "ssh".to_string()),
                (Value::Integer(1), "ping".to_string()),
            ]
        );

        let link = groups[0][0].links[0].to_string();
        assert!(link.starts_with("/alerts?timeline_mode=relative"));
        assert!(link.contains("query=alert.classification.text%20%3D%3D%20%27ssh%27"));
        assert!(link.contains("query_mode=criterion"));
    }

    #[test]
    fn test_limit_bounds_points() {
        let ctx = context(env(provider(alerts())), &[]);
        let chart = DiagramChart::new(
            &ctx,
            vec![classification().with_limit(1)],
            ChartOptions::default(),
        )
        .unwrap();
        let (ChartData::Diagram(groups), _) = chart.get_data().unwrap() else {
            panic!("Expected diagram data");
        };
        assert_eq!(groups[0].len(), 1);
    }

    #[test]
    fn test_nested_query_makes_subcharts() {
        let ctx = context(env(provider(alerts())), &[]);
        let chart = DiagramChart::new(
            &ctx,
            vec![
                classification(),
                Query::new("alert").path(Path::new("alert.source.node.address.address")),
            ],
            ChartOptions::default(),
        )
        .unwrap();

        let (ChartData::Diagram(groups), subtitles) = chart.get_data().unwrap() else {
            panic!("Expected diagram data");
        };
        assert_eq!(subtitles, vec!["ssh", "ping"]);
        let ssh: Vec<(Value, String)> = groups[0].iter().map(|i| (i.value(), i.label())).collect();
        assert_eq!(
            ssh,
            vec![
                (Value::Integer(2), "10.0.0.1".to_string()),
                (Value::Integer(1), "10.0.0.2".to_string()),
            ]
        );
        assert_eq!(groups[1].len(), 1);
    }

    #[test]
    fn test_fixed_period_widens_window() {
        let ctx = context(env(provider(alerts())), &[]);
        let options = ChartOptions::default()
            .with_period(PeriodParameters::relative(1, TimelineUnit::Unit(TimeUnit::Month)));
        let chart = DiagramChart::new(&ctx, vec![classification()], options).unwrap();
        let (ChartData::Diagram(groups), _) = chart.get_data().unwrap() else {
            panic!("Expected diagram data");
        };
        assert_eq!(groups[0].len(), 3);
    }

    #[test]
    fn test_denied_datatype_renders_no_data() {
        let denied = crate::provider::InMemoryDataProvider::new(crate::provider::Schema::alert())
            .deny("alert");
        let ctx = context(env(std::sync::Arc::new(denied)), &[]);
        let chart = DiagramChart::new(
            &ctx,
            vec![classification()],
            ChartOptions::default().with_chart_type("table"),
        )
        .unwrap();
        let output = chart.render().unwrap();
        assert!(output.data.is_empty());
        assert!(output.rendering.html.contains(crate::render::NO_DATA_MESSAGE));
    }

    #[test]
    fn test_rejects_unknown_chart_type() {
        let ctx = context(env(provider(vec![])), &[]);
        let err = DiagramChart::new(
            &ctx,
            vec![classification()],
            ChartOptions::default().with_chart_type("timebar"),
        )
        .err()
        .unwrap();
        assert!(matches!(err, AnalyticsError::InvalidParameterValue { .. }));
    }
}
