use super::chart::{ChartBase, ChartOptions, ChartOutput, LinkMode};
use super::diagram::with_default_aggregation;
use super::Query;
use crate::context::RequestContext;
use crate::criteria::{Criterion, Extract, Selection, SortOrder};
use crate::error::AnalyticsError;
use crate::render::{ChartData, RendererItem};
use crate::time::{Step, TimePeriod, TimeUnit};
use crate::url::Link;
use crate::value::Value;
use chrono::{DateTime, Datelike, FixedOffset, Timelike};
use std::collections::HashMap;

/// Chart types a chronology can be drawn as.
pub const CHRONOLOGY_TYPES: [&str; 3] = ["timeline", "timearea", "timebar"];

/// Bucketed values of one series, keyed by calendar fields from the year
/// down to the step unit.
type Buckets = HashMap<Vec<i64>, Value>;

/// A time-series chart: the aggregate of each group per time bucket.
///
/// With several queries, each contributes one series named after its
/// aggregate, e.g. `count(heartbeat)`.
pub struct ChronologyChart<'a> {
    base: ChartBase<'a>,
    queries: Vec<Query>,
}

impl<'a> ChronologyChart<'a> {
    /// Builds a chronology over one or more queries.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::MissingParameter`] without a query and
    /// [`AnalyticsError::InvalidParameterValue`] for a chart type that is
    /// not a chronology type.
    pub fn new(
        ctx: &'a RequestContext,
        queries: Vec<Query>,
        options: ChartOptions,
    ) -> Result<Self, AnalyticsError> {
        if queries.is_empty() {
            return Err(AnalyticsError::MissingParameter("query".into()));
        }
        let base = ChartBase::new(ctx, options, &CHRONOLOGY_TYPES, "timebar", LinkMode::Zoom)?;
        Ok(Self { base, queries })
    }

    /// The bucket step of the chart.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::Time`] for an unbounded period.
    pub fn step(&self) -> Result<Step, AnalyticsError> {
        let points = self.base.ctx.env().config().chart_points;
        Ok(self.base.period.get_step(Some(points))?)
    }

    fn bucket_selection(&self, query: &Query, unit: TimeUnit) -> Result<Vec<Selection>, AnalyticsError> {
        let time_field = self.base.ctx.provider().time_field(&query.datatype)?;
        let zone = self.base.period.timezone().name().to_string();
        Ok(TimeUnit::ALL[..=unit.index()]
            .iter()
            .map(|u| {
                Selection::timezone(time_field.clone(), zone.clone())
                    .with_extract(Extract::from(*u))
                    .order(SortOrder::Asc)
                    .group_by()
            })
            .collect())
    }

    /// The series of `query`, in legend order.
    ///
    /// When the query has dimensions and a positive limit, the top groups
    /// over the whole window are selected first and only they are
    /// bucketed.
    fn series(&self, query: &Query, unit: TimeUnit) -> Result<Vec<(String, Buckets)>, AnalyticsError> {
        let query = with_default_aggregation(query);
        let (selection, criteria) = self.base.prepare_query(&query)?;
        let limit = self.base.limit(&query);
        if limit == Some(0) {
            return Ok(Vec::new());
        }

        let mut order: Vec<Vec<Value>> = Vec::new();
        let mut top = Criterion::Empty;
        if limit.is_some() && !query.paths.is_empty() {
            let rows = self
                .base
                .run(&query.datatype, selection.clone(), criteria.clone(), limit)?;
            for row in rows {
                top = top | query.group_criteria(&row[1..]);
                order.push(row[1..].to_vec());
            }
        }

        let dimensions = query.paths.len();
        let precision = unit.index() + 1;
        let mut full = selection;
        full.extend(self.bucket_selection(&query, unit)?);
        let rows = self.base.run(&query.datatype, full, criteria & top, None)?;

        let mut groups: Vec<(Vec<Value>, Buckets)> = Vec::new();
        for row in rows {
            let key = &row[1..=dimensions];
            let Some(bucket) = row[dimensions + 1..]
                .iter()
                .take(precision)
                .map(Value::as_i64)
                .collect::<Option<Vec<i64>>>()
            else {
                continue;
            };

            let index = match groups.iter().position(|(k, _)| k.as_slice() == key) {
                Some(index) => index,
                None => {
                    groups.push((key.to_vec(), Buckets::new()));
                    groups.len() - 1
                }
            };
            groups[index].1.insert(bucket, row[0].clone());
        }

        if !order.is_empty() {
            groups = order
                .into_iter()
                .map(|key| {
                    let buckets = groups
                        .iter()
                        .position(|(k, _)| *k == key)
                        .map(|i| groups[i].1.clone())
                        .unwrap_or_default();
                    (key, buckets)
                })
                .collect();
        }

        Ok(groups
            .into_iter()
            .map(|(key, buckets)| (self.series_label(&key), buckets))
            .collect())
    }

    fn series_label(&self, key: &[Value]) -> String {
        if key.is_empty() {
            self.base.options.title.clone()
        } else {
            key.iter().map(Value::to_label).collect::<Vec<_>>().join(", ")
        }
    }

    /// The series of every query with the value of empty buckets.
    fn collect_series(&self, unit: TimeUnit) -> Result<Vec<(String, Buckets, Value)>, AnalyticsError> {
        let provider = self.base.ctx.provider();
        let empty = |datatype: &str| {
            if provider.is_continuous(datatype) {
                Value::Null
            } else {
                Value::Integer(0)
            }
        };

        if let [query] = self.queries.as_slice() {
            let series = ChartBase::tolerate(self.series(query, unit))?;
            return Ok(series
                .into_iter()
                .map(|(label, buckets)| (label, buckets, empty(&query.datatype)))
                .collect());
        }

        let title = &self.base.options.title;
        let mut out = Vec::with_capacity(self.queries.len());
        for query in &self.queries {
            let aggregation = with_default_aggregation(query)
                .aggregation
                .map(|a| a.to_string())
                .unwrap_or_default();
            let legend = aggregation.replace("(1)", &format!("({})", query.datatype));
            let buckets = ChartBase::tolerate(self.series(query, unit))?
                .into_iter()
                .find(|(label, _)| label == title)
                .map(|(_, buckets)| buckets)
                .unwrap_or_default();
            out.push((legend, buckets, empty(&query.datatype)));
        }
        Ok(out)
    }

    /// The period parameters of a bucket's zoom link.
    fn zoom_parameters(
        &self,
        start: &DateTime<FixedOffset>,
        next: &DateTime<FixedOffset>,
        end: &DateTime<FixedOffset>,
    ) -> Vec<(&'static str, String)> {
        let mut last = TimePeriod::mktime_param(next, None);
        if next != end {
            last -= 1;
        }

        let mut params: Vec<(&'static str, String)> = self
            .base
            .period
            .get_parameters()
            .into_iter()
            .filter(|(name, _)| !matches!(*name, "timeline_mode" | "timeline_start" | "timeline_end"))
            .collect();
        params.push(("timeline_mode", "custom".to_string()));
        params.push(("timeline_start", TimePeriod::mktime_param(start, None).to_string()));
        params.push(("timeline_end", last.to_string()));
        params
    }

    /// Walks the window bucket by bucket and returns the series, the
    /// x-axis labels and the step used.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::Time`] for an unbounded period, and query
    /// errors other than permission or backend denial.
    pub fn get_data(&self) -> Result<(ChartData, Vec<String>, Step), AnalyticsError> {
        let step = self.step()?;
        let series = self.collect_series(step.unit)?;
        let precision = step.unit.index() + 1;
        let (mut cursor, end) = self.base.period.bounds()?;
        let timezone = self.base.period.timezone();

        let zoom = self.base.options.period.is_none();
        let can_zoom = step.unit > TimeUnit::Minute;
        let first = &self.queries[0];

        let mut values: Vec<Vec<Value>> = vec![Vec::new(); series.len()];
        let mut links: Vec<Link> = Vec::new();
        let mut xlegend = Vec::new();

        while cursor < end {
            let next = timezone
                .truncate(&timezone.add(&cursor, step.delta)?, step.unit)?
                .min(end);
            if next <= cursor {
                break;
            }

            if zoom {
                let params = self.zoom_parameters(&cursor, &next, &end);
                if let Some(link) = self.base.make_link(&first.datatype, !can_zoom, &first.criteria, params) {
                    links.push(link);
                }
            }

            let key = calendar_key(&cursor, precision);
            for ((_, buckets, empty), out) in series.iter().zip(values.iter_mut()) {
                out.push(buckets.get(&key).cloned().unwrap_or_else(|| empty.clone()));
            }
            xlegend.push(cursor.format(step.unit_format).to_string());
            cursor = next;
        }

        let items = series
            .into_iter()
            .zip(values)
            .map(|((label, _, _), values)| RendererItem::series(label, values, links.clone()))
            .collect();
        Ok((ChartData::Chronology(items), xlegend, step))
    }

    /// Queries and renders the chart.
    ///
    /// # Errors
    ///
    /// See [`ChronologyChart::get_data`].
    pub fn render(self) -> Result<ChartOutput, AnalyticsError> {
        let (data, xlegend, step) = self.get_data()?;
        tracing::debug!(unit = %step.unit, points = xlegend.len(), "Built chronology");
        self.base.finish(data, Vec::new(), xlegend)
    }
}

fn calendar_key(dt: &DateTime<FixedOffset>, precision: usize) -> Vec<i64> {
    let fields = [
        i64::from(dt.year()),
        i64::from(dt.month()),
        i64::from(dt.day()),
        i64::from(dt.hour()),
        i64::from(dt.minute()),
        i64::from(dt.second()),
        i64::from(dt.nanosecond() / 1_000_000),
        i64::from(dt.nanosecond() / 1_000 % 1_000),
    ];
    fields[..precision.min(fields.len())].to_vec()
}
