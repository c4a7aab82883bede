use super::Query;
use crate::context::RequestContext;
use crate::criteria::{Criterion, QueryMode, Selection};
use crate::error::AnalyticsError;
use crate::provider::{QueryRequest, Row};
use crate::render::{ChartData, Palette, RenderOptions, Rendering};
use crate::time::{PeriodParameters, TimePeriod};
use crate::url::Link;
use serde::Serialize;

/// Where chart links lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    /// No links.
    Disabled,
    /// Links open the datatype listing.
    Immediate,
    /// Links open `link_view` (the listing when unset) narrowed to the point.
    Zoom,
}

/// Presentation and linking options shared by every chart.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartOptions {
    /// Chart title, also the series name of an ungrouped chronology.
    pub title: String,
    /// Chart type; the chart's default when unset.
    pub chart_type: Option<String>,
    /// Number of groups kept per query; `None` keeps them all.
    pub limit: Option<usize>,
    /// A fixed period replacing the request's; disables zoom links.
    pub period: Option<PeriodParameters>,
    /// Link behavior; the chart's default when unset.
    pub link_mode: Option<LinkMode>,
    /// Endpoint of zoom links.
    pub link_view: Option<String>,
    /// Parameters replacing the criteria of links to `link_view`.
    pub link_params: Vec<(String, String)>,
    /// Series labels and colors.
    pub palette: Palette,
}

/// Default number of groups per chart query.
pub const DEFAULT_LIMIT: usize = 10;

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            title: String::new(),
            chart_type: None,
            limit: Some(DEFAULT_LIMIT),
            period: None,
            link_mode: None,
            link_view: None,
            link_params: Vec::new(),
            palette: Palette::default(),
        }
    }
}

impl ChartOptions {
    /// Options titled `title`.
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Sets the chart type.
    #[must_use]
    pub fn with_chart_type(mut self, chart_type: impl Into<String>) -> Self {
        self.chart_type = Some(chart_type.into());
        self
    }

    /// Sets the group limit; `None` keeps every group.
    #[must_use]
    pub const fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Fixes the period.
    #[must_use]
    pub fn with_period(mut self, period: PeriodParameters) -> Self {
        self.period = Some(period);
        self
    }

    /// Sets the link mode.
    #[must_use]
    pub const fn with_link_mode(mut self, mode: LinkMode) -> Self {
        self.link_mode = Some(mode);
        self
    }

    /// Points zoom links to `view` with fixed parameters.
    #[must_use]
    pub fn with_link_view(mut self, view: impl Into<String>, params: Vec<(String, String)>) -> Self {
        self.link_view = Some(view.into());
        self.link_params = params;
        self
    }

    /// Sets the palette.
    #[must_use]
    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = palette;
        self
    }
}

/// A rendered chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartOutput {
    /// Chart title.
    pub title: String,
    /// Chart type rendered.
    pub chart_type: String,
    /// Renderer output.
    pub rendering: Rendering,
    /// The data the renderer received.
    pub data: ChartData,
    /// Presentation options.
    pub options: RenderOptions,
}

/// Machinery shared by the chart kinds: the active period, query
/// preparation, permission-tolerant execution and link building.
pub(crate) struct ChartBase<'a> {
    pub(crate) ctx: &'a RequestContext,
    pub(crate) options: ChartOptions,
    pub(crate) period: TimePeriod,
    pub(crate) chart_type: String,
    link_mode: LinkMode,
}

impl<'a> ChartBase<'a> {
    pub(crate) fn new(
        ctx: &'a RequestContext,
        options: ChartOptions,
        types: &[&str],
        default_type: &str,
        default_link_mode: LinkMode,
    ) -> Result<Self, AnalyticsError> {
        let chart_type = options
            .chart_type
            .clone()
            .unwrap_or_else(|| default_type.to_string());
        if !types.contains(&chart_type.as_str()) {
            return Err(AnalyticsError::invalid_value("chart_type", chart_type));
        }

        let period = match &options.period {
            Some(fixed) => TimePeriod::new(fixed.clone(), ctx.timezone().clone(), ctx.now())?,
            None => ctx.period().clone(),
        };
        let link_mode = options.link_mode.unwrap_or(default_link_mode);

        Ok(Self {
            ctx,
            options,
            period,
            chart_type,
            link_mode,
        })
    }

    pub(crate) fn limit(&self, query: &Query) -> Option<usize> {
        query.limit.or(self.options.limit)
    }

    /// The selections and criteria of `query`: the aggregate ordered first
    /// and every dimension grouped, or the ordered time field followed by
    /// the raw paths when there is no aggregate.
    pub(crate) fn prepare_query(
        &self,
        query: &Query,
    ) -> Result<(Vec<Selection>, Criterion), AnalyticsError> {
        let provider = self.ctx.provider();
        let time_field = provider.time_field(&query.datatype)?;

        let selection: Vec<Selection> = match &query.aggregation {
            Some(aggregation) => std::iter::once(aggregation.clone().order(query.order))
                .chain(query.paths.iter().map(|p| Selection::path(p.clone()).group_by()))
                .collect(),
            None => std::iter::once(Selection::path(time_field.clone()).order(query.order))
                .chain(query.paths.iter().map(|p| Selection::path(p.clone())))
                .collect(),
        };

        let extra = self
            .ctx
            .env()
            .extensions()
            .filter_criteria(&query.datatype, self.ctx.parameters())?;
        let criteria = self.period.get_criteria(&time_field) & extra & query.criteria.clone();
        Ok((selection, criteria))
    }

    /// Runs a query, reading permission and backend failures as no rows.
    pub(crate) fn run(
        &self,
        datatype: &str,
        selection: Vec<Selection>,
        criteria: Criterion,
        limit: Option<usize>,
    ) -> Result<Vec<Row>, AnalyticsError> {
        let mut request = QueryRequest::new(datatype, selection).with_criteria(criteria);
        if let Some(limit) = limit {
            request = request.with_limit(limit);
        }

        match self.ctx.provider().query(&request) {
            Ok(rows) => Ok(rows),
            Err(e) => {
                let e = AnalyticsError::from(e);
                if e.is_no_data() {
                    tracing::info!(datatype, error = %e, "Chart query yields no data");
                    Ok(Vec::new())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Reads permission and backend failures of a whole series as an
    /// empty one.
    pub(crate) fn tolerate<T: Default>(result: Result<T, AnalyticsError>) -> Result<T, AnalyticsError> {
        match result {
            Err(e) if e.is_no_data() => {
                tracing::info!(error = %e, "Chart series yields no data");
                Ok(T::default())
            }
            other => other,
        }
    }

    /// A link narrowing the view to `criteria` and `params`.
    ///
    /// `force_default` sends zoom links to the listing instead of
    /// `link_view`.
    pub(crate) fn make_link(
        &self,
        datatype: &str,
        force_default: bool,
        criteria: &Criterion,
        params: Vec<(&'static str, String)>,
    ) -> Option<Link> {
        let listing = || self.ctx.env().endpoints().listing(datatype).map(str::to_string);
        let view = match self.link_mode {
            LinkMode::Disabled => return None,
            LinkMode::Immediate => listing(),
            LinkMode::Zoom if force_default => listing(),
            LinkMode::Zoom => self.options.link_view.clone().or_else(listing),
        }?;

        let mut link = Link::new(view.as_str()).params(params);
        if self.options.link_view.as_deref() == Some(view.as_str())
            && !self.options.link_params.is_empty()
        {
            link = link.params(self.options.link_params.iter().cloned());
        } else if !criteria.is_empty() {
            link = link
                .param("query", criteria)
                .param("query_mode", QueryMode::Criterion);
        }
        Some(link)
    }

    /// Renders `data` through the registry.
    pub(crate) fn finish(
        self,
        data: ChartData,
        subtitles: Vec<String>,
        xlegend: Vec<String>,
    ) -> Result<ChartOutput, AnalyticsError> {
        let options = RenderOptions {
            title: self.options.title.clone(),
            subtitles,
            xlegend,
            palette: self.options.palette.clone(),
        };
        let rendering = self
            .ctx
            .env()
            .renderers()
            .render(&self.chart_type, &data, &options)?;

        tracing::debug!(
            chart_type = %self.chart_type,
            title = %options.title,
            empty = data.is_empty(),
            "Rendered chart"
        );

        Ok(ChartOutput {
            title: options.title.clone(),
            chart_type: self.chart_type,
            rendering,
            data,
            options,
        })
    }
}
