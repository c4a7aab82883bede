//! Chart data handed to renderers, and the renderer registry.
//!
//! Charts produce [`ChartData`] made of [`RendererItem`]s. A
//! [`RendererRegistry`] maps each chart type to the [`ChartKind`] that
//! advertises it and turns the data into a [`Rendering`].

use crate::error::AnalyticsError;
use crate::url::Link;
use crate::value::Value;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

/// Text of the placeholder shown when a renderer has nothing to draw.
pub const NO_DATA_MESSAGE: &str = "No data to display";

/// One chart point or one series.
///
/// A diagram point holds a single value, its label columns and at most one
/// drill link. A chronology series holds one value and one zoom link per
/// time bucket, labelled by the series name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RendererItem {
    /// Values.
    pub values: Vec<Value>,
    /// Label columns.
    pub labels: Vec<String>,
    /// Links.
    pub links: Vec<Link>,
}

impl RendererItem {
    /// A diagram point.
    #[must_use]
    pub fn point(value: Value, labels: Vec<String>, link: Option<Link>) -> Self {
        Self {
            values: vec![value],
            labels,
            links: link.into_iter().collect(),
        }
    }

    /// A time series.
    #[must_use]
    pub fn series(name: impl Into<String>, values: Vec<Value>, links: Vec<Link>) -> Self {
        Self {
            values,
            labels: vec![name.into()],
            links,
        }
    }

    /// The label columns joined with `", "`.
    #[must_use]
    pub fn label(&self) -> String {
        self.labels.join(", ")
    }

    /// The first value.
    #[must_use]
    pub fn value(&self) -> Value {
        self.values.first().cloned().unwrap_or_default()
    }
}

/// What a chart hands to its renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum ChartData {
    /// One list of points per sub-chart.
    Diagram(Vec<Vec<RendererItem>>),
    /// One item per series.
    Chronology(Vec<RendererItem>),
}

impl ChartData {
    /// True when there is no point to draw.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Diagram(groups) => groups.iter().all(Vec::is_empty),
            Self::Chronology(series) => series.is_empty(),
        }
    }
}

/// Label and color assignment for series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Palette {
    /// Colors handed out in turn.
    Cycle(Vec<String>),
    /// Fixed label and color per value; unknown values get the gray "N/a".
    Named(HashMap<String, (String, String)>),
}

const GRAY: &str = "5C5C5C";

const CYCLE: [&str; 12] = [
    "93B9DD", "B1E55D", "D4C608", "F5B365", "E78D90", "C6A0CF", "5256D3", "A7DE65", "F2A97B",
    "F6818A", "B087C6", "66DC92",
];

impl Default for Palette {
    fn default() -> Self {
        Self::Cycle(CYCLE.iter().map(ToString::to_string).collect())
    }
}

impl Palette {
    /// The severity palette.
    #[must_use]
    pub fn severity() -> Self {
        Self::Named(
            [
                ("high", "High", "E78D90"),
                ("medium", "Medium", "F5B365"),
                ("low", "Low", "B1E55D"),
                ("info", "Informational", "93B9DD"),
            ]
            .into_iter()
            .map(|(value, label, color)| (value.to_string(), (label.to_string(), color.to_string())))
            .collect(),
        )
    }

    /// Display label of series `label`.
    #[must_use]
    pub fn label(&self, label: &str) -> String {
        match self {
            Self::Cycle(_) => label.to_string(),
            Self::Named(map) => map
                .get(label)
                .map_or_else(|| "N/a".to_string(), |(l, _)| l.clone()),
        }
    }

    /// Color of the `index`th series, labelled `label`.
    #[must_use]
    pub fn color(&self, index: usize, label: &str) -> &str {
        match self {
            Self::Cycle(colors) if colors.is_empty() => GRAY,
            Self::Cycle(colors) => colors[index % colors.len()].as_str(),
            Self::Named(map) => map.get(label).map_or(GRAY, |(_, c)| c.as_str()),
        }
    }
}

/// Presentation options of one chart.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderOptions {
    /// Chart title.
    pub title: String,
    /// Titles of the sub-charts of a two-level diagram.
    pub subtitles: Vec<String>,
    /// Time axis legend of a chronology.
    pub xlegend: Vec<String>,
    /// Series labels and colors.
    pub palette: Palette,
}

/// Output of a renderer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Rendering {
    /// Markup.
    pub html: String,
    /// Script run after the markup is inserted.
    pub script: String,
}

/// A rendering capability.
pub trait ChartKind: Send + Sync {
    /// Backend name, used in CSS classes.
    fn backend(&self) -> &str;

    /// Chart types this renderer draws.
    fn chart_types(&self) -> &[&'static str];

    /// Draws `data` as a `chart_type` chart.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::RendererNoData`] when there is nothing to
    /// draw.
    fn render(
        &self,
        chart_type: &str,
        data: &ChartData,
        options: &RenderOptions,
    ) -> Result<Rendering, AnalyticsError>;
}

/// Chart types mapped to the renderer drawing them.
#[derive(Default, Clone)]
pub struct RendererRegistry {
    kinds: HashMap<String, Arc<dyn ChartKind>>,
}

impl std::fmt::Debug for RendererRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&String> = self.kinds.keys().collect();
        types.sort();
        f.debug_struct("RendererRegistry")
            .field("types", &types)
            .finish()
    }
}

impl RendererRegistry {
    /// A registry without renderers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in [`TableRenderer`].
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new().with(Arc::new(TableRenderer))
    }

    /// Registers `kind` for the types it advertises. The first renderer
    /// registered for a type stays its default.
    #[must_use]
    pub fn with(mut self, kind: Arc<dyn ChartKind>) -> Self {
        for chart_type in kind.chart_types() {
            self.kinds
                .entry((*chart_type).to_string())
                .or_insert_with(|| Arc::clone(&kind));
        }
        self
    }

    /// True when some renderer draws `chart_type`.
    #[must_use]
    pub fn supports(&self, chart_type: &str) -> bool {
        self.kinds.contains_key(chart_type)
    }

    /// Renders `data` as a `chart_type` chart.
    ///
    /// A type no renderer advertises yields the empty rendering; a renderer
    /// reporting no data yields the "No data to display" placeholder.
    ///
    /// # Errors
    ///
    /// Returns renderer failures other than missing data.
    pub fn render(
        &self,
        chart_type: &str,
        data: &ChartData,
        options: &RenderOptions,
    ) -> Result<Rendering, AnalyticsError> {
        let Some(kind) = self.kinds.get(chart_type) else {
            tracing::warn!(chart_type, "No renderer for chart type");
            return Ok(Rendering::default());
        };

        let class = format!("{}-{chart_type}", kind.backend());
        match kind.render(chart_type, data, options) {
            Ok(rendering) => Ok(Rendering {
                html: format!(
                    "<div class=\"renderer-elem {class}\">{}</div>",
                    rendering.html
                ),
                script: rendering.script,
            }),
            Err(AnalyticsError::RendererNoData) => Ok(Rendering {
                html: format!(
                    "<div class=\"renderer-elem renderer-elem-error {class}\">{NO_DATA_MESSAGE}</div>"
                ),
                script: String::new(),
            }),
            Err(e) => Err(e),
        }
    }
}

/// Draws charts as HTML tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableRenderer;

impl ChartKind for TableRenderer {
    fn backend(&self) -> &str {
        "html"
    }

    fn chart_types(&self) -> &[&'static str] {
        &["table"]
    }

    fn render(
        &self,
        _chart_type: &str,
        data: &ChartData,
        options: &RenderOptions,
    ) -> Result<Rendering, AnalyticsError> {
        if data.is_empty() {
            return Err(AnalyticsError::RendererNoData);
        }

        let mut html = String::new();
        match data {
            ChartData::Diagram(groups) => {
                for (i, items) in groups.iter().enumerate() {
                    if let Some(subtitle) = options.subtitles.get(i) {
                        let _ = write!(html, "<h4>{}</h4>", escape_html(subtitle));
                    }
                    html.push_str("<table>");
                    for (j, item) in items.iter().enumerate() {
                        html.push_str("<tr>");
                        swatch(&mut html, &options.palette, j, &item.label());
                        for label in &item.labels {
                            cell(&mut html, &options.palette.label(label), item.links.first());
                        }
                        cell(&mut html, &item.value().to_label(), None);
                        html.push_str("</tr>");
                    }
                    html.push_str("</table>");
                }
            }
            ChartData::Chronology(series) => {
                html.push_str("<table><tr><th></th>");
                for legend in &options.xlegend {
                    let _ = write!(html, "<th>{}</th>", escape_html(legend));
                }
                html.push_str("</tr>");
                for (j, item) in series.iter().enumerate() {
                    let name = item.label();
                    html.push_str("<tr>");
                    swatch(&mut html, &options.palette, j, &name);
                    for (k, value) in item.values.iter().enumerate() {
                        cell(&mut html, &value.to_label(), item.links.get(k));
                    }
                    html.push_str("</tr>");
                }
                html.push_str("</table>");
            }
        }

        Ok(Rendering {
            html,
            script: String::new(),
        })
    }
}

fn swatch(html: &mut String, palette: &Palette, index: usize, label: &str) {
    let _ = write!(
        html,
        "<td><span class=\"swatch\" style=\"background:#{}\" title=\"{}\"></span></td>",
        palette.color(index, label),
        escape_html(&palette.label(label))
    );
}

fn cell(html: &mut String, text: &str, link: Option<&Link>) {
    let text = escape_html(text);
    let _ = match link {
        Some(link) => write!(
            html,
            "<td><a href=\"{}\">{text}</a></td>",
            escape_html(&link.to_string())
        ),
        None => write!(html, "<td>{text}</td>"),
    };
}

fn escape_html(text: &str) -> String {
    text.chars().fold(String::with_capacity(text.len()), |mut out, c| {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    impl ChartKind for Failing {
        fn backend(&self) -> &str {
            "failing"
        }

        fn chart_types(&self) -> &[&'static str] {
            &["pie", "table"]
        }

        fn render(
            &self,
            _chart_type: &str,
            _data: &ChartData,
            _options: &RenderOptions,
        ) -> Result<Rendering, AnalyticsError> {
            Err(AnalyticsError::MissingParameter("colors".into()))
        }
    }

    fn points() -> ChartData {
        ChartData::Diagram(vec![vec![
            RendererItem::point(Value::Integer(3), vec!["ssh <scan>".into()], Some(Link::new("/a").param("q", "x"))),
            RendererItem::point(Value::Integer(1), vec!["ping".into()], None),
        ]])
    }

    #[test]
    fn test_table_renders_escaped_rows() {
        let registry = RendererRegistry::with_defaults();
        let rendering = registry
            .render("table", &points(), &RenderOptions::default())
            .unwrap();
        assert!(rendering.html.starts_with("<div class=\"renderer-elem html-table\">"));
        assert!(rendering.html.contains("ssh &lt;scan&gt;"));
        assert!(rendering.html.contains("<a href=\"/a?q=x\">"));
        assert!(rendering.script.is_empty());
    }

    #[test]
    fn test_no_data_placeholder() {
        let registry = RendererRegistry::with_defaults();
        let rendering = registry
            .render("table", &ChartData::Diagram(vec![vec![]]), &RenderOptions::default())
            .unwrap();
        assert!(rendering.html.contains(NO_DATA_MESSAGE));
        assert!(rendering.html.contains("renderer-elem-error"));
        assert!(rendering.script.is_empty());
    }

    #[test]
    fn test_unknown_type_renders_nothing() {
        let registry = RendererRegistry::with_defaults();
        assert!(!registry.supports("pie"));
        let rendering = registry
            .render("pie", &points(), &RenderOptions::default())
            .unwrap();
        assert_eq!(rendering, Rendering::default());
    }

    #[test]
    fn test_first_registration_wins_and_errors_propagate() {
        let registry = RendererRegistry::with_defaults().with(Arc::new(Failing));
        assert!(registry.supports("pie"));
        assert!(registry
            .render("table", &points(), &RenderOptions::default())
            .is_ok());
        assert!(registry
            .render("pie", &points(), &RenderOptions::default())
            .is_err());
    }

    #[test]
    fn test_palettes() {
        let cycle = Palette::default();
        assert_eq!(cycle.color(0, "a"), "93B9DD");
        assert_eq!(cycle.color(12, "a"), "93B9DD");

        let severity = Palette::severity();
        assert_eq!(severity.label("high"), "High");
        assert_eq!(severity.color(0, "high"), "E78D90");
        assert_eq!(severity.label(""), "N/a");
        assert_eq!(severity.color(0, ""), GRAY);
    }

    #[test]
    fn test_chart_data_serialization() {
        let data = ChartData::Chronology(vec![RendererItem::series(
            "ssh",
            vec![Value::Integer(1), Value::Null],
            vec![],
        )]);
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["kind"], "chronology");
        assert_eq!(json["data"][0]["labels"][0], "ssh");
        assert_eq!(json["data"][0]["values"][1], serde_json::Value::Null);
    }
}
