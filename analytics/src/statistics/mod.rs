//! Statistics charts.
//!
//! A chart runs one or more [`Query`] values through the request's data
//! provider within the active period, turns the rows into
//! [`ChartData`](crate::render::ChartData) and hands it to the renderer
//! registered for its chart type.
//!
//! - [`DiagramChart`]: categorical points, optionally nested one level.
//! - [`ChronologyChart`]: series bucketed along the time axis, with zoom
//!   links per bucket.
//!
//! Permission and backend denials yield an empty chart instead of an
//! error.

mod chart;
mod chronology;
mod diagram;
mod query;

pub use chart::{ChartOptions, ChartOutput, LinkMode, DEFAULT_LIMIT};
pub use chronology::{ChronologyChart, CHRONOLOGY_TYPES};
pub use diagram::{DiagramChart, DIAGRAM_TYPES};
pub use query::Query;

/// The default chart type of each chart kind.
pub const DEFAULT_CHART_TYPES: [(&str, &str); 2] = [("chronology", "timebar"), ("diagram", "bar")];

/// The default chart type of `kind` (`chronology` or `diagram`).
#[must_use]
pub fn default_chart_type(kind: &str) -> Option<&'static str> {
    DEFAULT_CHART_TYPES
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, chart_type)| *chart_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_chart_types_are_supported() {
        assert_eq!(default_chart_type("diagram"), Some("bar"));
        assert_eq!(default_chart_type("chronology"), Some("timebar"));
        assert_eq!(default_chart_type("map"), None);
        assert!(DIAGRAM_TYPES.contains(&"bar"));
        assert!(CHRONOLOGY_TYPES.contains(&"timebar"));
    }
}
