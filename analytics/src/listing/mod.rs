//! Alert listing.
//!
//! [`AlertListing`] turns the listing request parameters into a page of
//! [`ListedAlert`] rows. Without aggregation each row is one alert. With
//! aggregated paths (source and target addresses by default) alerts are
//! grouped on those paths and each row breaks its group down by
//! classification, severity and completion.
//!
//! Every displayed value carries a link narrowing the listing on it, built
//! from the current request with a fresh filter index.
//!
//! # Example
//!
//! ```
//! use analytics::config::AnalyticsConfig;
//! use analytics::context::{Environment, RequestContext, RequestParameters};
//! use analytics::listing::AlertListing;
//! use analytics::provider::{InMemoryDataProvider, Schema};
//! use analytics::time::Timezone;
//! use chrono::Utc;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let provider = InMemoryDataProvider::new(Schema::alert());
//! provider.insert("alert", json!({
//!     "messageid": "1",
//!     "create_time": Utc::now().to_rfc3339(),
//!     "classification": {"text": "ssh"}
//! })).unwrap();
//!
//! let env = Arc::new(Environment::new(Arc::new(provider), AnalyticsConfig::default()));
//! let params = RequestParameters::from_query_string("aggregated_source=none&aggregated_target=none");
//! let ctx = RequestContext::new(env, params, Timezone::utc(), Utc::now()).unwrap();
//!
//! let page = AlertListing::new(&ctx).unwrap().render().unwrap();
//! assert_eq!(page.total, 1);
//! assert_eq!(page.messages[0].infos[0].classification.value.as_deref(), Some("ssh"));
//! ```

mod aggregation;
mod alert;
mod fields;
mod filters;
mod parameters;

pub use alert::{ClassificationInfo, ListedAlert, SubAlert};
pub use fields::{
    guess_address_category, protocol_name, DirectionDataset, DirectionSummary, HostField,
    InlineField, ListedValue, Reference, Sensor,
};
pub use filters::generic_search_fields;
pub use parameters::{
    Column, ColumnFilter, FilterField, FilterOperator, ListingOrder, ListingParameters,
    TimezoneMode, ALERT_TYPES, COMPLETIONS, SEVERITIES,
};

use crate::context::RequestContext;
use crate::criteria::Path;
use crate::error::AnalyticsError;
use crate::url::Link;
use fields::FieldBuilder;
use serde::Serialize;

/// Listing endpoint used when the environment registers none.
pub const DEFAULT_ENDPOINT: &str = "/alerts";

/// Page navigation links.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Navigation {
    /// First page, when not on it.
    pub first: Option<Link>,
    /// Previous page, when not on the first.
    pub prev: Option<Link>,
    /// Next page, when rows remain.
    pub next: Option<Link>,
    /// Last page, when rows remain.
    pub last: Option<Link>,
}

/// A rendered listing page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingPage {
    /// Rows of the page.
    pub messages: Vec<ListedAlert>,
    /// Alerts, or groups when aggregated, across every page.
    pub total: usize,
    /// First row shown.
    pub offset: usize,
    /// Rows per page.
    pub limit: usize,
    /// Page links.
    pub navigation: Navigation,
    /// Names of the extension columns.
    pub extra_columns: Vec<String>,
    /// Aggregated source paths.
    pub aggregated_source: Vec<Path>,
    /// Aggregated target paths.
    pub aggregated_target: Vec<Path>,
    /// Aggregated classification paths.
    pub aggregated_classification: Vec<Path>,
    /// Aggregated analyzer paths.
    pub aggregated_analyzer: Vec<Path>,
}

/// The alert listing of one request.
#[derive(Debug)]
pub struct AlertListing<'a> {
    ctx: &'a RequestContext,
    params: ListingParameters,
}

impl<'a> AlertListing<'a> {
    /// Reads the listing parameters of the request.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::InvalidParameterValue`] for malformed
    /// listing parameters.
    pub fn new(ctx: &'a RequestContext) -> Result<Self, AnalyticsError> {
        let params = ListingParameters::from_request(ctx.parameters(), ctx.env().config())?;
        Ok(Self { ctx, params })
    }

    /// The normalized parameters.
    #[must_use]
    pub const fn parameters(&self) -> &ListingParameters {
        &self.params
    }

    /// Lists the page.
    ///
    /// # Errors
    ///
    /// Returns an error when a filter is invalid, the referenced alert of
    /// a sub-alert listing is unknown, or the provider fails.
    pub fn render(&self) -> Result<ListingPage, AnalyticsError> {
        let ctx = self.ctx;
        let params = &self.params;
        let criteria = filters::listing_criteria(ctx, params)?;
        let endpoint = ctx.env().endpoints().listing("alert").unwrap_or(DEFAULT_ENDPOINT);
        let mut fields = FieldBuilder::new(ctx, params, endpoint);

        let (messages, total) = if params.is_aggregated() {
            aggregation::aggregated_rows(&mut fields, &criteria)?
        } else {
            alert::flat_rows(&mut fields, criteria)?
        };

        tracing::info!(
            total,
            rows = messages.len(),
            offset = params.offset,
            aggregated = params.is_aggregated(),
            "Rendered alert listing"
        );

        Ok(ListingPage {
            navigation: navigation(&fields, params.offset, params.limit, total),
            messages,
            total,
            offset: params.offset,
            limit: params.limit,
            extra_columns: ctx.env().extensions().column_names(),
            aggregated_source: params.aggregated(Column::Source).to_vec(),
            aggregated_target: params.aggregated(Column::Target).to_vec(),
            aggregated_classification: params.aggregated(Column::Classification).to_vec(),
            aggregated_analyzer: params.aggregated(Column::Analyzer).to_vec(),
        })
    }
}

fn navigation(fields: &FieldBuilder<'_>, offset: usize, limit: usize, total: usize) -> Navigation {
    let page = |offset: usize| Some(fields.link(&[], &[("offset".to_string(), offset.to_string())]));
    let mut nav = Navigation::default();

    if offset > 0 {
        nav.first = page(0);
        nav.prev = page(offset.saturating_sub(limit));
    }
    if limit > 0 && total > offset + limit {
        nav.next = page(offset + limit);
        let remainder = total % limit;
        nav.last = page(total - if remainder == 0 { limit } else { remainder });
    }
    nav
}
