//! Alertlens analytics core
//!
//! The engine behind the alert console: filter expressions, time periods,
//! statistics charts and the aggregated alert listing, all running against
//! a path-based [`DataProvider`](provider::DataProvider).
//!
//! # Modules
//!
//! - [`criteria`] - Filter expressions, paths and selections
//! - [`time`] - Time units, steps and the active time period
//! - [`provider`] - The data access contract and an in-memory store
//! - [`context`] - The per-request context and the shared environment
//! - [`statistics`] - Diagram and chronology charts
//! - [`listing`] - The alert listing
//!
//! # Example
//!
//! ```
//! use analytics::criteria::{parse_criteria, PlainCompiler};
//!
//! let criterion = parse_criteria("alert.classification.text == 'ssh' && !alert.source", &PlainCompiler).unwrap();
//! assert_eq!(criterion.to_string(), "(alert.classification.text == 'ssh' && !alert.source)");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod context;
pub mod criteria;
pub mod error;
pub mod extension;
pub mod listing;
pub mod provider;
pub mod render;
pub mod statistics;
pub mod time;
pub mod url;
pub mod value;

#[cfg(test)]
mod testing;

pub use error::AnalyticsError;
pub use value::Value;

/// Re-export common dependencies for convenience.
pub use chrono;
pub use serde_json;
