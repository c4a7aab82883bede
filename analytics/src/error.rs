//! Crate-level error type.
//!
//! Each layer owns a narrower error ([`TimeError`], [`ParseError`],
//! [`ProviderError`]); [`AnalyticsError`] wraps them and adds the
//! request-validation failures surfaced to users.

use crate::criteria::ParseError;
use crate::provider::ProviderError;
use crate::time::TimeError;
use thiserror::Error;

/// Errors returned by the analytics operations.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// A request parameter holds a value outside its domain.
    #[error("Invalid value '{value}' for parameter '{name}'")]
    InvalidParameterValue {
        /// The parameter name.
        name: String,
        /// The offending value.
        value: String,
    },

    /// A required request parameter is absent.
    #[error("Missing parameter: '{0}'")]
    MissingParameter(String),

    /// A renderer had nothing to draw.
    #[error("No data to display")]
    RendererNoData,

    /// Time unit or period failure.
    #[error(transparent)]
    Time(#[from] TimeError),

    /// Filter expression failure.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Data provider failure.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl AnalyticsError {
    /// Shorthand for [`AnalyticsError::InvalidParameterValue`].
    pub fn invalid_value(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidParameterValue {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Returns true when the error means "this datatype yields nothing for
    /// this user" rather than a real failure.
    #[must_use]
    pub const fn is_no_data(&self) -> bool {
        matches!(
            self,
            Self::Provider(ProviderError::PermissionDenied(_) | ProviderError::NoBackend(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_message_names_parameter() {
        let err = AnalyticsError::invalid_value("timeline_unit", "fortnight");
        assert_eq!(
            err.to_string(),
            "Invalid value 'fortnight' for parameter 'timeline_unit'"
        );
    }

    #[test]
    fn test_is_no_data() {
        let denied = AnalyticsError::from(ProviderError::PermissionDenied("alert".into()));
        assert!(denied.is_no_data());

        let storage = AnalyticsError::from(ProviderError::Storage("boom".into()));
        assert!(!storage.is_no_data());
    }
}
