//! Drill-down and zoom link building.

use serde::{Serialize, Serializer};

/// A URL under construction: an endpoint plus ordered query parameters.
///
/// # Examples
///
/// ```
/// use analytics::url::Link;
///
/// let link = Link::new("/alerts")
///     .param("query", "alert.classification.text == 'a b'")
///     .param("query_mode", "criterion");
/// assert_eq!(
///     link.to_string(),
///     "/alerts?query=alert.classification.text%20%3D%3D%20%27a%20b%27&query_mode=criterion"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    endpoint: String,
    params: Vec<(String, String)>,
}

impl Link {
    /// A link to `endpoint` without parameters.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            params: Vec::new(),
        }
    }

    /// Appends a parameter.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((name.into(), value.to_string()));
        self
    }

    /// Appends several parameters.
    #[must_use]
    pub fn params<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: ToString,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.to_string())));
        self
    }

    /// Sets `name` to `value`, replacing earlier values.
    #[must_use]
    pub fn replace(mut self, name: &str, value: impl ToString) -> Self {
        self.params.retain(|(k, _)| k != name);
        self.param(name, value)
    }

    /// The endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The first value of parameter `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Every parameter, in order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl std::fmt::Display for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.endpoint)?;
        for (i, (name, value)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(
                f,
                "{sep}{}={}",
                urlencoding::encode(name),
                urlencoding::encode(value)
            )?;
        }
        Ok(())
    }
}

impl Serialize for Link {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_link() {
        assert_eq!(Link::new("/alerts").to_string(), "/alerts");
    }

    #[test]
    fn test_replace_and_get() {
        let link = Link::new("/alerts")
            .params([("timeline_mode", "relative"), ("timeline_value", "1")])
            .replace("timeline_mode", "custom");
        assert_eq!(link.get("timeline_mode"), Some("custom"));
        assert_eq!(
            link.to_string(),
            "/alerts?timeline_value=1&timeline_mode=custom"
        );
    }

    #[test]
    fn test_serializes_as_string() {
        let link = Link::new("/a").param("x", 1);
        assert_eq!(serde_json::to_string(&link).unwrap(), "\"/a?x=1\"");
    }
}
