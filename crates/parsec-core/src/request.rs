//! Inbound request attributes, as seen by validators, filters, and the CEL
//! claim mapper's `request` variable.

use std::collections::HashMap;

/// The subset of an ext_authz `CheckRequest`'s HTTP attributes Parsec cares
/// about. Field names match the CEL `request` variable exposed to filter
/// and mapper scripts.
#[derive(Debug, Clone, Default)]
pub struct RequestAttributes {
    pub method: String,
    pub path: String,
    pub host: String,
    pub ip_address: String,
    pub user_agent: String,
    pub headers: HashMap<String, String>,
    /// Deployment-specific extras that don't warrant a first-class field.
    pub additional: HashMap<String, String>,
}

impl RequestAttributes {
    /// Case-insensitive header lookup, matching HTTP header semantics.
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.to_ascii_lowercase() == name)
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut attrs = RequestAttributes::default();
        attrs
            .headers
            .insert("Authorization".to_string(), "Bearer t".to_string());

        assert_eq!(attrs.header("authorization"), Some("Bearer t"));
        assert_eq!(attrs.header("AUTHORIZATION"), Some("Bearer t"));
    }

    #[test]
    fn missing_header_returns_none() {
        let attrs = RequestAttributes::default();
        assert_eq!(attrs.header("authorization"), None);
    }
}
