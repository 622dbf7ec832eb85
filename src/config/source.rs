//! Source store configuration.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::validation::{ConfigError, validate_url};

/// One source store to collect from.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Unique source name; also keys the host alias and status output.
    pub name: String,

    /// Base URL of the source store.
    pub url: String,

    /// API token sent as `Authorization: Token <token>`.
    #[serde(default)]
    pub token: String,

    /// Organization the buckets belong to.
    #[serde(default)]
    pub org: String,

    /// Buckets to collect. Empty names are kept but never queried.
    #[serde(default)]
    pub buckets: Vec<String>,

    /// Canonical host label for every point from this source.
    #[serde(default)]
    pub host_alias: Option<String>,
}

impl SourceConfig {
    /// Buckets with a non-empty name.
    pub fn active_buckets(&self) -> impl Iterator<Item = &str> {
        self.buckets
            .iter()
            .map(String::as_str)
            .filter(|b| !b.is_empty())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("source name cannot be empty"));
        }
        let context = format!("source '{}'", self.name);
        validate_url(&context, &self.url)?;

        if self.host_alias.as_deref().is_some_and(|a| a.trim().is_empty()) {
            return Err(ConfigError::invalid(format!(
                "{context}: host_alias cannot be empty"
            )));
        }
        if self.active_buckets().next().is_none() {
            tracing::warn!(
                source = %self.name,
                "Source has no buckets configured, it will never collect"
            );
        }
        Ok(())
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("org", &self.org)
            .field("buckets", &self.buckets)
            .field("host_alias", &self.host_alias)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(name: &str, url: &str) -> SourceConfig {
        SourceConfig {
            name: name.to_string(),
            url: url.to_string(),
            token: "token".to_string(),
            org: "lab".to_string(),
            buckets: vec!["pods".to_string(), String::new()],
            host_alias: None,
        }
    }

    #[test]
    fn test_source_valid() {
        let s = source("server_a", "http://10.0.0.8:8086");
        assert!(s.validate().is_ok());
        assert_eq!(s.active_buckets().collect::<Vec<_>>(), vec!["pods"]);
    }

    #[test]
    fn test_source_empty_name() {
        let err = source(" ", "http://x").validate().unwrap_err();
        assert!(err.to_string().contains("source name cannot be empty"));
    }

    #[test]
    fn test_source_bad_url() {
        let err = source("a", "not a url").validate().unwrap_err();
        assert!(err.to_string().contains("invalid URL"));
    }

    #[test]
    fn test_source_without_buckets_is_allowed() {
        let mut s = source("a", "http://x");
        s.buckets = vec![String::new()];
        assert!(s.validate().is_ok());
        assert_eq!(s.active_buckets().count(), 0);
    }

    #[test]
    fn test_source_debug_hides_token() {
        let mut s = source("a", "http://x");
        s.token = "very-secret".to_string();
        assert!(!format!("{s:?}").contains("very-secret"));
    }
}
