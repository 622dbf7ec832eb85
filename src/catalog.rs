//! Query Catalog
//!
//! Named, parameterized query templates. A template carries `{{ bucket }}`
//! and `{{ minutes }}` placeholders that [`QueryCatalog::resolve`] fills in
//! with plain string substitution.
//!
//! Templates are loaded once at startup from YAML:
//!
//! ```yaml
//! queries:
//!   system_metrics:
//!     flux_query: |
//!       from(bucket: "{{ bucket }}")
//!         |> range(start: -{{ minutes }}m)
//!     minutes: 5
//! ```
//!
//! Bucket names are substituted verbatim, so they must come from operator
//! configuration only.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Placeholder replaced with the bucket name.
pub const BUCKET_PLACEHOLDER: &str = "{{ bucket }}";

/// Placeholder replaced with the window length in minutes.
pub const MINUTES_PLACEHOLDER: &str = "{{ minutes }}";

/// Default query window (5 minutes).
pub const DEFAULT_WINDOW_MINUTES: u32 = 5;

fn default_minutes() -> u32 {
    DEFAULT_WINDOW_MINUTES
}

/// A single named query template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryTemplate {
    /// Template text with placeholders.
    #[serde(rename = "flux_query")]
    pub template: String,

    /// Window length substituted for `{{ minutes }}`.
    #[serde(default = "default_minutes")]
    pub minutes: u32,
}

impl QueryTemplate {
    pub fn new(template: impl Into<String>, minutes: u32) -> Self {
        Self {
            template: template.into(),
            minutes,
        }
    }

    /// Fill in the placeholders for `bucket`.
    pub fn render(&self, bucket: &str) -> String {
        self.template
            .replace(BUCKET_PLACEHOLDER, bucket)
            .replace(MINUTES_PLACEHOLDER, &self.minutes.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    queries: BTreeMap<String, QueryTemplate>,
}

/// Immutable set of named query templates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryCatalog {
    queries: BTreeMap<String, QueryTemplate>,
}

impl QueryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template.
    pub fn with_query(mut self, name: impl Into<String>, template: QueryTemplate) -> Self {
        self.queries.insert(name.into(), template);
        self
    }

    /// Load templates from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read or parsed, or if any
    /// template is empty or has a zero-minute window.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse templates from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let file: CatalogFile = serde_yaml::from_str(content)?;
        let catalog = Self {
            queries: file.queries,
        };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load templates, falling back to [`QueryCatalog::builtin`] on any error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(catalog) => {
                tracing::info!(
                    path = %path.display(),
                    queries = catalog.len(),
                    "Query configuration loaded"
                );
                catalog
            }
            Err(e) => {
                tracing::error!(
                    path = %path.display(),
                    error = %e,
                    "Failed to load query configuration, using built-in defaults"
                );
                Self::builtin()
            }
        }
    }

    /// The built-in template set used when no file is available.
    pub fn builtin() -> Self {
        const SYSTEM: &str = r#"from(bucket: "{{ bucket }}")
  |> range(start: -{{ minutes }}m)
  |> filter(fn: (r) =>
    r._measurement == "cpu" or
    r._measurement == "mem" or
    r._measurement == "disk" or
    r._measurement == "system"
  )
  |> group(columns: ["host", "_measurement", "_field"])
  |> aggregateWindow(every: 1m, fn: mean, createEmpty: false)"#;

        const NETWORK: &str = r#"from(bucket: "{{ bucket }}")
  |> range(start: -{{ minutes }}m)
  |> filter(fn: (r) => r._measurement == "net")
  |> group(columns: ["host", "_measurement", "_field"])
  |> aggregateWindow(every: 1m, fn: mean, createEmpty: false)"#;

        const GROUPED: &str = r#"from(bucket: "{{ bucket }}")
  |> range(start: -{{ minutes }}m)
  |> group(columns: ["_measurement", "_field", "host"])
  |> aggregateWindow(every: 1m, fn: mean, createEmpty: false)"#;

        Self::new()
            .with_query("system_metrics", QueryTemplate::new(SYSTEM, 5))
            .with_query("network_metrics", QueryTemplate::new(NETWORK, 5))
            .with_query("pod_monitoring", QueryTemplate::new(GROUPED, 5))
            .with_query("power_monitoring", QueryTemplate::new(GROUPED, 5))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, query) in &self.queries {
            if query.template.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "query '{}': flux_query cannot be empty",
                    name
                )));
            }
            if query.minutes == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "query '{}': minutes must be positive",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Render query `name` for `bucket`; `None` if no such query exists.
    pub fn resolve(&self, name: &str, bucket: &str) -> Option<String> {
        self.queries.get(name).map(|q| q.render(bucket))
    }

    pub fn get(&self, name: &str) -> Option<&QueryTemplate> {
        self.queries.get(name)
    }

    /// Query names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.queries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_resolve_substitutes_placeholders() {
        let catalog = QueryCatalog::new().with_query(
            "cpu",
            QueryTemplate::new(
                r#"from(bucket: "{{ bucket }}") |> range(start: -{{ minutes }}m)"#,
                15,
            ),
        );

        assert_eq!(
            catalog.resolve("cpu", "telegraf").unwrap(),
            r#"from(bucket: "telegraf") |> range(start: -15m)"#
        );
    }

    #[test]
    fn test_resolve_unknown_query() {
        let catalog = QueryCatalog::builtin();
        assert!(catalog.resolve("does_not_exist", "b").is_none());
    }

    #[test]
    fn test_builtin_catalog() {
        let catalog = QueryCatalog::builtin();
        let names: Vec<_> = catalog.names().collect();
        assert_eq!(
            names,
            vec![
                "network_metrics",
                "pod_monitoring",
                "power_monitoring",
                "system_metrics"
            ]
        );
        let rendered = catalog.resolve("system_metrics", "pods").unwrap();
        assert!(rendered.contains(r#"from(bucket: "pods")"#));
        assert!(rendered.contains("range(start: -5m)"));
        assert!(!rendered.contains("{{"));
    }

    #[test]
    fn test_from_yaml_default_minutes() {
        let yaml = r#"
queries:
  net:
    flux_query: 'from(bucket: "{{ bucket }}") |> range(start: -{{ minutes }}m)'
"#;
        let catalog = QueryCatalog::from_yaml(yaml).unwrap();
        assert_eq!(catalog.get("net").unwrap().minutes, DEFAULT_WINDOW_MINUTES);
    }

    #[test]
    fn test_from_yaml_rejects_zero_minutes() {
        let yaml = r#"
queries:
  net:
    flux_query: 'from(bucket: "{{ bucket }}")'
    minutes: 0
"#;
        let err = QueryCatalog::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("minutes must be positive"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "queries:\n  power:\n    flux_query: 'from(bucket: \"{{{{ bucket }}}}\")'\n    minutes: 10"
        )
        .unwrap();

        let catalog = QueryCatalog::load(file.path()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(
            catalog.resolve("power", "power_monitoring").unwrap(),
            r#"from(bucket: "power_monitoring")"#
        );
    }

    #[test]
    fn test_shipped_queries_parse() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/configs/queries.yaml");
        let catalog = QueryCatalog::load(path).unwrap();
        assert_eq!(catalog.len(), 3);
        let rendered = catalog.resolve("network_metrics", "pods").unwrap();
        assert!(rendered.contains(r#"from(bucket: "pods")"#));
        assert!(rendered.contains("range(start: -5m)"));
    }

    #[test]
    fn test_load_or_default_falls_back() {
        let catalog = QueryCatalog::load_or_default("/nonexistent/queries.yaml");
        assert_eq!(catalog, QueryCatalog::builtin());
    }
}
