//! Row-to-point transformation.
//!
//! Converts query result rows into [`DataPoint`]s tagged with a normalized
//! host and the originating bucket.
//!
//! # Hostname override
//!
//! Each source may be mapped to one canonical host label. Heterogeneous
//! agents report inconsistent hostnames for the same machine; collapsing
//! them per source gives downstream dashboards one stable identity.
//!
//! 1. Empty or `"unknown"` host: the source's alias, else `unknown_<source>`.
//! 2. Source has an alias: the alias, whatever the row reported.
//! 3. Otherwise: the reported host lower-cased with `-` replaced by `_`.

use std::collections::{BTreeSet, HashMap};

use crate::registry::Source;
use crate::store::{DataPoint, Row, RowValue, columns};

/// Sentinel for a missing host, field or measurement.
pub const UNKNOWN: &str = "unknown";

/// Tag carrying the source bucket name.
pub const SOURCE_BUCKET_TAG: &str = "source_bucket";

/// Tag carrying the source field name.
pub const FIELD_TAG: &str = "field";

/// Columns never copied into the tag set.
const RESERVED_COLUMNS: [&str; 9] = [
    columns::RESULT,
    columns::TABLE,
    columns::START,
    columns::STOP,
    columns::TIME,
    columns::VALUE,
    columns::FIELD,
    columns::MEASUREMENT,
    columns::HOST,
];

/// Static source → canonical host table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostnameOverrides {
    aliases: HashMap<String, String>,
}

impl HostnameOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alias(mut self, source: impl Into<String>, alias: impl Into<String>) -> Self {
        self.aliases.insert(source.into(), alias.into());
        self
    }

    /// Build the table from each source's configured alias.
    pub fn from_sources<'a>(sources: impl IntoIterator<Item = &'a Source>) -> Self {
        let aliases = sources
            .into_iter()
            .filter_map(|s| Some((s.name.clone(), s.host_alias.clone()?)))
            .collect();
        Self { aliases }
    }

    pub fn alias(&self, source: &str) -> Option<&str> {
        self.aliases.get(source).map(String::as_str)
    }

    /// Normalize `original` as reported by a row from `source`.
    pub fn apply(&self, source: &str, original: &str) -> String {
        if original.is_empty() || original == UNKNOWN {
            return match self.alias(source) {
                Some(alias) => alias.to_string(),
                None => format!("unknown_{source}"),
            };
        }
        if let Some(alias) = self.alias(source) {
            return alias.to_string();
        }
        original.to_lowercase().replace('-', "_")
    }
}

/// Converts rows into normalized data points.
#[derive(Debug, Clone, Default)]
pub struct Transformer {
    overrides: HostnameOverrides,
}

impl Transformer {
    pub fn new(overrides: HostnameOverrides) -> Self {
        Self { overrides }
    }

    pub fn overrides(&self) -> &HostnameOverrides {
        &self.overrides
    }

    /// Transform every row. Never fails and never drops a row.
    pub fn transform<R: Row>(&self, rows: &[R], source: &str, bucket: &str) -> Vec<DataPoint> {
        let mut original_hosts = BTreeSet::new();
        let mut final_hosts = BTreeSet::new();

        let points: Vec<DataPoint> = rows
            .iter()
            .map(|row| {
                let original = row.tag(columns::HOST).unwrap_or_else(|| UNKNOWN.into());
                let point = self.transform_row(row, source, bucket, &original);
                original_hosts.insert(original);
                if let Some(host) = point.host() {
                    final_hosts.insert(host.to_string());
                }
                point
            })
            .collect();

        if !points.is_empty() {
            tracing::info!(
                source = %source,
                bucket = %bucket,
                points = points.len(),
                "Transformed points, host mapping: {:?} -> {:?}",
                original_hosts,
                final_hosts
            );
        }
        points
    }

    fn transform_row<R: Row>(&self, row: &R, source: &str, bucket: &str, host: &str) -> DataPoint {
        let value = row.value().and_then(RowValue::as_f64).unwrap_or(0.0);
        let field = row.field().unwrap_or_else(|| UNKNOWN.into());

        let mut point = DataPoint::new(row.measurement().unwrap_or_else(|| UNKNOWN.into()))
            .with_field(DataPoint::VALUE_FIELD, value)
            .with_time(row.time());

        for (key, value) in row.columns() {
            if RESERVED_COLUMNS.contains(&key) {
                continue;
            }
            point.tags.insert(key.to_string(), value.to_string());
        }

        // Fixed tags win over same-named row columns
        point
            .with_tag(columns::HOST, self.overrides.apply(source, host))
            .with_tag(SOURCE_BUCKET_TAG, bucket)
            .with_tag(FIELD_TAG, field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Record;

    fn overrides() -> HostnameOverrides {
        HostnameOverrides::new()
            .with_alias("server_a", "pod_8")
            .with_alias("server_b", "pod_30")
    }

    fn cpu_row(host: Option<&str>, value: impl Into<RowValue>) -> Record {
        let mut row = Record::new()
            .with(columns::RESULT, "_result")
            .with(columns::TABLE, 0i64)
            .with(columns::START, "2024-05-01T11:55:00Z")
            .with(columns::STOP, "2024-05-01T12:00:00Z")
            .with(columns::TIME, "2024-05-01T11:56:00Z")
            .with(columns::VALUE, value)
            .with(columns::FIELD, "usage_user")
            .with(columns::MEASUREMENT, "cpu")
            .with("cpu", "cpu-total");
        if let Some(h) = host {
            row.insert(columns::HOST, h);
        }
        row
    }

    #[test]
    fn test_override_alias_always_wins() {
        let o = overrides();
        assert_eq!(o.apply("server_a", "Web-01"), "pod_8");
        assert_eq!(o.apply("server_a", "pod_8"), "pod_8");
        assert_eq!(o.apply("server_b", "anything-else"), "pod_30");
    }

    #[test]
    fn test_override_unknown_host() {
        let o = overrides();
        assert_eq!(o.apply("server_a", "unknown"), "pod_8");
        assert_eq!(o.apply("server_a", ""), "pod_8");
        assert_eq!(o.apply("server_c", "unknown"), "unknown_server_c");
        assert_eq!(o.apply("server_c", ""), "unknown_server_c");
    }

    #[test]
    fn test_override_normalizes_unmapped() {
        let o = overrides();
        assert_eq!(o.apply("server_c", "Web-Node-01"), "web_node_01");
        assert_eq!(o.apply("server_c", "db_1"), "db_1");
    }

    #[test]
    fn test_override_is_pure() {
        let o = overrides();
        for (source, host) in [("server_a", "x"), ("server_c", "A-B"), ("server_c", "")] {
            assert_eq!(o.apply(source, host), o.apply(source, host));
        }
    }

    #[test]
    fn test_from_sources() {
        use crate::registry::Source;
        use crate::store::MemoryStore;
        use std::sync::Arc;

        let a = Source::new("a", Arc::new(MemoryStore::default())).with_host_alias("pod_1");
        let b = Source::new("b", Arc::new(MemoryStore::default()));
        let o = HostnameOverrides::from_sources([&a, &b]);
        assert_eq!(o.alias("a"), Some("pod_1"));
        assert_eq!(o.alias("b"), None);
    }

    #[test]
    fn test_transform_builds_tags() {
        let t = Transformer::new(overrides());
        let points = t.transform(&[cpu_row(Some("Web-01"), 12.5)], "server_c", "telegraf");

        assert_eq!(points.len(), 1);
        let p = &points[0];
        assert_eq!(p.measurement, "cpu");
        assert_eq!(p.value(), Some(12.5));
        assert!(p.time.is_some());
        assert_eq!(p.tags.get("host").unwrap(), "web_01");
        assert_eq!(p.tags.get("source_bucket").unwrap(), "telegraf");
        assert_eq!(p.tags.get("field").unwrap(), "usage_user");
        assert_eq!(p.tags.get("cpu").unwrap(), "cpu-total");
        for reserved in ["result", "table", "_start", "_stop", "_time", "_value", "_field"] {
            assert!(!p.tags.contains_key(reserved), "{reserved} leaked into tags");
        }
        assert_eq!(p.tags.len(), 4);
    }

    #[test]
    fn test_transform_coerces_bad_values() {
        let t = Transformer::default();
        let rows = vec![
            cpu_row(Some("h"), "not-a-number"),
            cpu_row(Some("h"), RowValue::Null),
            cpu_row(Some("h"), f64::NAN),
            cpu_row(Some("h"), 7i64),
        ];
        let values: Vec<_> = t
            .transform(&rows, "s", "b")
            .iter()
            .map(|p| p.value().unwrap())
            .collect();
        assert_eq!(values, vec![0.0, 0.0, 0.0, 7.0]);
    }

    #[test]
    fn test_transform_missing_host_uses_alias() {
        let t = Transformer::new(overrides());
        let points = t.transform(&[cpu_row(None, 1.0)], "server_b", "pods");
        assert_eq!(points[0].host(), Some("pod_30"));
    }

    #[test]
    fn test_transform_sparse_row_still_produces_point() {
        let t = Transformer::default();
        let points = t.transform(&[Record::new()], "lonely", "b");
        assert_eq!(points.len(), 1);
        let p = &points[0];
        assert_eq!(p.measurement, UNKNOWN);
        assert_eq!(p.value(), Some(0.0));
        assert_eq!(p.host(), Some("unknown_lonely"));
        assert!(p.time.is_none());
    }
}
