//! Status Reporter
//!
//! Read-only projection of engine and registry state for the HTTP surface.
//! Assembling a status never mutates anything and never waits on an
//! in-flight cycle: it reads the last published snapshots.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum_macros::{AsRefStr, Display, EnumString};

use crate::engine::{CollectionEngine, CollectionStats};

/// Aggregate service health.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ServiceStatus {
    /// Every source is enabled.
    Healthy,
    /// At least one source is disabled.
    Degraded,
}

/// Per-source detail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceStatus {
    pub enabled: bool,
    pub buckets: Vec<String>,
    pub last_success: Option<DateTime<Utc>>,
    pub stats: CollectionStats,
}

/// Full status document served on `/health`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    pub status: ServiceStatus,
    pub timestamp: DateTime<Utc>,
    pub metrics_collected_total: u64,
    pub last_collection: Option<DateTime<Utc>>,
    pub cycles_completed: u64,
    /// Collection interval in seconds.
    pub collection_interval: u64,
    pub sources: BTreeMap<String, SourceStatus>,
}

/// Condensed counters served on `/metrics`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub metrics_collected_total: u64,
    pub sources_count: usize,
    pub enabled_sources: usize,
}

/// Builds status documents from a running engine.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    engine: Arc<CollectionEngine>,
    interval: Duration,
}

impl StatusReporter {
    pub fn new(engine: Arc<CollectionEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Full status with per-source detail.
    pub fn status(&self) -> EngineStatus {
        let totals = self.engine.totals();
        let mut stats = self.engine.all_stats();

        let mut status = ServiceStatus::Healthy;
        let mut sources = BTreeMap::new();
        for (source, state) in self.engine.registry().snapshot() {
            if !state.enabled {
                status = ServiceStatus::Degraded;
            }
            sources.insert(
                source.name.clone(),
                SourceStatus {
                    enabled: state.enabled,
                    buckets: source.buckets.clone(),
                    last_success: state.last_success,
                    stats: stats.remove(&source.name).unwrap_or_default(),
                },
            );
        }

        EngineStatus {
            status,
            timestamp: Utc::now(),
            metrics_collected_total: totals.metrics_collected_total,
            last_collection: totals.last_collection,
            cycles_completed: totals.cycles_completed,
            collection_interval: self.interval.as_secs(),
            sources,
        }
    }

    /// Totals and source counts only.
    pub fn summary(&self) -> StatusSummary {
        let registry = self.engine.registry();
        StatusSummary {
            metrics_collected_total: self.engine.totals().metrics_collected_total,
            sources_count: registry.len(),
            enabled_sources: registry.enabled_sources().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{QueryCatalog, QueryTemplate};
    use crate::registry::{Source, SourceRegistry};
    use crate::store::{MemoryStore, Record, columns};

    fn reporter() -> StatusReporter {
        let row = Record::new()
            .with(columns::MEASUREMENT, "mem")
            .with(columns::FIELD, "used_percent")
            .with(columns::VALUE, 41.5)
            .with(columns::HOST, "node-1");
        let a = Arc::new(MemoryStore::new("a").with_rows("system", vec![row]));
        let b = Arc::new(MemoryStore::new("b"));
        let registry = Arc::new(SourceRegistry::new(vec![
            Source::new("a", a).with_buckets(["system"]),
            Source::new("b", b).with_buckets(["power", ""]),
        ]));
        let catalog = Arc::new(
            QueryCatalog::new().with_query("mem", QueryTemplate::new("mem {{ bucket }}", 5)),
        );
        let engine = CollectionEngine::new(registry, catalog, Arc::new(MemoryStore::default()));
        StatusReporter::new(Arc::new(engine), Duration::from_secs(60))
    }

    #[test]
    fn test_status_healthy_to_degraded_and_back() {
        let reporter = reporter();
        let registry = reporter.engine.registry().clone();
        assert_eq!(reporter.status().status, ServiceStatus::Healthy);

        registry.set_enabled("b", false);
        assert_eq!(reporter.status().status, ServiceStatus::Degraded);

        registry.set_enabled("b", true);
        assert_eq!(reporter.status().status, ServiceStatus::Healthy);
    }

    #[tokio::test]
    async fn test_status_after_cycle() {
        let reporter = reporter();
        reporter.engine.collect_all_sources().await;

        let status = reporter.status();
        assert_eq!(status.metrics_collected_total, 1);
        assert_eq!(status.cycles_completed, 1);
        assert_eq!(status.collection_interval, 60);
        assert!(status.last_collection.is_some());

        let a = &status.sources["a"];
        assert!(a.enabled);
        assert!(a.last_success.is_some());
        assert_eq!(a.stats.last_point_count, 1);
        assert_eq!(a.stats.last_hosts, vec!["node_1"]);

        let b = &status.sources["b"];
        assert_eq!(b.buckets, vec!["power", ""]);
        assert!(b.last_success.is_none());
        assert_eq!(b.stats, CollectionStats::default());
    }

    #[test]
    fn test_summary() {
        let reporter = reporter();
        reporter.engine.registry().set_enabled("a", false);

        let summary = reporter.summary();
        assert_eq!(summary.metrics_collected_total, 0);
        assert_eq!(summary.sources_count, 2);
        assert_eq!(summary.enabled_sources, 1);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_value(reporter().status()).unwrap();
        assert_eq!(json["status"], "healthy");
        assert!(json["last_collection"].is_null());
        assert_eq!(json["sources"]["a"]["stats"]["success_cycles"], 0);
        assert_eq!(ServiceStatus::Degraded.to_string(), "degraded");
    }
}
