//! Health Monitor
//!
//! Probes the central store and every source, and moves sources between
//! enabled and disabled. A source is healthy only when its own health
//! endpoint passes and every one of its non-empty buckets answers a trivial
//! query. Probe failures are never propagated: each one is logged and
//! recorded as unhealthy.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::DEFAULT_REQUEST_TIMEOUT;
use crate::registry::{Source, SourceRegistry};
use crate::store::{TimeSeriesClient, bounded};

/// Outcome of one health sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub central_healthy: bool,
    /// Per-source result, keyed by source name.
    pub sources: BTreeMap<String, bool>,
}

impl HealthReport {
    /// Names of the sources that failed their probe.
    pub fn unhealthy_sources(&self) -> impl Iterator<Item = &str> {
        self.sources
            .iter()
            .filter(|(_, healthy)| !**healthy)
            .map(|(name, _)| name.as_str())
    }
}

/// Minimal query that proves a bucket is readable.
fn bucket_probe(bucket: &str) -> String {
    format!(r#"from(bucket: "{bucket}") |> range(start: -1m) |> limit(n: 1)"#)
}

/// Periodically verifies store connectivity.
pub struct HealthMonitor {
    registry: Arc<SourceRegistry>,
    central: Arc<dyn TimeSeriesClient>,
    probe_timeout: Duration,
}

impl HealthMonitor {
    pub fn new(registry: Arc<SourceRegistry>, central: Arc<dyn TimeSeriesClient>) -> Self {
        Self {
            registry,
            central,
            probe_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Probe the central store and every registered source.
    ///
    /// Each source's enabled flag is set to its probe result. Never fails.
    pub async fn test_all(&self) -> HealthReport {
        let central_healthy = self.probe_central().await;

        let mut sources = BTreeMap::new();
        for source in self.registry.sources() {
            let healthy = self.probe_source(source).await;
            if self.registry.set_enabled(&source.name, healthy) {
                if healthy {
                    tracing::info!(source = %source.name, "Source re-enabled");
                } else {
                    tracing::warn!(source = %source.name, "Source disabled");
                }
            }
            sources.insert(source.name.clone(), healthy);
        }

        let report = HealthReport {
            central_healthy,
            sources,
        };
        tracing::info!(
            central = report.central_healthy,
            healthy = report.sources.values().filter(|h| **h).count(),
            total = report.sources.len(),
            "Health sweep complete"
        );
        report
    }

    /// Probe the central store's health endpoint.
    pub async fn probe_central(&self) -> bool {
        match self.check(self.central.as_ref()).await {
            Ok(()) => {
                tracing::info!(endpoint = %self.central.endpoint(), "Central store healthy");
                true
            }
            Err(reason) => {
                tracing::error!(
                    endpoint = %self.central.endpoint(),
                    error = %reason,
                    "Central store unhealthy"
                );
                false
            }
        }
    }

    /// Probe one source and each of its non-empty buckets.
    ///
    /// Every bucket is probed even after one fails so the log names all of
    /// them.
    pub async fn probe_source(&self, source: &Source) -> bool {
        if let Err(reason) = self.check(source.client()).await {
            tracing::error!(source = %source.name, error = %reason, "Source unhealthy");
            return false;
        }

        let mut healthy = true;
        for bucket in source.active_buckets() {
            let query = bucket_probe(bucket);
            let probe = source.client().query(bucket, &query);
            if let Err(e) = bounded(self.probe_timeout, probe).await {
                tracing::error!(
                    source = %source.name,
                    bucket = %bucket,
                    error = %e,
                    "Bucket probe failed"
                );
                healthy = false;
            }
        }

        if healthy {
            tracing::debug!(source = %source.name, "Source healthy");
        }
        healthy
    }

    async fn check(&self, client: &dyn TimeSeriesClient) -> Result<(), String> {
        match bounded(self.probe_timeout, client.health()).await {
            Ok(check) if check.is_pass() => Ok(()),
            Ok(check) => Err(check
                .message
                .unwrap_or_else(|| "health status is fail".to_string())),
            Err(e) => Err(e.to_string()),
        }
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("central", &self.central.endpoint())
            .field("sources", &self.registry.len())
            .field("probe_timeout", &self.probe_timeout)
            .finish()
    }
}
