//! Collection Engine
//!
//! For every enabled source, for every non-empty bucket, for every catalog
//! query: read rows, transform them, and write the points to the central
//! store under the source bucket's own name.
//!
//! # Error isolation
//!
//! - A rejected query or a failed write affects only that query's points.
//! - A connection-class read failure (transport error, timeout, store
//!   unavailable) aborts the source for this cycle, counts one failed cycle
//!   and disables the source until the next health sweep re-enables it.
//! - One source failing never prevents the remaining sources from running.
//!
//! # Snapshots
//!
//! Per-source [`CollectionStats`] and that source's share of
//! `metrics_collected_total` are published together at the end of
//! [`CollectionEngine::collect_from_source`], so the total always matches the
//! points actually written even if a later source aborts the cycle.
//! `last_collection` and `cycles_completed` are published at the end of
//! [`CollectionEngine::collect_all_sources`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::QueryCatalog;
use crate::config::DEFAULT_REQUEST_TIMEOUT;
use crate::registry::{Source, SourceRegistry};
use crate::store::{StoreError, TimeSeriesClient, bounded};
use crate::transform::{HostnameOverrides, Transformer};

/// Running statistics for one source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    /// Cycles that wrote at least one point.
    pub success_cycles: u64,
    /// Cycles aborted by a connection-class failure.
    pub failed_cycles: u64,
    /// Points written in the last successful cycle.
    pub last_point_count: u64,
    /// Normalized hosts seen in the last successful cycle, sorted.
    pub last_hosts: Vec<String>,
    /// Points written per bucket in the last successful cycle.
    pub last_buckets: BTreeMap<String, u64>,
}

/// Engine-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineTotals {
    /// Points successfully written since startup. Never decreases.
    pub metrics_collected_total: u64,
    pub last_collection: Option<DateTime<Utc>>,
    pub cycles_completed: u64,
}

/// What one source produced in one cycle.
#[derive(Debug, Default)]
struct SourceOutcome {
    points: u64,
    hosts: BTreeSet<String>,
    buckets: BTreeMap<String, u64>,
}

/// Drives collection from every registered source into the central store.
pub struct CollectionEngine {
    registry: Arc<SourceRegistry>,
    catalog: Arc<QueryCatalog>,
    transformer: Transformer,
    central: Arc<dyn TimeSeriesClient>,
    request_timeout: Duration,
    stats: RwLock<HashMap<String, CollectionStats>>,
    totals: RwLock<EngineTotals>,
}

impl CollectionEngine {
    /// Create an engine; host aliases are taken from the registry's sources.
    pub fn new(
        registry: Arc<SourceRegistry>,
        catalog: Arc<QueryCatalog>,
        central: Arc<dyn TimeSeriesClient>,
    ) -> Self {
        let overrides = HostnameOverrides::from_sources(registry.sources().iter().map(|s| &**s));
        let stats = registry
            .sources()
            .iter()
            .map(|s| (s.name.clone(), CollectionStats::default()))
            .collect();

        Self {
            registry,
            catalog,
            transformer: Transformer::new(overrides),
            central,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            stats: RwLock::new(stats),
            totals: RwLock::new(EngineTotals::default()),
        }
    }

    /// Bound every read and write by `timeout`.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    pub fn catalog(&self) -> &QueryCatalog {
        &self.catalog
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Last published statistics for `source`.
    pub fn stats(&self, source: &str) -> Option<CollectionStats> {
        self.stats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source)
            .cloned()
    }

    /// Last published statistics for every source.
    pub fn all_stats(&self) -> HashMap<String, CollectionStats> {
        self.stats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn totals(&self) -> EngineTotals {
        self.totals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run one collection cycle over every registered source.
    ///
    /// Disabled sources are visited but contribute nothing. Returns the
    /// number of points written this cycle.
    pub async fn collect_all_sources(&self) -> u64 {
        tracing::info!(sources = self.registry.len(), "Starting data collection cycle");

        let mut total = 0;
        for source in self.registry.sources() {
            total += self.collect_from_source(source).await;
        }

        {
            let mut totals = self.totals.write().unwrap_or_else(PoisonError::into_inner);
            totals.last_collection = Some(Utc::now());
            totals.cycles_completed += 1;
        }

        tracing::info!(points = total, "Collection complete");
        total
    }

    /// Collect every bucket of one source. Returns the number of points written.
    pub async fn collect_from_source(&self, source: &Source) -> u64 {
        if !self.registry.is_enabled(&source.name) {
            tracing::debug!(source = %source.name, "Source disabled, skipping");
            return 0;
        }

        match self.collect_buckets(source).await {
            Ok(outcome) if outcome.points > 0 => {
                let hosts = if outcome.hosts.is_empty() {
                    "unknown".to_string()
                } else {
                    outcome.hosts.iter().cloned().collect::<Vec<_>>().join(", ")
                };
                tracing::info!(
                    source = %source.name,
                    points = outcome.points,
                    buckets = ?outcome.buckets,
                    hosts = %hosts,
                    "Collected metrics"
                );

                let points = outcome.points;
                self.commit_success(&source.name, outcome);
                self.registry.record_success(&source.name, Utc::now());
                points
            }
            Ok(_) => {
                tracing::warn!(source = %source.name, "No data collected from any bucket");
                0
            }
            Err(e) => {
                tracing::error!(
                    source = %source.name,
                    error = %e,
                    "Collection failed, disabling source until next health sweep"
                );
                self.commit(&source.name, |stats| stats.failed_cycles += 1);
                self.registry.set_enabled(&source.name, false);
                0
            }
        }
    }

    /// Publish a successful attempt: stats and the running total move together.
    fn commit_success(&self, source: &str, outcome: SourceOutcome) {
        let mut stats = self.stats.write().unwrap_or_else(PoisonError::into_inner);
        let mut totals = self.totals.write().unwrap_or_else(PoisonError::into_inner);

        let entry = stats.entry(source.to_string()).or_default();
        entry.success_cycles += 1;
        entry.last_point_count = outcome.points;
        entry.last_hosts = outcome.hosts.into_iter().collect();
        entry.last_buckets = outcome.buckets;
        totals.metrics_collected_total += outcome.points;
    }

    /// Publish a stats update for one source under a single write lock.
    fn commit(&self, source: &str, update: impl FnOnce(&mut CollectionStats)) {
        let mut stats = self.stats.write().unwrap_or_else(PoisonError::into_inner);
        update(stats.entry(source.to_string()).or_default());
    }

    async fn collect_buckets(&self, source: &Source) -> Result<SourceOutcome, StoreError> {
        let mut outcome = SourceOutcome::default();

        for bucket in source.active_buckets() {
            tracing::info!(source = %source.name, bucket = %bucket, "Collecting from bucket");

            let mut bucket_total = 0;
            for query_name in self.catalog.names() {
                bucket_total += self
                    .collect_query(source, bucket, query_name, &mut outcome.hosts)
                    .await?;
            }

            outcome.points += bucket_total;
            outcome.buckets.insert(bucket.to_string(), bucket_total);
        }

        Ok(outcome)
    }

    /// Run one query against one bucket and forward the result.
    ///
    /// Only connection-class read failures are returned as errors; everything
    /// else is logged and counts as zero points.
    async fn collect_query(
        &self,
        source: &Source,
        bucket: &str,
        query_name: &str,
        hosts: &mut BTreeSet<String>,
    ) -> Result<u64, StoreError> {
        let Some(query) = self.catalog.resolve(query_name, bucket) else {
            tracing::warn!(query = %query_name, "Query not found in configuration");
            return Ok(0);
        };

        tracing::debug!(
            source = %source.name,
            bucket = %bucket,
            query = %query_name,
            "Executing query"
        );
        let rows = match bounded(self.request_timeout, source.client().query(bucket, &query)).await
        {
            Ok(rows) => rows,
            Err(e) if e.is_connection() => return Err(e),
            Err(e) => {
                tracing::error!(
                    source = %source.name,
                    bucket = %bucket,
                    query = %query_name,
                    error = %e,
                    "Query failed"
                );
                return Ok(0);
            }
        };
        if rows.is_empty() {
            return Ok(0);
        }

        let points = self.transformer.transform(&rows, &source.name, bucket);
        hosts.extend(points.iter().filter_map(|p| p.host()).map(str::to_owned));

        // Destination bucket mirrors the source bucket name
        let count = points.len() as u64;
        match bounded(self.request_timeout, self.central.write(bucket, points)).await {
            Ok(()) => {
                tracing::debug!(bucket = %bucket, points = count, "Points written");
                Ok(count)
            }
            Err(e) => {
                tracing::error!(
                    source = %source.name,
                    bucket = %bucket,
                    query = %query_name,
                    points = count,
                    error = %e,
                    "Failed to write points"
                );
                Ok(0)
            }
        }
    }
}

impl std::fmt::Debug for CollectionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionEngine")
            .field("central", &self.central.endpoint())
            .field("sources", &self.registry.len())
            .field("queries", &self.catalog.len())
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}
