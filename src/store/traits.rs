//! Core store client trait.

use std::future::Future;
use std::time::Duration;

use super::{DataPoint, HealthCheck, Record, StoreError};

/// Async client for a time-series store.
///
/// Source stores are only ever read from and the central store is only ever
/// written to, but both sides speak the same interface so the same adapter
/// can serve either role.
///
/// Implementations must not retry internally; the engine relies on every
/// call mapping to at most one request so failures surface within a cycle.
#[async_trait::async_trait]
pub trait TimeSeriesClient: Send + Sync + 'static {
    /// Human-readable endpoint for logs.
    fn endpoint(&self) -> &str;

    /// Lightweight liveness probe.
    async fn health(&self) -> Result<HealthCheck, StoreError>;

    /// Run a query and return every result row.
    ///
    /// `bucket` identifies the partition the query targets; adapters whose
    /// query language embeds the bucket may use it only for diagnostics.
    async fn query(&self, bucket: &str, query: &str) -> Result<Vec<Record>, StoreError>;

    /// Write a batch of points into `bucket`.
    async fn write(&self, bucket: &str, points: Vec<DataPoint>) -> Result<(), StoreError>;
}

/// Run a store call with an upper bound on its duration.
///
/// An elapsed deadline becomes [`StoreError::Timeout`].
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| StoreError::Timeout(limit))?
}
