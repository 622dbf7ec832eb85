//! In-process time-series store.
//!
//! Serves canned rows per bucket, captures every write, and can be told to
//! fail health probes, reads or writes. Backs `--dry-run` as the central
//! store and stands in for real stores in tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{DataPoint, HealthCheck, Record, StoreError, TimeSeriesClient};

/// A captured write call.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteBatch {
    pub bucket: String,
    pub points: Vec<DataPoint>,
}

#[derive(Debug, Default)]
struct MemoryState {
    unhealthy: Option<String>,
    rows: HashMap<String, Vec<Record>>,
    read_error: Option<StoreError>,
    bucket_errors: HashMap<String, StoreError>,
    query_errors: Vec<(String, StoreError)>,
    write_failures: usize,
    writes: Vec<WriteBatch>,
    health_calls: usize,
    query_calls: usize,
    write_calls: usize,
}

/// In-memory [`TimeSeriesClient`].
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    state: Mutex<MemoryState>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serve `rows` for every query against `bucket`.
    pub fn with_rows(self, bucket: impl Into<String>, rows: Vec<Record>) -> Self {
        self.lock().rows.insert(bucket.into(), rows);
        self
    }

    /// Report a failing health probe (`Some`) or a passing one (`None`).
    pub fn set_unhealthy(&self, message: Option<&str>) {
        self.lock().unhealthy = message.map(str::to_owned);
    }

    /// Fail every query with `error` (`None` clears it).
    pub fn fail_reads(&self, error: Option<StoreError>) {
        self.lock().read_error = error;
    }

    /// Fail every query against `bucket`.
    pub fn fail_bucket(&self, bucket: impl Into<String>, error: StoreError) {
        self.lock().bucket_errors.insert(bucket.into(), error);
    }

    /// Fail every query whose text contains `needle`.
    pub fn fail_queries_containing(&self, needle: impl Into<String>, error: StoreError) {
        self.lock().query_errors.push((needle.into(), error));
    }

    /// Fail the next `count` writes.
    pub fn fail_next_writes(&self, count: usize) {
        self.lock().write_failures = count;
    }

    /// Every successful write so far.
    pub fn writes(&self) -> Vec<WriteBatch> {
        self.lock().writes.clone()
    }

    /// Total points across successful writes.
    pub fn written_points(&self) -> usize {
        self.lock().writes.iter().map(|w| w.points.len()).sum()
    }

    pub fn health_calls(&self) -> usize {
        self.lock().health_calls
    }

    pub fn query_calls(&self) -> usize {
        self.lock().query_calls
    }

    /// Write attempts, including failed ones.
    pub fn write_calls(&self) -> usize {
        self.lock().write_calls
    }
}

#[async_trait::async_trait]
impl TimeSeriesClient for MemoryStore {
    fn endpoint(&self) -> &str {
        &self.name
    }

    async fn health(&self) -> Result<HealthCheck, StoreError> {
        let mut state = self.lock();
        state.health_calls += 1;
        Ok(match &state.unhealthy {
            Some(message) => HealthCheck::fail(message.clone()),
            None => HealthCheck::pass(),
        })
    }

    async fn query(&self, bucket: &str, query: &str) -> Result<Vec<Record>, StoreError> {
        let mut state = self.lock();
        state.query_calls += 1;

        if let Some(err) = &state.read_error {
            return Err(err.clone());
        }
        if let Some(err) = state.bucket_errors.get(bucket) {
            return Err(err.clone());
        }
        if let Some((_, err)) = state.query_errors.iter().find(|(n, _)| query.contains(n)) {
            return Err(err.clone());
        }
        Ok(state.rows.get(bucket).cloned().unwrap_or_default())
    }

    async fn write(&self, bucket: &str, points: Vec<DataPoint>) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.write_calls += 1;

        if state.write_failures > 0 {
            state.write_failures -= 1;
            return Err(StoreError::from_status(500, "injected write failure"));
        }
        state.writes.push(WriteBatch {
            bucket: bucket.to_string(),
            points,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_serves_rows_per_bucket() {
        let store = MemoryStore::new("src").with_rows("a", vec![Record::new().with("x", 1.0)]);

        assert_eq!(store.query("a", "q").await.unwrap().len(), 1);
        assert!(store.query("b", "q").await.unwrap().is_empty());
        assert_eq!(store.query_calls(), 2);
    }

    #[tokio::test]
    async fn test_memory_store_write_failures() {
        let store = MemoryStore::default();
        store.fail_next_writes(1);

        let points = vec![DataPoint::new("m").with_field("value", 1.0)];
        assert!(store.write("b", points.clone()).await.is_err());
        assert!(store.write("b", points).await.is_ok());
        assert_eq!(store.write_calls(), 2);
        assert_eq!(store.written_points(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_health_toggle() {
        let store = MemoryStore::default();
        assert!(store.health().await.unwrap().is_pass());
        store.set_unhealthy(Some("maintenance"));
        let check = store.health().await.unwrap();
        assert!(!check.is_pass());
        assert_eq!(check.message.as_deref(), Some("maintenance"));
    }
}
