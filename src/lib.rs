//! Tributary - Metrics Aggregation Bridge
//!
//! Periodically pulls metrics from several source time-series stores, tags
//! every point with a normalized host and its origin bucket, and writes the
//! result to one central store. It can be used as a library, or run as a
//! standalone binary with the `tributary` executable.
//!
//! # Architecture
//!
//! - **Store**: `TimeSeriesClient` seam with InfluxDB v2 and in-memory adapters
//! - **Catalog**: named query templates loaded from YAML
//! - **Registry**: configured sources and their enabled state
//! - **Transform**: rows to data points, hostname normalization
//! - **Engine**: per-source, per-bucket, per-query collection with error isolation
//! - **Health**: connectivity sweeps that disable and re-enable sources
//! - **Scheduler**: fixed-interval loop with cycle-counted health sweeps
//! - **Server**: read-only JSON status endpoints
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use tributary::{
//!     CollectionEngine, HealthMonitor, InfluxClient, QueryCatalog, Scheduler, Source,
//!     SourceRegistry,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let central = Arc::new(InfluxClient::new("http://central:8086", "token", "lab")?);
//! let source = Arc::new(InfluxClient::new("http://10.0.0.8:8086", "token", "lab")?);
//! let registry = Arc::new(SourceRegistry::new(vec![
//!     Source::new("server_a", source).with_buckets(["pods"]),
//! ]));
//!
//! let engine = Arc::new(CollectionEngine::new(
//!     registry.clone(),
//!     Arc::new(QueryCatalog::builtin()),
//!     central.clone(),
//! ));
//! let monitor = Arc::new(HealthMonitor::new(registry, central));
//!
//! let shutdown = tokio_util::sync::CancellationToken::new();
//! Scheduler::new(engine, monitor, Duration::from_secs(60)).run(shutdown).await;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod engine;
pub mod health;
pub mod registry;
pub mod scheduler;
pub mod server;
pub mod status;
pub mod store;
pub mod transform;

pub use catalog::{QueryCatalog, QueryTemplate};
pub use config::{AppConfig, ConfigError};
pub use engine::{CollectionEngine, CollectionStats, EngineTotals};
pub use health::{HealthMonitor, HealthReport};
pub use registry::{Source, SourceRegistry, SourceState};
pub use scheduler::Scheduler;
pub use status::{EngineStatus, ServiceStatus, StatusReporter, StatusSummary};
pub use store::{DataPoint, InfluxClient, MemoryStore, Record, Row, StoreError, TimeSeriesClient};
pub use transform::{HostnameOverrides, Transformer};
