//! Store Layer
//!
//! The seam between the collection engine and the time-series stores it
//! reads from and writes to.
//!
//! # Components
//!
//! - [`TimeSeriesClient`]: async read/write/health interface every store adapter implements
//! - [`Row`]: capability trait the transformer reads query results through
//! - [`Record`] / [`RowValue`]: store-agnostic query result rows
//! - [`DataPoint`]: normalized point written to the central store
//! - [`InfluxClient`]: InfluxDB v2 adapter over the `influxdb2` client
//! - [`MemoryStore`]: in-process store for dry runs and tests

mod error;
mod influx;
mod memory;
mod traits;
mod types;

pub use error::StoreError;
pub use influx::InfluxClient;
pub use memory::{MemoryStore, WriteBatch};
pub use traits::{TimeSeriesClient, bounded};
pub use types::{DataPoint, HealthCheck, HealthStatus, Record, Row, RowValue, columns};
