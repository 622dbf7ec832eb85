//! InfluxDB v2 adapter built on the `influxdb2` client.
//!
//! Flux queries go through `query_raw`, whose records are mapped into
//! [`Record`]s; writes convert each [`DataPoint`] into an
//! `influxdb2::models::DataPoint` and stream the batch to the bucket.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use futures::stream;
use influxdb2::RequestError;
use influxdb2::models::{DataPoint as InfluxPoint, Query};
use influxdb2_structmap::value::Value;
use url::Url;

use super::{DataPoint, HealthCheck, Record, RowValue, StoreError, TimeSeriesClient, bounded};
use crate::config::DEFAULT_REQUEST_TIMEOUT;

/// Client for one InfluxDB v2 instance.
pub struct InfluxClient {
    client: influxdb2::Client,
    endpoint: String,
    org: String,
    timeout: Duration,
}

impl std::fmt::Debug for InfluxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfluxClient")
            .field("endpoint", &self.endpoint)
            .field("org", &self.org)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl InfluxClient {
    /// Create a client with the default request timeout.
    ///
    /// # Errors
    /// Returns `StoreError::InvalidUrl` if `url` cannot be parsed.
    pub fn new(
        url: &str,
        token: impl Into<String>,
        org: impl Into<String>,
    ) -> Result<Self, StoreError> {
        Self::with_timeout(url, token, org, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a client whose calls are bounded by `timeout`.
    pub fn with_timeout(
        url: &str,
        token: impl Into<String>,
        org: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        // influxdb2::Client panics on a URL it cannot parse
        Url::parse(url)?;

        let endpoint = url.trim_end_matches('/').to_string();
        let org = org.into();
        Ok(Self {
            client: influxdb2::Client::new(endpoint.as_str(), org.as_str(), token),
            endpoint,
            org,
            timeout,
        })
    }

    pub fn org(&self) -> &str {
        &self.org
    }

    /// Run one client call under the timeout and classify its failure.
    async fn call<T>(
        &self,
        request: impl Future<Output = Result<T, RequestError>>,
    ) -> Result<T, StoreError> {
        bounded(self.timeout, async {
            request.await.map_err(|e| classify(e, self.timeout))
        })
        .await
    }
}

/// Map an `influxdb2` failure onto the store error taxonomy.
fn classify(error: RequestError, timeout: Duration) -> StoreError {
    match error {
        RequestError::Http { status, text } => {
            StoreError::from_status(status.as_u16(), error_message(text))
        }
        RequestError::ReqwestProcessing { source } if source.is_timeout() => {
            StoreError::Timeout(timeout)
        }
        RequestError::ReqwestProcessing { source } if source.is_decode() => {
            StoreError::Decode(source.to_string())
        }
        RequestError::ReqwestProcessing { source } => StoreError::Connection(source.to_string()),
        other => StoreError::Decode(other.to_string()),
    }
}

/// InfluxDB error bodies are `{"code": ..., "message": ...}`; keep just the message.
fn error_message(body: String) -> String {
    serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_owned))
        .unwrap_or(body)
}

fn row_value(value: Value) -> RowValue {
    match value {
        Value::Unknown => RowValue::Null,
        Value::String(s) => RowValue::String(s),
        Value::Double(v) => RowValue::Float(v.into_inner()),
        Value::Bool(b) => RowValue::Boolean(b),
        Value::Long(v) => RowValue::Integer(v),
        Value::UnsignedLong(v) => {
            i64::try_from(v).map_or(RowValue::Float(v as f64), RowValue::Integer)
        }
        Value::TimeRFC(t) => RowValue::Time(t.with_timezone(&Utc)),
        other => RowValue::String(format!("{other:?}")),
    }
}

/// Build a [`Record`] from the column values of one Flux record.
fn record_from_flux(values: impl IntoIterator<Item = (String, Value)>) -> Record {
    let mut record = Record::new();
    for (column, value) in values {
        record.insert(column, row_value(value));
    }
    record
}

fn to_influx(point: DataPoint) -> Result<InfluxPoint, StoreError> {
    let mut builder = InfluxPoint::builder(point.measurement);
    for (key, value) in point.tags {
        builder = builder.tag(key, value);
    }
    for (key, value) in point.fields {
        builder = builder.field(key, value);
    }
    if let Some(nanos) = point.time.and_then(|t| t.timestamp_nanos_opt()) {
        builder = builder.timestamp(nanos);
    }
    builder.build().map_err(|e| StoreError::Encode(e.to_string()))
}

#[async_trait::async_trait]
impl TimeSeriesClient for InfluxClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn health(&self) -> Result<HealthCheck, StoreError> {
        let result = tokio::time::timeout(self.timeout, self.client.health())
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?;

        let body: serde_json::Value = match result {
            Ok(check) => {
                serde_json::to_value(&check).map_err(|e| StoreError::Decode(e.to_string()))?
            }
            // An unhealthy instance answers 503 with the same JSON body
            Err(RequestError::Http { status, text }) if status.as_u16() == 503 => {
                match serde_json::from_str(&text) {
                    Ok(body) => body,
                    Err(_) => return Err(StoreError::from_status(503, error_message(text))),
                }
            }
            Err(e) => return Err(classify(e, self.timeout)),
        };
        serde_json::from_value(body).map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn query(&self, bucket: &str, query: &str) -> Result<Vec<Record>, StoreError> {
        tracing::trace!(endpoint = %self.endpoint, bucket = %bucket, "Sending Flux query");
        let records = self
            .call(self.client.query_raw(Some(Query::new(query.to_string()))))
            .await?;
        Ok(records
            .into_iter()
            .map(|r| record_from_flux(r.values))
            .collect())
    }

    async fn write(&self, bucket: &str, points: Vec<DataPoint>) -> Result<(), StoreError> {
        if points.is_empty() {
            return Ok(());
        }
        let points = points
            .into_iter()
            .map(to_influx)
            .collect::<Result<Vec<_>, _>>()?;

        self.call(self.client.write(bucket, stream::iter(points)))
            .await
    }
}
