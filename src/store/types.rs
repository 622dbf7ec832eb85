//! Core data types for the store layer.
//!
//! - [`Row`]: read-side capability trait (tag lookup, measurement/field/value/time accessors)
//! - [`Record`]: the row type every [`TimeSeriesClient`](super::TimeSeriesClient) returns
//! - [`DataPoint`]: a normalized point destined for the central store
//! - [`HealthCheck`]: result of a store health probe

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Well-known column names in Flux query results.
pub mod columns {
    pub const RESULT: &str = "result";
    pub const TABLE: &str = "table";
    pub const START: &str = "_start";
    pub const STOP: &str = "_stop";
    pub const TIME: &str = "_time";
    pub const VALUE: &str = "_value";
    pub const FIELD: &str = "_field";
    pub const MEASUREMENT: &str = "_measurement";
    pub const HOST: &str = "host";
}

/// A single typed cell of a query result row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowValue {
    Float(f64),
    Integer(i64),
    Boolean(bool),
    String(String),
    Time(DateTime<Utc>),
    Null,
}

impl RowValue {
    /// Numeric view of the value.
    ///
    /// Strings are parsed, booleans map to 1.0/0.0. Returns `None` for
    /// anything without a finite numeric interpretation.
    pub fn as_f64(&self) -> Option<f64> {
        let v = match self {
            Self::Float(v) => *v,
            Self::Integer(v) => *v as f64,
            Self::Boolean(b) => f64::from(u8::from(*b)),
            Self::String(s) => s.trim().parse::<f64>().ok()?,
            Self::Time(_) | Self::Null => return None,
        };
        v.is_finite().then_some(v)
    }

    /// Borrow the value as a string slice if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Timestamp view; RFC 3339 strings are parsed.
    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Time(t) => Some(*t),
            Self::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for RowValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::String(s) => f.write_str(s),
            Self::Time(t) => f.write_str(&t.to_rfc3339()),
            Self::Null => Ok(()),
        }
    }
}

impl From<f64> for RowValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for RowValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<bool> for RowValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<&str> for RowValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for RowValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<DateTime<Utc>> for RowValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Time(v)
    }
}

/// Read access to one query result row.
///
/// Store adapters return rows implementing this trait; the transformer
/// depends only on it. Only [`Row::get`] and [`Row::columns`] are required.
pub trait Row {
    /// Look up a column by name.
    fn get(&self, column: &str) -> Option<&RowValue>;

    /// Every non-null column of the row.
    fn columns(&self) -> impl Iterator<Item = (&str, &RowValue)>;

    /// Column value rendered as a tag string; `None` when absent or null.
    fn tag(&self, key: &str) -> Option<String> {
        self.get(key)
            .filter(|v| !v.is_null())
            .map(ToString::to_string)
    }

    fn measurement(&self) -> Option<String> {
        self.tag(columns::MEASUREMENT)
    }

    fn field(&self) -> Option<String> {
        self.tag(columns::FIELD)
    }

    fn value(&self) -> Option<&RowValue> {
        self.get(columns::VALUE)
    }

    fn time(&self) -> Option<DateTime<Utc>> {
        self.get(columns::TIME).and_then(RowValue::as_time)
    }
}

/// A query result row keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: BTreeMap<String, RowValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column value.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<RowValue>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<RowValue>) {
        self.values.insert(column.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Row for Record {
    fn get(&self, column: &str) -> Option<&RowValue> {
        self.values.get(column)
    }

    fn columns(&self) -> impl Iterator<Item = (&str, &RowValue)> {
        self.values
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.as_str(), v))
    }
}

/// A normalized data point written to the central store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPoint {
    /// Measurement name, carried through from the source row.
    pub measurement: String,
    /// Tag set; keys are unique.
    pub tags: BTreeMap<String, String>,
    /// Field set (currently a single `value` field).
    pub fields: BTreeMap<String, f64>,
    /// Point timestamp; `None` lets the store assign one.
    pub time: Option<DateTime<Utc>>,
}

impl DataPoint {
    /// Name of the single numeric field every point carries.
    pub const VALUE_FIELD: &'static str = "value";

    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            time: None,
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: f64) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn with_time(mut self, time: Option<DateTime<Utc>>) -> Self {
        self.time = time;
        self
    }

    /// The normalized `host` tag, if set.
    pub fn host(&self) -> Option<&str> {
        self.tags.get(columns::HOST).map(String::as_str)
    }

    /// The `value` field, if set.
    pub fn value(&self) -> Option<f64> {
        self.fields.get(Self::VALUE_FIELD).copied()
    }
}

/// Health probe outcome.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum HealthStatus {
    Pass,
    Fail,
}

/// Result of a store health probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    #[serde(default)]
    pub message: Option<String>,
}

impl HealthCheck {
    pub fn pass() -> Self {
        Self {
            status: HealthStatus::Pass,
            message: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Fail,
            message: Some(message.into()),
        }
    }

    pub fn is_pass(&self) -> bool {
        self.status == HealthStatus::Pass
    }
}
