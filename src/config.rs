//! Configuration module for Tributary.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Server settings (port, bind address)
//! - Central store connection
//! - Collection timing (interval, request timeout, error backoff)
//! - Source stores and their buckets

mod app;
mod source;
mod validation;

pub use app::{AppConfig, CentralConfig, CollectionConfig, ServerConfig};
pub use source::SourceConfig;
pub use validation::{ConfigError, expand_env_vars, parse_duration};

// Re-export constants
pub use app::{
    DEFAULT_ERROR_BACKOFF, DEFAULT_INTERVAL, DEFAULT_PORT, DEFAULT_QUERIES_PATH,
    DEFAULT_REQUEST_TIMEOUT, MIN_INTERVAL,
};
