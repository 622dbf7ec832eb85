//! Application configuration structures.

use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::source::SourceConfig;
use super::validation::{ConfigError, expand_env_vars, validate_url};

// =============================================================================
// Constants
// =============================================================================

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 5000;

/// Default collection interval (60 seconds).
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Minimum collection interval (1 second).
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Default bound on each store call (30 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default pause after an unexpected scheduler failure (30 seconds).
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(30);

/// Default query template file.
pub const DEFAULT_QUERIES_PATH: &str = "configs/queries.yaml";

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_error_backoff() -> Duration {
    DEFAULT_ERROR_BACKOFF
}

fn default_queries_path() -> PathBuf {
    PathBuf::from(DEFAULT_QUERIES_PATH)
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Web server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address (default: "0.0.0.0").
    pub bind: String,

    /// Server port (default: 5000).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

// =============================================================================
// Central Store Configuration
// =============================================================================

/// The store every collected point is written to.
#[derive(Clone, Serialize, Deserialize)]
pub struct CentralConfig {
    pub url: String,

    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub org: String,
}

impl fmt::Debug for CentralConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CentralConfig")
            .field("url", &self.url)
            .field("org", &self.org)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Collection Configuration
// =============================================================================

/// Collection timing and query templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Time between cycles (default: 60s, minimum: 1s).
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Bound on every read, write and probe (default: 30s).
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Pause after an unexpected scheduler failure (default: 30s).
    #[serde(default = "default_error_backoff", with = "humantime_serde")]
    pub error_backoff: Duration,

    /// Query template file; built-in templates are used if it cannot be loaded.
    #[serde(default = "default_queries_path")]
    pub queries_path: PathBuf,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            error_backoff: DEFAULT_ERROR_BACKOFF,
            queries_path: default_queries_path(),
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Web server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Central store configuration.
    pub central: CentralConfig,

    /// Collection timing configuration.
    #[serde(default)]
    pub collection: CollectionConfig,

    /// Source stores, in collection order.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// `${VAR}` and `${VAR:-default}` references are expanded before parsing.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(&expand_env_vars(content))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate server bind address
        self.server.bind.parse::<IpAddr>().map_err(|_| {
            ConfigError::invalid(format!(
                "invalid server bind address: '{}'",
                self.server.bind
            ))
        })?;

        if self.server.port == 0 {
            return Err(ConfigError::invalid("server port must be non-zero"));
        }

        validate_url("central", &self.central.url)?;

        if self.collection.interval < MIN_INTERVAL {
            return Err(ConfigError::invalid(format!(
                "collection interval must be at least {}",
                humantime::format_duration(MIN_INTERVAL)
            )));
        }
        if self.collection.request_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "collection request_timeout must be positive",
            ));
        }

        // Check for duplicate source names
        let mut seen = HashSet::new();
        for source in &self.sources {
            source.validate()?;
            if !seen.insert(source.name.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "duplicate source name: '{}'",
                    source.name
                )));
            }
        }

        if self.sources.is_empty() {
            tracing::warn!("No sources configured, collection cycles will be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
server:
  bind: 127.0.0.1
  port: 5001
central:
  url: http://central:8086
  token: central-token
  org: lab
collection:
  interval: 30s
  request_timeout: 10s
sources:
  - name: server_a
    url: http://10.0.0.8:8086
    token: a-token
    org: lab
    buckets: [pods, power]
    host_alias: pod_8
  - name: server_c
    url: http://10.0.0.9:8086
    buckets: ["${TRIBUTARY_TEST_UNSET_C_BUCKET:-telegraf}"]
"#;

    fn minimal() -> AppConfig {
        AppConfig::from_yaml("central:\n  url: http://central:8086\n").unwrap()
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind, "0.0.0.0");
        assert_eq!(config.port, 5000);
    }

    #[test]
    fn test_collection_config_default() {
        let config = minimal().collection;
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.error_backoff, Duration::from_secs(30));
        assert_eq!(config.queries_path, PathBuf::from("configs/queries.yaml"));
    }

    #[test]
    fn test_parse_sample() {
        let config = AppConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.server.port, 5001);
        assert_eq!(config.central.org, "lab");
        assert_eq!(config.collection.interval, Duration::from_secs(30));
        assert_eq!(config.collection.request_timeout, Duration::from_secs(10));
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].host_alias.as_deref(), Some("pod_8"));
        assert_eq!(config.sources[1].buckets, vec!["telegraf"]);
        assert!(config.sources[1].token.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.sources[0].name, "server_a");
    }

    #[test]
    fn test_shipped_config_parses() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/configs/config.yaml");
        let config = AppConfig::load(path).unwrap();
        let names: Vec<_> = config.sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["server_a", "server_b"]);
        assert_eq!(config.sources[1].host_alias.as_deref(), Some("pod_30"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = AppConfig::load("/nonexistent/config.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }

    #[test]
    fn test_config_validation_invalid_port() {
        let mut config = minimal();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_bind_address() {
        let mut config = minimal();
        config.server.bind = "not-an-ip".to_string();

        let result = config.validate();
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("invalid server bind address")
        );
    }

    #[test]
    fn test_config_validation_interval_too_short() {
        let mut config = minimal();
        config.collection.interval = Duration::from_millis(500);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("at least 1s"));
    }

    #[test]
    fn test_config_validation_duplicate_source_names() {
        let yaml = r#"
central: { url: "http://central:8086" }
sources:
  - { name: dup, url: "http://a:8086", buckets: [x] }
  - { name: dup, url: "http://b:8086", buckets: [y] }
"#;
        let err = AppConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate source name"));
    }

    #[test]
    fn test_config_validation_bad_central_url() {
        let err = AppConfig::from_yaml("central:\n  url: nowhere\n").unwrap_err();
        assert!(err.to_string().contains("central"));
    }

    #[test]
    fn test_config_missing_central() {
        let err = AppConfig::from_yaml("server:\n  port: 5000\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
