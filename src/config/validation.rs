//! Configuration validation utilities.

use std::sync::OnceLock;
use std::time::Duration;

use regex::{Captures, Regex};
use thiserror::Error;
use url::Url;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse YAML configuration.
    #[error("failed to parse YAML config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Configuration validation failed.
    #[error("config validation error: {0}")]
    ValidationError(String),
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }
}

/// Parse duration string using humantime.
///
/// Accepts `30s`, `1m`, `5m30s`, `1h`, `100ms` and friends.
///
/// # Examples
///
/// ```
/// use tributary::config::parse_duration;
///
/// assert_eq!(parse_duration("30s").unwrap().as_secs(), 30);
/// assert_eq!(parse_duration("2m").unwrap().as_secs(), 120);
/// ```
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("duration string is empty".to_string());
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Expand `${VAR}` and `${VAR:-default}` references from the environment.
///
/// Unset variables without a default expand to the empty string.
pub fn expand_env_vars(input: &str) -> String {
    static ENV_VAR_REGEX: OnceLock<Regex> = OnceLock::new();

    let regex = ENV_VAR_REGEX.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("failed to compile env var regex")
    });

    regex
        .replace_all(input, |caps: &Captures| {
            let default = caps.get(2).map_or("", |m| m.as_str());
            std::env::var(&caps[1]).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
}

/// Require an absolute http(s) URL.
pub(crate) fn validate_url(context: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value).map_err(|e| {
        ConfigError::invalid(format!("{context}: invalid URL '{value}': {e}"))
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::invalid(format!(
            "{context}: unsupported URL scheme '{other}'"
        ))),
    }
}
