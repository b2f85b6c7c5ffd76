//! HealthVault client configuration.
//!
//! Configuration is loaded from environment variables. The login password
//! is redacted in Debug output.

use common::config::{ObservabilityConfig, DEFAULT_LOG_LEVEL};
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default base URL of the health-record API.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api/v1";

/// Default whole-request timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 10;

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 5;

/// HealthVault client configuration.
#[derive(Clone)]
pub struct Config {
    /// API base URL without trailing slash (default: `http://localhost:8080/api/v1`).
    pub api_base_url: String,

    /// Timeout for a whole request, renewal included.
    pub http_timeout: Duration,

    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,

    /// Session file. `None` keeps the session in memory for the process
    /// lifetime only.
    pub session_file: Option<PathBuf>,

    /// Email used by the session probe when no session is stored.
    pub login_email: Option<String>,

    /// Password used by the session probe.
    pub login_password: Option<SecretString>,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_base_url", &self.api_base_url)
            .field("http_timeout", &self.http_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("session_file", &self.session_file)
            .field("login_email", &self.login_email)
            .field(
                "login_password",
                &self.login_password.as_ref().map(|_| "[REDACTED]"),
            )
            .field("observability", &self.observability)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECONDS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECONDS),
            session_file: None,
            login_email: None,
            login_password: None,
            observability: ObservabilityConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid API base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("Invalid timeout configuration: {0}")]
    InvalidTimeout(String),

    #[error("Invalid logging configuration: {0}")]
    InvalidLogging(String),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let api_base_url = vars
            .get("HV_API_BASE_URL")
            .map_or(DEFAULT_API_BASE_URL, String::as_str)
            .trim()
            .trim_end_matches('/')
            .to_string();

        if !(api_base_url.starts_with("http://") || api_base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(format!(
                "HV_API_BASE_URL must start with http:// or https://, got '{api_base_url}'"
            )));
        }

        let http_timeout_secs = parse_seconds(
            vars,
            "HV_HTTP_TIMEOUT_SECONDS",
            DEFAULT_HTTP_TIMEOUT_SECONDS,
        )?;
        let connect_timeout_secs = parse_seconds(
            vars,
            "HV_CONNECT_TIMEOUT_SECONDS",
            DEFAULT_CONNECT_TIMEOUT_SECONDS,
        )?;

        if connect_timeout_secs > http_timeout_secs {
            return Err(ConfigError::InvalidTimeout(format!(
                "HV_CONNECT_TIMEOUT_SECONDS ({connect_timeout_secs}) must not exceed HV_HTTP_TIMEOUT_SECONDS ({http_timeout_secs})"
            )));
        }

        let session_file = vars
            .get("HV_SESSION_FILE")
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        let login_email = vars
            .get("HV_LOGIN_EMAIL")
            .filter(|value| !value.trim().is_empty())
            .cloned();

        let login_password = vars
            .get("HV_LOGIN_PASSWORD")
            .filter(|value| !value.is_empty())
            .cloned()
            .map(SecretString::from);

        let log_level = vars
            .get("HV_LOG_LEVEL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
        if log_level.trim().is_empty() {
            return Err(ConfigError::InvalidLogging(
                "HV_LOG_LEVEL must not be empty".to_string(),
            ));
        }

        let json_logs = match vars.get("HV_LOG_JSON").map(String::as_str) {
            None => false,
            Some("true" | "1") => true,
            Some("false" | "0") => false,
            Some(other) => {
                return Err(ConfigError::InvalidLogging(format!(
                    "HV_LOG_JSON must be true, false, 1 or 0, got '{other}'"
                )))
            }
        };

        Ok(Config {
            api_base_url,
            http_timeout: Duration::from_secs(http_timeout_secs),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            session_file,
            login_email,
            login_password,
            observability: ObservabilityConfig {
                log_level,
                json_logs,
            },
        })
    }

    /// Reject a plain-HTTP base URL. Tokens travel in headers, so anything
    /// beyond local development needs TLS.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidBaseUrl` if the base URL is not HTTPS.
    pub fn require_https(&self) -> Result<(), ConfigError> {
        if self.api_base_url.starts_with("https://") {
            Ok(())
        } else {
            Err(ConfigError::InvalidBaseUrl(format!(
                "HTTPS required, got '{}'",
                self.api_base_url
            )))
        }
    }
}

fn parse_seconds(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: u64 = value_str.trim().parse().map_err(|e| {
        ConfigError::InvalidTimeout(format!(
            "{name} must be a valid positive integer, got '{value_str}': {e}"
        ))
    })?;

    if value == 0 {
        return Err(ConfigError::InvalidTimeout(format!(
            "{name} must be greater than 0"
        )));
    }

    Ok(value)
}
