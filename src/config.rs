//! Configuration of the ingestion endpoint.
//!
//! Applications usually build [`SynchrologConfig`] from the environment;
//! the environment helpers are a convenience and the rest of the crate only
//! ever sees the resulting struct.

use std::time::Duration;

/// Access token issued by Synchrolog. Required.
pub const SYNCHROLOG_ACCESS_TOKEN_ENV: &str = "SYNCHROLOG_ACCESS_TOKEN";

/// Override for the plain log ingestion URL.
pub const SYNCHROLOG_LOG_URL_ENV: &str = "SYNCHROLOG_LOG_URL";

/// Override for the error ingestion URL.
pub const SYNCHROLOG_ERROR_URL_ENV: &str = "SYNCHROLOG_ERROR_URL";

/// Per-request timeout of the delivery client, in milliseconds.
pub const SYNCHROLOG_TIMEOUT_MS_ENV: &str = "SYNCHROLOG_TIMEOUT_MS";

pub const DEFAULT_LOG_URL: &str = "https://input.synchrolog.com/v1/track-backend";
pub const DEFAULT_ERROR_URL: &str = "https://input.synchrolog.com/v1/track-backend-error";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Connection settings for the Synchrolog ingestion API.
#[derive(Clone, Debug)]
pub struct SynchrologConfig {
    pub access_token: String,
    pub log_url: String,
    pub error_url: String,
    pub timeout: Duration,
}

impl SynchrologConfig {
    /// Config with the default endpoints and timeout.
    pub fn new(access_token: impl Into<String>) -> Self {
        SynchrologConfig {
            access_token: access_token.into(),
            log_url: DEFAULT_LOG_URL.to_string(),
            error_url: DEFAULT_ERROR_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Build from `SYNCHROLOG_*` environment variables.
    ///
    /// A missing token is not an error here; [`SynchrologConfig::validate`]
    /// (called by `init`) reports it.
    pub fn from_env() -> Result<Self, ConfigError> {
        let timeout = match std::env::var(SYNCHROLOG_TIMEOUT_MS_ENV) {
            Ok(raw) => {
                let ms = raw
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| ConfigError::InvalidTimeout(raw.clone()))?;
                Duration::from_millis(ms)
            }
            Err(_) => DEFAULT_TIMEOUT,
        };

        Ok(SynchrologConfig {
            access_token: env_or(SYNCHROLOG_ACCESS_TOKEN_ENV, ""),
            log_url: env_or(SYNCHROLOG_LOG_URL_ENV, DEFAULT_LOG_URL),
            error_url: env_or(SYNCHROLOG_ERROR_URL_ENV, DEFAULT_ERROR_URL),
            timeout,
        })
    }

    pub fn with_log_url(mut self, url: impl Into<String>) -> Self {
        self.log_url = url.into();
        self
    }

    pub fn with_error_url(mut self, url: impl Into<String>) -> Self {
        self.error_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_token.trim().is_empty() {
            return Err(ConfigError::MissingAccessToken);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout("0".to_string()));
        }
        Ok(())
    }
}

/// Error returned for an unusable [`SynchrologConfig`].
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("SYNCHROLOG_ACCESS_TOKEN can not be empty")]
    MissingAccessToken,

    #[error("invalid delivery timeout: {0:?}")]
    InvalidTimeout(String),
}
