//! Client configuration parsed from environment variables.
//!
//! TIMEOUTS
//! ========
//! Every request carries an explicit bound. Ordinary chat/profile/history
//! calls share `request_secs`; drawing analysis gets its own, longer
//! `analysis_secs` which also caps status polling.

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_STATE_DIR: &str = ".dreamsearch";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_ANALYSIS_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid base URL '{0}' (expected http:// or https://)")]
    InvalidBaseUrl(String),
    #[error("{var} must be greater than zero")]
    ZeroTimeout { var: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
    pub analysis_secs: u64,
}

impl Timeouts {
    #[must_use]
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    #[must_use]
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    #[must_use]
    pub fn analysis(&self) -> Duration {
        Duration::from_secs(self.analysis_secs)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            analysis_secs: DEFAULT_ANALYSIS_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Backend root, without a trailing slash.
    pub base_url: String,
    /// Directory holding the persisted auth snapshot.
    pub state_dir: PathBuf,
    pub timeouts: Timeouts,
}

impl ClientConfig {
    /// Build typed client config from environment variables.
    ///
    /// Optional:
    /// - `DREAMSEARCH_API_URL`: default `http://localhost:8000`
    /// - `DREAMSEARCH_STATE_DIR`: default `.dreamsearch`
    /// - `DREAMSEARCH_REQUEST_TIMEOUT_SECS`: default 30
    /// - `DREAMSEARCH_CONNECT_TIMEOUT_SECS`: default 10
    /// - `DREAMSEARCH_ANALYSIS_TIMEOUT_SECS`: default 300
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is not http(s) or a timeout is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] but reads values through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is not http(s) or a timeout is zero.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = normalize_base_url(
            lookup("DREAMSEARCH_API_URL")
                .as_deref()
                .unwrap_or(DEFAULT_API_BASE_URL),
        )?;
        let state_dir = lookup("DREAMSEARCH_STATE_DIR").map_or_else(|| PathBuf::from(DEFAULT_STATE_DIR), PathBuf::from);
        let timeouts = Timeouts {
            request_secs: parse_timeout(&lookup, "DREAMSEARCH_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?,
            connect_secs: parse_timeout(&lookup, "DREAMSEARCH_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)?,
            analysis_secs: parse_timeout(&lookup, "DREAMSEARCH_ANALYSIS_TIMEOUT_SECS", DEFAULT_ANALYSIS_TIMEOUT_SECS)?,
        };
        Ok(Self { base_url, state_dir, timeouts })
    }

    /// Override the backend root (e.g. from a CLI flag).
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not http(s).
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, ConfigError> {
        self.base_url = normalize_base_url(base_url)?;
        Ok(self)
    }

    /// Path of the persisted auth snapshot inside `state_dir`.
    #[must_use]
    pub fn auth_file(&self) -> PathBuf {
        self.state_dir.join("auth.json")
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_owned(),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            timeouts: Timeouts::default(),
        }
    }
}

fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ConfigError::InvalidBaseUrl(raw.to_owned()));
    }
    Ok(trimmed.to_owned())
}

/// Unparseable values fall back to the default; an explicit zero is rejected.
fn parse_timeout<F>(lookup: &F, var: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(var)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default);
    if value == 0 {
        return Err(ConfigError::ZeroTimeout { var });
    }
    Ok(value)
}
