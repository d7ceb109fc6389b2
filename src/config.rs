//! Hub configuration parsed from environment variables.

use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5000;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid NOTIFY_BASE_URL {0:?}: expected an http:// or https:// URL")]
    InvalidBaseUrl(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Notification service root, without a trailing slash.
    pub base_url: String,
    /// Idle timeout requested from the backend. `None` leaves it to the server.
    pub timeout_ms: Option<u64>,
    /// Fixed wait between a failed attempt and the next one.
    pub reconnect_delay: Duration,
    /// TCP connect timeout for push and REST requests.
    pub connect_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout_ms: None,
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl HubConfig {
    /// Build typed hub config from environment variables.
    ///
    /// Optional:
    /// - `NOTIFY_BASE_URL`: default `http://localhost:8080`
    /// - `NOTIFY_TIMEOUT_MS`: idle timeout sent to the server, `0` means none
    /// - `NOTIFY_RECONNECT_DELAY_MS`: default 5000
    /// - `NOTIFY_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] if the base URL is not http(s).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`HubConfig::from_env`] over an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] if the base URL is not http(s).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = parse_base_url(lookup("NOTIFY_BASE_URL").as_deref())?;
        let timeout_ms = parse_or("NOTIFY_TIMEOUT_MS", &lookup, 0_u64);
        let reconnect_ms = parse_or("NOTIFY_RECONNECT_DELAY_MS", &lookup, DEFAULT_RECONNECT_DELAY_MS);
        let connect_secs = parse_or("NOTIFY_CONNECT_TIMEOUT_SECS", &lookup, DEFAULT_CONNECT_TIMEOUT_SECS);

        Ok(Self {
            base_url,
            timeout_ms: (timeout_ms > 0).then_some(timeout_ms),
            reconnect_delay: Duration::from_millis(reconnect_ms),
            connect_timeout: Duration::from_secs(connect_secs),
        })
    }
}

fn parse_or<T>(key: &str, lookup: &impl Fn(&str) -> Option<String>, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_base_url(raw: Option<&str>) -> Result<String, ConfigError> {
    let raw = raw.map_or(DEFAULT_BASE_URL, str::trim);
    if !(raw.starts_with("http://") || raw.starts_with("https://")) {
        return Err(ConfigError::InvalidBaseUrl(raw.to_owned()));
    }
    let trimmed = raw.trim_end_matches('/');
    if trimmed.ends_with(':') || trimmed.ends_with("//") {
        return Err(ConfigError::InvalidBaseUrl(raw.to_owned()));
    }
    Ok(trimmed.to_owned())
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
