//! Stream Configuration Settings
//!
//! Configuration types for the Polygon stream, loaded from environment
//! variables.

use std::net::SocketAddr;
use std::time::Duration;

use crate::domain::streaming::{QUOTES, TRADES};

/// Endpoint used when `POLYGON_WS_URL` is not set.
pub const DEFAULT_ENDPOINT: &str = "alpaca.socket.polygon.io";

/// Fixed path of the stock data stream.
pub const STREAM_PATH: &str = "/stocks";

/// Default time allowed for the authentication acknowledgment.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(5);

/// API credentials.
///
/// Only the key id takes part in the stream handshake. The `Debug`
/// implementation redacts it; `Display` shows a short prefix for logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    key_id: String,
}

impl Credentials {
    /// Create new credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the key id is empty.
    pub fn new(key_id: impl Into<String>) -> Result<Self, ConfigError> {
        let key_id = key_id.into();
        if key_id.trim().is_empty() {
            return Err(ConfigError::EmptyValue("APCA_API_KEY_ID".to_string()));
        }
        Ok(Self { key_id })
    }

    /// Get the key id.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key_id", &"[REDACTED]")
            .finish()
    }
}

impl std::fmt::Display for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix: String = self.key_id.chars().take(4).collect();
        write!(f, "Credentials(key_id={prefix}…)")
    }
}

/// Reconnection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectSettings {
    /// Delay after the first failed reopen.
    pub delay_initial: Duration,
    /// Maximum delay between reopen attempts.
    pub delay_max: Duration,
    /// Multiplier for exponential backoff.
    pub delay_multiplier: f64,
    /// Maximum failed attempts before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            delay_initial: Duration::from_millis(500),
            delay_max: Duration::from_secs(30),
            delay_multiplier: 2.0,
            max_attempts: 0, // Unlimited
        }
    }
}

/// Complete stream configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Full WebSocket URL of the stock stream.
    pub url: String,
    /// API credentials.
    pub credentials: Credentials,
    /// Bound on the authentication acknowledgment wait.
    pub auth_timeout: Duration,
    /// Reconnection settings.
    pub reconnect: ReconnectSettings,
    /// Channels the binary subscribes to at startup.
    pub channels: Vec<String>,
    /// Prometheus scrape address; metrics are recorded but not served when unset.
    pub metrics_addr: Option<SocketAddr>,
}

impl StreamConfig {
    /// Create a configuration for an explicit URL with default settings.
    #[must_use]
    pub fn new(url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            url: url.into(),
            credentials,
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            reconnect: ReconnectSettings::default(),
            channels: vec![TRADES.to_string(), QUOTES.to_string()],
            metrics_addr: None,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `APCA_API_KEY_ID` is missing or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if `APCA_API_KEY_ID` is missing or empty, or if the
    /// backoff multiplier is not a finite number of at least 1.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key_id = lookup("APCA_API_KEY_ID")
            .ok_or_else(|| ConfigError::MissingEnvVar("APCA_API_KEY_ID".to_string()))?;
        let credentials = Credentials::new(key_id)?;

        let endpoint = lookup("POLYGON_WS_URL").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        let auth_timeout = parse_duration_secs(
            lookup("POLYGON_STREAM_AUTH_TIMEOUT_SECS"),
            DEFAULT_AUTH_TIMEOUT,
        );

        let defaults = ReconnectSettings::default();
        let reconnect = ReconnectSettings {
            delay_initial: parse_duration_millis(
                lookup("POLYGON_STREAM_RECONNECT_DELAY_INITIAL_MS"),
                defaults.delay_initial,
            ),
            delay_max: parse_duration_secs(
                lookup("POLYGON_STREAM_RECONNECT_DELAY_MAX_SECS"),
                defaults.delay_max,
            ),
            delay_multiplier: parse_multiplier(
                lookup("POLYGON_STREAM_RECONNECT_DELAY_MULTIPLIER"),
                defaults.delay_multiplier,
            )?,
            max_attempts: parse_or(
                lookup("POLYGON_STREAM_RECONNECT_MAX_ATTEMPTS"),
                defaults.max_attempts,
            ),
        };

        let channels = lookup("POLYGON_STREAM_CHANNELS")
            .map(|raw| parse_channels(&raw))
            .filter(|channels| !channels.is_empty())
            .unwrap_or_else(|| vec![TRADES.to_string(), QUOTES.to_string()]);

        let metrics_addr = lookup("POLYGON_STREAM_METRICS_ADDR").and_then(|v| v.trim().parse().ok());

        Ok(Self {
            url: stream_url(&endpoint),
            credentials,
            auth_timeout,
            reconnect,
            channels,
            metrics_addr,
        })
    }
}

/// Build the stock stream URL from a configured endpoint.
///
/// Accepts a bare host or a URL. `http` and `ws` schemes select plain `ws`;
/// everything else uses `wss`. Any path on the endpoint is replaced by
/// [`STREAM_PATH`].
#[must_use]
pub fn stream_url(endpoint: &str) -> String {
    let endpoint = endpoint.trim();

    let (scheme, rest) = match endpoint.split_once("://") {
        Some((scheme, rest))
            if scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("ws") =>
        {
            ("ws", rest)
        }
        Some((_, rest)) => ("wss", rest),
        None => ("wss", endpoint),
    };

    let host = rest.split_once('/').map_or(rest, |(host, _)| host);

    format!("{scheme}://{host}{STREAM_PATH}")
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable is set to a value outside its allowed range.
    #[error("invalid value for {var}: {value}")]
    InvalidValue {
        /// Variable name.
        var: String,
        /// Offending value.
        value: String,
    },
}

fn parse_channels(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|channel| !channel.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn parse_multiplier(value: Option<String>, default: f64) -> Result<f64, ConfigError> {
    let Some(raw) = value else {
        return Ok(default);
    };
    match raw.trim().parse::<f64>() {
        Ok(multiplier) if multiplier.is_finite() && multiplier >= 1.0 => Ok(multiplier),
        Ok(_) => Err(ConfigError::InvalidValue {
            var: "POLYGON_STREAM_RECONNECT_DELAY_MULTIPLIER".to_string(),
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}

fn parse_duration_secs(value: Option<String>, default: Duration) -> Duration {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_duration_millis(value: Option<String>, default: Duration) -> Duration {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
