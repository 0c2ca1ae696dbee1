//! Service Configuration Settings
//!
//! Configuration types for the exchange rate stream, loaded from environment
//! variables.

use std::time::Duration;

use crate::infrastructure::finnhub::{DEFAULT_FINNHUB_WS_URL, FinnhubClientConfig, ReconnectConfig};
use crate::infrastructure::synthetic::SyntheticConfig;

/// Which price feed backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedMode {
    /// Live trades from Finnhub.
    #[default]
    Live,
    /// Locally generated prices.
    Synthetic,
}

impl FeedMode {
    /// Parse a feed mode, ignoring case. Returns `None` for unknown values.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "live" | "finnhub" => Some(Self::Live),
            "synthetic" | "mock" => Some(Self::Synthetic),
            _ => None,
        }
    }

    /// Mode name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Synthetic => "synthetic",
        }
    }
}

/// Finnhub connection settings.
#[derive(Clone)]
pub struct FinnhubSettings {
    /// API key; `None` leaves the live feed disabled.
    pub api_key: Option<String>,
    /// WebSocket endpoint.
    pub ws_url: String,
    /// Fixed delay before reconnecting.
    pub reconnect_delay: Duration,
}

impl Default for FinnhubSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            ws_url: DEFAULT_FINNHUB_WS_URL.to_string(),
            reconnect_delay: Duration::from_millis(5000),
        }
    }
}

impl FinnhubSettings {
    /// Client configuration for these settings.
    #[must_use]
    pub fn client_config(&self) -> FinnhubClientConfig {
        FinnhubClientConfig::new(self.ws_url.clone(), self.api_key.clone())
            .with_reconnect(ReconnectConfig::with_delay(self.reconnect_delay))
    }
}

impl std::fmt::Debug for FinnhubSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinnhubSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("ws_url", &self.ws_url)
            .field("reconnect_delay", &self.reconnect_delay)
            .finish()
    }
}

/// Synthetic feed settings.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticSettings {
    /// Interval between generated batches.
    pub interval: Duration,
    /// Generator seed.
    pub seed: u64,
}

impl Default for SyntheticSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            seed: 42,
        }
    }
}

impl SyntheticSettings {
    /// Feed configuration for these settings.
    #[must_use]
    pub const fn feed_config(&self) -> SyntheticConfig {
        SyntheticConfig {
            interval: self.interval,
            seed: self.seed,
        }
    }
}

/// SSE stream settings.
#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    /// Interval between heartbeat payloads.
    pub heartbeat_interval: Duration,
    /// Payloads buffered per client before new ones are dropped.
    pub client_buffer: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(30_000),
            client_buffer: 256,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// HTTP port for the stream, health, and metrics endpoints.
    pub http_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { http_port: 3000 }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, Default)]
pub struct StreamConfig {
    /// Which feed backs the service.
    pub feed_mode: FeedMode,
    /// Finnhub settings.
    pub finnhub: FinnhubSettings,
    /// Synthetic feed settings.
    pub synthetic: SyntheticSettings,
    /// SSE stream settings.
    pub stream: StreamSettings,
    /// Server settings.
    pub server: ServerSettings,
}

impl StreamConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds a value the service cannot run
    /// with.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds a value the service cannot run
    /// with.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let feed_mode = match lookup("PRICE_FEED") {
            Some(value) => FeedMode::from_str_case_insensitive(&value).ok_or_else(|| {
                ConfigError::InvalidValue {
                    key: "PRICE_FEED".to_string(),
                    reason: format!("expected 'live' or 'synthetic', got '{value}'"),
                }
            })?,
            None => FeedMode::default(),
        };

        let finnhub = FinnhubSettings {
            api_key: lookup("FINNHUB_API_KEY").filter(|k| !k.trim().is_empty()),
            ws_url: lookup("FINNHUB_WS_URL")
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| FinnhubSettings::default().ws_url),
            reconnect_delay: require_nonzero(
                "FEED_RECONNECT_DELAY_MS",
                parse_duration_millis(
                    &lookup,
                    "FEED_RECONNECT_DELAY_MS",
                    FinnhubSettings::default().reconnect_delay,
                ),
            )?,
        };

        let synthetic_interval_key = if lookup("SYNTHETIC_INTERVAL_MS").is_some() {
            "SYNTHETIC_INTERVAL_MS"
        } else {
            "MOCK_DATA_INTERVAL"
        };
        let synthetic = SyntheticSettings {
            interval: require_nonzero(
                synthetic_interval_key,
                parse_duration_millis(
                    &lookup,
                    synthetic_interval_key,
                    SyntheticSettings::default().interval,
                ),
            )?,
            seed: parse_u64(&lookup, "SYNTHETIC_SEED", SyntheticSettings::default().seed),
        };

        let stream = StreamSettings {
            heartbeat_interval: require_nonzero(
                "STREAM_HEARTBEAT_INTERVAL_MS",
                parse_duration_millis(
                    &lookup,
                    "STREAM_HEARTBEAT_INTERVAL_MS",
                    StreamSettings::default().heartbeat_interval,
                ),
            )?,
            client_buffer: parse_usize(
                &lookup,
                "STREAM_CLIENT_BUFFER",
                StreamSettings::default().client_buffer,
            ),
        };
        if stream.client_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                key: "STREAM_CLIENT_BUFFER".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        let server = ServerSettings {
            http_port: parse_u16(&lookup, "HTTP_PORT", ServerSettings::default().http_port),
        };

        Ok(Self {
            feed_mode,
            finnhub,
            synthetic,
            stream,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable holds an unusable value.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
}

fn require_nonzero(key: &str, value: Duration) -> Result<Duration, ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

fn parse_value<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Ignoring unparsable setting");
            default
        }),
        None => default,
    }
}

fn parse_u16<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: u16) -> u16 {
    parse_value(lookup, key, default)
}

fn parse_u64<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: u64) -> u64 {
    parse_value(lookup, key, default)
}

fn parse_usize<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: usize) -> usize {
    parse_value(lookup, key, default)
}

fn parse_duration_millis<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key).map_or(default, |raw| match raw.trim().parse::<u64>() {
        Ok(millis) => Duration::from_millis(millis),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparsable duration");
            default
        }
    })
}
