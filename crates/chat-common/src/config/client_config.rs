//! Client configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file when present).

use chat_core::RetentionPolicy;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::telemetry::LogLevel;

/// Base URL of the versioned REST API
pub const API_BASE: &str = "https://discordapp.com/api/v6/";

/// Gateway protocol version requested on connect
pub const API_VERSION: u8 = 6;

/// Main client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Bot token sent in `Authorization` headers and the identify frame
    pub token: String,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub rest: RestConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Entity cache configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub retention: RetentionPolicy,
}

/// Logger configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: LogLevel,
    #[serde(default)]
    pub json: bool,
}

/// REST dispatcher configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RestConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Timeout applied to every HTTP call
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Maximum number of requests on the wire across all buckets
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Retry budget for network failures and 5xx responses
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Requeue budget for 429 responses
    #[serde(default = "default_max_rate_limit_retries")]
    pub max_rate_limit_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

/// Gateway session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub shard_id: u32,
    #[serde(default = "default_shard_count")]
    pub shard_count: u32,
    /// Connect attempts before the session gives up
    #[serde(default = "default_max_connect_attempts")]
    pub max_connect_attempts: u32,
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// How long to wait for the hello frame after connecting
    #[serde(default = "default_hello_timeout_ms")]
    pub hello_timeout_ms: u64,
    /// Maximum time one event handler call may take before it is dropped
    #[serde(default = "default_handler_timeout_ms")]
    pub handler_timeout_ms: u64,
    /// Member count above which the service omits offline members
    #[serde(default = "default_large_threshold")]
    pub large_threshold: u32,
}

// Default value functions
fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_api_base() -> String {
    API_BASE.to_string()
}

fn default_user_agent() -> String {
    concat!("DiscordBot (chat-client, ", env!("CARGO_PKG_VERSION"), ")").to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_max_in_flight() -> usize {
    16
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_rate_limit_retries() -> u32 {
    5
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_retry_max_delay_ms() -> u64 {
    10_000
}

fn default_shard_count() -> u32 {
    1
}

fn default_max_connect_attempts() -> u32 {
    5
}

fn default_backoff_initial_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    60_000
}

fn default_hello_timeout_ms() -> u64 {
    20_000
}

fn default_handler_timeout_ms() -> u64 {
    5_000
}

fn default_large_threshold() -> u32 {
    250
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            user_agent: default_user_agent(),
            request_timeout_ms: default_request_timeout_ms(),
            max_in_flight: default_max_in_flight(),
            max_retries: default_max_retries(),
            max_rate_limit_retries: default_max_rate_limit_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl RestConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            shard_id: 0,
            shard_count: default_shard_count(),
            max_connect_attempts: default_max_connect_attempts(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            hello_timeout_ms: default_hello_timeout_ms(),
            handler_timeout_ms: default_handler_timeout_ms(),
            large_threshold: default_large_threshold(),
        }
    }
}

impl GatewayConfig {
    #[must_use]
    pub fn hello_timeout(&self) -> Duration {
        Duration::from_millis(self.hello_timeout_ms)
    }

    #[must_use]
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }
}

impl ClientConfig {
    /// Configuration with every setting at its default
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            cache: CacheConfig::default(),
            log: LogConfig::default(),
            rest: RestConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if `CHAT_TOKEN` is missing or an enumerated setting is invalid
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Ok(Self {
            token: env::var("CHAT_TOKEN").map_err(|_| ConfigError::MissingVar("CHAT_TOKEN"))?,
            cache: CacheConfig {
                retention: parse_enum("CACHE_RETENTION")?.unwrap_or_default(),
            },
            log: LogConfig {
                level: parse_enum("LOG_LEVEL")?.unwrap_or_else(default_log_level),
                json: env_or("LOG_JSON", false),
            },
            rest: RestConfig {
                api_base: env::var("REST_API_BASE").unwrap_or_else(|_| default_api_base()),
                user_agent: env::var("REST_USER_AGENT").unwrap_or_else(|_| default_user_agent()),
                request_timeout_ms: env_or("REST_REQUEST_TIMEOUT_MS", default_request_timeout_ms()),
                max_in_flight: env_or("REST_MAX_IN_FLIGHT", default_max_in_flight()),
                max_retries: env_or("REST_MAX_RETRIES", default_max_retries()),
                max_rate_limit_retries: env_or(
                    "REST_MAX_RATE_LIMIT_RETRIES",
                    default_max_rate_limit_retries(),
                ),
                retry_base_delay_ms: env_or("REST_RETRY_BASE_DELAY_MS", default_retry_base_delay_ms()),
                retry_max_delay_ms: env_or("REST_RETRY_MAX_DELAY_MS", default_retry_max_delay_ms()),
            },
            gateway: GatewayConfig {
                shard_id: env_or("GATEWAY_SHARD_ID", 0),
                shard_count: env_or("GATEWAY_SHARD_COUNT", default_shard_count()),
                max_connect_attempts: env_or(
                    "GATEWAY_MAX_CONNECT_ATTEMPTS",
                    default_max_connect_attempts(),
                ),
                backoff_initial_ms: env_or("GATEWAY_BACKOFF_INITIAL_MS", default_backoff_initial_ms()),
                backoff_max_ms: env_or("GATEWAY_BACKOFF_MAX_MS", default_backoff_max_ms()),
                hello_timeout_ms: env_or("GATEWAY_HELLO_TIMEOUT_MS", default_hello_timeout_ms()),
                handler_timeout_ms: env_or("GATEWAY_HANDLER_TIMEOUT_MS", default_handler_timeout_ms()),
                large_threshold: env_or("GATEWAY_LARGE_THRESHOLD", default_large_threshold()),
            },
        })
    }

    /// Check settings that would make the client unusable
    ///
    /// # Errors
    /// Returns an error naming the first invalid setting
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.trim().is_empty() {
            return Err(ConfigError::InvalidValue("token", "must not be empty".to_string()));
        }
        if self.gateway.shard_count == 0 || self.gateway.shard_id >= self.gateway.shard_count {
            return Err(ConfigError::InvalidValue(
                "gateway.shard_id",
                format!("{} of {}", self.gateway.shard_id, self.gateway.shard_count),
            ));
        }
        if self.rest.max_in_flight == 0 {
            return Err(ConfigError::InvalidValue("rest.max_in_flight", "0".to_string()));
        }
        Ok(())
    }
}

fn env_or<T: FromStr>(key: &'static str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn parse_enum<T>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue(key, e.to_string())),
        Err(_) => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
