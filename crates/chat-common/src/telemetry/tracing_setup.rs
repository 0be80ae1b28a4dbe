//! Tracing subscriber setup
//!
//! Installs a `tracing` subscriber for applications embedding the client.
//! `RUST_LOG` overrides the configured level when set.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::logger::{LogLevel, Logger, LoggerLayer};
use crate::config::LogConfig;

/// Tracing configuration options
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Most verbose level emitted
    pub level: LogLevel,
    /// Enable JSON output format
    pub json: bool,
    /// Include file and line numbers
    pub file_line: bool,
    /// Include thread names
    pub thread_names: bool,
    /// Include thread IDs
    pub thread_ids: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json: false,
            file_line: false,
            thread_names: false,
            thread_ids: false,
        }
    }
}

impl TracingConfig {
    /// Verbose configuration for local debugging
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: LogLevel::Trace,
            json: false,
            file_line: true,
            thread_names: true,
            thread_ids: false,
        }
    }

    /// Build from the client's log section
    #[must_use]
    pub fn from_log_config(config: &LogConfig) -> Self {
        Self {
            level: config.level,
            json: config.json,
            ..Self::default()
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.to_level_filter().to_string()))
    }
}

/// Initialize the tracing subscriber with default configuration
///
/// # Panics
/// Panics if a global subscriber is already set.
pub fn init_tracing() {
    init_tracing_with_config(&TracingConfig::default());
}

/// Initialize the tracing subscriber with custom configuration
///
/// # Panics
/// Panics if a global subscriber is already set.
pub fn init_tracing_with_config(config: &TracingConfig) {
    if let Err(e) = try_init_tracing_with_config(config) {
        panic!("{e}");
    }
}

/// Try to initialize tracing with default configuration
pub fn try_init_tracing() -> Result<(), TracingError> {
    try_init_tracing_with_config(&TracingConfig::default())
}

/// Try to initialize tracing with custom configuration
///
/// Unlike `init_tracing_with_config`, this never panics when a subscriber is already set.
pub fn try_init_tracing_with_config(config: &TracingConfig) -> Result<(), TracingError> {
    let json_layer = config.json.then(|| {
        fmt::layer()
            .json()
            .with_file(config.file_line)
            .with_line_number(config.file_line)
            .with_thread_names(config.thread_names)
            .with_thread_ids(config.thread_ids)
    });
    let text_layer = (!config.json).then(|| {
        fmt::layer()
            .with_file(config.file_line)
            .with_line_number(config.file_line)
            .with_thread_names(config.thread_names)
            .with_thread_ids(config.thread_ids)
    });

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|_| TracingError::AlreadyInitialized)
}

/// Route every tracing event at or below `level` to a custom [`Logger`]
pub fn try_init_logger<L: Logger>(logger: L, level: LogLevel) -> Result<(), TracingError> {
    tracing_subscriber::registry()
        .with(LoggerLayer::new(logger, level))
        .try_init()
        .map_err(|_| TracingError::AlreadyInitialized)
}

/// Tracing initialization errors
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("Tracing subscriber already initialized")]
    AlreadyInitialized,
}
