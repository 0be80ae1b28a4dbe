//! Telemetry: tracing setup and the pluggable logger

mod logger;
mod tracing_setup;

pub use logger::{ConsoleLogger, LogLevel, LogLevelParseError, Logger, LoggerLayer};
pub use tracing_setup::{
    init_tracing, init_tracing_with_config, try_init_logger, try_init_tracing,
    try_init_tracing_with_config, TracingConfig, TracingError,
};
