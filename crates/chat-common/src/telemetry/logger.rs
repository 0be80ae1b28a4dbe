//! Pluggable leveled logger
//!
//! Levels are ordered `None < Fatal < Info < Trace`; a logger configured at a
//! level also receives every lower level. [`LoggerLayer`] bridges `tracing`
//! events into any [`Logger`], so library code only ever uses `tracing` macros.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::str::FromStr;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::level_filters::LevelFilter;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// Logger verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    None,
    Fatal,
    Info,
    Trace,
}

impl LogLevel {
    /// Whether a logger at this level emits a line logged at `level`
    #[inline]
    #[must_use]
    pub fn enables(self, level: LogLevel) -> bool {
        level != LogLevel::None && level <= self
    }

    /// Equivalent `tracing` filter
    #[must_use]
    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            Self::None => LevelFilter::OFF,
            Self::Fatal => LevelFilter::ERROR,
            Self::Info => LevelFilter::INFO,
            Self::Trace => LevelFilter::TRACE,
        }
    }

    /// Map a `tracing` level onto the logger's coarser scale
    #[must_use]
    pub fn from_tracing(level: &Level) -> Self {
        match *level {
            Level::ERROR => Self::Fatal,
            Level::WARN | Level::INFO => Self::Info,
            _ => Self::Trace,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Fatal => "FATAL",
            Self::Info => "INFO",
            Self::Trace => "TRACE",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error returned for an unrecognised level name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level: {0}")]
pub struct LogLevelParseError(pub String);

impl FromStr for LogLevel {
    type Err = LogLevelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "fatal" | "error" => Ok(Self::Fatal),
            "info" => Ok(Self::Info),
            "trace" | "debug" => Ok(Self::Trace),
            other => Err(LogLevelParseError(other.to_string())),
        }
    }
}

/// Sink for leveled log lines
pub trait Logger: Send + Sync + 'static {
    fn log(&self, level: LogLevel, message: &str);
}

impl<L: Logger + ?Sized> Logger for Arc<L> {
    fn log(&self, level: LogLevel, message: &str) {
        (**self).log(level, message);
    }
}

/// Default logger printing `[LEVEL] message` lines to stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn log(&self, level: LogLevel, message: &str) {
        println!("[{}] {}", level.label(), message);
    }
}

/// `tracing` layer forwarding events to a [`Logger`]
pub struct LoggerLayer<L> {
    logger: L,
    level: LogLevel,
}

impl<L: Logger> LoggerLayer<L> {
    #[must_use]
    pub fn new(logger: L, level: LogLevel) -> Self {
        Self { logger, level }
    }
}

impl<S, L> Layer<S> for LoggerLayer<L>
where
    S: Subscriber,
    L: Logger,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = LogLevel::from_tracing(event.metadata().level());
        if !self.level.enables(level) {
            return;
        }

        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        self.logger.log(level, &visitor.finish());
    }
}

/// Flattens an event into `message key=value ...`
#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl LineVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.trim_start().to_string()
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}
