//! Structured log events.
//!
//! A `LogEvent` is produced once per `tracing` event (or per performance
//! record), routed to every interested sink, and then dropped.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Severity levels understood by the sinks, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub enum LogLevel {
    #[serde(alias = "debug")]
    Debug,
    #[serde(alias = "info", alias = "information")]
    Information,
    #[serde(alias = "warn", alias = "warning")]
    Warning,
    #[serde(alias = "error")]
    Error,
}

impl LogLevel {
    /// Map a `tracing` level. TRACE has no counterpart and is not routed.
    pub fn from_tracing(level: &tracing::Level) -> Option<Self> {
        match *level {
            tracing::Level::TRACE => None,
            tracing::Level::DEBUG => Some(LogLevel::Debug),
            tracing::Level::INFO => Some(LogLevel::Information),
            tracing::Level::WARN => Some(LogLevel::Warning),
            tracing::Level::ERROR => Some(LogLevel::Error),
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "Debug",
            LogLevel::Information => "Information",
            LogLevel::Warning => "Warning",
            LogLevel::Error => "Error",
        }
    }

    /// Three-letter abbreviation (`DBG`, `INF`, `WRN`, `ERR`).
    pub const fn short(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DBG",
            LogLevel::Information => "INF",
            LogLevel::Warning => "WRN",
            LogLevel::Error => "ERR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single structured log record.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    /// Module path of the emitting code (`SourceContext`).
    pub target: String,
    /// Message template; may contain `{field}` placeholders.
    pub message: String,
    /// Bound arguments, in the order they were recorded.
    pub fields: Vec<(String, String)>,
    pub correlation_id: Option<Arc<str>>,
    /// Error text, taken from an `error` field when present.
    pub error: Option<String>,
}

impl LogEvent {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            target: String::new(),
            message: message.into(),
            fields: Vec::new(),
            correlation_id: None,
            error: None,
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn with_correlation_id(mut self, id: Option<Arc<str>>) -> Self {
        self.correlation_id = id;
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// The message with `{field}` placeholders substituted.
    ///
    /// Unknown placeholders are kept verbatim.
    pub fn rendered_message(&self) -> String {
        let mut out = String::with_capacity(self.message.len());
        let mut rest = self.message.as_str();

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    let name = &after[..close];
                    match self.field(name) {
                        Some(value) => out.push_str(value),
                        None => {
                            out.push('{');
                            out.push_str(name);
                            out.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                None => {
                    out.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}
