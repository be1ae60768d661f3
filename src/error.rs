//! Error taxonomy.
//!
//! # Propagation Policy
//! - `ConfigError::Missing` / `ConfigError::Invalid` at startup abort the process
//! - `ConfigError` on a live update is reported and the previous snapshot stays current
//! - `SinkError` is caught per sink and reported once through stderr
//! - `CorrelationError` falls back to a generated id
//! - Handler failures are never wrapped; they pass through unchanged

use std::fmt;

/// A single semantic validation failure inside a config section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub section: &'static str,
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(section: &'static str, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            section,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}: {}", self.section, self.field, self.message)
    }
}

/// Errors raised while loading or updating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A mandatory section is absent from the source.
    #[error("mandatory config section [{0}] is missing")]
    Missing(&'static str),

    /// The section parsed but failed semantic validation.
    #[error("config section [{section}] rejected: {}", join(.errors))]
    Invalid {
        section: &'static str,
        errors: Vec<ValidationError>,
    },

    /// The raw values did not match the section's schema.
    #[error("config section [{section}] could not be parsed: {source}")]
    Parse {
        section: String,
        #[source]
        source: toml::de::Error,
    },

    /// The built-in defaults could not be turned into a table to merge over.
    #[error("defaults for config section [{section}] could not be encoded: {source}")]
    Defaults {
        section: &'static str,
        #[source]
        source: toml::ser::Error,
    },

    /// The config source could not be read.
    #[error("config source could not be read: {0}")]
    Io(#[from] std::io::Error),

    /// No section is registered under this name.
    #[error("unknown config section [{0}]")]
    UnknownSection(String),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised on a log sink's write path.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink {sink} write failed: {source}")]
    Io {
        sink: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("sink {0} is suspended after repeated failures")]
    Suspended(&'static str),
}

/// Reasons an inbound correlation header cannot be reused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CorrelationError {
    #[error("correlation header is empty")]
    Empty,

    #[error("correlation header is not visible ASCII")]
    NotVisibleAscii,

    #[error("correlation header exceeds {max} bytes (got {len})")]
    TooLong { len: usize, max: usize },
}

/// Errors that stop the service before it serves traffic.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("logging could not be installed: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),

    #[error("invalid {field} '{value}'")]
    Address { field: &'static str, value: String },

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config watcher could not start: {0}")]
    Watch(#[from] notify::Error),

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}
