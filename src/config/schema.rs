//! Configuration schema definitions.
//!
//! Each top-level table of the config file is one section. All section types
//! derive Serde traits and `deny_unknown_fields` rejects misspelled keys.
//! Partial tables are merged over these defaults by
//! [`parse_section`](crate::config::store::parse_section), which keeps each
//! sink's own defaults when only some of its keys are given.

use serde::{Deserialize, Serialize};

use crate::observability::event::LogLevel;

/// Default correlation header, shared by the inbound read and outbound echo.
pub const DEFAULT_CORRELATION_HEADER: &str = "X-Correlation-Id";

/// Default output template for text sinks.
pub const DEFAULT_MESSAGE_TEMPLATE: &str =
    "{Timestamp:yyyy-MM-dd HH:mm:ss.fff zzz} [{Level:u3}] [{CorrelationId}] {Message:lj}{NewLine}{Exception}";

/// Default output template for the performance sink.
pub const DEFAULT_PERFORMANCE_TEMPLATE: &str =
    "{Timestamp:yyyy-MM-dd HH:mm:ss.fff zzz} {Message:lj}{NewLine}";

/// Application settings. The only mandatory section.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppSettings {
    /// Service name, reported on startup and in the status endpoint.
    pub name: String,

    /// Deployment environment label (e.g. "Development", "Production").
    pub environment: String,

    /// Bind address (e.g., "0.0.0.0:8080"). Read once at startup.
    pub bind_address: String,

    /// Request timeout (total time for request/response) in seconds.
    pub request_timeout_secs: u64,

    /// Enable the Prometheus metrics endpoint. Read once at startup.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address. Read once at startup.
    pub metrics_address: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: "request-telemetry".to_string(),
            environment: "Production".to_string(),
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Logging settings: shared file limits plus one block per sink.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// Size cap for a single log file before it rolls over.
    pub file_size_bytes: u64,

    /// Maximum time an event may sit in a file sink's buffer.
    pub flush_interval_seconds: u64,

    /// Rolled files kept per sink (0 keeps everything).
    pub retained_file_count: usize,

    pub console_log: SinkSettings,
    pub app_log: SinkSettings,
    pub app_json_log: SinkSettings,
    pub performance_log: SinkSettings,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            file_size_bytes: 104_857_600,
            flush_interval_seconds: 1,
            retained_file_count: 31,
            console_log: SinkSettings {
                enable: true,
                minimum_level: LogLevel::Information,
                path: String::new(),
                message_template: DEFAULT_MESSAGE_TEMPLATE.to_string(),
            },
            app_log: SinkSettings {
                path: "logs/app..log".to_string(),
                ..SinkSettings::default()
            },
            app_json_log: SinkSettings {
                path: "logs/app-json..json".to_string(),
                ..SinkSettings::default()
            },
            performance_log: SinkSettings {
                minimum_level: LogLevel::Information,
                path: "logs/performance..log".to_string(),
                message_template: DEFAULT_PERFORMANCE_TEMPLATE.to_string(),
                ..SinkSettings::default()
            },
        }
    }
}

/// Per-sink knobs.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SinkSettings {
    pub enable: bool,
    pub minimum_level: LogLevel,

    /// Path template; `name..ext` receives the day stamp between the dots.
    pub path: String,

    pub message_template: String,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            enable: true,
            minimum_level: LogLevel::Debug,
            path: "logs/logging..log".to_string(),
            message_template: DEFAULT_MESSAGE_TEMPLATE.to_string(),
        }
    }
}

/// Correlation header settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorrelationSettings {
    /// Header read from requests and echoed on responses.
    pub header_name: String,

    /// Longest inbound id reused verbatim; longer values are replaced.
    pub max_length: usize,

    /// Attach the resolved id to the response.
    pub echo_response_header: bool,
}

impl Default for CorrelationSettings {
    fn default() -> Self {
        Self {
            header_name: DEFAULT_CORRELATION_HEADER.to_string(),
            max_length: 128,
            echo_response_header: true,
        }
    }
}
