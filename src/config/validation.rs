//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, sizes > 0)
//! - Reject empty path templates on enabled file sinks
//! - Reject header names that are not valid HTTP tokens
//! - Reject a performance sink level that would filter out every record
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure: section → Result<(), Vec<ValidationError>>
//! - Runs before a snapshot is published

use std::net::SocketAddr;

use axum::http::HeaderName;

use crate::config::schema::{AppSettings, CorrelationSettings, LoggingSettings, SinkSettings};
use crate::error::ValidationError;
use crate::observability::PERFORMANCE_LEVEL;

pub fn validate_app(settings: &AppSettings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if settings.name.trim().is_empty() {
        errors.push(ValidationError::new("app", "name", "must not be empty"));
    }
    if settings.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "app",
            "bind_address",
            format!("'{}' is not a socket address", settings.bind_address),
        ));
    }
    if settings.request_timeout_secs == 0 {
        errors.push(ValidationError::new("app", "request_timeout_secs", "must be greater than 0"));
    }
    if settings.metrics_enabled && settings.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "app",
            "metrics_address",
            format!("'{}' is not a socket address", settings.metrics_address),
        ));
    }

    finish(errors)
}

pub fn validate_logging(settings: &LoggingSettings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if settings.file_size_bytes == 0 {
        errors.push(ValidationError::new("logging", "file_size_bytes", "must be greater than 0"));
    }
    if settings.flush_interval_seconds == 0 {
        errors.push(ValidationError::new(
            "logging",
            "flush_interval_seconds",
            "must be greater than 0",
        ));
    }

    validate_sink("console_log", &settings.console_log, false, &mut errors);
    validate_sink("app_log", &settings.app_log, true, &mut errors);
    validate_sink("app_json_log", &settings.app_json_log, true, &mut errors);
    validate_sink("performance_log", &settings.performance_log, true, &mut errors);
    if settings.performance_log.enable && settings.performance_log.minimum_level > PERFORMANCE_LEVEL {
        errors.push(ValidationError::new(
            "logging",
            "performance_log.minimum_level",
            format!("must not be above {PERFORMANCE_LEVEL:?}, the level of performance records"),
        ));
    }

    finish(errors)
}

fn validate_sink(
    name: &str,
    sink: &SinkSettings,
    file_backed: bool,
    errors: &mut Vec<ValidationError>,
) {
    if !sink.enable {
        return;
    }
    if file_backed && sink.path.trim().is_empty() {
        errors.push(ValidationError::new("logging", format!("{name}.path"), "must not be empty"));
    }
    if sink.message_template.is_empty() {
        errors.push(ValidationError::new(
            "logging",
            format!("{name}.message_template"),
            "must not be empty",
        ));
    }
}

pub fn validate_correlation(settings: &CorrelationSettings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if HeaderName::from_bytes(settings.header_name.as_bytes()).is_err() {
        errors.push(ValidationError::new(
            "correlation",
            "header_name",
            format!("'{}' is not a valid header name", settings.header_name),
        ));
    }
    if settings.max_length == 0 {
        errors.push(ValidationError::new("correlation", "max_length", "must be greater than 0"));
    }

    finish(errors)
}

fn finish(errors: Vec<ValidationError>) -> Result<(), Vec<ValidationError>> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
