//! Performance record and response status reporting.

use std::fmt;

use axum::http::{Response, StatusCode};
use chrono::{DateTime, Local};
use serde::{Serialize, Serializer};

/// How a wrapped handler finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    /// The handler produced a response with this status code.
    Completed(u16),
    /// The handler returned an error or panicked.
    Failed,
    /// The handler was dropped before it finished.
    Cancelled,
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseStatus::Completed(code) => write!(f, "{code}"),
            ResponseStatus::Failed => f.write_str("FAILED"),
            ResponseStatus::Cancelled => f.write_str("CANCELLED"),
        }
    }
}

impl Serialize for ResponseStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Handler outputs that know their response status.
pub trait ReportStatus {
    fn response_status(&self) -> ResponseStatus;
}

impl ReportStatus for StatusCode {
    fn response_status(&self) -> ResponseStatus {
        ResponseStatus::Completed(self.as_u16())
    }
}

/// Response extension marking a response that stands in for a handler error.
#[derive(Debug, Clone, Copy, Default)]
pub struct HandlerFailed;

impl<B> ReportStatus for Response<B> {
    fn response_status(&self) -> ResponseStatus {
        if self.extensions().get::<HandlerFailed>().is_some() {
            return ResponseStatus::Failed;
        }
        self.status().response_status()
    }
}

impl<T: ReportStatus, E> ReportStatus for Result<T, E> {
    fn response_status(&self) -> ResponseStatus {
        match self {
            Ok(output) => output.response_status(),
            Err(_) => ResponseStatus::Failed,
        }
    }
}

/// One request's timing, written to the performance sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceRecord {
    pub request_start: DateTime<Local>,
    pub request_end: DateTime<Local>,
    pub resource_name: String,
    pub correlation_id: String,
    pub status_code: ResponseStatus,
    /// Time spent inside the handler.
    pub handler_millis: f64,
    /// Time spent assembling this record.
    pub overhead_millis: f64,
    pub total_millis: f64,
}

impl PerformanceRecord {
    pub fn set_overhead_millis(&mut self, overhead_millis: f64) {
        self.overhead_millis = overhead_millis;
        self.total_millis = self.handler_millis + overhead_millis;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_as_string() {
        assert_eq!(serde_json::to_string(&ResponseStatus::Completed(200)).unwrap(), "\"200\"");
        assert_eq!(serde_json::to_string(&ResponseStatus::Failed).unwrap(), "\"FAILED\"");
        assert_eq!(ResponseStatus::Cancelled.to_string(), "CANCELLED");
    }

    #[test]
    fn results_report_failure_on_err() {
        let ok: Result<StatusCode, ()> = Ok(StatusCode::CREATED);
        let err: Result<StatusCode, ()> = Err(());
        assert_eq!(ok.response_status(), ResponseStatus::Completed(201));
        assert_eq!(err.response_status(), ResponseStatus::Failed);
    }

    #[test]
    fn marked_response_reports_failure() {
        let mut response = Response::new(());
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        assert_eq!(response.response_status(), ResponseStatus::Completed(500));

        response.extensions_mut().insert(HandlerFailed);
        assert_eq!(response.response_status(), ResponseStatus::Failed);
    }

    #[test]
    fn total_is_handler_plus_overhead() {
        let now = Local::now();
        let mut record = PerformanceRecord {
            request_start: now,
            request_end: now,
            resource_name: "GET /health".to_string(),
            correlation_id: "abc123".to_string(),
            status_code: ResponseStatus::Completed(200),
            handler_millis: 12.5,
            overhead_millis: 0.0,
            total_millis: 12.5,
        };
        record.set_overhead_millis(0.25);
        assert_eq!(record.total_millis, 12.75);
    }
}
