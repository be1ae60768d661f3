//! Handler timing.
//!
//! [`PerformanceWrapper::around`] times one handler call and, when the
//! performance sink is enabled, emits a [`PerformanceRecord`] for it. The
//! handler's output, error or panic is passed through untouched.

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use futures_util::FutureExt;

use crate::correlation;
use crate::observability::metrics;
use crate::observability::{LogEvent, SinkRouter, PERFORMANCE_LEVEL, PERFORMANCE_TARGET};
use crate::performance::record::{PerformanceRecord, ReportStatus, ResponseStatus};

#[derive(Clone)]
pub struct PerformanceWrapper {
    router: Arc<SinkRouter>,
}

impl PerformanceWrapper {
    pub fn new(router: Arc<SinkRouter>) -> Self {
        Self { router }
    }

    /// Run `handler`, timing it as `resource`.
    ///
    /// A panic in the handler is recorded as `FAILED` and then resumed. If
    /// the returned future is dropped before the handler finishes, a
    /// `CANCELLED` record is emitted instead.
    pub async fn around<F>(&self, resource: &str, handler: F) -> F::Output
    where
        F: Future,
        F::Output: ReportStatus,
    {
        let context = correlation::current();
        let mut in_flight = InFlight {
            wrapper: self,
            resource,
            correlation_id: context.as_ref().map(|c| c.shared_id()),
            request_start: context.map_or_else(Local::now, |c| c.start_time()),
            started: Instant::now(),
            armed: true,
        };

        let outcome = AssertUnwindSafe(handler).catch_unwind().await;
        let handler_time = in_flight.started.elapsed();
        in_flight.armed = false;

        let status = match &outcome {
            Ok(output) => output.response_status(),
            Err(payload) => {
                tracing::error!(
                    resource = %resource,
                    error = %panic_message(payload.as_ref()),
                    "Request handler panicked"
                );
                ResponseStatus::Failed
            }
        };
        if status == ResponseStatus::Failed && outcome.is_ok() {
            tracing::error!(resource = %resource, "Request handler failed");
        }

        self.finish(
            resource,
            in_flight.correlation_id.clone(),
            in_flight.request_start,
            handler_time,
            status,
        );

        match outcome {
            Ok(output) => output,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    fn finish(
        &self,
        resource: &str,
        correlation_id: Option<Arc<str>>,
        request_start: DateTime<Local>,
        handler_time: Duration,
        status: ResponseStatus,
    ) {
        metrics::record_request(resource, &status.to_string(), handler_time);

        if !self.router.performance_enabled() {
            return;
        }

        let t1 = Instant::now();
        let mut record = PerformanceRecord {
            request_start,
            request_end: Local::now(),
            resource_name: resource.to_string(),
            correlation_id: correlation_id.as_deref().unwrap_or_default().to_string(),
            status_code: status,
            handler_millis: millis(handler_time),
            overhead_millis: 0.0,
            total_millis: 0.0,
        };
        record.set_overhead_millis(millis(t1.elapsed()));

        let payload = match serde_json::to_string(&record) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, resource = %resource, "Failed to serialize performance record");
                return;
            }
        };

        let mut event = LogEvent::new(PERFORMANCE_LEVEL, "{perf}")
            .with_field("perf", payload)
            .with_correlation_id(correlation_id);
        event.target = PERFORMANCE_TARGET.to_string();
        self.router.emit(&event);
    }
}

/// Emits the cancellation record if `around` is dropped mid-handler.
struct InFlight<'a> {
    wrapper: &'a PerformanceWrapper,
    resource: &'a str,
    correlation_id: Option<Arc<str>>,
    request_start: DateTime<Local>,
    started: Instant,
    armed: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::warn!(resource = %self.resource, "Request cancelled before the handler finished");
        self.wrapper.finish(
            self.resource,
            self.correlation_id.take(),
            self.request_start,
            self.started.elapsed(),
            ResponseStatus::Cancelled,
        );
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1_000.0
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigStore, LoggingSettings};
    use crate::correlation::{CorrelationContext, IdSource};
    use axum::http::StatusCode;
    use serde_json::Value;
    use std::fs;
    use std::path::Path;

    fn wrapper_in(dir: &Path, perf_enabled: bool) -> (PerformanceWrapper, Arc<SinkRouter>) {
        let store = Arc::new(ConfigStore::default());
        let mut logging = LoggingSettings::default();
        logging.console_log.enable = false;
        logging.app_log.enable = false;
        logging.app_json_log.enable = false;
        logging.performance_log.enable = perf_enabled;
        logging.performance_log.path = dir.join("perf..log").to_string_lossy().into_owned();
        logging.performance_log.message_template = "{Message}{NewLine}".to_string();
        store.publish(logging).unwrap();

        let router = Arc::new(SinkRouter::new(store));
        (PerformanceWrapper::new(Arc::clone(&router)), router)
    }

    fn records(dir: &Path) -> Vec<Value> {
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        entries
            .flat_map(|entry| {
                fs::read_to_string(entry.unwrap().path())
                    .unwrap()
                    .lines()
                    .map(|line| serde_json::from_str(line).unwrap())
                    .collect::<Vec<Value>>()
            })
            .collect()
    }

    #[tokio::test]
    async fn emits_record_with_correlation_id() {
        let dir = tempfile::tempdir().unwrap();
        let (wrapper, router) = wrapper_in(dir.path(), true);

        let context = CorrelationContext::new("abc123", IdSource::Inbound);
        let status = correlation::scope(context, async {
            wrapper
                .around("GET /weatherforecast", async { StatusCode::OK })
                .await
        })
        .await;
        router.flush_all();

        assert_eq!(status, StatusCode::OK);
        let records = records(dir.path());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["correlation_id"], "abc123");
        assert_eq!(records[0]["status_code"], "200");
        assert_eq!(records[0]["resource_name"], "GET /weatherforecast");
        let handler = records[0]["handler_millis"].as_f64().unwrap();
        let overhead = records[0]["overhead_millis"].as_f64().unwrap();
        let total = records[0]["total_millis"].as_f64().unwrap();
        assert!((handler + overhead - total).abs() < 1e-9);
    }

    #[tokio::test]
    async fn disabled_sink_still_runs_handler() {
        let dir = tempfile::tempdir().unwrap();
        let (wrapper, router) = wrapper_in(dir.path(), false);

        let status = wrapper.around("GET /health", async { StatusCode::ACCEPTED }).await;
        router.flush_all();

        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(records(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn handler_error_is_recorded_and_returned() {
        let dir = tempfile::tempdir().unwrap();
        let (wrapper, router) = wrapper_in(dir.path(), true);

        let result: Result<StatusCode, &str> = wrapper.around("GET /fail", async { Err("boom") }).await;
        router.flush_all();

        assert_eq!(result, Err("boom"));
        assert_eq!(records(dir.path())[0]["status_code"], "FAILED");
    }

    #[tokio::test]
    async fn handler_panic_is_recorded_and_resumed() {
        let dir = tempfile::tempdir().unwrap();
        let (wrapper, router) = wrapper_in(dir.path(), true);

        let outcome = AssertUnwindSafe(wrapper.around("GET /panic", async {
            if true {
                panic!("handler exploded");
            }
            StatusCode::OK
        }))
        .catch_unwind()
        .await;
        router.flush_all();

        let payload = outcome.unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "handler exploded");
        assert_eq!(records(dir.path())[0]["status_code"], "FAILED");
    }

    #[tokio::test]
    async fn dropped_handler_emits_cancelled_record() {
        let dir = tempfile::tempdir().unwrap();
        let (wrapper, router) = wrapper_in(dir.path(), true);

        let context = CorrelationContext::new("cancel-me", IdSource::Inbound);
        let timed_out = tokio::time::timeout(
            Duration::from_millis(20),
            correlation::scope(context, async {
                wrapper
                    .around("GET /slow", std::future::pending::<StatusCode>())
                    .await
            }),
        )
        .await;
        router.flush_all();

        assert!(timed_out.is_err());
        let records = records(dir.path());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["status_code"], "CANCELLED");
        assert_eq!(records[0]["correlation_id"], "cancel-me");
    }

    #[tokio::test]
    async fn request_start_is_the_context_start() {
        let dir = tempfile::tempdir().unwrap();
        let (wrapper, router) = wrapper_in(dir.path(), true);

        let context = CorrelationContext::new("started-1", IdSource::Generated);
        let started = serde_json::to_value(context.start_time()).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        correlation::scope(context, async {
            wrapper.around("GET /health", async { StatusCode::OK }).await
        })
        .await;
        router.flush_all();

        assert_eq!(records(dir.path())[0]["request_start"], started);
    }
}
