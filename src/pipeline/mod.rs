//! Request pipeline.
//!
//! # Data Flow
//! ```text
//! Idle
//!     → ContextEstablished (correlation::begin with the live header settings)
//!     → Instrumented       (PerformanceWrapper::around runs the handler)
//!     → Completed          (handler finished, failed or panicked)
//! ```
//!
//! The correlation context is ended on every exit, including a handler
//! panic and the pipeline future being dropped mid-request.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use axum::http::HeaderMap;

use crate::config::{ConfigStore, CorrelationSettings};
use crate::correlation::{self, CorrelationContext, IdSource};
use crate::observability::SinkRouter;
use crate::performance::{PerformanceWrapper, ReportStatus};

/// Where a request currently is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    ContextEstablished,
    Instrumented,
    Completed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Idle => "idle",
            PipelineStage::ContextEstablished => "context_established",
            PipelineStage::Instrumented => "instrumented",
            PipelineStage::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Handler output plus the id the request ran under.
#[derive(Debug)]
pub struct PipelineOutcome<T> {
    pub output: T,
    pub correlation_id: Arc<str>,
}

/// Per-request sequencing of correlation, instrumentation and the handler.
#[derive(Clone)]
pub struct RequestPipeline {
    store: Arc<ConfigStore>,
    wrapper: PerformanceWrapper,
}

impl RequestPipeline {
    pub fn new(router: Arc<SinkRouter>) -> Self {
        Self {
            store: Arc::clone(router.store()),
            wrapper: PerformanceWrapper::new(router),
        }
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// Run `handler` for one request identified by `resource`.
    pub async fn handle<F>(
        &self,
        headers: &HeaderMap,
        resource: &str,
        handler: F,
    ) -> PipelineOutcome<F::Output>
    where
        F: Future,
        F::Output: ReportStatus,
    {
        let context = {
            let settings = self.store.correlation();
            self.establish(headers, &settings)
        };
        self.run(context, resource, handler).await
    }

    /// `Idle → ContextEstablished`: resolve the request's correlation context.
    ///
    /// Split from [`run`](Self::run) so callers can learn the id before the
    /// handler starts.
    pub fn establish(&self, headers: &HeaderMap, settings: &CorrelationSettings) -> CorrelationContext {
        correlation::begin(headers, settings)
    }

    /// Run `handler` inside `context`, instrumented, and end the context on
    /// every exit.
    pub async fn run<F>(
        &self,
        context: CorrelationContext,
        resource: &str,
        handler: F,
    ) -> PipelineOutcome<F::Output>
    where
        F: Future,
        F::Output: ReportStatus,
    {
        let correlation_id = context.shared_id();
        let source = match context.source() {
            IdSource::Inbound => "inbound",
            IdSource::Generated => "generated",
            IdSource::Fallback(_) => "fallback",
        };

        let output = correlation::scope(context.clone(), async {
            tracing::debug!(
                resource = %resource,
                from = %PipelineStage::Idle,
                to = %PipelineStage::ContextEstablished,
                source = source,
                "Pipeline stage"
            );
            advance(resource, PipelineStage::ContextEstablished, PipelineStage::Instrumented);
            let output = self.wrapper.around(resource, handler).await;
            tracing::debug!(
                resource = %resource,
                from = %PipelineStage::Instrumented,
                to = %PipelineStage::Completed,
                elapsed_ms = context.elapsed().as_millis() as u64,
                "Pipeline stage"
            );
            output
        })
        .await;

        PipelineOutcome {
            output,
            correlation_id,
        }
    }
}

fn advance(resource: &str, from: PipelineStage, to: PipelineStage) {
    tracing::debug!(resource = %resource, from = %from, to = %to, "Pipeline stage");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoggingSettings;
    use axum::http::{HeaderValue, StatusCode};
    use std::sync::Mutex;

    fn pipeline() -> RequestPipeline {
        let store = Arc::new(ConfigStore::default());
        let mut logging = LoggingSettings::default();
        logging.console_log.enable = false;
        logging.app_log.enable = false;
        logging.app_json_log.enable = false;
        logging.performance_log.enable = false;
        store.publish(logging).unwrap();
        RequestPipeline::new(Arc::new(SinkRouter::new(store)))
    }

    #[tokio::test]
    async fn inbound_header_becomes_the_request_id() {
        let pipeline = pipeline();
        let mut headers = HeaderMap::new();
        headers.insert("x-correlation-id", HeaderValue::from_static("abc123"));

        let outcome = pipeline
            .handle(&headers, "GET /", async {
                assert_eq!(correlation::current_id().as_deref(), Some("abc123"));
                StatusCode::OK
            })
            .await;

        assert_eq!(&*outcome.correlation_id, "abc123");
        assert_eq!(outcome.output, StatusCode::OK);
    }

    #[tokio::test]
    async fn generated_ids_do_not_collide() {
        let pipeline = pipeline();
        let headers = HeaderMap::new();

        let first = pipeline.handle(&headers, "GET /", async { StatusCode::OK }).await;
        let second = pipeline.handle(&headers, "GET /", async { StatusCode::OK }).await;

        assert!(!first.correlation_id.is_empty());
        assert_ne!(first.correlation_id, second.correlation_id);
    }

    #[tokio::test]
    async fn context_is_ended_after_failure() {
        let pipeline = pipeline();
        let seen: Arc<Mutex<Option<CorrelationContext>>> = Arc::default();
        let slot = Arc::clone(&seen);

        let outcome = pipeline
            .handle(&HeaderMap::new(), "GET /fail", async move {
                *slot.lock().unwrap() = correlation::current();
                Err::<StatusCode, &str>("boom")
            })
            .await;

        assert_eq!(outcome.output, Err("boom"));
        let context = seen.lock().unwrap().take().unwrap();
        assert!(!context.is_active());
        assert!(correlation::current().is_none());
    }

    #[tokio::test]
    async fn established_id_is_known_before_the_handler_runs() {
        let pipeline = pipeline();
        let mut headers = HeaderMap::new();
        headers.insert("x-correlation-id", HeaderValue::from_static("early-1"));

        let context = pipeline.establish(&headers, &CorrelationSettings::default());
        assert_eq!(context.id(), "early-1");
        assert_eq!(*context.source(), IdSource::Inbound);

        let outcome = pipeline
            .run(context.clone(), "GET /", async {
                assert_eq!(correlation::current_id().as_deref(), Some("early-1"));
                StatusCode::OK
            })
            .await;

        assert_eq!(&*outcome.correlation_id, "early-1");
        assert!(!context.is_active());
    }
}
