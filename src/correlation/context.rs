//! Request-scoped correlation context.
//!
//! A context is created per request by [`begin`], made visible to everything
//! that runs inside [`scope`] through a tokio task-local, and detached by
//! [`CorrelationContext::end`]. `scope` ends the context on every exit path,
//! including when the scoped future is dropped mid-flight.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use chrono::{DateTime, Local};

use crate::config::CorrelationSettings;
use crate::correlation::id::{self, IdSource};

tokio::task_local! {
    static ACTIVE_CORRELATION: CorrelationContext;
}

/// The correlation state of one in-flight request.
///
/// Cloning shares the same context; it is never shared across requests.
#[derive(Debug, Clone)]
pub struct CorrelationContext {
    inner: Arc<ContextInner>,
}

#[derive(Debug)]
struct ContextInner {
    id: Arc<str>,
    source: IdSource,
    start_time: DateTime<Local>,
    started: Instant,
    detached: AtomicBool,
}

impl CorrelationContext {
    pub fn new(id: impl Into<Arc<str>>, source: IdSource) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                id: id.into(),
                source,
                start_time: Local::now(),
                started: Instant::now(),
                detached: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Shared handle to the id, cheap to attach to events.
    pub fn shared_id(&self) -> Arc<str> {
        Arc::clone(&self.inner.id)
    }

    pub fn source(&self) -> &IdSource {
        &self.inner.source
    }

    pub fn start_time(&self) -> DateTime<Local> {
        self.inner.start_time
    }

    pub fn elapsed(&self) -> Duration {
        self.inner.started.elapsed()
    }

    pub fn is_active(&self) -> bool {
        !self.inner.detached.load(Ordering::Acquire)
    }

    /// Detach the context. Returns `false` if it was already detached.
    pub fn end(&self) -> bool {
        let first = !self.inner.detached.swap(true, Ordering::AcqRel);
        if first {
            tracing::trace!(correlation_id = %self.inner.id, "Correlation context ended");
        }
        first
    }
}

/// Derive the context for an inbound request.
///
/// Never fails: an unusable header falls back to a generated id.
pub fn begin(headers: &HeaderMap, settings: &CorrelationSettings) -> CorrelationContext {
    let (id, source) = id::resolve(headers, &settings.header_name, settings.max_length);

    if let IdSource::Fallback(error) = &source {
        tracing::warn!(
            header = %settings.header_name,
            error = %error,
            correlation_id = %id,
            "Inbound correlation header rejected, generated a new id"
        );
    }

    CorrelationContext::new(id, source)
}

/// The context of the request the caller is running in, if any.
pub fn current() -> Option<CorrelationContext> {
    ACTIVE_CORRELATION
        .try_with(Clone::clone)
        .ok()
        .filter(CorrelationContext::is_active)
}

/// Shortcut for [`current`] when only the id is needed.
pub fn current_id() -> Option<Arc<str>> {
    current().map(|context| context.shared_id())
}

/// Run `fut` with `context` as the ambient correlation context.
///
/// The context is ended when `fut` completes or when the returned future
/// is dropped before completion.
pub async fn scope<F>(context: CorrelationContext, fut: F) -> F::Output
where
    F: Future,
{
    let _teardown = Teardown(context.clone());
    ACTIVE_CORRELATION.scope(context, fut).await
}

/// Synchronous counterpart of [`scope`].
pub fn sync_scope<F, R>(context: CorrelationContext, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _teardown = Teardown(context.clone());
    ACTIVE_CORRELATION.sync_scope(context, f)
}

/// Carry the caller's context (if any) into a future spawned elsewhere.
///
/// The child never ends the context; the owning request does.
pub fn propagate<F>(fut: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    let context = current();
    async move {
        match context {
            Some(context) => ACTIVE_CORRELATION.scope(context, fut).await,
            None => fut.await,
        }
    }
}

struct Teardown(CorrelationContext);

impl Drop for Teardown {
    fn drop(&mut self) {
        self.0.end();
    }
}
