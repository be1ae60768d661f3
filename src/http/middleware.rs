//! Axum adapters for the request pipeline.
//!
//! Two layers cooperate. [`echo_correlation_id`] sits outside the timeout
//! and panic layers; it takes the correlation settings snapshot for the
//! request and hands it inward through a [`CorrelationEcho`] extension.
//! [`correlation_pipeline`] resolves the id with that same snapshot, stores
//! it in the extension before the handler runs and then runs the pipeline.
//! The echo therefore reaches the client on timeout and panic responses too.

use std::sync::{Arc, OnceLock};

use axum::extract::{MatchedPath, Request, State};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

use crate::config::{ConfigStore, CorrelationSettings, Snapshot};
use crate::pipeline::{PipelineOutcome, RequestPipeline};

/// Per-request handoff between the two correlation layers.
#[derive(Clone)]
pub struct CorrelationEcho {
    settings: Arc<Snapshot<CorrelationSettings>>,
    id: Arc<OnceLock<Arc<str>>>,
}

impl CorrelationEcho {
    fn new(settings: Arc<Snapshot<CorrelationSettings>>) -> Self {
        Self {
            settings,
            id: Arc::default(),
        }
    }
}

/// Outer layer: echo the request's correlation id on whatever response
/// comes back, including ones produced by layers below it.
pub async fn echo_correlation_id(
    State(store): State<Arc<ConfigStore>>,
    mut request: Request,
    next: Next,
) -> Response {
    let echo = CorrelationEcho::new(store.correlation());
    request.extensions_mut().insert(echo.clone());

    let mut response = next.run(request).await;
    if let Some(id) = echo.id.get() {
        insert_header(&mut response, &echo.settings, id);
    }
    response
}

/// Inner layer: run every request through the [`RequestPipeline`].
///
/// Without [`echo_correlation_id`] above it, this layer echoes the id
/// itself on the handler's response.
pub async fn correlation_pipeline(
    State(pipeline): State<RequestPipeline>,
    request: Request,
    next: Next,
) -> Response {
    let resource = resource_name(&request);
    let echo = request.extensions().get::<CorrelationEcho>().cloned();
    let settings = match &echo {
        Some(echo) => Arc::clone(&echo.settings),
        None => pipeline.store().correlation(),
    };

    let context = pipeline.establish(request.headers(), &settings);
    if let Some(echo) = &echo {
        let _ = echo.id.set(context.shared_id());
    }

    let PipelineOutcome {
        output: mut response,
        correlation_id,
    } = pipeline.run(context, &resource, next.run(request)).await;

    if echo.is_none() {
        insert_header(&mut response, &settings, &correlation_id);
    }
    response
}

fn insert_header(response: &mut Response, settings: &CorrelationSettings, id: &str) {
    if !settings.echo_response_header {
        return;
    }
    match (
        HeaderName::from_bytes(settings.header_name.as_bytes()),
        HeaderValue::from_str(id),
    ) {
        (Ok(name), Ok(value)) => {
            response.headers_mut().insert(name, value);
        }
        _ => tracing::warn!(
            header = %settings.header_name,
            correlation_id = %id,
            "Correlation id not echoed: not a valid header"
        ),
    }
}

/// `"<METHOD> <route>"`, using the matched route template when there is one.
fn resource_name(request: &Request) -> String {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(MatchedPath::as_str)
        .unwrap_or_else(|| request.uri().path());
    format!("{} {}", request.method(), path)
}
