//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the demo handlers
//! - Wire up middleware (trace, timeout, panic recovery, request pipeline)
//! - Serve on a listener until shutdown

use std::sync::Arc;
use std::time::Duration;

use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::http::handlers::{self, AppState};
use crate::http::middleware::{correlation_pipeline, echo_correlation_id};
use crate::observability::SinkRouter;
use crate::pipeline::RequestPipeline;

/// HTTP server for the demo service.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server logging through `sinks`.
    pub fn new(sinks: Arc<SinkRouter>) -> Self {
        let pipeline = RequestPipeline::new(sinks);
        let router = Self::build_router(pipeline);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Layers listed later wrap those listed earlier, so a panic leaves the
    /// pipeline (which records it) before `CatchPanicLayer` turns it into a
    /// 500, and a timeout cancels the pipeline mid-request. The echo layer
    /// wraps both, so those responses still carry the correlation id.
    #[allow(deprecated)]
    fn build_router(pipeline: RequestPipeline) -> Router {
        let store = Arc::clone(pipeline.store());
        let timeout = Duration::from_secs(store.app().request_timeout_secs);

        Router::new()
            .route("/health", get(handlers::health))
            .route("/weatherforecast", get(handlers::forecasts))
            .route("/weatherforecast/{city}", get(handlers::city_forecasts))
            .route("/fail", get(handlers::fail))
            .route("/panic", get(handlers::panicking))
            .route("/delay/{millis}", get(handlers::delayed))
            .with_state(AppState {
                store: Arc::clone(&store),
            })
            .layer(from_fn_with_state(pipeline, correlation_pipeline))
            .layer(CatchPanicLayer::new())
            .layer(TimeoutLayer::new(timeout))
            .layer(from_fn_with_state(store, echo_correlation_id))
            .layer(TraceLayer::new_for_http())
    }

    /// The assembled router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
