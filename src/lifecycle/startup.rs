//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Initialize logging, metrics and reload tasks in dependency order
//! - Bind the listener and serve until a shutdown signal
//! - Flush every sink on the way out
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::loader::load_config;
use crate::config::watcher::{apply_updates, ConfigWatcher};
use crate::error::StartupError;
use crate::http::HttpServer;
use crate::lifecycle::signals::{reload_on_hangup, shutdown_signal};
use crate::lifecycle::Shutdown;
use crate::observability::logging::{init_logging, spawn_flusher};
use crate::observability::metrics::init_metrics;
use crate::observability::SinkRouter;

/// Run the service with the config file at `config_path` until shutdown.
pub async fn run(config_path: &Path) -> Result<(), StartupError> {
    let store = Arc::new(load_config(config_path)?);
    let sinks = Arc::new(SinkRouter::new(Arc::clone(&store)));
    init_logging(Arc::clone(&sinks))?;

    let app = store.app();
    tracing::info!(
        name = %app.name,
        environment = %app.environment,
        config = %config_path.display(),
        "{{name}} starting"
    );

    if app.metrics_enabled {
        let addr = parse_address("app.metrics_address", &app.metrics_address)?;
        init_metrics(addr);
    }

    let bind_address = app.bind_address.clone();
    drop(app);

    let shutdown = Arc::new(Shutdown::new());

    let (watcher, updates) = ConfigWatcher::new(config_path);
    let hangup_updates = watcher.sender();
    let _watch_handle = watcher.run()?;
    tokio::spawn(apply_updates(Arc::clone(&store), updates, shutdown.subscribe()));
    tokio::spawn(reload_on_hangup(
        config_path.to_path_buf(),
        hangup_updates,
        shutdown.subscribe(),
    ));
    let flusher = spawn_flusher(Arc::clone(&sinks), shutdown.subscribe());

    let listener = TcpListener::bind(bind_address.as_str())
        .await
        .map_err(|source| StartupError::Bind {
            address: bind_address,
            source,
        })?;
    let server_shutdown = shutdown.subscribe();

    let signals = Arc::clone(&shutdown);
    tokio::spawn(async move {
        shutdown_signal().await;
        signals.trigger();
    });

    let served = HttpServer::new(Arc::clone(&sinks))
        .run(listener, server_shutdown)
        .await
        .map_err(StartupError::Serve);

    shutdown.trigger();
    tracing::info!("Shutdown complete");
    if let Err(e) = flusher.await {
        eprintln!("[request-telemetry] log flusher did not finish: {e}");
        sinks.flush_all();
    }
    served
}

fn parse_address(field: &'static str, value: &str) -> Result<SocketAddr, StartupError> {
    value.parse().map_err(|_| StartupError::Address {
        field,
        value: value.to_string(),
    })
}
