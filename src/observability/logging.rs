//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global `tracing` subscriber with the sink router layer
//! - Flush file sinks on the configured interval and once more at shutdown
//!
//! # Design Decisions
//! - `RUST_LOG` may narrow what reaches the sinks; it never widens past the
//!   per-sink minimum levels from the config file
//! - Sink failures go to stderr, never back through `tracing`

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

use crate::observability::layer::SinkRouterLayer;
use crate::observability::router::SinkRouter;

const DEFAULT_FILTER: &str = "debug,hyper=info,h2=info,tower=info,notify=info";

/// Install the global subscriber. Fails if one is already set.
pub fn init_logging(router: Arc<SinkRouter>) -> Result<(), TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(SinkRouterLayer::new(router))
        .try_init()
}

/// Periodically flush buffered file sinks until shutdown, then flush once
/// more. The interval is re-read from the live config on every tick.
pub fn spawn_flusher(
    router: Arc<SinkRouter>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let seconds = router.store().logging().flush_interval_seconds.max(1);
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(seconds)) => {
                    router.flush_all();
                }
                _ = shutdown.recv() => {
                    break;
                }
            }
        }
        router.flush_all();
    })
}
