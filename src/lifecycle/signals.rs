//! OS signal handling.
//!
//! # Responsibilities
//! - SIGINT (Ctrl+C) and SIGTERM trigger graceful shutdown
//! - SIGHUP re-reads the config file, the same as a file change
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A handler that cannot be installed is logged and never fires

use std::path::PathBuf;

use tokio::sync::{broadcast, mpsc};

use crate::config::loader::load_document;

/// Resolve when the process is asked to stop.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Shutdown signal received (Ctrl+C)"),
        _ = terminate => tracing::info!("Shutdown signal received (SIGTERM)"),
    }
}

/// Reload `path` into `updates` on every SIGHUP until shutdown.
#[cfg(unix)]
pub async fn reload_on_hangup(
    path: PathBuf,
    updates: mpsc::UnboundedSender<toml::Table>,
    mut shutdown: broadcast::Receiver<()>,
) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            tracing::error!(error = %e, "Failed to install SIGHUP handler");
            return;
        }
    };

    loop {
        tokio::select! {
            received = hangup.recv() => {
                if received.is_none() {
                    break;
                }
                tracing::info!(path = ?path, "SIGHUP received, reloading config");
                match load_document(&path) {
                    Ok(document) => {
                        if updates.send(document).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::error!(
                        error = %e,
                        "Failed to reload config. Keeping current configuration."
                    ),
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

#[cfg(not(unix))]
pub async fn reload_on_hangup(
    _path: PathBuf,
    _updates: mpsc::UnboundedSender<toml::Table>,
    _shutdown: broadcast::Receiver<()>,
) {
}
