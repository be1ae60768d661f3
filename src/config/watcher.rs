//! Configuration file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};

use crate::config::loader::load_document;
use crate::config::store::{ConfigStore, ReloadOutcome};

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<toml::Table>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for parsed documents.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<toml::Table>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Another producer for the same update channel (e.g. a SIGHUP reload).
    pub fn sender(&self) -> mpsc::UnboundedSender<toml::Table> {
        self.update_tx.clone()
    }

    /// Start watching the file. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!("Config file change detected, reloading...");
                        match load_document(&path) {
                            Ok(document) => {
                                let _ = tx.send(document);
                            }
                            Err(e) => {
                                tracing::error!(
                                    error = %e,
                                    "Failed to reload config. Keeping current configuration."
                                );
                            }
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Apply reloaded documents to the store until shutdown or the sender closes.
pub async fn apply_updates(
    store: Arc<ConfigStore>,
    mut updates: mpsc::UnboundedReceiver<toml::Table>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(document) = update else { break };
                let outcomes = store.apply_document(&document);
                let rejected = outcomes
                    .iter()
                    .filter(|(_, outcome)| matches!(outcome, ReloadOutcome::Rejected(_)))
                    .count();
                tracing::debug!(sections = outcomes.len(), rejected, "Config document applied");
            }
            _ = shutdown.recv() => break,
        }
    }
    tracing::debug!("Config update task stopped");
}
