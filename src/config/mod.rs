//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (read & parse into raw section tables)
//!     → store.rs (deserialize over defaults per section)
//!     → validation.rs (semantic checks)
//!     → SnapshotCell<Section> (validated, immutable, versioned)
//!     → shared via Arc<ConfigStore> to all subsystems
//!
//! On change:
//!     watcher.rs detects change
//!     → loader.rs loads new document
//!     → store.rs validates each section
//!     → atomic swap of Arc<Snapshot<Section>>
//!     → subscribers notified in registration order
//! ```
//!
//! # Design Decisions
//! - Snapshots are immutable; changes publish a whole replacement
//! - Readers never lock; a `get()` returns either the old or the new snapshot
//! - A rejected update leaves the current snapshot in place
//! - Only a missing mandatory section at startup is fatal

pub mod loader;
pub mod schema;
pub mod store;
pub mod validation;
pub mod watcher;

pub use schema::{AppSettings, CorrelationSettings, LoggingSettings, SinkSettings};
pub use store::{ConfigStore, ReloadOutcome, Section, Snapshot, SnapshotCell};
