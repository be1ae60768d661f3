//! Atomically swappable configuration snapshots.
//!
//! Every section lives in its own [`SnapshotCell`]. Readers call `get()` and
//! receive an `Arc` to an immutable, versioned snapshot; they never take a
//! lock. Writers validate, then publish a whole new snapshot with a single
//! pointer swap, then notify subscribers in registration order. Validation
//! and publication for one section run under a mutex that readers never
//! touch, so at most one update per section is in flight.

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::schema::{AppSettings, CorrelationSettings, LoggingSettings};
use crate::config::validation::{validate_app, validate_correlation, validate_logging};
use crate::error::{ConfigError, ValidationError};
use crate::observability::metrics;

/// A named, validated configuration section.
pub trait Section:
    DeserializeOwned + Serialize + Default + Clone + PartialEq + fmt::Debug + Send + Sync + 'static
{
    /// Table name in the config source.
    const NAME: &'static str;

    /// Absent mandatory sections abort startup instead of defaulting.
    const MANDATORY: bool = false;

    fn validate(&self) -> Result<(), Vec<ValidationError>>;

    /// The cell holding this section inside a store.
    fn cell(store: &ConfigStore) -> &SnapshotCell<Self>;
}

impl Section for AppSettings {
    const NAME: &'static str = "app";
    const MANDATORY: bool = true;

    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        validate_app(self)
    }

    fn cell(store: &ConfigStore) -> &SnapshotCell<Self> {
        &store.app
    }
}

impl Section for LoggingSettings {
    const NAME: &'static str = "logging";

    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        validate_logging(self)
    }

    fn cell(store: &ConfigStore) -> &SnapshotCell<Self> {
        &store.logging
    }
}

impl Section for CorrelationSettings {
    const NAME: &'static str = "correlation";

    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        validate_correlation(self)
    }

    fn cell(store: &ConfigStore) -> &SnapshotCell<Self> {
        &store.correlation
    }
}

/// An immutable section value plus its publication version.
#[derive(Debug, PartialEq)]
pub struct Snapshot<T> {
    version: u64,
    value: T,
}

impl<T> Snapshot<T> {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn value(&self) -> &T {
        &self.value
    }
}

impl<T> Deref for Snapshot<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

type Subscriber<T> = Arc<dyn Fn(&Arc<Snapshot<T>>) + Send + Sync>;

/// Holder of the single current snapshot of one section.
pub struct SnapshotCell<T: Section> {
    current: ArcSwap<Snapshot<T>>,
    write_lock: Mutex<()>,
    subscribers: Mutex<Vec<Subscriber<T>>>,
}

impl<T: Section> SnapshotCell<T> {
    /// Create a cell with an initial value. The value is not re-validated.
    pub fn new(value: T) -> Self {
        Self {
            current: ArcSwap::from_pointee(Snapshot { version: 1, value }),
            write_lock: Mutex::new(()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Current snapshot. Never blocks.
    pub fn get(&self) -> Arc<Snapshot<T>> {
        self.current.load_full()
    }

    /// Register a callback invoked with every newly published snapshot.
    ///
    /// Callbacks run on the publishing thread while that section's writer
    /// lock is held, so they must not publish to the same section.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&Arc<Snapshot<T>>) + Send + Sync + 'static,
    {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    /// Validate and publish a replacement value.
    ///
    /// On rejection the current snapshot is left untouched.
    pub fn publish(&self, value: T) -> Result<Arc<Snapshot<T>>, ConfigError> {
        let _writer = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        value.validate().map_err(|errors| ConfigError::Invalid {
            section: T::NAME,
            errors,
        })?;

        let next = Arc::new(Snapshot {
            version: self.current.load().version + 1,
            value,
        });
        self.current.store(Arc::clone(&next));

        let subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for subscriber in &subscribers {
            subscriber(&next);
        }

        Ok(next)
    }

    /// Parse raw values (merged over defaults) and publish them.
    pub fn apply_raw(&self, raw: toml::Value) -> Result<Arc<Snapshot<T>>, ConfigError> {
        self.publish(parse_section(raw)?)
    }
}

impl<T: Section> fmt::Debug for SnapshotCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotCell")
            .field("section", &T::NAME)
            .field("current", &self.current.load())
            .finish()
    }
}

/// Outcome of applying one section from a reloaded document.
#[derive(Debug)]
pub enum ReloadOutcome {
    /// A new snapshot with this version is current.
    Published(u64),
    /// The parsed value equals the current snapshot; nothing was published.
    Unchanged,
    /// The section is absent from the document; the current snapshot stays.
    Kept,
    /// The update was rejected; the current snapshot stays.
    Rejected(ConfigError),
}

impl ReloadOutcome {
    fn label(&self) -> &'static str {
        match self {
            ReloadOutcome::Published(_) => "published",
            ReloadOutcome::Unchanged => "unchanged",
            ReloadOutcome::Kept => "kept",
            ReloadOutcome::Rejected(_) => "rejected",
        }
    }
}

/// The set of live configuration sections.
#[derive(Debug)]
pub struct ConfigStore {
    app: SnapshotCell<AppSettings>,
    logging: SnapshotCell<LoggingSettings>,
    correlation: SnapshotCell<CorrelationSettings>,
}

impl ConfigStore {
    /// Names of every registered section.
    pub const SECTIONS: [&'static str; 3] = [
        AppSettings::NAME,
        LoggingSettings::NAME,
        CorrelationSettings::NAME,
    ];

    /// Build the startup snapshots from a parsed config document.
    ///
    /// Absent optional sections fall back to defaults. An absent mandatory
    /// section or any invalid section is an error.
    pub fn from_document(document: &toml::Table) -> Result<Self, ConfigError> {
        for key in document.keys() {
            if !Self::SECTIONS.contains(&key.as_str()) {
                tracing::warn!(section = %key, "Ignoring unknown config section");
            }
        }

        Ok(Self {
            app: SnapshotCell::new(initial_value(document)?),
            logging: SnapshotCell::new(initial_value(document)?),
            correlation: SnapshotCell::new(initial_value(document)?),
        })
    }

    pub fn get<T: Section>(&self) -> Arc<Snapshot<T>> {
        T::cell(self).get()
    }

    pub fn subscribe<T, F>(&self, callback: F)
    where
        T: Section,
        F: Fn(&Arc<Snapshot<T>>) + Send + Sync + 'static,
    {
        T::cell(self).subscribe(callback)
    }

    pub fn publish<T: Section>(&self, value: T) -> Result<Arc<Snapshot<T>>, ConfigError> {
        T::cell(self).publish(value)
    }

    pub fn app(&self) -> Arc<Snapshot<AppSettings>> {
        self.app.get()
    }

    pub fn logging(&self) -> Arc<Snapshot<LoggingSettings>> {
        self.logging.get()
    }

    pub fn correlation(&self) -> Arc<Snapshot<CorrelationSettings>> {
        self.correlation.get()
    }

    /// Apply a change notification for one section by name.
    ///
    /// Returns the version of the newly current snapshot.
    pub fn on_external_change(&self, section: &str, raw: toml::Value) -> Result<u64, ConfigError> {
        let result = match section {
            AppSettings::NAME => self.app.apply_raw(raw).map(|s| s.version()),
            LoggingSettings::NAME => self.logging.apply_raw(raw).map(|s| s.version()),
            CorrelationSettings::NAME => self.correlation.apply_raw(raw).map(|s| s.version()),
            other => Err(ConfigError::UnknownSection(other.to_string())),
        };

        match &result {
            Ok(version) => {
                tracing::info!(section = %section, version = *version, "Config section updated");
            }
            Err(error) => {
                tracing::error!(
                    section = %section,
                    error = %error,
                    "Config update rejected. Keeping current configuration."
                );
            }
        }
        result
    }

    /// Apply every section of a reloaded document.
    pub fn apply_document(&self, document: &toml::Table) -> Vec<(&'static str, ReloadOutcome)> {
        let outcomes = vec![
            (AppSettings::NAME, self.reload_section::<AppSettings>(document)),
            (LoggingSettings::NAME, self.reload_section::<LoggingSettings>(document)),
            (CorrelationSettings::NAME, self.reload_section::<CorrelationSettings>(document)),
        ];

        for (section, outcome) in &outcomes {
            metrics::record_config_reload(section, outcome.label());
        }
        outcomes
    }

    fn reload_section<T: Section>(&self, document: &toml::Table) -> ReloadOutcome {
        let Some(raw) = document.get(T::NAME) else {
            if T::MANDATORY {
                let error = ConfigError::Missing(T::NAME);
                tracing::error!(error = %error, "Config reload rejected. Keeping current configuration.");
                return ReloadOutcome::Rejected(error);
            }
            return ReloadOutcome::Kept;
        };

        let value: T = match parse_section(raw.clone()) {
            Ok(value) => value,
            Err(error) => {
                tracing::error!(error = %error, "Config reload rejected. Keeping current configuration.");
                return ReloadOutcome::Rejected(error);
            }
        };

        let cell = T::cell(self);
        if *cell.get().value() == value {
            return ReloadOutcome::Unchanged;
        }

        match cell.publish(value) {
            Ok(snapshot) => {
                tracing::info!(section = T::NAME, version = snapshot.version(), "Config section reloaded");
                ReloadOutcome::Published(snapshot.version())
            }
            Err(error) => {
                tracing::error!(error = %error, "Config reload rejected. Keeping current configuration.");
                ReloadOutcome::Rejected(error)
            }
        }
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self {
            app: SnapshotCell::new(AppSettings::default()),
            logging: SnapshotCell::new(LoggingSettings::default()),
            correlation: SnapshotCell::new(CorrelationSettings::default()),
        }
    }
}

/// Deserialize a raw section table merged key by key over `T::default()`.
///
/// Nested tables merge recursively, so a partial `[logging.app_log]` keeps
/// the app sink's own defaults rather than the generic sink defaults.
pub fn parse_section<T: Section>(raw: toml::Value) -> Result<T, ConfigError> {
    let parse_error = |source| ConfigError::Parse {
        section: T::NAME.to_string(),
        source,
    };
    let mut merged = toml::Value::try_from(T::default()).map_err(|source| ConfigError::Defaults {
        section: T::NAME,
        source,
    })?;
    merge_value(&mut merged, raw);
    merged.try_into().map_err(parse_error)
}

fn merge_value(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_value(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn initial_value<T: Section>(document: &toml::Table) -> Result<T, ConfigError> {
    let value = match document.get(T::NAME) {
        Some(raw) => parse_section(raw.clone())?,
        None if T::MANDATORY => return Err(ConfigError::Missing(T::NAME)),
        None => {
            tracing::debug!(section = T::NAME, "Config section absent, using defaults");
            T::default()
        }
    };

    value.validate().map_err(|errors| ConfigError::Invalid {
        section: T::NAME,
        errors,
    })?;
    Ok(value)
}
