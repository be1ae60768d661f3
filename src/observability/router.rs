//! Log sink router.
//!
//! # Data Flow
//! ```text
//! LogEvent
//!     → emit(): read the current logging snapshot once
//!     → for each sink: enabled? level >= minimum? target accepted?
//!     → render (output template, or JSON for the structured sink)
//!     → write under that sink's own lock
//!     → failure: report once, suspend with backoff, keep going
//! ```
//!
//! Sinks are independent: each owns its lock, its open file and its failure
//! state, so a failing or slow sink never blocks delivery to the others.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::SecondsFormat;
use serde_json::{Map, Value};

use crate::config::{ConfigStore, LoggingSettings, SinkSettings};
use crate::error::SinkError;
use crate::observability::event::{LogEvent, LogLevel};
use crate::observability::rolling::{RollingFile, RollingLimits};
use crate::observability::sink::{stderr_reporter, FallbackReporter, SinkHealth, SinkKind};
use crate::observability::template::OutputTemplate;
use crate::resilience::backoff::BackoffPolicy;

/// What happened to an event at one sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Written,
    /// Disabled, below the minimum level, or not this sink's target.
    Filtered,
    /// Dropped because the sink is backing off after a failure.
    Suspended,
    /// The write failed; the failure was recorded.
    Failed,
}

enum Output {
    Stream(Box<dyn Write + Send>),
    File(Option<RollingFile>),
}

struct SlotState {
    template: Option<OutputTemplate>,
    output: Output,
}

struct SinkSlot {
    kind: SinkKind,
    state: Mutex<SlotState>,
    health: SinkHealth,
}

impl SinkSlot {
    fn new(kind: SinkKind, output: Output) -> Self {
        Self {
            kind,
            state: Mutex::new(SlotState {
                template: None,
                output,
            }),
            health: SinkHealth::default(),
        }
    }
}

/// Fans log events out to the console, app, JSON and performance sinks.
pub struct SinkRouter {
    store: Arc<ConfigStore>,
    slots: [SinkSlot; 4],
    reporter: FallbackReporter,
    backoff: BackoffPolicy,
}

impl SinkRouter {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self {
            store,
            slots: [
                SinkSlot::new(SinkKind::Console, Output::Stream(Box::new(io::stdout()))),
                SinkSlot::new(SinkKind::App, Output::File(None)),
                SinkSlot::new(SinkKind::AppJson, Output::File(None)),
                SinkSlot::new(SinkKind::Performance, Output::File(None)),
            ],
            reporter: stderr_reporter(),
            backoff: BackoffPolicy::default(),
        }
    }

    /// Replace the console stream (stdout by default).
    pub fn with_console_writer(mut self, writer: impl Write + Send + 'static) -> Self {
        self.slots[0] = SinkSlot::new(SinkKind::Console, Output::Stream(Box::new(writer)));
        self
    }

    /// Replace the out-of-band failure channel (stderr by default).
    pub fn with_fallback<F>(mut self, reporter: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.reporter = Arc::new(reporter);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// Route one event to every sink that wants it.
    pub fn emit(&self, event: &LogEvent) -> [Delivery; 4] {
        let settings = self.store.logging();
        let mut deliveries = [Delivery::Filtered; 4];
        for (i, slot) in self.slots.iter().enumerate() {
            deliveries[i] = self.deliver(slot, event, &settings);
        }
        deliveries
    }

    /// Route one event to a single sink.
    pub fn emit_to(&self, kind: SinkKind, event: &LogEvent) -> Delivery {
        let settings = self.store.logging();
        self.deliver(self.slot(kind), event, &settings)
    }

    /// Lowest level any non-performance sink currently accepts.
    pub fn min_enabled_level(&self) -> Option<LogLevel> {
        let settings = self.store.logging();
        [SinkKind::Console, SinkKind::App, SinkKind::AppJson]
            .iter()
            .map(|kind| kind.settings(&settings))
            .filter(|sink| sink.enable)
            .map(|sink| sink.minimum_level)
            .min()
    }

    /// Whether the performance sink is enabled in the live snapshot.
    pub fn performance_enabled(&self) -> bool {
        self.store.logging().performance_log.enable
    }

    /// Events a sink has lost to failures or suspension.
    pub fn dropped(&self, kind: SinkKind) -> u64 {
        self.slot(kind).health.dropped()
    }

    /// Flush every file sink; close the files of sinks that are disabled.
    pub fn flush_all(&self) {
        let settings = self.store.logging();
        for slot in &self.slots {
            let mut state = slot.state.lock().unwrap_or_else(PoisonError::into_inner);
            let enabled = slot.kind.settings(&settings).enable;
            let result = match &mut state.output {
                Output::File(file) if !enabled => {
                    file.take();
                    Ok(())
                }
                Output::File(Some(file)) => file.flush(),
                Output::File(None) => Ok(()),
                Output::Stream(stream) => stream.flush(),
            };
            if let Err(source) = result {
                if let Output::File(file) = &mut state.output {
                    file.take();
                }
                drop(state);
                let error = SinkError::Io {
                    sink: slot.kind.name(),
                    source,
                };
                slot.health
                    .record_failure(&error, &self.backoff, &self.reporter, slot.kind);
            }
        }
    }

    fn slot(&self, kind: SinkKind) -> &SinkSlot {
        match kind {
            SinkKind::Console => &self.slots[0],
            SinkKind::App => &self.slots[1],
            SinkKind::AppJson => &self.slots[2],
            SinkKind::Performance => &self.slots[3],
        }
    }

    fn deliver(&self, slot: &SinkSlot, event: &LogEvent, settings: &LoggingSettings) -> Delivery {
        let sink = slot.kind.settings(settings);
        if !sink.enable || event.level < sink.minimum_level || !slot.kind.accepts(&event.target) {
            return Delivery::Filtered;
        }
        if slot.health.admit(slot.kind, Instant::now()).is_err() {
            return Delivery::Suspended;
        }

        let mut state = slot.state.lock().unwrap_or_else(PoisonError::into_inner);
        let result = write_event(&mut state, slot.kind, sink, settings, event);
        if let Err(source) = result {
            if let Output::File(file) = &mut state.output {
                file.take();
            }
            drop(state);
            let error = SinkError::Io {
                sink: slot.kind.name(),
                source,
            };
            slot.health
                .record_failure(&error, &self.backoff, &self.reporter, slot.kind);
            return Delivery::Failed;
        }
        drop(state);

        slot.health.record_success();
        Delivery::Written
    }
}

fn write_event(
    state: &mut SlotState,
    kind: SinkKind,
    sink: &SinkSettings,
    settings: &LoggingSettings,
    event: &LogEvent,
) -> io::Result<()> {
    let rendered = if kind == SinkKind::AppJson {
        render_json(event)?
    } else {
        let current = state
            .template
            .as_ref()
            .is_some_and(|template| template.source() == sink.message_template);
        if !current {
            state.template = Some(OutputTemplate::parse(&sink.message_template));
        }
        match &state.template {
            Some(template) => template.render(event),
            None => return Ok(()),
        }
    };

    match &mut state.output {
        Output::Stream(stream) => {
            stream.write_all(rendered.as_bytes())?;
            stream.flush()
        }
        Output::File(slot) => {
            let limits = RollingLimits {
                max_bytes: settings.file_size_bytes,
                flush_interval: Duration::from_secs(settings.flush_interval_seconds),
                retained_files: settings.retained_file_count,
            };
            let reopen = !matches!(slot, Some(file) if file.template() == sink.path);
            if reopen {
                *slot = Some(RollingFile::new(&sink.path, limits));
            }
            let Some(file) = slot.as_mut() else {
                return Ok(());
            };
            file.set_limits(limits);
            file.write(&rendered, event.timestamp)
        }
    }
}

/// Compact JSON line for the structured sink.
fn render_json(event: &LogEvent) -> io::Result<String> {
    let mut record = Map::new();
    record.insert(
        "@t".to_string(),
        Value::String(event.timestamp.to_rfc3339_opts(SecondsFormat::Micros, false)),
    );
    record.insert("@mt".to_string(), Value::String(event.message.clone()));
    record.insert("@m".to_string(), Value::String(event.rendered_message()));
    record.insert("@l".to_string(), Value::String(event.level.as_str().to_string()));
    if let Some(error) = &event.error {
        record.insert("@x".to_string(), Value::String(error.clone()));
    }
    if let Some(id) = &event.correlation_id {
        record.insert("CorrelationId".to_string(), Value::String(id.to_string()));
    }
    if !event.target.is_empty() {
        record.insert("SourceContext".to_string(), Value::String(event.target.clone()));
    }
    for (name, value) in &event.fields {
        record
            .entry(name.clone())
            .or_insert_with(|| Value::String(value.clone()));
    }

    let mut line = serde_json::to_string(&Value::Object(record))?;
    line.push('\n');
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::sink::PERFORMANCE_TARGET;
    use std::fs;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn settings_in(dir: &std::path::Path) -> LoggingSettings {
        let mut settings = LoggingSettings::default();
        settings.flush_interval_seconds = 1;
        settings.console_log.message_template = "[{Level:u3}] {CorrelationId} {Message}{NewLine}".to_string();
        settings.app_log.path = dir.join("app..log").to_string_lossy().into_owned();
        settings.app_log.message_template = "{Level:u3} {Message}{NewLine}".to_string();
        settings.app_json_log.path = dir.join("app-json..json").to_string_lossy().into_owned();
        settings.performance_log.path = dir.join("perf..log").to_string_lossy().into_owned();
        settings.performance_log.message_template = "{Message}{NewLine}".to_string();
        settings
    }

    fn router_in(dir: &std::path::Path) -> (SinkRouter, SharedBuffer) {
        let store = Arc::new(ConfigStore::default());
        store.publish(settings_in(dir)).unwrap();
        let console = SharedBuffer::default();
        let router = SinkRouter::new(store).with_console_writer(console.clone());
        (router, console)
    }

    fn read_all(dir: &std::path::Path, prefix: &str) -> String {
        let mut out = String::new();
        let mut paths: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.file_name().unwrap().to_string_lossy().starts_with(prefix))
            .collect();
        paths.sort();
        for path in paths {
            out.push_str(&fs::read_to_string(path).unwrap());
        }
        out
    }

    #[test]
    fn fans_out_to_every_enabled_sink() {
        let dir = tempfile::tempdir().unwrap();
        let (router, console) = router_in(dir.path());

        let event = LogEvent::new(LogLevel::Information, "hello {name}")
            .with_field("name", "world")
            .with_correlation_id(Some(Arc::from("abc123")));
        let deliveries = router.emit(&event);
        router.flush_all();

        assert_eq!(
            deliveries,
            [Delivery::Written, Delivery::Written, Delivery::Written, Delivery::Filtered]
        );
        assert_eq!(console.contents(), "[INF] abc123 hello world\n");
        assert_eq!(read_all(dir.path(), "app."), "INF hello world\n");

        let json: Value = serde_json::from_str(read_all(dir.path(), "app-json.").trim()).unwrap();
        assert_eq!(json["@mt"], "hello {name}");
        assert_eq!(json["@m"], "hello world");
        assert_eq!(json["CorrelationId"], "abc123");
        assert_eq!(json["name"], "world");
    }

    #[test]
    fn minimum_level_filters_per_sink() {
        let dir = tempfile::tempdir().unwrap();
        let (router, console) = router_in(dir.path());

        let deliveries = router.emit(&LogEvent::new(LogLevel::Debug, "noisy"));
        assert_eq!(deliveries[0], Delivery::Filtered);
        assert_eq!(deliveries[1], Delivery::Written);
        assert!(console.contents().is_empty());
        assert_eq!(router.min_enabled_level(), Some(LogLevel::Debug));
    }

    #[test]
    fn disabling_app_log_keeps_console() {
        let dir = tempfile::tempdir().unwrap();
        let (router, console) = router_in(dir.path());

        router.emit(&LogEvent::new(LogLevel::Information, "before"));

        let mut next = settings_in(dir.path());
        next.app_log.enable = false;
        router.store().publish(next).unwrap();

        let deliveries = router.emit(&LogEvent::new(LogLevel::Information, "after"));
        router.flush_all();

        assert_eq!(deliveries[0], Delivery::Written);
        assert_eq!(deliveries[1], Delivery::Filtered);
        assert_eq!(read_all(dir.path(), "app."), "INF before\n");
        assert!(console.contents().contains("after"));
    }

    #[test]
    fn performance_events_only_reach_performance_sink() {
        let dir = tempfile::tempdir().unwrap();
        let (router, console) = router_in(dir.path());

        let mut event = LogEvent::new(LogLevel::Information, r#"{"resource_name":"GET /"}"#);
        event.target = PERFORMANCE_TARGET.to_string();
        let deliveries = router.emit(&event);
        router.flush_all();

        assert_eq!(
            deliveries,
            [Delivery::Filtered, Delivery::Filtered, Delivery::Filtered, Delivery::Written]
        );
        assert!(console.contents().is_empty());
        assert_eq!(read_all(dir.path(), "perf."), "{\"resource_name\":\"GET /\"}\n");
    }

    #[test]
    fn failing_sink_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the app log directory should be.
        let blocker = dir.path().join("blocked");
        fs::write(&blocker, "not a directory").unwrap();

        let store = Arc::new(ConfigStore::default());
        let mut settings = settings_in(dir.path());
        settings.app_log.path = blocker.join("app..log").to_string_lossy().into_owned();
        store.publish(settings).unwrap();

        let reports = Arc::new(Mutex::new(Vec::<String>::new()));
        let captured = Arc::clone(&reports);
        let console = SharedBuffer::default();
        let router = SinkRouter::new(store)
            .with_console_writer(console.clone())
            .with_fallback(move |m| captured.lock().unwrap().push(m.to_string()))
            .with_backoff(BackoffPolicy::new(60_000, 60_000));

        let first = router.emit(&LogEvent::new(LogLevel::Warning, "one"));
        let second = router.emit(&LogEvent::new(LogLevel::Warning, "two"));

        assert_eq!(first[0], Delivery::Written);
        assert_eq!(first[1], Delivery::Failed);
        assert_eq!(first[2], Delivery::Written);
        assert_eq!(second[1], Delivery::Suspended);
        assert_eq!(console.contents().lines().count(), 2);
        assert_eq!(reports.lock().unwrap().len(), 1);
        assert_eq!(router.dropped(SinkKind::App), 2);
    }

    #[test]
    fn path_change_reopens_file() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _console) = router_in(dir.path());

        router.emit(&LogEvent::new(LogLevel::Information, "first"));

        let mut next = settings_in(dir.path());
        next.app_log.path = dir.path().join("moved..log").to_string_lossy().into_owned();
        router.store().publish(next).unwrap();
        router.emit(&LogEvent::new(LogLevel::Information, "second"));
        router.flush_all();

        assert_eq!(read_all(dir.path(), "app."), "INF first\n");
        assert_eq!(read_all(dir.path(), "moved."), "INF second\n");
    }
}
