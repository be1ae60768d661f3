//! Sink identities and per-sink failure tracking.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use crate::config::{LoggingSettings, SinkSettings};
use crate::error::SinkError;
use crate::observability::event::LogLevel;
use crate::observability::metrics;
use crate::resilience::backoff::BackoffPolicy;

/// Source context of performance records. Only the performance sink takes
/// events with this target, and it takes nothing else.
pub const PERFORMANCE_TARGET: &str = "performance";

/// Level every performance record is emitted at.
pub const PERFORMANCE_LEVEL: LogLevel = LogLevel::Information;

/// The four output destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkKind {
    Console,
    App,
    AppJson,
    Performance,
}

impl SinkKind {
    pub const ALL: [SinkKind; 4] = [
        SinkKind::Console,
        SinkKind::App,
        SinkKind::AppJson,
        SinkKind::Performance,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            SinkKind::Console => "console",
            SinkKind::App => "app",
            SinkKind::AppJson => "app_json",
            SinkKind::Performance => "performance",
        }
    }

    pub fn settings<'a>(&self, logging: &'a LoggingSettings) -> &'a SinkSettings {
        match self {
            SinkKind::Console => &logging.console_log,
            SinkKind::App => &logging.app_log,
            SinkKind::AppJson => &logging.app_json_log,
            SinkKind::Performance => &logging.performance_log,
        }
    }

    /// Whether events from `target` belong in this sink.
    pub fn accepts(&self, target: &str) -> bool {
        let is_performance = target == PERFORMANCE_TARGET;
        match self {
            SinkKind::Performance => is_performance,
            _ => !is_performance,
        }
    }

    pub const fn is_file(&self) -> bool {
        !matches!(self, SinkKind::Console)
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Out-of-band channel for sink failures (stderr by default).
pub type FallbackReporter = Arc<dyn Fn(&str) + Send + Sync>;

pub fn stderr_reporter() -> FallbackReporter {
    Arc::new(|message: &str| eprintln!("{message}"))
}

#[derive(Debug, Default)]
struct FailureState {
    consecutive_failures: u32,
    suspended_until: Option<Instant>,
    reported: bool,
}

/// Failure bookkeeping for one sink.
#[derive(Debug, Default)]
pub struct SinkHealth {
    state: Mutex<FailureState>,
    dropped: AtomicU64,
}

impl SinkHealth {
    /// Whether a write may be attempted now. Counts the drop when not.
    pub fn admit(&self, kind: SinkKind, now: Instant) -> Result<(), SinkError> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match state.suspended_until {
            Some(until) if now < until => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(SinkError::Suspended(kind.name()))
            }
            _ => Ok(()),
        }
    }

    /// Record a failed write; reports only the first of a failure streak.
    pub fn record_failure(
        &self,
        error: &SinkError,
        backoff: &BackoffPolicy,
        reporter: &FallbackReporter,
        kind: SinkKind,
    ) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        metrics::record_sink_failure(kind.name());

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        let delay = backoff.delay(state.consecutive_failures);
        state.suspended_until = Some(Instant::now() + delay);

        if !state.reported {
            state.reported = true;
            reporter(&format!(
                "[request-telemetry] log sink '{kind}' disabled for {delay:?}: {error}; \
                 further failures are not reported until it recovers"
            ));
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.consecutive_failures > 0 || state.suspended_until.is_some() {
            *state = FailureState::default();
        }
    }

    /// Events lost to failures or suspension.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .consecutive_failures
    }
}
