//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! tracing events ─→ layer.rs ─┐
//!                             ├─→ router.rs ─→ console | app file | JSON file | performance file
//! performance records ────────┘        │
//!                                      └─→ rolling.rs (day/size rollover, retention)
//!
//! request and sink counters ─→ metrics.rs (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Sink settings are read from the live config snapshot on every event
//! - Each sink fails alone; failures are reported to stderr, not re-logged
//! - The performance sink only takes events targeted at `performance`

pub mod event;
pub mod layer;
pub mod logging;
pub mod metrics;
pub mod rolling;
pub mod router;
pub mod sink;
pub mod template;

pub use event::{LogEvent, LogLevel};
pub use router::{Delivery, SinkRouter};
pub use sink::{SinkKind, PERFORMANCE_LEVEL, PERFORMANCE_TARGET};
