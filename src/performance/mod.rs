//! Per-request performance instrumentation.
//!
//! # Data Flow
//! ```text
//! handler future
//!     → wrapper.rs (t0, run handler, t1)
//!     → performance sink enabled? (live config)
//!     → record.rs (assemble record, overhead = t2 - t1)
//!     → sink router, target "performance"
//! ```

pub mod record;
pub mod wrapper;

pub use record::{HandlerFailed, PerformanceRecord, ReportStatus, ResponseStatus};
pub use wrapper::PerformanceWrapper;
