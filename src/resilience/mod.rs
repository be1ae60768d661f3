//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Log sink write fails:
//!     → sink marks itself suspended
//!     → backoff.rs decides how long (exponential, capped, jittered)
//!     → next write after the deadline reopens the file and tries again
//! ```
//!
//! # Design Decisions
//! - Retries apply only to the sinks' own write paths, never to handled requests
//! - Suspension drops events instead of queueing them (bounded memory)
//! - Jitter keeps several failing sinks from retrying in lockstep

pub mod backoff;
