//! Correlation context subsystem.
//!
//! # Data Flow
//! ```text
//! inbound headers
//!     → id.rs (reuse configured header value, or generate UUIDv7)
//!     → context.rs (CorrelationContext, one per request)
//!     → scope() makes it ambient for the request's task
//!     → observability layer reads current_id() for every event
//!     → scope exit / drop ends the context
//! ```
//!
//! # Design Decisions
//! - Task-local, not global: concurrent requests never observe each other
//! - Header problems are recoverable; a generated id is always available
//! - Teardown is tied to scope drop, so cancellation cannot leak a context

pub mod context;
pub mod id;

pub use context::{begin, current, current_id, propagate, scope, sync_scope, CorrelationContext};
pub use id::IdSource;
