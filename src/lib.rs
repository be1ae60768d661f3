//! Request correlation and performance instrumentation library.

pub mod config;
pub mod correlation;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod performance;
pub mod pipeline;
pub mod resilience;

pub use config::ConfigStore;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use observability::SinkRouter;
pub use pipeline::{PipelineOutcome, RequestPipeline};
