//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, outer layers)
//!     → middleware.rs (request pipeline: correlation, timing, header echo)
//!     → handlers.rs (demo endpoints)
//!     → Send to client
//! ```

pub mod handlers;
pub mod middleware;
pub mod server;

pub use server::HttpServer;
