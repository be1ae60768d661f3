//! Request telemetry demo service.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ TraceLayer → Timeout → CatchPanic
//!                         │
//!                         ▼
//!                  ┌──────────────────┐   live snapshots   ┌──────────────┐
//!                  │ request pipeline │◀───────────────────│ config store │◀── file watcher / SIGHUP
//!                  │  correlation     │                    └──────────────┘
//!                  │  performance     │                           │
//!                  └────────┬─────────┘                           ▼
//!                           │ handler              ┌─────────────────────────────┐
//!                           ▼                      │ sink router                 │
//!                      demo handlers ── events ──▶ │ console | app | json | perf │
//!                                                  └─────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use request_telemetry::lifecycle::startup;

#[derive(Parser)]
#[command(name = "request-telemetry")]
#[command(about = "Request correlation and performance logging demo service", long_about = None)]
struct Cli {
    /// Path to the TOML config file (watched for changes)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    startup::run(&cli.config).await?;
    Ok(())
}
