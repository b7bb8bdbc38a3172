// src/lib.rs
// Public library surface for the service binary, the one-shot tools and integration tests.

pub mod analyze;
pub mod api;
pub mod clock;
pub mod config;
pub mod cycles;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod pipeline;
pub mod store;
pub mod watchdog;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::config::AppConfig;
pub use crate::pipeline::Pipeline;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact log output filtered by `RUST_LOG` (default `info`).
/// A no-op if a global subscriber is already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}
