//! Breaking Sentinel: service entrypoint.
//! Loads configuration, opens the store, starts the fast and slow cycles in
//! the background and serves the ops router.

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;

use breaking_sentinel::{
    api::{self, AppState},
    cycles::Cycles,
    init_tracing,
    metrics::Metrics,
    AppConfig, Pipeline,
};

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    init_tracing();

    // Configuration and store problems are fatal at boot; everything later is per-tick.
    let cfg = AppConfig::from_env().context("loading configuration")?;
    let metrics = Metrics::init()?;
    metrics.record_config(&cfg);

    let pipeline = Arc::new(Pipeline::from_config(&cfg)?);
    tracing::info!(
        target: "scheduler",
        priority = cfg.accounts.priority.len(),
        normal = cfg.accounts.normal.len(),
        store = %cfg.store_path.display(),
        "breaking-sentinel starting"
    );

    let cycles = Cycles::default();
    cycles.clone().start(pipeline.clone());

    let state = AppState::new(pipeline.store.clone())
        .with_metrics(metrics)
        .with_cycles(cycles);
    let router = api::router(state);

    Ok(router.into())
}
