// src/api.rs
//! Ops surface: liveness, pipeline status and Prometheus metrics.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::cycles::Cycles;
use crate::metrics::Metrics;
use crate::model::{Checkpoint, WatchdogState};
use crate::store::{Store, StoreStats};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub metrics: Option<Metrics>,
    pub cycles: Option<Cycles>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            metrics: None,
            cycles: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_cycles(mut self, cycles: Cycles) -> Self {
        self.cycles = Some(cycles);
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(status))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct CyclesOut {
    fast_running: bool,
    slow_running: bool,
}

#[derive(Debug, Serialize)]
struct StatusOut {
    checkpoint: Option<Checkpoint>,
    watchdog: WatchdogState,
    stats: StoreStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    cycles: Option<CyclesOut>,
}

async fn status(State(state): State<AppState>) -> Response {
    let read = async {
        let checkpoint = state.store.checkpoint().await?;
        let watchdog = state.store.watchdog_state().await?;
        let stats = state.store.stats().await?;
        Ok::<_, crate::store::StoreError>((checkpoint, watchdog, stats))
    };
    match read.await {
        Ok((checkpoint, watchdog, stats)) => Json(StatusOut {
            checkpoint,
            watchdog,
            stats,
            cycles: state.cycles.as_ref().map(|c| CyclesOut {
                fast_running: c.fast.is_busy(),
                slow_running: c.slow.is_busy(),
            }),
        })
        .into_response(),
        Err(e) => {
            tracing::error!(target: "api", error = %e, "status read failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(m) => m.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
