// src/ingest/mod.rs
pub mod backfill;
pub mod dedup;
pub mod normalize;
pub mod providers;
pub mod types;
pub mod window;

use anyhow::{Context, Result};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::ingest::types::Window;
use crate::model::Checkpoint;
use crate::pipeline::Pipeline;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_fetched_total", "Raw posts returned by the fetcher.");
        describe_counter!("ingest_inserted_total", "Posts newly written to the store.");
        describe_counter!(
            "ingest_duplicates_total",
            "Posts rejected by the store as already present."
        );
        describe_counter!(
            "ingest_malformed_total",
            "Raw posts skipped because they could not be normalized."
        );
        describe_counter!(
            "ingest_provider_errors_total",
            "Fetcher request/decode errors."
        );
        describe_gauge!(
            "ingest_last_run_ts",
            "Unix ts of the last successful pull cycle."
        );
    });
}

#[derive(Debug, Clone, Serialize)]
pub struct PullReport {
    pub window: Window,
    pub fetched: usize,
    pub normalized: usize,
    pub inserted: usize,
    /// False when the fetcher hit its page cap before the window was drained.
    pub complete: bool,
    /// The advanced checkpoint, `None` when it was left where it was.
    pub checkpoint: Option<Checkpoint>,
}

/// One fast-path cycle: window, fetch, normalize, dedup-insert, checkpoint.
///
/// The checkpoint only advances when fetch and store both succeeded and the
/// fetch drained every page, so a failed or truncated cycle is retried over
/// the same (or a wider) window.
pub async fn run_pull_once(p: &Pipeline) -> Result<PullReport> {
    ensure_metrics_described();

    let window = window::build_window(p.store.as_ref(), p.clock.as_ref(), &p.poll).await?;
    tracing::debug!(target: "ingest", since = %window.since, until = %window.until, "pull window");

    let got = p
        .fetcher
        .fetch(&window)
        .await
        .with_context(|| format!("fetching from {}", p.fetcher.name()))?;
    let complete = got.complete;
    let fetched = got.posts.len();
    counter!("ingest_fetched_total").increment(fetched as u64);

    let items = normalize::normalize_posts(got.posts, &p.accounts, p.clock.now());
    let normalized = items.len();
    let inserted = dedup::dedup_and_insert(p.store.as_ref(), items).await?;

    if !complete {
        tracing::warn!(
            target: "ingest",
            fetched,
            inserted,
            since = %window.since,
            "fetch truncated; checkpoint not advanced"
        );
        return Ok(PullReport {
            window,
            fetched,
            normalized,
            inserted,
            complete,
            checkpoint: None,
        });
    }

    let checkpoint = window::update_checkpoint(p.store.as_ref(), window.until, inserted).await?;
    gauge!("ingest_last_run_ts").set(p.clock.now().timestamp() as f64);

    tracing::info!(
        target: "ingest",
        fetched,
        normalized,
        inserted,
        checkpoint = %checkpoint.last_checked,
        "pull cycle done"
    );

    Ok(PullReport {
        window,
        fetched,
        normalized,
        inserted,
        complete,
        checkpoint: Some(checkpoint),
    })
}
