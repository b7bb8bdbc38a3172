// src/ingest/backfill.rs
use anyhow::{anyhow, bail, Context, Result};
use chrono::Duration;
use serde::Serialize;

use crate::analyze::scheduler::{run_slow_path_once, SlowPathReport};
use crate::config::MAX_SPAN_HOURS;
use crate::ingest::types::Window;
use crate::ingest::{dedup, ensure_metrics_described, normalize};
use crate::pipeline::Pipeline;

#[derive(Debug, Clone, Serialize)]
pub struct BackfillReport {
    pub window: Window,
    pub fetched: usize,
    pub inserted: usize,
    pub complete: bool,
    pub slow_path: SlowPathReport,
}

/// Re-fetch the last `hours`, store whatever is new, then run one slow-path
/// tick. The poll checkpoint is left alone.
pub async fn run_backfill_once(p: &Pipeline, hours: f64) -> Result<BackfillReport> {
    if !hours.is_finite() || hours <= 0.0 || hours > MAX_SPAN_HOURS {
        bail!("backfill hours must be a positive number up to {MAX_SPAN_HOURS}, got {hours}");
    }
    ensure_metrics_described();

    let now = p.clock.now();
    let since = Duration::try_milliseconds((hours * 3_600_000.0).round() as i64)
        .and_then(|span| now.checked_sub_signed(span))
        .ok_or_else(|| anyhow!("backfill span of {hours}h is out of range"))?;
    let window = Window { since, until: now };
    tracing::info!(target: "ingest", hours, since = %window.since, until = %window.until, "backfill");

    let got = p
        .fetcher
        .fetch(&window)
        .await
        .context("backfill fetch")?;
    let complete = got.complete;
    let fetched = got.posts.len();
    let items = normalize::normalize_posts(got.posts, &p.accounts, now);
    let inserted = dedup::dedup_and_insert(p.store.as_ref(), items).await?;
    if complete {
        tracing::info!(target: "ingest", fetched, inserted, "backfill stored");
    } else {
        tracing::warn!(target: "ingest", fetched, inserted, "backfill truncated by page cap");
    }

    let slow_path = run_slow_path_once(p).await?;
    Ok(BackfillReport {
        window,
        fetched,
        inserted,
        complete,
        slow_path,
    })
}
