// src/ingest/window.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::config::PollConfig;
use crate::ingest::types::Window;
use crate::model::Checkpoint;
use crate::store::Store;

/// Next poll window: `until = now`, `since = (last checkpoint or now - lookback) - overlap`.
pub async fn build_window(store: &dyn Store, clock: &dyn Clock, cfg: &PollConfig) -> Result<Window> {
    let now = clock.now();
    let cp = store.checkpoint().await.context("reading poll checkpoint")?;
    Ok(window_from(cp.map(|c| c.last_checked), now, cfg))
}

/// Pure part of [`build_window`]. `since` never passes `until`, even if the
/// stored checkpoint is ahead of the local clock.
pub fn window_from(last_checked: Option<DateTime<Utc>>, now: DateTime<Utc>, cfg: &PollConfig) -> Window {
    let anchor = last_checked.unwrap_or(now - cfg.default_lookback);
    let since = (anchor - cfg.overlap).min(now);
    Window { since, until: now }
}

/// Record a successful poll+store cycle. Only call after both steps succeeded.
/// `last_checked` never moves backwards.
pub async fn update_checkpoint(
    store: &dyn Store,
    until: DateTime<Utc>,
    saved_count: usize,
) -> Result<Checkpoint> {
    let existing = store.checkpoint().await.context("reading poll checkpoint")?;
    let last_checked = match existing {
        Some(c) if c.last_checked > until => {
            tracing::warn!(
                target: "ingest",
                stored = %c.last_checked,
                %until,
                "checkpoint ahead of window end; keeping stored instant"
            );
            c.last_checked
        }
        _ => until,
    };
    let cp = Checkpoint {
        last_checked,
        last_saved_count: saved_count,
    };
    store.put_checkpoint(cp).await.context("writing poll checkpoint")?;
    Ok(cp)
}

/// Instant format understood by the search query (`2025-01-31_23:59:00_UTC`).
pub fn format_query_instant(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d_%H:%M:%S_UTC").to_string()
}
