// src/watchdog.rs
//! Silence watchdog.
//!
//! No state machine is stored. Each tick recomputes staleness from the newest
//! item and cooldown eligibility from `WatchdogState.last_alert_at`, so
//! recovery needs nothing more than a fresh item arriving.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde::Serialize;

use crate::notify::Cooldown;
use crate::pipeline::Pipeline;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WatchdogOutcome {
    /// Nothing ingested yet.
    NoData,
    Healthy {
        last_ingested_at: DateTime<Utc>,
    },
    /// Silent, but there is no channel to report to.
    ChannelMissing {
        last_ingested_at: DateTime<Utc>,
    },
    /// Silent, alerted recently.
    Suppressed {
        last_ingested_at: DateTime<Utc>,
        last_alert_at: DateTime<Utc>,
    },
    Alerted {
        last_ingested_at: DateTime<Utc>,
        last_item_id: String,
    },
}

pub fn silence_message(threshold: Duration, last_ingested_at: DateTime<Utc>, last_item_id: &str) -> String {
    format!(
        "🚨 ALERT: No posts received in over {} hours!\n\n\
         Last post timestamp: {}\n\
         Last post id: {}\n\n\
         Polling might be stuck; check the twitterapi.io dashboard.",
        format_hours(threshold),
        last_ingested_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        if last_item_id.is_empty() { "unknown" } else { last_item_id }
    )
}

fn format_hours(d: Duration) -> String {
    let h = d.num_milliseconds() as f64 / 3_600_000.0;
    if h.fract() == 0.0 {
        format!("{}", h as i64)
    } else {
        format!("{h:.2}")
    }
}

pub async fn run_watchdog_once(p: &Pipeline) -> Result<WatchdogOutcome> {
    let Some(latest) = p
        .store
        .latest_by_ingested_at()
        .await
        .context("reading latest item")?
    else {
        tracing::info!(target: "watchdog", "no items ingested yet; nothing to check");
        return Ok(WatchdogOutcome::NoData);
    };

    let now = p.clock.now();
    let last_ingested_at = latest.ingested_at;
    let silent_for = now.signed_duration_since(last_ingested_at);

    if silent_for <= p.watchdog.silence_threshold {
        tracing::debug!(
            target: "watchdog",
            last = %last_ingested_at,
            minutes_ago = silent_for.num_minutes(),
            "ingestion healthy"
        );
        return Ok(WatchdogOutcome::Healthy { last_ingested_at });
    }

    let Some(chat) = p.notify.watchdog_chat_id.as_deref() else {
        tracing::warn!(target: "watchdog", "TELEGRAM_WATCHDOG_CHAT_ID not set; skipping silence alert");
        return Ok(WatchdogOutcome::ChannelMissing { last_ingested_at });
    };

    let state = p
        .store
        .watchdog_state()
        .await
        .context("reading watchdog state")?;
    let cooldown = Cooldown::new(p.watchdog.cooldown);
    if !cooldown.should_fire(state.last_alert_at, now) {
        tracing::info!(target: "watchdog", "silent but recently alerted; cooldown active");
        // should_fire only returns false when a previous alert exists
        let last_alert_at = state.last_alert_at.unwrap_or(now);
        return Ok(WatchdogOutcome::Suppressed {
            last_ingested_at,
            last_alert_at,
        });
    }

    let text = silence_message(p.watchdog.silence_threshold, last_ingested_at, &latest.id);
    p.notifier
        .notify(chat, &text)
        .await
        .context("sending silence alert")?;

    let mut state = state;
    state.last_alert_at = Some(now);
    p.store
        .put_watchdog_state(state)
        .await
        .context("recording silence alert")?;
    counter!("watchdog_alerts_total").increment(1);

    tracing::warn!(
        target: "watchdog",
        last = %last_ingested_at,
        hours_silent = silent_for.num_minutes() as f64 / 60.0,
        "silence alert sent"
    );
    Ok(WatchdogOutcome::Alerted {
        last_ingested_at,
        last_item_id: latest.id,
    })
}
