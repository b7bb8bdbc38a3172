// src/analyze/scheduler.rs
//! Priority batch scheduler: one slow-path tick.
//!
//! select → gate → cap → sub-batch → classify (sequential, stop at first
//! failure) → audit → alerts → notify → mark processed.
//!
//! Only items of sub-batches that were classified successfully are marked
//! processed. A failed sub-batch and everything after it stay unprocessed
//! and are picked up again by a later tick.

use anyhow::{anyhow, Context, Result};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;

use super::aggregate::collect_alerts;
use super::classifier::Classification;
use crate::config::BatchConfig;
use crate::model::{AnalysisBatch, Item};
use crate::notify::format_alert_message;
use crate::pipeline::Pipeline;
use crate::store::analysis_order;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("slow_path_ticks_total", "Slow-path ticks started.");
        describe_counter!(
            "slow_path_items_processed_total",
            "Items marked processed after a successful sub-batch."
        );
        describe_counter!("slow_path_alerts_total", "Breaking alerts stored.");
        describe_counter!("classifier_errors_total", "Failed classifier calls.");
        describe_counter!("notify_failures_total", "Alert sends that failed.");
        describe_gauge!(
            "slow_path_last_run_ts",
            "Unix ts when the slow path last finished a tick."
        );
    });
}

/// Why a tick did or did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    Empty,
    PriorityMet,
    RegularMet,
    Waiting,
}

impl Gate {
    pub fn proceeds(self) -> bool {
        matches!(self, Gate::PriorityMet | Gate::RegularMet)
    }
}

/// `P >= min_priority` or `R >= min_regular`.
pub fn gate(priority: usize, regular: usize, cfg: &BatchConfig) -> Gate {
    if priority + regular == 0 {
        Gate::Empty
    } else if priority >= cfg.min_priority {
        Gate::PriorityMet
    } else if regular >= cfg.min_regular {
        Gate::RegularMet
    } else {
        Gate::Waiting
    }
}

/// Split the selection into the capped batch (as contiguous sub-batches) and
/// the count left for later ticks.
pub fn plan_subbatches<'a>(selected: &'a [Item], cfg: &BatchConfig) -> (Vec<&'a [Item]>, usize) {
    let take = selected.len().min(cfg.max_batch);
    let chosen = &selected[..take];
    let subs = chosen.chunks(cfg.subbatch_size.max(1)).collect();
    (subs, selected.len() - take)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlowPathReport {
    pub gate: Gate,
    pub selected: usize,
    pub priority: usize,
    pub regular: usize,
    pub chosen: usize,
    pub carried_over: usize,
    pub subbatches: usize,
    pub subbatches_ok: usize,
    pub alerts: usize,
    pub notified: usize,
    pub notify_failures: usize,
    pub marked: usize,
}

impl SlowPathReport {
    fn new(gate: Gate) -> Self {
        Self {
            gate,
            selected: 0,
            priority: 0,
            regular: 0,
            chosen: 0,
            carried_over: 0,
            subbatches: 0,
            subbatches_ok: 0,
            alerts: 0,
            notified: 0,
            notify_failures: 0,
            marked: 0,
        }
    }
}

struct Completed {
    item_ids: Vec<String>,
    out: Classification,
}

pub async fn run_slow_path_once(p: &Pipeline) -> Result<SlowPathReport> {
    ensure_metrics_described();
    counter!("slow_path_ticks_total").increment(1);
    let cfg = &p.batch;

    let mut selected = p
        .store
        .find_unprocessed(cfg.select_limit)
        .await
        .context("selecting unprocessed items")?;
    selected.sort_by(analysis_order);

    let priority = selected
        .iter()
        .filter(|i| i.priority_class.is_priority())
        .count();
    let regular = selected.len() - priority;
    let decision = gate(priority, regular, cfg);

    let mut report = SlowPathReport::new(decision);
    report.selected = selected.len();
    report.priority = priority;
    report.regular = regular;

    match decision {
        Gate::Empty => {
            tracing::debug!(target: "slow_path", "no unprocessed items");
            return Ok(report);
        }
        Gate::Waiting => {
            tracing::info!(
                target: "slow_path",
                priority,
                min_priority = cfg.min_priority,
                regular,
                min_regular = cfg.min_regular,
                "below thresholds; waiting"
            );
            return Ok(report);
        }
        Gate::PriorityMet | Gate::RegularMet => {}
    }

    let (subs, carried_over) = plan_subbatches(&selected, cfg);
    report.chosen = selected.len() - carried_over;
    report.carried_over = carried_over;
    report.subbatches = subs.len();
    tracing::info!(
        target: "slow_path",
        gate = ?decision,
        chosen = report.chosen,
        subbatches = subs.len(),
        carried_over,
        "processing"
    );

    let mut completed: Vec<Completed> = Vec::with_capacity(subs.len());
    let mut failure: Option<anyhow::Error> = None;

    for (idx, sub) in subs.iter().enumerate() {
        let item_ids: Vec<String> = sub.iter().map(|i| i.id.clone()).collect();
        match p.classifier.classify(sub).await {
            Ok(out) => {
                let audit = AnalysisBatch {
                    created_at: p.clock.now(),
                    item_ids: item_ids.clone(),
                    results: out.results.clone(),
                    breaking: out.breaking.clone(),
                    raw: out.raw.clone(),
                };
                if let Err(e) = p.store.insert_analysis(audit).await {
                    tracing::error!(target: "slow_path", error = %e, subbatch = idx, "failed to store analysis record");
                }
                tracing::debug!(
                    target: "slow_path",
                    subbatch = idx,
                    items = item_ids.len(),
                    breaking = out.breaking.len(),
                    "sub-batch classified"
                );
                completed.push(Completed { item_ids, out });
            }
            Err(e) => {
                counter!("classifier_errors_total").increment(1);
                tracing::warn!(
                    target: "slow_path",
                    subbatch = idx,
                    classifier = p.classifier.name(),
                    error = %e,
                    "classification failed; abandoning remaining sub-batches"
                );
                failure = Some(e.context(format!(
                    "classifying sub-batch {}/{}",
                    idx + 1,
                    subs.len()
                )));
                break;
            }
        }
    }
    report.subbatches_ok = completed.len();

    let now = p.clock.now();
    let alerts = collect_alerts(completed.iter().flat_map(|c| c.out.breaking.iter()), now);

    let mut fresh = Vec::new();
    if !alerts.is_empty() {
        let res = p
            .store
            .insert_alerts(alerts.clone())
            .await
            .context("storing alerts")?;
        if let Some(e) = res.first_hard_error() {
            return Err(anyhow!("storing alert {}: {:?}", e.id, e.kind));
        }
        if res.duplicates() > 0 {
            tracing::info!(target: "slow_path", duplicates = res.duplicates(), "alerts already stored by an earlier tick");
        }
        let dup_idx: std::collections::HashSet<usize> =
            res.write_errors.iter().map(|e| e.index).collect();
        fresh = alerts
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !dup_idx.contains(i))
            .map(|(_, a)| a)
            .collect();
        counter!("slow_path_alerts_total").increment(res.inserted as u64);
    }
    report.alerts = fresh.len();

    if !fresh.is_empty() {
        match p.notify.alert_chat_id.as_deref() {
            None => {
                tracing::warn!(target: "slow_path", alerts = fresh.len(), "TELEGRAM_ALERT_CHAT_ID not set; skipping breaking alerts")
            }
            Some(chat) => {
                for a in &fresh {
                    let text = format_alert_message(a);
                    match p.notifier.notify(chat, &text).await {
                        Ok(()) => report.notified += 1,
                        Err(e) => {
                            report.notify_failures += 1;
                            counter!("notify_failures_total").increment(1);
                            tracing::warn!(target: "notify", alert = %a.id, error = %e, "alert send failed");
                        }
                    }
                }
            }
        }
    }

    let done_ids: Vec<String> = completed.into_iter().flat_map(|c| c.item_ids).collect();
    if !done_ids.is_empty() {
        report.marked = p
            .store
            .mark_processed(&done_ids, p.clock.now())
            .await
            .context("marking items processed")?;
        counter!("slow_path_items_processed_total").increment(report.marked as u64);
    }
    gauge!("slow_path_last_run_ts").set(p.clock.now().timestamp() as f64);

    tracing::info!(
        target: "slow_path",
        subbatches_ok = report.subbatches_ok,
        subbatches = report.subbatches,
        alerts = report.alerts,
        notified = report.notified,
        marked = report.marked,
        "tick done"
    );

    match failure {
        Some(e) => Err(e),
        None => Ok(report),
    }
}
