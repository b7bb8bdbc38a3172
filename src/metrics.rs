// src/metrics.rs
use anyhow::{Context, Result};
use metrics::gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use crate::config::AppConfig;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the process-wide Prometheus recorder. Safe to call more than
    /// once; later calls reuse the first handle.
    pub fn init() -> Result<Self> {
        let handle = HANDLE
            .get_or_try_init(|| {
                PrometheusBuilder::new()
                    .install_recorder()
                    .context("prometheus: install recorder")
            })?
            .clone();
        Ok(Self { handle })
    }

    /// Static gauges describing the running configuration.
    pub fn record_config(&self, cfg: &AppConfig) {
        gauge!("config_fast_interval_secs").set(cfg.poll.interval.as_secs() as f64);
        gauge!("config_slow_interval_secs").set(cfg.batch.interval.as_secs() as f64);
        gauge!("config_max_batch").set(cfg.batch.max_batch as f64);
        gauge!("config_watchdog_silence_secs").set(cfg.watchdog.silence_threshold.num_seconds() as f64);
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }
}
