// src/cycles.rs
//! Periodic drivers for the fast cycle (pull + watchdog) and the slow cycle
//! (batch classification), each behind a single-flight lease.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::analyze::scheduler::run_slow_path_once;
use crate::ingest::run_pull_once;
use crate::pipeline::Pipeline;
use crate::watchdog::run_watchdog_once;

/// At most one running invocation per cycle kind.
#[derive(Debug, Clone)]
pub struct SingleFlight {
    name: &'static str,
    busy: Arc<AtomicBool>,
}

/// Releases the lease on drop, including on panic or early return.
#[derive(Debug)]
pub struct FlightGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

impl SingleFlight {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// `None` while a previous holder is still running.
    pub fn try_acquire(&self) -> Option<FlightGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard {
                busy: self.busy.clone(),
            })
    }

    /// Run `job` under the lease. Returns `None` if the tick was skipped.
    /// Errors are logged here and never escape.
    pub async fn run<F, Fut>(&self, job: F) -> Option<Result<()>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let Some(_guard) = self.try_acquire() else {
            tracing::info!(target: "scheduler", cycle = self.name, "previous run still in flight; skipping tick");
            counter!("cycle_skipped_total", "cycle" => self.name).increment(1);
            return None;
        };
        let res = job().await;
        if let Err(e) = &res {
            counter!("cycle_errors_total", "cycle" => self.name).increment(1);
            tracing::error!(target: "scheduler", cycle = self.name, error = ?e, "cycle failed");
        }
        Some(res)
    }
}

/// Tick `job` every `period`, first tick one period from now. Each tick runs
/// in its own task so a stuck call only makes later ticks of the same cycle
/// skip; it never blocks the ticker or the other cycle.
pub fn spawn_cycle<F, Fut>(period: Duration, lease: SingleFlight, job: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let job = Arc::new(job);
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if lease.is_busy() {
                tracing::info!(target: "scheduler", cycle = lease.name(), "previous run still in flight; skipping tick");
                counter!("cycle_skipped_total", "cycle" => lease.name()).increment(1);
                continue;
            }
            let lease = lease.clone();
            let job = job.clone();
            tokio::spawn(async move {
                lease.run(|| (*job)()).await;
            });
        }
    })
}

async fn fast_tick(p: &Pipeline) -> Result<()> {
    // A failed pull must not hide silence; the watchdog runs regardless.
    let pulled = run_pull_once(p).await;
    run_watchdog_once(p).await?;
    pulled.map(|_| ())
}

async fn slow_tick(p: &Pipeline) -> Result<()> {
    run_slow_path_once(p).await.map(|_| ())
}

#[derive(Debug, Clone)]
pub struct Cycles {
    pub fast: SingleFlight,
    pub slow: SingleFlight,
}

impl Default for Cycles {
    fn default() -> Self {
        Self {
            fast: SingleFlight::new("fast"),
            slow: SingleFlight::new("slow"),
        }
    }
}

impl Cycles {
    /// One pass of pull, watchdog and slow path, in that order.
    pub async fn run_startup(&self, p: &Pipeline) {
        tracing::info!(target: "scheduler", "startup run");
        self.fast.run(|| fast_tick(p)).await;
        self.slow.run(|| slow_tick(p)).await;
    }

    pub fn spawn(&self, p: Arc<Pipeline>) -> Vec<JoinHandle<()>> {
        tracing::info!(
            target: "scheduler",
            fast_secs = p.poll.interval.as_secs(),
            slow_secs = p.batch.interval.as_secs(),
            "scheduling cycles"
        );
        let fast_p = p.clone();
        let fast = spawn_cycle(p.poll.interval, self.fast.clone(), move || {
            let p = fast_p.clone();
            async move { fast_tick(&p).await }
        });
        let slow_p = p.clone();
        let slow = spawn_cycle(p.batch.interval, self.slow.clone(), move || {
            let p = slow_p.clone();
            async move { slow_tick(&p).await }
        });
        vec![fast, slow]
    }

    /// Startup pass in the background, then the periodic cycles.
    pub fn start(self, p: Arc<Pipeline>) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run_startup(&p).await;
            for h in self.spawn(p) {
                if let Err(e) = h.await {
                    tracing::error!(target: "scheduler", error = %e, "cycle task ended");
                }
            }
        })
    }
}
