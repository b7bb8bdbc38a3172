//! One-shot backfill: re-fetch the last `BACKFILL_HOURS` (default 12), store
//! anything new and run one slow-path tick. The poll checkpoint is untouched.

use anyhow::Context;
use breaking_sentinel::{ingest::backfill::run_backfill_once, init_tracing, AppConfig, Pipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cfg = AppConfig::from_env().context("loading configuration")?;
    let pipeline = Pipeline::from_config(&cfg)?;

    let report = run_backfill_once(&pipeline, cfg.backfill_hours).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
