//! Run a single slow-path tick against the configured store and exit.

use anyhow::Context;
use breaking_sentinel::{analyze::run_slow_path_once, init_tracing, AppConfig, Pipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cfg = AppConfig::from_env().context("loading configuration")?;
    let pipeline = Pipeline::from_config(&cfg)?;

    let report = run_slow_path_once(&pipeline).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
