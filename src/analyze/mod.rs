// src/analyze/mod.rs
// Slow path: classifier seam, response parsing, alert aggregation, batch scheduler.

pub mod aggregate;
pub mod classifier;
pub mod parse;
pub mod scheduler;

pub use classifier::{Classification, Classifier};
pub use scheduler::{run_slow_path_once, SlowPathReport};
