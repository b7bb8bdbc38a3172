// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Half-open poll interval `[since, until)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl Window {
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.since <= t && t < self.until
    }
}

/// Posts returned for a window. `complete` is false when paging stopped
/// before the upstream ran out of pages, so the window was only partly seen.
#[derive(Debug, Clone, Default)]
pub struct Fetched {
    pub posts: Vec<Value>,
    pub complete: bool,
}

impl Fetched {
    pub fn complete(posts: Vec<Value>) -> Self {
        Self {
            posts,
            complete: true,
        }
    }
}

/// Source of raw posts for a window. Implementations page internally and
/// return every page as one flat, order-preserving list of JSON posts.
#[async_trait::async_trait]
pub trait PostFetcher: Send + Sync {
    async fn fetch(&self, window: &Window) -> Result<Fetched>;
    fn name(&self) -> &'static str;
}
