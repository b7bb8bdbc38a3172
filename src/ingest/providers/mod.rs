// src/ingest/providers/mod.rs
//! Search providers and the cursor paginator they share.

pub mod twitterapi;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

pub use twitterapi::TwitterApiFetcher;

/// One page of search results.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchPage {
    pub tweets: Vec<Value>,
    pub has_next_page: Option<bool>,
    pub next_cursor: Option<String>,
}

impl SearchPage {
    /// Cursor for the next request, only if the source says there is more
    /// and handed back a usable cursor.
    pub fn continuation(&self) -> Option<&str> {
        if self.has_next_page != Some(true) {
            return None;
        }
        self.next_cursor
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

/// Fetches a single page. `cursor` is `None` for the first page.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn page(&self, cursor: Option<&str>) -> Result<SearchPage>;
}

/// Wait inserted before every page except the first.
#[async_trait]
pub trait Pacing: Send + Sync {
    async fn before_page(&self, page_no: u32);
}

/// Fixed sleep between pages; the upstream free tier allows one request per 5s.
#[derive(Debug, Clone, Copy)]
pub struct FixedPacing(pub Duration);

#[async_trait]
impl Pacing for FixedPacing {
    async fn before_page(&self, page_no: u32) {
        if page_no > 1 && !self.0.is_zero() {
            tracing::debug!(target: "ingest", page_no, delay_ms = self.0.as_millis() as u64, "pacing before page");
            tokio::time::sleep(self.0).await;
        }
    }
}

/// Outcome of a full pagination run.
#[derive(Debug, Default)]
pub struct Collected {
    pub posts: Vec<Value>,
    pub pages: u32,
    /// Stopped by `max_pages` while the source still reported more.
    pub truncated: bool,
}

/// Walks cursor pages until the source runs dry, `max_pages` is hit or the
/// cancel flag is raised. Posts keep page order.
pub struct Paginator<'a> {
    source: &'a dyn PageSource,
    pacing: &'a dyn Pacing,
    max_pages: u32,
    cancel: Option<Arc<AtomicBool>>,
    cursor: Option<String>,
    pages: u32,
    done: bool,
}

impl<'a> Paginator<'a> {
    pub fn new(source: &'a dyn PageSource, pacing: &'a dyn Pacing, max_pages: u32) -> Self {
        Self {
            source,
            pacing,
            max_pages: max_pages.max(1),
            cancel: None,
            cursor: None,
            pages: 0,
            done: false,
        }
    }

    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Next page, or `None` once exhausted.
    pub async fn next_page(&mut self) -> Result<Option<SearchPage>> {
        if self.done || self.pages >= self.max_pages {
            return Ok(None);
        }
        if self.cancelled() {
            bail!("pagination cancelled after {} page(s)", self.pages);
        }
        self.pacing.before_page(self.pages + 1).await;
        if self.cancelled() {
            bail!("pagination cancelled after {} page(s)", self.pages);
        }

        let page = self.source.page(self.cursor.as_deref()).await?;
        self.pages += 1;
        match page.continuation() {
            Some(c) => self.cursor = Some(c.to_string()),
            None => self.done = true,
        }
        Ok(Some(page))
    }

    pub async fn collect_all(mut self) -> Result<Collected> {
        let mut out = Collected::default();
        while let Some(page) = self.next_page().await? {
            tracing::debug!(
                target: "ingest",
                page = self.pages,
                count = page.tweets.len(),
                "search page"
            );
            out.posts.extend(page.tweets);
        }
        out.pages = self.pages;
        out.truncated = !self.done;
        if out.truncated {
            tracing::warn!(
                target: "ingest",
                max_pages = self.max_pages,
                collected = out.posts.len(),
                "page cap reached with more results pending; returning partial window"
            );
        }
        Ok(out)
    }
}
