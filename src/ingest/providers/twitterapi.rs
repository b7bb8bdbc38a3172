// src/ingest/providers/twitterapi.rs
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use metrics::counter;

use super::{FixedPacing, PageSource, Paginator, SearchPage};
use crate::config::{Accounts, PollConfig};
use crate::ingest::types::{Fetched, PostFetcher, Window};
use crate::ingest::window::format_query_instant;

pub const SEARCH_URL: &str = "https://api.twitterapi.io/twitter/tweet/advanced_search";

/// `from:a OR from:b since:… until:… -filter:replies include:nativeretweets`
pub fn build_search_query(accounts: &Accounts, window: &Window) -> Result<String> {
    let handles = accounts.all();
    if handles.is_empty() {
        bail!("no accounts configured; set PRIORITY_ACCOUNTS and/or NORMAL_ACCOUNTS");
    }
    let from = handles
        .iter()
        .map(|h| format!("from:{h}"))
        .collect::<Vec<_>>()
        .join(" OR ");
    Ok(format!(
        "{from} since:{} until:{} -filter:replies include:nativeretweets",
        format_query_instant(window.since),
        format_query_instant(window.until)
    ))
}

/// Advanced-search client for twitterapi.io.
pub struct TwitterApiFetcher {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    accounts: Accounts,
    page_delay: Duration,
    max_pages: u32,
    cancel: Arc<AtomicBool>,
}

impl TwitterApiFetcher {
    pub fn new(api_key: impl Into<String>, accounts: Accounts, poll: &PollConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("breaking-sentinel/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(300))
            .build()
            .context("building search http client")?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            endpoint: SEARCH_URL.to_string(),
            accounts,
            page_delay: poll.page_delay,
            max_pages: poll.max_pages,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = url.into();
        self
    }

    /// Shared flag; raising it stops any in-flight pagination before its next page.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }
}

/// One query bound to the client.
struct QueryPages<'a> {
    fetcher: &'a TwitterApiFetcher,
    query: String,
}

#[async_trait]
impl PageSource for QueryPages<'_> {
    async fn page(&self, cursor: Option<&str>) -> Result<SearchPage> {
        let mut params: Vec<(&str, &str)> = vec![("queryType", "Latest"), ("query", self.query.as_str())];
        if let Some(c) = cursor {
            params.push(("cursor", c));
        }

        let resp = self
            .fetcher
            .http
            .get(&self.fetcher.endpoint)
            .header("X-API-Key", &self.fetcher.api_key)
            .query(&params)
            .send()
            .await
            .map_err(|e| {
                counter!("ingest_provider_errors_total").increment(1);
                anyhow!(e).context("search request")
            })?;

        let status = resp.status();
        if !status.is_success() {
            counter!("ingest_provider_errors_total").increment(1);
            let body = resp.text().await.unwrap_or_default();
            bail!("search returned {status}: {}", truncate(&body, 300));
        }
        resp.json::<SearchPage>()
            .await
            .context("decoding search page")
    }
}

#[async_trait]
impl PostFetcher for TwitterApiFetcher {
    async fn fetch(&self, window: &Window) -> Result<Fetched> {
        let query = build_search_query(&self.accounts, window)?;
        tracing::info!(
            target: "ingest",
            since = %window.since,
            until = %window.until,
            accounts = self.accounts.all().len(),
            "searching"
        );

        let source = QueryPages {
            fetcher: self,
            query,
        };
        let pacing = FixedPacing(self.page_delay);
        let collected = Paginator::new(&source, &pacing, self.max_pages)
            .with_cancel(self.cancel.clone())
            .collect_all()
            .await?;

        tracing::info!(
            target: "ingest",
            posts = collected.posts.len(),
            pages = collected.pages,
            truncated = collected.truncated,
            "search complete"
        );
        Ok(Fetched {
            posts: collected.posts,
            complete: !collected.truncated,
        })
    }

    fn name(&self) -> &'static str {
        "twitterapi.io"
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
