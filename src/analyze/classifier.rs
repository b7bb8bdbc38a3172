// src/analyze/classifier.rs
//! Classifier seam for the slow path plus the chat-completions implementation.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::parse::{parse_classifier_response, ParsedResponse};
use crate::model::{BreakingItem, Item};

/// Parsed classifier output for one sub-batch, plus the raw body for the audit record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub results: Vec<Value>,
    pub breaking: Vec<BreakingItem>,
    pub raw: Value,
}

impl Classification {
    pub fn from_raw(raw: Value) -> Self {
        let ParsedResponse { results, breaking } = parse_classifier_response(&raw);
        Self {
            results,
            breaking,
            raw,
        }
    }
}

/// Given a sub-batch, return per-item results aligned with input order and
/// the flattened breaking candidates. Transport failures are errors;
/// unreadable bodies are not.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, items: &[Item]) -> Result<Classification>;
    fn name(&self) -> &'static str;
}

/// xAI-style chat completions client.
pub struct GrokClassifier {
    http: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
}

impl GrokClassifier {
    pub fn new(api_key: String, url: String, model: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("breaking-sentinel/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()
            .context("building classifier http client")?;
        Ok(Self {
            http,
            api_key,
            url,
            model,
        })
    }
}

#[derive(Serialize)]
struct PromptItem<'a> {
    #[serde(rename = "tweetId")]
    tweet_id: &'a str,
    #[serde(rename = "mainText")]
    main_text: &'a str,
    #[serde(rename = "quotedText")]
    quoted_text: &'a str,
    #[serde(rename = "quotedAuthor")]
    quoted_author: &'a str,
    #[serde(rename = "authorUsername")]
    author_username: &'a str,
    #[serde(rename = "tweetUrl")]
    tweet_url: &'a str,
    #[serde(rename = "quotedUrl")]
    quoted_url: &'a str,
}

const INSTRUCTIONS: &str = "\
You are a crypto-market breaking-news detector. Flag only confirmed, urgent events that can \
realistically move BTC/ETH within 0-48h (exchange outages or hacks, major listings, protocol \
exploits, crypto regulation, ETF decisions or outsized flows, stablecoin depegs, central bank \
rate decisions, key macro data, major geopolitical escalation, index regime shifts). \
Rumours, opinions, forecasts and general stock news are not breaking. When in doubt, it is not breaking.

For EACH input post, in input order, output one object:
{\"summary\": \"1-2 sentences\", \"breaking\": [] or [{\"mainText\", \"quotedText\", \"quotedAuthor\", \
\"reason\", \"urgency\": \"low|medium|high\", \"username\", \"tweet_id\", \"link\", \"quotedLink\"}]}
tweet_id MUST equal the input tweetId. Read mainText and quotedText together.
Output ONLY a strict JSON array. No markdown, no code fences, no commentary.";

/// Prompt body: instructions followed by the posts as a compact JSON array.
pub fn build_prompt(items: &[Item]) -> Result<String> {
    let posts: Vec<PromptItem<'_>> = items
        .iter()
        .map(|it| PromptItem {
            tweet_id: &it.id,
            main_text: &it.payload.text,
            quoted_text: &it.payload.quoted_text,
            quoted_author: &it.payload.quoted_author,
            author_username: &it.payload.author_username,
            tweet_url: &it.payload.url,
            quoted_url: &it.payload.quoted_url,
        })
        .collect();
    let json = serde_json::to_string(&posts).context("serializing prompt items")?;
    Ok(format!("{INSTRUCTIONS}\n\nPosts:\n{json}"))
}

#[async_trait]
impl Classifier for GrokClassifier {
    async fn classify(&self, items: &[Item]) -> Result<Classification> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
        }

        let prompt = build_prompt(items)?;
        let req = Req {
            model: &self.model,
            messages: vec![Msg {
                role: "user",
                content: &prompt,
            }],
        };

        let resp = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("classifier request")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(300).collect();
            return Err(anyhow!("classifier returned {status}: {snippet}"));
        }
        let raw: Value = resp.json().await.context("decoding classifier body")?;
        Ok(Classification::from_raw(raw))
    }

    fn name(&self) -> &'static str {
        "grok"
    }
}
