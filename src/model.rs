// src/model.rs
//! Canonical documents shared by the fast path, the slow path and the watchdog.
//! These types stay strict; loosely-shaped inputs are mapped onto them in
//! `ingest::normalize` and `analyze::parse`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Author bucket assigned at normalization time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PriorityClass {
    Priority,
    Group,
    #[default]
    Other,
}

impl PriorityClass {
    pub fn is_priority(self) -> bool {
        matches!(self, PriorityClass::Priority)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PriorityClass::Priority => "priority",
            PriorityClass::Group => "group",
            PriorityClass::Other => "other",
        }
    }
}

/// Domain payload of a post. Opaque to the scheduling core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostPayload {
    pub text: String,
    pub url: String,
    pub quoted_text: String,
    pub quoted_author: String,
    pub quoted_url: String,
    pub has_quote: bool,
    pub images: Vec<String>,
    pub image_count: u32,
    pub author_username: String,
    pub author_name: String,
    pub author_followers: u64,
    pub author_verified: bool,
    pub author_blue_verified: bool,
    pub like_count: u64,
    pub retweet_count: u64,
    pub reply_count: u64,
    pub view_count: u64,
    pub quote_count: u64,
    pub bookmark_count: u64,
    pub is_reply: bool,
    pub in_reply_to_id: String,
    pub conversation_id: String,
    /// Creation time exactly as the source reported it.
    pub created_at_raw: String,
    pub lang: String,
    pub source: String,
}

/// A stored post. `id` is the external post id and is globally unique in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub ingested_at: DateTime<Utc>,
    pub source_timestamp: Option<DateTime<Utc>>,
    pub priority_class: PriorityClass,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub payload: PostPayload,
}

impl Item {
    /// Fresh, unprocessed item with an empty payload.
    pub fn new(
        id: impl Into<String>,
        priority_class: PriorityClass,
        ingested_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            ingested_at,
            source_timestamp: None,
            priority_class,
            processed: false,
            processed_at: None,
            payload: PostPayload::default(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.payload.text = text.into();
        self
    }
}

/// Poll cursor. Singleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_checked: DateTime<Utc>,
    pub last_saved_count: usize,
}

/// Singleton state of the silence watchdog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchdogState {
    pub last_alert_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    /// Case-insensitive; anything unrecognized is `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Urgency::Low),
            "medium" => Some(Urgency::Medium),
            "high" => Some(Urgency::High),
            _ => None,
        }
    }

    /// Medium and high become alerts; low is informational only.
    pub fn is_alertable(self) -> bool {
        self >= Urgency::Medium
    }

    pub fn icon(self) -> &'static str {
        match self {
            Urgency::High => "🔴",
            Urgency::Medium => "🟡",
            Urgency::Low => "🟢",
        }
    }
}

/// Candidate event as emitted by the classifier. Field names follow the
/// classifier's output contract; every field is optional and coerced to a string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakingItem {
    #[serde(rename = "mainText", alias = "main_text", deserialize_with = "lenient_string")]
    pub main_text: String,
    #[serde(rename = "quotedText", alias = "quoted_text", deserialize_with = "lenient_string")]
    pub quoted_text: String,
    #[serde(rename = "quotedAuthor", alias = "quoted_author", deserialize_with = "lenient_string")]
    pub quoted_author: String,
    #[serde(deserialize_with = "lenient_string")]
    pub reason: String,
    #[serde(deserialize_with = "lenient_string")]
    pub urgency: String,
    #[serde(deserialize_with = "lenient_string")]
    pub username: String,
    #[serde(
        rename = "tweet_id",
        alias = "tweetId",
        alias = "id",
        deserialize_with = "lenient_string"
    )]
    pub tweet_id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub link: String,
    #[serde(rename = "quotedLink", alias = "quoted_link", deserialize_with = "lenient_string")]
    pub quoted_link: String,
}

/// Notified breaking event. `id` is the source item id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub urgency: Urgency,
    pub has_quote: bool,
    pub main_text: String,
    pub quoted_text: String,
    pub quoted_author: String,
    pub reason: String,
    pub username: String,
    pub link: String,
    pub quoted_link: String,
}

/// Append-only audit record, one per sub-batch sent to the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisBatch {
    pub created_at: DateTime<Utc>,
    pub item_ids: Vec<String>,
    pub results: Vec<Value>,
    pub breaking: Vec<BreakingItem>,
    pub raw: Value,
}

/// Accepts strings, numbers, booleans and null; anything else becomes "".
fn lenient_string<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(d)?;
    Ok(match v {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}
