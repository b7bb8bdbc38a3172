// src/ingest/normalize.rs
//! Maps loosely-shaped search results onto the strict [`Item`].
//!
//! Field precedence (first non-empty wins, then the default):
//!
//! | Item field            | 1st              | 2nd                            | default     |
//! |-----------------------|------------------|--------------------------------|-------------|
//! | id                    | `tweetId`        | `id`                           | `""`        |
//! | text                  | `mainText`       | `text`                         | `""`        |
//! | url                   | `tweetUrl`       | `url`                          | `""`        |
//! | quoted_text           | `quotedText`     | `quoted_tweet.text`            | `""`        |
//! | quoted_author         | `quotedAuthor`   | `quoted_tweet.author.userName` | `""`        |
//! | quoted_url            | `quotedUrl`      | `quoted_tweet.url`             | `""`        |
//! | author_username       | `authorUsername` | `author.userName`              | `"unknown"` |
//! | author_name           | `authorName`     | `author.name`                  | `""`        |
//! | author_followers      | `authorFollowers`| `author.followers`             | `0`         |
//! | author_verified       | `authorVerified` | `author.isVerified`            | `false`     |
//! | author_blue_verified  | `authorBlueVerified` | `author.isBlueVerified`    | `false`     |
//!
//! Counts, reply fields, `createdAt`, `lang` and `source` are single-sourced.
//!
//! A field of the wrong JSON type reads as absent; only a post that is not a
//! JSON object at all is skipped.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::config::Accounts;
use crate::model::{Item, PostPayload};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawAuthor {
    #[serde(deserialize_with = "opt_string")]
    pub user_name: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub name: Option<String>,
    #[serde(deserialize_with = "opt_u64")]
    pub followers: Option<u64>,
    #[serde(deserialize_with = "opt_bool")]
    pub is_verified: Option<bool>,
    #[serde(deserialize_with = "opt_bool")]
    pub is_blue_verified: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawQuoted {
    #[serde(deserialize_with = "opt_string")]
    pub text: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub url: Option<String>,
    #[serde(deserialize_with = "opt_object")]
    pub author: Option<RawAuthor>,
}

/// Permissive view of one search result.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawPost {
    #[serde(deserialize_with = "opt_string")]
    pub tweet_id: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub id: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub text: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub main_text: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub quoted_text: Option<String>,
    #[serde(rename = "quoted_tweet", deserialize_with = "opt_object")]
    pub quoted_tweet: Option<RawQuoted>,
    #[serde(deserialize_with = "opt_string")]
    pub quoted_author: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub quoted_url: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub tweet_url: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub url: Option<String>,
    #[serde(deserialize_with = "opt_string_vec")]
    pub images: Option<Vec<String>>,
    #[serde(deserialize_with = "opt_u64")]
    pub image_count: Option<u64>,
    #[serde(deserialize_with = "opt_string")]
    pub author_username: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub author_name: Option<String>,
    #[serde(deserialize_with = "opt_u64")]
    pub author_followers: Option<u64>,
    #[serde(deserialize_with = "opt_bool")]
    pub author_verified: Option<bool>,
    #[serde(deserialize_with = "opt_bool")]
    pub author_blue_verified: Option<bool>,
    #[serde(deserialize_with = "opt_object")]
    pub author: Option<RawAuthor>,
    #[serde(deserialize_with = "opt_u64")]
    pub like_count: Option<u64>,
    #[serde(deserialize_with = "opt_u64")]
    pub retweet_count: Option<u64>,
    #[serde(deserialize_with = "opt_u64")]
    pub reply_count: Option<u64>,
    #[serde(deserialize_with = "opt_u64")]
    pub view_count: Option<u64>,
    #[serde(deserialize_with = "opt_u64")]
    pub quote_count: Option<u64>,
    #[serde(deserialize_with = "opt_u64")]
    pub bookmark_count: Option<u64>,
    #[serde(deserialize_with = "opt_bool")]
    pub is_reply: Option<bool>,
    #[serde(deserialize_with = "opt_string")]
    pub in_reply_to_id: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub conversation_id: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub created_at: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub lang: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub source: Option<String>,
}

/// Normalize a page of raw JSON posts. Entries that are not JSON objects of the
/// expected shape are skipped with a warning.
pub fn normalize_posts(raw: Vec<Value>, accounts: &Accounts, now: DateTime<Utc>) -> Vec<Item> {
    let mut out = Vec::with_capacity(raw.len());
    for (idx, v) in raw.into_iter().enumerate() {
        match serde_json::from_value::<RawPost>(v) {
            Ok(p) => out.push(normalize_post(p, accounts, now)),
            Err(e) => {
                tracing::warn!(target: "ingest", idx, error = %e, "skipping malformed post");
                counter!("ingest_malformed_total").increment(1);
            }
        }
    }
    out
}

pub fn normalize_post(p: RawPost, accounts: &Accounts, now: DateTime<Utc>) -> Item {
    let author = p.author.unwrap_or_default();
    let quoted = p.quoted_tweet.unwrap_or_default();
    let quoted_author = quoted.author.unwrap_or_default();

    let id = first(p.tweet_id, p.id).trim().to_string();
    let text = decode(&first(p.main_text, p.text));
    let quoted_text = decode(&first(p.quoted_text, quoted.text));
    let author_username = {
        let u = first(p.author_username, author.user_name);
        if u.is_empty() {
            "unknown".to_string()
        } else {
            u
        }
    };
    let created_at_raw = p.created_at.unwrap_or_default();
    let images = p.images.unwrap_or_default();

    let payload = PostPayload {
        text,
        url: first(p.tweet_url, p.url),
        has_quote: !quoted_text.is_empty(),
        quoted_text,
        quoted_author: first(p.quoted_author, quoted_author.user_name),
        quoted_url: first(p.quoted_url, quoted.url),
        image_count: p
            .image_count
            .filter(|n| *n > 0)
            .unwrap_or(images.len() as u64) as u32,
        images,
        author_name: first(p.author_name, author.name),
        author_followers: p
            .author_followers
            .filter(|n| *n > 0)
            .or(author.followers)
            .unwrap_or(0),
        author_verified: p.author_verified.unwrap_or(false) || author.is_verified.unwrap_or(false),
        author_blue_verified: p.author_blue_verified.unwrap_or(false)
            || author.is_blue_verified.unwrap_or(false),
        like_count: p.like_count.unwrap_or(0),
        retweet_count: p.retweet_count.unwrap_or(0),
        reply_count: p.reply_count.unwrap_or(0),
        view_count: p.view_count.unwrap_or(0),
        quote_count: p.quote_count.unwrap_or(0),
        bookmark_count: p.bookmark_count.unwrap_or(0),
        is_reply: p.is_reply.unwrap_or(false),
        in_reply_to_id: p.in_reply_to_id.unwrap_or_default(),
        conversation_id: p.conversation_id.unwrap_or_default(),
        created_at_raw: created_at_raw.clone(),
        lang: p.lang.unwrap_or_default(),
        source: p.source.unwrap_or_default(),
        author_username: author_username.clone(),
    };

    Item {
        id,
        ingested_at: now,
        source_timestamp: parse_source_time(&created_at_raw),
        priority_class: accounts.classify(&author_username),
        processed: false,
        processed_at: None,
        payload,
    }
}

/// Accepts RFC 3339 and the classic `Wed Oct 10 20:19:24 +0000 2018` form.
pub fn parse_source_time(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%a %b %d %H:%M:%S %z %Y"))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn first(a: Option<String>, b: Option<String>) -> String {
    a.filter(|s| !s.is_empty())
        .or(b.filter(|s| !s.is_empty()))
        .unwrap_or_default()
}

fn decode(s: &str) -> String {
    html_escape::decode_html_entities(s).to_string()
}

fn opt_string<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(d)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn opt_u64<'de, D>(d: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// `true`/`false`, `"true"`/`"false"`, `"1"`/`"0"` or `1`/`0`.
fn opt_bool<'de, D>(d: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(d)? {
        Value::Bool(b) => Some(b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        Value::Number(n) => match n.as_u64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        _ => None,
    })
}

/// Array entries that are strings (or numbers) are kept; anything else is dropped.
fn opt_string_vec<'de, D>(d: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(d)? {
        Value::Array(xs) => Some(
            xs.into_iter()
                .filter_map(|x| match x {
                    Value::String(s) => Some(s),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
        ),
        _ => None,
    })
}

fn opt_object<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    Ok(match Value::deserialize(d)? {
        v @ Value::Object(_) => serde_json::from_value(v).ok(),
        _ => None,
    })
}
