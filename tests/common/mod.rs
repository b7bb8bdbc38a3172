// tests/common/mod.rs
//
// Fakes for the pipeline collaborators plus small builders.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};

use breaking_sentinel::analyze::{Classification, Classifier};
use breaking_sentinel::clock::{Clock, ManualClock};
use breaking_sentinel::config::{Accounts, NotifyConfig};
use breaking_sentinel::ingest::normalize::parse_source_time;
use breaking_sentinel::ingest::types::{Fetched, PostFetcher, Window};
use breaking_sentinel::model::{Item, PriorityClass};
use breaking_sentinel::notify::Notifier;
use breaking_sentinel::store::{DocumentStore, Store};
use breaking_sentinel::Pipeline;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 6, 14, 0, 0).unwrap()
}

pub fn post(id: &str, author: &str, text: &str, created: DateTime<Utc>) -> Value {
    json!({
        "tweetId": id,
        "text": text,
        "author": { "userName": author },
        "createdAt": created.to_rfc3339(),
    })
}

// ---------------------------------------------------------------- fetcher

/// Serves a fixed corpus, returning only posts created inside the window.
#[derive(Default)]
pub struct CorpusFetcher {
    pub corpus: Mutex<Vec<Value>>,
    pub windows: Mutex<Vec<Window>>,
    pub fail: Mutex<bool>,
    /// Report every fetch as cut short by the page cap.
    pub incomplete: Mutex<bool>,
}

impl CorpusFetcher {
    pub fn new(corpus: Vec<Value>) -> Self {
        Self {
            corpus: Mutex::new(corpus),
            ..Default::default()
        }
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    pub fn set_incomplete(&self, incomplete: bool) {
        *self.incomplete.lock() = incomplete;
    }
}

#[async_trait]
impl PostFetcher for CorpusFetcher {
    async fn fetch(&self, window: &Window) -> Result<Fetched> {
        self.windows.lock().push(*window);
        if *self.fail.lock() {
            return Err(anyhow!("upstream 503"));
        }
        let posts = self
            .corpus
            .lock()
            .iter()
            .filter(|p| {
                p["createdAt"]
                    .as_str()
                    .and_then(parse_source_time)
                    .map(|t| window.contains(t))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        Ok(Fetched {
            posts,
            complete: !*self.incomplete.lock(),
        })
    }

    fn name(&self) -> &'static str {
        "corpus"
    }
}

// ------------------------------------------------------------- classifier

type Script = dyn Fn(usize, &[Item]) -> Result<Classification> + Send + Sync;

/// Classifier driven by a closure of (call index, sub-batch). Records every call.
pub struct ScriptedClassifier {
    script: Box<Script>,
    pub calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedClassifier {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(usize, &[Item]) -> Result<Classification> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(f),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every call succeeds with nothing breaking.
    pub fn quiet() -> Self {
        Self::new(|_, items| Ok(results(items, |_| None)))
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, items: &[Item]) -> Result<Classification> {
        let idx = {
            let mut calls = self.calls.lock();
            calls.push(items.iter().map(|i| i.id.clone()).collect());
            calls.len() - 1
        };
        (self.script)(idx, items)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Chat-completions style body with one result per item; `urgency_of` decides
/// whether an item is breaking and at which urgency.
pub fn results<F>(items: &[Item], urgency_of: F) -> Classification
where
    F: Fn(&Item) -> Option<&'static str>,
{
    let arr: Vec<Value> = items
        .iter()
        .map(|it| {
            let breaking = match urgency_of(it) {
                Some(u) => json!([{
                    "mainText": it.payload.text,
                    "reason": "test",
                    "urgency": u,
                    "username": it.payload.author_username,
                    "tweet_id": it.id,
                    "link": format!("https://x.com/i/status/{}", it.id),
                }]),
                None => json!([]),
            };
            json!({ "summary": format!("summary of {}", it.id), "breaking": breaking })
        })
        .collect();
    let content = serde_json::to_string(&arr).unwrap();
    Classification::from_raw(json!({ "choices": [{ "message": { "content": content } }] }))
}

// --------------------------------------------------------------- notifier

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
    /// Calls (0-based) that should fail.
    pub fail_on: Mutex<Vec<usize>>,
    attempts: AtomicUsize,
}

impl RecordingNotifier {
    pub fn failing_on(calls: &[usize]) -> Self {
        Self {
            fail_on: Mutex::new(calls.to_vec()),
            ..Default::default()
        }
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, channel: &str, text: &str) -> Result<()> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_on.lock().contains(&n) {
            return Err(anyhow!("telegram 502"));
        }
        self.sent.lock().push((channel.to_string(), text.to_string()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

// ---------------------------------------------------------------- harness

pub struct Harness {
    pub store: Arc<DocumentStore>,
    pub clock: Arc<ManualClock>,
    pub fetcher: Arc<CorpusFetcher>,
    pub classifier: Arc<ScriptedClassifier>,
    pub notifier: Arc<RecordingNotifier>,
    pub pipeline: Pipeline,
}

impl Harness {
    pub fn new(classifier: ScriptedClassifier) -> Self {
        Self::with(CorpusFetcher::default(), classifier, RecordingNotifier::default())
    }

    pub fn with(
        fetcher: CorpusFetcher,
        classifier: ScriptedClassifier,
        notifier: RecordingNotifier,
    ) -> Self {
        let store = Arc::new(DocumentStore::in_memory());
        let clock = Arc::new(ManualClock::new(t0()));
        let fetcher = Arc::new(fetcher);
        let classifier = Arc::new(classifier);
        let notifier = Arc::new(notifier);
        let pipeline = Pipeline::new(
            store.clone(),
            clock.clone(),
            fetcher.clone(),
            classifier.clone(),
            notifier.clone(),
            Accounts::from_csv(Some("deitaone"), Some("watcherguru,tier10k")),
        )
        .with_notify(NotifyConfig {
            alert_chat_id: Some("alerts".into()),
            watchdog_chat_id: Some("watchdog".into()),
        });
        Self {
            store,
            clock,
            fetcher,
            classifier,
            notifier,
            pipeline,
        }
    }

    /// Insert unprocessed items directly; later items are ingested later.
    pub async fn seed(&self, prefix: &str, n: usize, class: PriorityClass) -> Vec<String> {
        let items: Vec<Item> = (0..n)
            .map(|i| {
                let mut it = Item::new(
                    format!("{prefix}{i:02}"),
                    class,
                    self.clock.now() + Duration::seconds(i as i64),
                )
                .with_text(format!("post {prefix}{i:02}"));
                it.payload.author_username = "someone".into();
                it
            })
            .collect();
        let ids = items.iter().map(|i| i.id.clone()).collect();
        self.store.insert_many(items).await.unwrap();
        ids
    }

    pub async fn processed(&self, id: &str) -> bool {
        self.store.get_item(id).await.unwrap().unwrap().processed
    }
}
