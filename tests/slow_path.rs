// tests/slow_path.rs
//
// Slow-path tick against scripted classifier/notifier fakes.

mod common;

use anyhow::anyhow;
use chrono::Utc;
use serde_json::json;

use breaking_sentinel::analyze::{run_slow_path_once, Classification};
use breaking_sentinel::analyze::scheduler::Gate;
use breaking_sentinel::config::NotifyConfig;
use breaking_sentinel::model::{Alert, PriorityClass, Urgency};
use breaking_sentinel::store::Store;

use common::{results, Harness, RecordingNotifier, ScriptedClassifier, CorpusFetcher};

fn ids(range: std::ops::RangeInclusive<usize>, prefix: &str) -> Vec<String> {
    range.rev().map(|i| format!("{prefix}{i:02}")).collect()
}

#[tokio::test]
async fn two_regular_items_wait_for_more() {
    let h = Harness::new(ScriptedClassifier::quiet());
    h.seed("r", 2, PriorityClass::Group).await;

    let r = run_slow_path_once(&h.pipeline).await.unwrap();
    assert_eq!(r.gate, Gate::Waiting);
    assert_eq!(h.classifier.call_count(), 0);
    assert!(!h.processed("r00").await);
}

#[tokio::test]
async fn empty_store_is_a_no_op() {
    let h = Harness::new(ScriptedClassifier::quiet());
    let r = run_slow_path_once(&h.pipeline).await.unwrap();
    assert_eq!(r.gate, Gate::Empty);
    assert_eq!(h.classifier.call_count(), 0);
}

#[tokio::test]
async fn one_priority_item_is_enough() {
    let h = Harness::new(ScriptedClassifier::quiet());
    h.seed("p", 1, PriorityClass::Priority).await;

    let r = run_slow_path_once(&h.pipeline).await.unwrap();
    assert_eq!(r.gate, Gate::PriorityMet);
    assert_eq!(h.classifier.call_count(), 1);
    assert_eq!(r.marked, 1);
    assert!(h.processed("p00").await);

    // already processed, nothing left to do
    let again = run_slow_path_once(&h.pipeline).await.unwrap();
    assert_eq!(again.gate, Gate::Empty);
    assert_eq!(h.classifier.call_count(), 1);
}

#[tokio::test]
async fn unreadable_classifier_reply_marks_items_without_alerting() {
    let h = Harness::new(ScriptedClassifier::new(|_, _| {
        Ok(Classification::from_raw(json!({
            "choices": [{ "message": { "content": "sorry, I can't help with that" } }]
        })))
    }));
    h.seed("p", 3, PriorityClass::Priority).await;

    let r = run_slow_path_once(&h.pipeline).await.unwrap();
    assert_eq!(r.subbatches_ok, 1);
    assert_eq!(r.marked, 3);
    assert_eq!(r.alerts, 0);
    assert_eq!(h.notifier.count(), 0);
    for id in ["p00", "p01", "p02"] {
        assert!(h.processed(id).await, "{id}");
    }
    let stats = h.store.stats().await.unwrap();
    assert_eq!(stats.alerts, 0);
    assert_eq!(stats.analyses, 1);
}

#[tokio::test]
async fn batch_is_capped_and_split_newest_first() {
    let h = Harness::new(ScriptedClassifier::quiet());
    h.seed("r", 15, PriorityClass::Group).await;

    let r = run_slow_path_once(&h.pipeline).await.unwrap();
    assert_eq!(r.gate, Gate::RegularMet);
    assert_eq!(r.chosen, 10);
    assert_eq!(r.carried_over, 5);
    assert_eq!(r.marked, 10);

    let calls = h.classifier.calls.lock().clone();
    assert_eq!(calls, vec![ids(10..=14, "r"), ids(5..=9, "r")]);
    for id in ids(0..=4, "r") {
        assert!(!h.processed(&id).await, "{id} should wait for the next tick");
    }
    assert_eq!(h.store.stats().await.unwrap().unprocessed, 5);
    assert_eq!(h.store.stats().await.unwrap().analyses, 2);
}

#[tokio::test]
async fn priority_items_go_first_even_when_older() {
    let h = Harness::new(ScriptedClassifier::quiet());
    h.seed("p", 1, PriorityClass::Priority).await;
    h.clock.advance(chrono::Duration::minutes(1));
    h.seed("r", 12, PriorityClass::Group).await;

    run_slow_path_once(&h.pipeline).await.unwrap();
    let calls = h.classifier.calls.lock().clone();
    assert_eq!(calls[0][0], "p00");
    assert!(!h.processed("r00").await);
}

#[tokio::test]
async fn only_medium_and_high_are_alerted() {
    let h = Harness::new(ScriptedClassifier::new(|_, items| {
        Ok(results(items, |it| match it.id.as_str() {
            "p00" => Some("low"),
            "p01" => Some("medium"),
            "p02" => Some("high"),
            _ => None,
        }))
    }));
    h.seed("p", 3, PriorityClass::Priority).await;

    let r = run_slow_path_once(&h.pipeline).await.unwrap();
    assert_eq!(r.alerts, 2);
    assert_eq!(r.notified, 2);
    assert_eq!(h.store.stats().await.unwrap().alerts, 2);

    let sent = h.notifier.sent.lock().clone();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|(chat, _)| chat == "alerts"));
    // newest first: p02 (high) then p01 (medium)
    assert!(sent[0].1.starts_with("🔴"), "{}", sent[0].1);
    assert!(sent[0].1.contains("post p02"));
    assert!(sent[1].1.contains("post p01"));
}

#[tokio::test]
async fn failed_subbatch_leaves_its_items_for_later() {
    let h = Harness::new(ScriptedClassifier::new(|idx, items| {
        if idx == 1 {
            Err(anyhow!("classifier timed out"))
        } else {
            Ok(results(items, |_| None))
        }
    }));
    h.seed("r", 10, PriorityClass::Group).await;

    let err = run_slow_path_once(&h.pipeline).await.unwrap_err();
    assert!(format!("{err:#}").contains("classifier timed out"));

    for id in ids(5..=9, "r") {
        assert!(h.processed(&id).await, "{id} was classified");
    }
    for id in ids(0..=4, "r") {
        assert!(!h.processed(&id).await, "{id} was not classified");
    }
    assert_eq!(h.store.stats().await.unwrap().analyses, 1);
    assert_eq!(h.classifier.call_count(), 2);
}

#[tokio::test]
async fn alerts_from_completed_subbatches_survive_a_later_failure() {
    let h = Harness::new(ScriptedClassifier::new(|idx, items| {
        if idx == 1 {
            Err(anyhow!("boom"))
        } else {
            Ok(results(items, |it| (it.id == "r09").then_some("high")))
        }
    }));
    h.seed("r", 10, PriorityClass::Group).await;

    assert!(run_slow_path_once(&h.pipeline).await.is_err());
    assert_eq!(h.notifier.count(), 1);
    assert_eq!(h.store.stats().await.unwrap().alerts, 1);
}

#[tokio::test]
async fn one_failed_send_does_not_block_the_others() {
    let h = Harness::with(
        CorpusFetcher::default(),
        ScriptedClassifier::new(|_, items| Ok(results(items, |_| Some("high")))),
        RecordingNotifier::failing_on(&[0]),
    );
    h.seed("p", 3, PriorityClass::Priority).await;

    let r = run_slow_path_once(&h.pipeline).await.unwrap();
    assert_eq!(r.alerts, 3);
    assert_eq!(r.notify_failures, 1);
    assert_eq!(r.notified, 2);
    assert_eq!(r.marked, 3);
    assert_eq!(h.notifier.count(), 2);
}

#[tokio::test]
async fn no_alert_channel_means_no_sends() {
    let h = Harness::new(ScriptedClassifier::new(|_, items| {
        Ok(results(items, |_| Some("high")))
    }));
    h.seed("p", 2, PriorityClass::Priority).await;
    let p = h.pipeline.clone().with_notify(NotifyConfig::default());

    let r = run_slow_path_once(&p).await.unwrap();
    assert_eq!(r.alerts, 2);
    assert_eq!(r.notified, 0);
    assert_eq!(h.notifier.count(), 0);
    assert_eq!(h.store.stats().await.unwrap().alerts, 2);
    assert!(h.processed("p00").await);
}

#[tokio::test]
async fn already_stored_alert_is_not_sent_again() {
    let h = Harness::new(ScriptedClassifier::new(|_, items| {
        Ok(results(items, |_| Some("medium")))
    }));
    h.seed("p", 2, PriorityClass::Priority).await;
    h.store
        .insert_alerts(vec![Alert {
            id: "p00".into(),
            created_at: Utc::now(),
            urgency: Urgency::High,
            has_quote: false,
            main_text: "earlier".into(),
            quoted_text: String::new(),
            quoted_author: String::new(),
            reason: String::new(),
            username: String::new(),
            link: String::new(),
            quoted_link: String::new(),
        }])
        .await
        .unwrap();

    let r = run_slow_path_once(&h.pipeline).await.unwrap();
    assert_eq!(r.alerts, 1);
    assert_eq!(r.marked, 2);
    let sent = h.notifier.sent.lock().clone();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.contains("post p01"));
}
