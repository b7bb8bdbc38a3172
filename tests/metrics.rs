// tests/metrics.rs
//
// Installs the global recorder, so it is kept behind a feature and serialized.
#![cfg(feature = "strict-metrics")]

mod common;

use axum::body::{to_bytes, Body};
use http::{Request, StatusCode};
use serial_test::serial;
use tower::ServiceExt;

use breaking_sentinel::api::{router, AppState};
use breaking_sentinel::ingest::run_pull_once;
use breaking_sentinel::metrics::Metrics;

use common::{post, t0, CorpusFetcher, Harness, RecordingNotifier, ScriptedClassifier};

#[tokio::test]
#[serial]
async fn pull_counters_show_up_on_metrics_endpoint() {
    let metrics = Metrics::init().unwrap();
    // second init reuses the installed recorder
    Metrics::init().unwrap();

    let h = Harness::with(
        CorpusFetcher::new(vec![post("m1", "deitaone", "x", t0() - chrono::Duration::minutes(1))]),
        ScriptedClassifier::quiet(),
        RecordingNotifier::default(),
    );
    run_pull_once(&h.pipeline).await.unwrap();

    let app = router(AppState::new(h.store.clone()).with_metrics(metrics));
    let resp = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = to_bytes(resp.into_body(), 1 << 20).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("ingest_fetched_total"), "{text}");
    assert!(text.contains("ingest_inserted_total"), "{text}");
}
