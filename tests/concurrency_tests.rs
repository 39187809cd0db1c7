//! Request coalescing and the process-wide judge cap under concurrent load.

mod common;

use std::sync::Arc;

use adjudicate::AdjudicationConfig;
use common::{seed_crash_corpus, Fixture, FixtureOptions};
use matcher::ProcessOptions;
use tokio::sync::Barrier;

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn identical_concurrent_requests_run_once() {
    let dir = Fixture::new_dir();
    seed_crash_corpus(&Fixture::export_root(&dir));
    let fx = Fixture::build(dir, FixtureOptions::default());

    let start = Arc::new(Barrier::new(8));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let detector = Arc::clone(&fx.detector);
        let start = Arc::clone(&start);
        handles.push(tokio::spawn(async move {
            start.wait().await;
            detector
                .process_ticket("GM-103", &ProcessOptions::default())
                .await
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(fx.embeddings.calls(), 1);
    let fingerprint = &results[0].diagnostics.fingerprint;
    assert!(results
        .iter()
        .all(|r| &r.diagnostics.fingerprint == fingerprint));
    let shared = results.iter().filter(|r| r.diagnostics.shared).count();
    assert_eq!(shared, 7, "all but the leader should join the running request");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_tickets_proceed_independently() {
    let dir = Fixture::new_dir();
    seed_crash_corpus(&Fixture::export_root(&dir));
    let fx = Fixture::build(dir, FixtureOptions::default());

    let mut handles = Vec::new();
    for id in ["GM-101", "GM-102", "GM-103", "GM-104"] {
        let detector = Arc::clone(&fx.detector);
        handles.push(tokio::spawn(async move {
            detector
                .process_ticket(id, &ProcessOptions::default())
                .await
                .map(|result| (id, result))
        }));
    }

    for handle in handles {
        let (id, result) = handle.await.unwrap().unwrap();
        assert_eq!(result.ticket_id, id);
        assert!(!result.diagnostics.shared);
        assert!(result.candidates.iter().all(|c| c.ticket_id != id));
    }

    // GM-101 and GM-102 normalize to the same text and share one embedding.
    assert_eq!(fx.embeddings.calls(), 3);
    assert_eq!(fx.detector.stats().indexed_tickets, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn judge_calls_respect_the_global_cap() {
    let dir = Fixture::new_dir();
    seed_crash_corpus(&Fixture::export_root(&dir));
    let defaults = FixtureOptions::default();
    let fx = Fixture::build(
        dir,
        FixtureOptions {
            adjudication: AdjudicationConfig {
                global_concurrency: 2,
                ..defaults.adjudication.clone()
            },
            ..defaults
        },
    );

    let report = fx
        .detector
        .index_tickets(&ids(&["GM-101", "GM-102", "GM-103", "GM-104"]), 4)
        .await;
    assert_eq!(report.indexed.len(), 4);

    let options = ProcessOptions::default().with_concurrency(4);
    let (a, b) = tokio::join!(
        fx.detector.process_ticket("GM-102", &options),
        fx.detector.process_ticket("GM-103", &options),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(fx.judge.calls(), 6);
    assert!(fx.judge.max_in_flight() <= 2);
    assert_eq!(a.diagnostics.degraded_verdicts, 0);
    assert_eq!(b.diagnostics.degraded_verdicts, 0);
}
