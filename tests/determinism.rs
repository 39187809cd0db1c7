//! Same input, same output: across reruns and across detector instances.

mod common;

use common::{seed_crash_corpus, Fixture, FixtureOptions};
use matcher::{ProcessOptions, RankedResult};

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn summary(result: &RankedResult) -> Vec<(String, String, i32)> {
    result
        .candidates
        .iter()
        .map(|c| {
            (
                c.ticket_id.clone(),
                format!("{:?}", c.adjudication.verdict),
                (c.similarity * 1e4).round() as i32,
            )
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reruns_rank_identically() {
    let dir = Fixture::new_dir();
    seed_crash_corpus(&Fixture::export_root(&dir));
    let fx = Fixture::build(dir, FixtureOptions::default());
    fx.detector
        .index_tickets(&ids(&["GM-101", "GM-102", "GM-103", "GM-104"]), 4)
        .await;

    let first = fx
        .detector
        .process_ticket("GM-103", &ProcessOptions::default())
        .await
        .unwrap();
    for _ in 0..3 {
        let again = fx
            .detector
            .process_ticket("GM-103", &ProcessOptions::default())
            .await
            .unwrap();
        assert_eq!(summary(&again), summary(&first));
        assert_eq!(again.diagnostics.fingerprint, first.diagnostics.fingerprint);
        assert!(again.diagnostics.cache_hit);
    }
    assert_eq!(fx.embeddings.calls(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn separate_detectors_agree_on_fingerprints_and_vectors() {
    let mut fixtures = Vec::new();
    for _ in 0..2 {
        let dir = Fixture::new_dir();
        seed_crash_corpus(&Fixture::export_root(&dir));
        fixtures.push(Fixture::build(dir, FixtureOptions::default()));
    }

    for fx in &fixtures {
        let report = fx
            .detector
            .index_tickets(&ids(&["GM-104", "GM-101", "GM-103"]), 3)
            .await;
        assert_eq!(report.indexed.len(), 3);
    }

    for id in ["GM-101", "GM-103", "GM-104"] {
        let a = fixtures[0].detector.index().get(id).unwrap().unwrap();
        let b = fixtures[1].detector.index().get(id).unwrap().unwrap();
        assert_eq!(a.fingerprint, b.fingerprint, "{id}");
        assert_eq!(a.vector, b.vector, "{id}");
        assert_eq!(a.document, b.document, "{id}");
    }

    let results: Vec<RankedResult> = process_everywhere(&fixtures).await;
    assert_eq!(summary(&results[0]), summary(&results[1]));
}

async fn process_everywhere(fixtures: &[Fixture]) -> Vec<RankedResult> {
    let mut out = Vec::new();
    for fx in fixtures {
        out.push(
            fx.detector
                .process_ticket("GM-102", &ProcessOptions::default())
                .await
                .unwrap(),
        );
    }
    out
}
