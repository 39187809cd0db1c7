//! Shared fixtures for the workspace integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use adjudicate::{AdjudicationConfig, Adjudicator, JudgeProvider, JudgeRequest, OverlapJudgeProvider};
use async_trait::async_trait;
use canonical::NormalizerConfig;
use index::{BackendConfig, IndexConfig, VectorIndex};
use ingest::{JsonDirTicketSource, SidecarTextExtractor};
use matcher::{DetectorConfig, DuplicateDetector};
use semantic::{
    Embedder, EmbeddingProvider, EmbeddingStore, ProviderError, RedbEmbeddingStore, RetryPolicy,
    StubEmbeddingProvider,
};
use serde_json::json;
use tempfile::TempDir;

pub const DIM: usize = 128;

/// Write `<root>/<id>/ticket_data.json` in the tracker export layout.
pub fn write_ticket(root: &Path, id: &str, summary: &str, description: &str, status: &str) {
    write_ticket_json(
        root,
        id,
        json!({
            "metadata": {
                "key": id,
                "summary": summary,
                "description": description,
                "status": status,
                "priority": "P2",
                "created": "2024-03-01T09:00:00.000+0000"
            },
            "comments": [],
            "attachments": []
        }),
    );
}

pub fn write_ticket_json(root: &Path, id: &str, export: serde_json::Value) {
    let dir = root.join(id);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("ticket_data.json"), export.to_string()).unwrap();
}

/// Stub embeddings behind a call counter; can be switched off.
pub struct CountingEmbeddings {
    inner: StubEmbeddingProvider,
    calls: AtomicUsize,
    failing: bool,
}

impl CountingEmbeddings {
    pub fn new() -> Self {
        Self {
            inner: StubEmbeddingProvider::new(DIM),
            calls: AtomicUsize::new(0),
            failing: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for CountingEmbeddings {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn dimension(&self) -> usize {
        DIM
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(25)).await;
        if self.failing {
            return Err(ProviderError::Http {
                status: 503,
                body: "service unavailable".into(),
            });
        }
        self.inner.embed(text).await
    }
}

/// Word-overlap judge with scripted delays and raw answers per candidate.
/// Tracks how many calls are in flight at once.
#[derive(Default)]
pub struct ScriptedJudge {
    delays: HashMap<String, Duration>,
    answers: HashMap<String, String>,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ScriptedJudge {
    pub fn delay(mut self, ticket_id: &str, delay: Duration) -> Self {
        self.delays.insert(ticket_id.into(), delay);
        self
    }

    pub fn answer(mut self, ticket_id: &str, raw: &str) -> Self {
        self.answers.insert(ticket_id.into(), raw.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JudgeProvider for ScriptedJudge {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn judge(&self, request: &JudgeRequest) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self
            .delays
            .get(&request.candidate_ticket_id)
            .copied()
            .unwrap_or(Duration::from_millis(20));
        tokio::time::sleep(delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.answers.get(&request.candidate_ticket_id) {
            Some(raw) => Ok(raw.clone()),
            None => OverlapJudgeProvider::default().judge(request).await,
        }
    }
}

/// Options for [`Fixture::build`].
pub struct FixtureOptions {
    pub embeddings: CountingEmbeddings,
    pub judge: ScriptedJudge,
    pub normalizer: NormalizerConfig,
    pub adjudication: AdjudicationConfig,
}

impl Default for FixtureOptions {
    fn default() -> Self {
        Self {
            embeddings: CountingEmbeddings::new(),
            judge: ScriptedJudge::default(),
            normalizer: NormalizerConfig::default(),
            adjudication: AdjudicationConfig {
                call_timeout: Duration::from_millis(250),
                retry: RetryPolicy::none(),
                ..AdjudicationConfig::default()
            },
        }
    }
}

/// A detector over a temporary tracker export with redb-backed stores.
pub struct Fixture {
    pub dir: TempDir,
    pub detector: Arc<DuplicateDetector>,
    pub embeddings: Arc<CountingEmbeddings>,
    pub judge: Arc<ScriptedJudge>,
}

impl Fixture {
    pub fn export_root(dir: &TempDir) -> PathBuf {
        dir.path().join("export")
    }

    pub fn new_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(Self::export_root(&dir)).unwrap();
        dir
    }

    pub fn build(dir: TempDir, opts: FixtureOptions) -> Fixture {
        let embeddings = Arc::new(opts.embeddings);
        let judge = Arc::new(opts.judge);

        let store: Arc<dyn EmbeddingStore> =
            Arc::new(RedbEmbeddingStore::open(dir.path().join("embeddings.redb")).unwrap());
        let embedder = Embedder::new(
            embeddings.clone(),
            store,
            RetryPolicy::default()
                .with_max_attempts(3)
                .with_base_delay(Duration::from_millis(1))
                .with_jitter(false),
        );

        let index_path = dir.path().join("index.redb");
        let index = VectorIndex::open(
            IndexConfig::new(DIM).with_backend(BackendConfig::redb(index_path.to_string_lossy())),
        )
        .unwrap();

        let detector = DuplicateDetector::new(
            Arc::new(JsonDirTicketSource::new(Self::export_root(&dir))),
            Arc::new(SidecarTextExtractor::new()),
            Arc::new(embedder),
            Arc::new(index),
            Arc::new(Adjudicator::new(judge.clone(), opts.adjudication)),
            DetectorConfig {
                normalizer: opts.normalizer,
                max_top_k: 50,
            },
        )
        .unwrap();

        Fixture {
            dir,
            detector: Arc::new(detector),
            embeddings,
            judge,
        }
    }

    pub fn root(&self) -> PathBuf {
        Self::export_root(&self.dir)
    }

    /// Drop the detector (closing both databases) and hand back the directory.
    pub fn into_dir(self) -> TempDir {
        let Fixture { dir, detector, .. } = self;
        drop(detector);
        dir
    }
}

/// Three tickets reporting the same save crash plus one unrelated ticket.
pub fn seed_crash_corpus(root: &Path) {
    write_ticket(
        root,
        "GM-101",
        "Editor crashes when saving large project",
        "Saving a project over 2GB crashes the editor every time.",
        "Closed",
    );
    write_ticket(
        root,
        "GM-102",
        "Editor crashes when saving large project",
        "Saving a project over 2GB crashes the editor every time.",
        "Open",
    );
    write_ticket(
        root,
        "GM-103",
        "Editor slow when opening large project",
        "Opening a big project takes minutes before the viewport shows.",
        "Open",
    );
    write_ticket(
        root,
        "GM-104",
        "Audio drops out on bluetooth headsets",
        "Playback stutters after pairing a headset.",
        "Open",
    );
}
