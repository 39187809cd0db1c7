//! # Duplicate detector (`matcher`)
//!
//! ## Purpose
//!
//! `matcher` sits on top of the other workspace crates and runs one ticket
//! through the whole duplicate-detection pipeline:
//!
//! ```text
//! fetch ─▶ attachment text ─▶ consolidate ─▶ embed (cached) ─▶ upsert
//!                                                               │
//!            ranked result ◀── rank ◀── adjudicate ◀── top-K ◀──┘
//! ```
//!
//! Every processed ticket is written to the index before it is queried, so
//! the corpus grows as tickets are checked. The ticket itself is always
//! excluded from its own candidates.
//!
//! ## Core Types
//!
//! - [`DuplicateDetector`]: owns the shared collaborators and runs requests.
//! - [`ProcessOptions`]: per-request `top_k`, judge fan-out, forced
//!   re-embedding, metadata filter and deadline.
//! - [`RankedResult`]: candidates ordered confirmed, then undecided
//!   (`low_confidence`), then refuted, plus [`Diagnostics`].
//! - [`PipelineError`]: the reasons a request can fail as a whole.
//!
//! ## Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use adjudicate::{AdjudicationConfig, Adjudicator, OverlapJudgeProvider};
//! use index::{IndexConfig, VectorIndex};
//! use ingest::{JsonDirTicketSource, NoopExtractor};
//! use matcher::{DetectorConfig, DuplicateDetector, ProcessOptions};
//! use semantic::{Embedder, InMemoryEmbeddingStore, RetryPolicy, StubEmbeddingProvider};
//!
//! # async fn run() -> Result<(), matcher::PipelineError> {
//! let embedder = Embedder::new(
//!     Arc::new(StubEmbeddingProvider::new(256)),
//!     Arc::new(InMemoryEmbeddingStore::new()),
//!     RetryPolicy::default(),
//! );
//! let index = VectorIndex::open(IndexConfig::new(256))?;
//! let adjudicator = Adjudicator::new(
//!     Arc::new(OverlapJudgeProvider::default()),
//!     AdjudicationConfig::default(),
//! );
//!
//! let detector = DuplicateDetector::new(
//!     Arc::new(JsonDirTicketSource::new("./export")),
//!     Arc::new(NoopExtractor),
//!     Arc::new(embedder),
//!     Arc::new(index),
//!     Arc::new(adjudicator),
//!     DetectorConfig::default(),
//! )?;
//!
//! let result = detector.process_ticket("GM-1042", &ProcessOptions::default()).await?;
//! for candidate in result.confirmed() {
//!     println!("{} similarity={:.3}", candidate.ticket_id, candidate.similarity);
//! }
//! # Ok(())
//! # }
//! ```

mod engine;
mod rank;
mod types;

pub use engine::DuplicateDetector;
pub use rank::rank_candidates;
pub use types::{
    AttachmentFailure, DetectorConfig, DetectorStats, Diagnostics, IndexFailure, IndexReport,
    IndexedTicket, PipelineError, ProcessOptions, RankedCandidate, RankedResult, StageTimings,
};
