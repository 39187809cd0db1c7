//! Pairwise duplicate adjudication
//!
//! Vector similarity finds tickets that *look* alike. This crate asks a
//! judge model whether a candidate really reports the same problem as the
//! query ticket, and turns its answer into a strict [`Verdict`]:
//!
//! - [`Verdict::Confirmed`]: same underlying problem
//! - [`Verdict::Refuted`]: different problem
//! - [`Verdict::Failed`]: no usable answer (timeout, provider error,
//!   unparseable output). Never silently treated as a yes or a no.
//!
//! The [`Adjudicator`] owns a process-wide semaphore so the number of
//! outstanding judge calls stays bounded no matter how many queries run at
//! once. Each query additionally limits its own fan-out.
//!
//! ```no_run
//! use adjudicate::{AdjudicationConfig, Adjudicator, CandidateDocument, OverlapJudgeProvider, QueryDocument};
//! use std::sync::Arc;
//!
//! # async fn run() {
//! let adjudicator = Adjudicator::new(Arc::new(OverlapJudgeProvider::default()), AdjudicationConfig::default());
//! let query = QueryDocument::new("GM-2", "Title: Crash on save");
//! let candidates = vec![CandidateDocument::new("GM-1", "Title: Crash on save", 0.98)];
//! let verdicts = adjudicator.adjudicate_all(&query, &candidates, 4).await;
//! assert_eq!(verdicts.len(), 1);
//! # }
//! ```

mod adjudicator;
mod api;
mod prompt;
mod provider;
mod verdict;

pub use adjudicator::{
    AdjudicationConfig, Adjudicator, JudgeConfig, MISSING_DOCUMENT_REASON, SKIPPED_REASON,
};
pub use api::{ApiJudgeConfig, ApiJudgeProvider, JudgeApiKind};
pub use prompt::{CandidateDocument, JudgeRequest, QueryDocument, SYSTEM_INSTRUCTION};
pub use provider::{JudgeProvider, OverlapJudgeProvider};
pub use verdict::{parse_verdict, AdjudicationVerdict, Judgement, Verdict};
