use std::time::Duration;

use adjudicate::AdjudicationVerdict;
use canonical::{CanonicalError, NormalizerConfig};
use chrono::{DateTime, Utc};
use index::{EntryMetadata, IndexError, MetadataFilter};
use ingest::TicketFetchError;
use semantic::{EmbedError, ProviderError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-request knobs for [`DuplicateDetector::process_ticket`](crate::DuplicateDetector::process_ticket).
///
/// Options are part of the coalescing key, so two callers only share a
/// computation when they ask for exactly the same thing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessOptions {
    /// Number of nearest neighbors to pull from the index.
    pub top_k: usize,
    /// Judge calls this request may have outstanding at once.
    pub adjudication_concurrency: usize,
    /// Bypass the embedding cache and overwrite the cached vector.
    pub force_reembed: bool,
    pub filter: Option<MetadataFilter>,
    /// Upper bound on how long the caller waits for the whole pipeline.
    #[serde(with = "semantic::serde_millis::option")]
    pub deadline: Option<Duration>,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            top_k: 10,
            adjudication_concurrency: 4,
            force_reembed: false,
            filter: None,
            deadline: None,
        }
    }
}

impl ProcessOptions {
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.adjudication_concurrency = concurrency;
        self
    }

    pub fn with_force_reembed(mut self, force: bool) -> Self {
        self.force_reembed = force;
        self
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn validate(&self, max_top_k: usize) -> Result<(), PipelineError> {
        if self.top_k == 0 || self.top_k > max_top_k {
            return Err(PipelineError::InvalidOptions(format!(
                "top_k must be in 1..={max_top_k}, got {}",
                self.top_k
            )));
        }
        if self.adjudication_concurrency == 0 {
            return Err(PipelineError::InvalidOptions(
                "adjudication_concurrency must be at least 1".into(),
            ));
        }
        if self.deadline.is_some_and(|d| d.is_zero()) {
            return Err(PipelineError::InvalidOptions(
                "deadline must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Static configuration of a [`DuplicateDetector`](crate::DuplicateDetector).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub normalizer: NormalizerConfig,
    /// Largest `top_k` a request may ask for.
    pub max_top_k: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            normalizer: NormalizerConfig::default(),
            max_top_k: 50,
        }
    }
}

/// One candidate in the final, ranked answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    /// 1-based position in the final order.
    pub rank: usize,
    pub ticket_id: String,
    pub similarity: f32,
    /// 1-based position the index returned before adjudication.
    pub index_rank: usize,
    pub adjudication: AdjudicationVerdict,
    /// The judge gave no usable answer; similarity is the only signal.
    pub low_confidence: bool,
    pub metadata: EntryMetadata,
}

/// An attachment whose text could not be extracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentFailure {
    pub attachment_id: String,
    pub filename: String,
    pub reason: String,
}

/// Wall-clock milliseconds spent in each stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimings {
    pub fetch_ms: u64,
    pub extract_ms: u64,
    pub normalize_ms: u64,
    pub embed_ms: u64,
    pub upsert_ms: u64,
    pub query_ms: u64,
    pub adjudicate_ms: u64,
    pub total_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub fingerprint: String,
    pub canonical_version: u32,
    pub model_id: String,
    pub cache_hit: bool,
    /// The embedding was produced by a concurrent request for the same text.
    pub embedding_coalesced: bool,
    pub embedding_attempts: u32,
    pub truncated: bool,
    pub original_bytes: usize,
    pub kept_bytes: usize,
    pub attachment_failures: Vec<AttachmentFailure>,
    pub candidate_count: usize,
    /// Candidates whose verdict is `Failed`.
    pub degraded_verdicts: usize,
    /// This caller joined a computation started by another caller.
    pub shared: bool,
    pub timings: StageTimings,
    pub processed_at: DateTime<Utc>,
}

/// Output of [`DuplicateDetector::process_ticket`](crate::DuplicateDetector::process_ticket).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub ticket_id: String,
    pub candidates: Vec<RankedCandidate>,
    pub diagnostics: Diagnostics,
}

impl RankedResult {
    /// Candidates the judge confirmed as duplicates, best first.
    pub fn confirmed(&self) -> impl Iterator<Item = &RankedCandidate> {
        self.candidates
            .iter()
            .filter(|c| c.adjudication.verdict.is_duplicate())
    }
}

/// Result of indexing a single ticket without querying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedTicket {
    pub ticket_id: String,
    pub fingerprint: String,
    pub cache_hit: bool,
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFailure {
    pub ticket_id: String,
    pub error: String,
    pub retryable: bool,
}

/// Outcome of a bulk [`index_tickets`](crate::DuplicateDetector::index_tickets) run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    pub indexed: Vec<IndexedTicket>,
    pub failed: Vec<IndexFailure>,
}

impl IndexReport {
    pub fn total(&self) -> usize {
        self.indexed.len() + self.failed.len()
    }
}

/// Snapshot of the detector's shared state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectorStats {
    pub indexed_tickets: usize,
    pub dimension: usize,
    pub model_id: String,
    pub judge: String,
    pub embedding: semantic::EmbedderStats,
}

/// Errors that abort a pipeline run.
///
/// A failed adjudication is never one of these: it shows up as a `Failed`
/// verdict inside the result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("ticket fetch failed: {0}")]
    TicketFetch(#[from] TicketFetchError),
    #[error("ticket could not be normalized: {0}")]
    Normalize(#[from] CanonicalError),
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),
    #[error("index unavailable: {0}")]
    IndexUnavailable(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid options: {0}")]
    InvalidOptions(String),
    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
}

impl PipelineError {
    /// Whether the same request could succeed later without any change.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::TicketFetch(err) => err.is_transient(),
            PipelineError::EmbeddingUnavailable(_)
            | PipelineError::IndexUnavailable(_)
            | PipelineError::DeadlineExceeded(_) => true,
            PipelineError::Normalize(_)
            | PipelineError::Configuration(_)
            | PipelineError::InvalidOptions(_) => false,
        }
    }
}

impl From<EmbedError> for PipelineError {
    fn from(err: EmbedError) -> Self {
        if err.is_configuration() {
            PipelineError::Configuration(err.to_string())
        } else {
            PipelineError::EmbeddingUnavailable(err.to_string())
        }
    }
}

impl From<IndexError> for PipelineError {
    fn from(err: IndexError) -> Self {
        if err.is_configuration() {
            PipelineError::Configuration(err.to_string())
        } else {
            PipelineError::IndexUnavailable(err.to_string())
        }
    }
}

impl From<ProviderError> for PipelineError {
    fn from(err: ProviderError) -> Self {
        PipelineError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let opts = ProcessOptions::default();
        assert_eq!(opts.top_k, 10);
        assert_eq!(opts.adjudication_concurrency, 4);
        assert!(!opts.force_reembed);
        assert!(opts.validate(50).is_ok());
    }

    #[test]
    fn rejects_out_of_range_options() {
        let too_big = ProcessOptions::default().with_top_k(51);
        assert!(matches!(
            too_big.validate(50),
            Err(PipelineError::InvalidOptions(_))
        ));
        assert!(ProcessOptions::default().with_top_k(0).validate(50).is_err());
        assert!(ProcessOptions::default()
            .with_concurrency(0)
            .validate(50)
            .is_err());
        assert!(ProcessOptions::default()
            .with_deadline(Duration::ZERO)
            .validate(50)
            .is_err());
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: ProcessOptions =
            serde_json::from_str(r#"{"top_k": 5, "deadline": 1500}"#).unwrap();
        assert_eq!(opts.top_k, 5);
        assert_eq!(opts.adjudication_concurrency, 4);
        assert_eq!(opts.deadline, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn retryability() {
        assert!(PipelineError::TicketFetch(TicketFetchError::Upstream("502".into())).is_retryable());
        assert!(!PipelineError::TicketFetch(TicketFetchError::NotFound("GM-1".into())).is_retryable());
        assert!(PipelineError::DeadlineExceeded(Duration::from_secs(1)).is_retryable());
        assert!(!PipelineError::Configuration("dim".into()).is_retryable());
    }

    #[test]
    fn dimension_errors_are_configuration() {
        let err: PipelineError = IndexError::DimensionMismatch {
            expected: 3,
            actual: 4,
        }
        .into();
        assert!(matches!(err, PipelineError::Configuration(_)));

        let err: PipelineError = IndexError::Backend("disk full".into()).into();
        assert!(matches!(err, PipelineError::IndexUnavailable(_)));

        let err: PipelineError = EmbedError::Unavailable {
            attempts: 4,
            last_error: ProviderError::RateLimited,
        }
        .into();
        assert!(matches!(err, PipelineError::EmbeddingUnavailable(_)));
    }

    #[test]
    fn revoked_embedding_key_is_not_retryable() {
        let err: PipelineError = EmbedError::Unavailable {
            attempts: 1,
            last_error: ProviderError::Http {
                status: 401,
                body: "invalid api key".into(),
            },
        }
        .into();
        assert!(matches!(err, PipelineError::Configuration(_)));
        assert!(!err.is_retryable());
    }
}
