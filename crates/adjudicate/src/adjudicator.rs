use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use semantic::{retry_async, ProviderError, RetryPolicy};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::api::{ApiJudgeConfig, ApiJudgeProvider};
use crate::prompt::{CandidateDocument, JudgeRequest, QueryDocument};
use crate::provider::{JudgeProvider, OverlapJudgeProvider};
use crate::verdict::{parse_verdict, AdjudicationVerdict};

/// Which judge to call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JudgeConfig {
    Overlap { threshold: f32 },
    Api(ApiJudgeConfig),
}

impl Default for JudgeConfig {
    fn default() -> Self {
        JudgeConfig::Overlap { threshold: 0.6 }
    }
}

impl JudgeConfig {
    pub fn build(&self) -> Result<Arc<dyn JudgeProvider>, ProviderError> {
        Ok(match self {
            JudgeConfig::Overlap { threshold } => Arc::new(OverlapJudgeProvider::new(*threshold)),
            JudgeConfig::Api(api) => Arc::new(ApiJudgeProvider::new(api.clone())?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdjudicationConfig {
    pub judge: JudgeConfig,
    /// Candidates judged per query; the rest are reported as skipped.
    pub max_candidates: usize,
    /// Simultaneous judge calls across every query in the process.
    pub global_concurrency: usize,
    /// Bound on a single judge attempt.
    #[serde(with = "semantic::serde_millis")]
    pub call_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for AdjudicationConfig {
    fn default() -> Self {
        Self {
            judge: JudgeConfig::default(),
            max_candidates: 10,
            global_concurrency: 8,
            call_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default().with_max_attempts(2),
        }
    }
}

impl AdjudicationConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.global_concurrency == 0 {
            return Err("adjudication.global_concurrency must be >= 1".into());
        }
        if self.call_timeout.is_zero() {
            return Err("adjudication.call_timeout must be > 0".into());
        }
        if self.retry.max_attempts == 0 {
            return Err("adjudication.retry.max_attempts must be >= 1".into());
        }
        Ok(())
    }
}

pub const SKIPPED_REASON: &str = "not adjudicated: per-query candidate limit reached";
pub const MISSING_DOCUMENT_REASON: &str = "candidate document unavailable";

/// Judges candidates against a query ticket.
///
/// Never returns an error: every failure becomes a
/// [`Verdict::Failed`](crate::Verdict::Failed) on that candidate.
pub struct Adjudicator {
    provider: Arc<dyn JudgeProvider>,
    permits: Arc<Semaphore>,
    cfg: AdjudicationConfig,
}

impl Adjudicator {
    pub fn new(provider: Arc<dyn JudgeProvider>, cfg: AdjudicationConfig) -> Self {
        let permits = Arc::new(Semaphore::new(cfg.global_concurrency.max(1)));
        Self {
            provider,
            permits,
            cfg,
        }
    }

    pub fn config(&self) -> &AdjudicationConfig {
        &self.cfg
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Judge one candidate.
    pub async fn adjudicate(
        &self,
        query: &QueryDocument,
        candidate: &CandidateDocument,
    ) -> AdjudicationVerdict {
        let Some(candidate_text) = candidate.text.as_deref() else {
            warn!(candidate = %candidate.ticket_id, "candidate has no stored document, skipping judge");
            return AdjudicationVerdict::failed(&candidate.ticket_id, MISSING_DOCUMENT_REASON);
        };

        let request = JudgeRequest::new(query, candidate, candidate_text);
        let started = Instant::now();
        let timeout = self.cfg.call_timeout;

        let outcome = retry_async(&self.cfg.retry, "adjudication", |_| {
            let request = &request;
            async move {
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|_| ProviderError::Transport("adjudicator is shut down".into()))?;

                let raw = tokio::time::timeout(timeout, self.provider.judge(request))
                    .await
                    .map_err(|_| ProviderError::Timeout(timeout))??;

                parse_verdict(&raw).map_err(ProviderError::Malformed)
            }
        })
        .await;

        let latency_ms = started.elapsed().as_millis() as u64;
        let mut verdict = match outcome.result {
            Ok(judgement) => AdjudicationVerdict::from_judgement(&candidate.ticket_id, judgement),
            Err(err) => {
                warn!(
                    query = %query.ticket_id,
                    candidate = %candidate.ticket_id,
                    attempts = outcome.attempts,
                    error = %err,
                    "adjudication failed"
                );
                AdjudicationVerdict::failed(&candidate.ticket_id, err.to_string())
            }
        };
        verdict.latency_ms = latency_ms;
        verdict.attempts = outcome.attempts;

        debug!(
            query = %query.ticket_id,
            candidate = %candidate.ticket_id,
            verdict = ?verdict.verdict,
            latency_ms,
            "candidate adjudicated"
        );
        verdict
    }

    /// Judge up to `max_candidates` candidates with at most `fan_out` calls
    /// in flight for this query. The result has one verdict per input
    /// candidate, in input order.
    pub async fn adjudicate_all(
        &self,
        query: &QueryDocument,
        candidates: &[CandidateDocument],
        fan_out: usize,
    ) -> Vec<AdjudicationVerdict> {
        let limit = self.cfg.max_candidates.min(candidates.len());
        let (judged, skipped) = candidates.split_at(limit);

        let pending: Vec<_> = judged
            .iter()
            .map(|candidate| self.adjudicate(query, candidate))
            .collect();
        let mut verdicts: Vec<AdjudicationVerdict> = stream::iter(pending)
            .buffered(fan_out.max(1))
            .collect()
            .await;

        verdicts.extend(
            skipped
                .iter()
                .map(|c| AdjudicationVerdict::failed(&c.ticket_id, SKIPPED_REASON)),
        );
        verdicts
    }
}
