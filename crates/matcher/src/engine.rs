use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use adjudicate::{Adjudicator, CandidateDocument, QueryDocument};
use canonical::{consolidate, ConsolidatedDocument};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use index::{EntryMetadata, IndexEntry, QueryRequest, SimilarityCandidate, VectorIndex};
use ingest::{AttachmentExtractor, Ticket, TicketSource};
use semantic::{EmbedOutcome, Embedder, SingleFlight};
use tracing::{debug, error, info, warn};

use crate::rank::rank_candidates;
use crate::types::{
    AttachmentFailure, DetectorConfig, DetectorStats, Diagnostics, IndexFailure, IndexReport,
    IndexedTicket, PipelineError, ProcessOptions, RankedResult, StageTimings,
};

/// Everything that shapes a run's result. The deadline only bounds how long
/// one caller waits, so it is left out.
type FlightKey = (String, ProcessOptions);

fn flight_key(ticket_id: &str, options: &ProcessOptions) -> FlightKey {
    let shape = ProcessOptions {
        deadline: None,
        ..options.clone()
    };
    (ticket_id.to_string(), shape)
}

/// Ticket material that has been fetched, normalized, embedded and stored.
struct Prepared {
    ticket: Ticket,
    document: ConsolidatedDocument,
    embedding: EmbedOutcome,
    attachment_failures: Vec<AttachmentFailure>,
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn entry_metadata(ticket: &Ticket) -> EntryMetadata {
    EntryMetadata {
        title: Some(ticket.title.clone()).filter(|t| !t.is_empty()),
        status: ticket.fields.status.clone(),
        priority: ticket.fields.priority.clone(),
        resolution: ticket.fields.resolution.clone(),
        created_at: ticket.fields.created_at,
        resolved_at: ticket.fields.resolved_at,
    }
}

/// Finds likely duplicates of a ticket among everything indexed so far.
///
/// All collaborators are shared through `Arc`; a single detector serves any
/// number of concurrent requests.
pub struct DuplicateDetector {
    source: Arc<dyn TicketSource>,
    extractor: Arc<dyn AttachmentExtractor>,
    embedder: Arc<Embedder>,
    index: Arc<VectorIndex>,
    adjudicator: Arc<Adjudicator>,
    cfg: DetectorConfig,
    flights: SingleFlight<FlightKey, Result<RankedResult, PipelineError>>,
}

impl DuplicateDetector {
    /// Wire a detector. Fails when the embedding model and the index
    /// disagree on vector dimension.
    pub fn new(
        source: Arc<dyn TicketSource>,
        extractor: Arc<dyn AttachmentExtractor>,
        embedder: Arc<Embedder>,
        index: Arc<VectorIndex>,
        adjudicator: Arc<Adjudicator>,
        cfg: DetectorConfig,
    ) -> Result<Self, PipelineError> {
        if embedder.dimension() != index.dimension() {
            return Err(PipelineError::Configuration(format!(
                "embedding model `{}` produces {} dimensions but the index stores {}",
                embedder.model_id(),
                embedder.dimension(),
                index.dimension()
            )));
        }
        if cfg.max_top_k == 0 {
            return Err(PipelineError::Configuration(
                "max_top_k must be at least 1".into(),
            ));
        }
        cfg.normalizer
            .validate()
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;

        Ok(Self {
            source,
            extractor,
            embedder,
            index,
            adjudicator,
            cfg,
            flights: SingleFlight::new(),
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.cfg
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    pub fn embedder(&self) -> &Arc<Embedder> {
        &self.embedder
    }

    pub fn stats(&self) -> DetectorStats {
        DetectorStats {
            indexed_tickets: self.index.len(),
            dimension: self.index.dimension(),
            model_id: self.embedder.model_id().to_string(),
            judge: self.adjudicator.provider_name().to_string(),
            embedding: self.embedder.stats(),
        }
    }

    /// Run the full pipeline for `ticket_id` and return its ranked
    /// duplicate candidates.
    ///
    /// Concurrent calls with the same id and options share one run, whatever
    /// their deadlines. A deadline bounds only this caller's wait; when it
    /// expires and nobody else is waiting, the outstanding work is dropped.
    /// Otherwise another waiter carries the run on.
    pub async fn process_ticket(
        &self,
        ticket_id: &str,
        options: &ProcessOptions,
    ) -> Result<RankedResult, PipelineError> {
        options.validate(self.cfg.max_top_k)?;

        let key = flight_key(ticket_id, options);
        let flight = self
            .flights
            .run(key, || self.run_pipeline(ticket_id, options));

        let (result, shared) = match options.deadline {
            Some(deadline) => match tokio::time::timeout(deadline, flight).await {
                Ok(out) => out,
                Err(_) => {
                    warn!(
                        ticket_id,
                        deadline_ms = deadline.as_millis() as u64,
                        "deadline exceeded, abandoning outstanding calls"
                    );
                    return Err(PipelineError::DeadlineExceeded(deadline));
                }
            },
            None => flight.await,
        };

        match result {
            Ok(mut ranked) => {
                ranked.diagnostics.shared = shared;
                Ok(ranked)
            }
            Err(err) => {
                error!(ticket_id, error = %err, shared, "duplicate detection failed");
                Err(err)
            }
        }
    }

    /// Fetch, normalize, embed and store one ticket without querying.
    pub async fn index_ticket(
        &self,
        ticket_id: &str,
        force_reembed: bool,
    ) -> Result<IndexedTicket, PipelineError> {
        let mut timings = StageTimings::default();
        let prepared = self.prepare(ticket_id, force_reembed, &mut timings).await?;
        Ok(IndexedTicket {
            ticket_id: prepared.ticket.id,
            fingerprint: prepared.document.fingerprint,
            cache_hit: prepared.embedding.cache_hit,
            truncated: prepared.document.truncated,
        })
    }

    /// Index many tickets with at most `concurrency` in flight. One failing
    /// ticket does not stop the others. The report is sorted by ticket id.
    pub async fn index_tickets(&self, ticket_ids: &[String], concurrency: usize) -> IndexReport {
        let outcomes: Vec<(String, Result<IndexedTicket, PipelineError>)> =
            stream::iter(ticket_ids)
                .map(|id| async move { (id.clone(), self.index_ticket(id, false).await) })
                .buffer_unordered(concurrency.max(1))
                .collect()
                .await;

        let mut report = IndexReport::default();
        for (ticket_id, outcome) in outcomes {
            match outcome {
                Ok(indexed) => report.indexed.push(indexed),
                Err(err) => {
                    warn!(ticket_id = %ticket_id, error = %err, "ticket not indexed");
                    report.failed.push(IndexFailure {
                        ticket_id,
                        retryable: err.is_retryable(),
                        error: err.to_string(),
                    });
                }
            }
        }
        report.indexed.sort_by(|a, b| a.ticket_id.cmp(&b.ticket_id));
        report.failed.sort_by(|a, b| a.ticket_id.cmp(&b.ticket_id));

        if let Err(err) = self.index.flush() {
            warn!(error = %err, "index flush after bulk load failed");
        }
        info!(
            indexed = report.indexed.len(),
            failed = report.failed.len(),
            "bulk indexing finished"
        );
        report
    }

    async fn run_pipeline(
        &self,
        ticket_id: &str,
        options: &ProcessOptions,
    ) -> Result<RankedResult, PipelineError> {
        let started = Instant::now();
        let mut timings = StageTimings::default();
        let Prepared {
            ticket,
            document,
            embedding,
            attachment_failures,
        } = self
            .prepare(ticket_id, options.force_reembed, &mut timings)
            .await?;

        let stage = Instant::now();
        let hits = self
            .query_neighbours(&ticket.id, &embedding.record.vector, options)
            .await?;
        timings.query_ms = elapsed_ms(stage);
        debug!(ticket_id = %ticket.id, hits = hits.len(), "index queried");

        let stage = Instant::now();
        let texts = self.load_documents(&hits).await?;
        let candidates: Vec<CandidateDocument> = hits
            .iter()
            .zip(texts)
            .map(|(hit, text)| CandidateDocument {
                ticket_id: hit.ticket_id.clone(),
                text,
                similarity: hit.score,
                status: hit.metadata.status.clone(),
                resolution: hit.metadata.resolution.clone(),
            })
            .collect();
        let query = QueryDocument::new(&ticket.id, &document.text);
        let verdicts = self
            .adjudicator
            .adjudicate_all(&query, &candidates, options.adjudication_concurrency)
            .await;
        timings.adjudicate_ms = elapsed_ms(stage);

        let ranked = rank_candidates(hits, verdicts);
        let degraded_verdicts = ranked.iter().filter(|c| c.low_confidence).count();
        timings.total_ms = elapsed_ms(started);

        info!(
            ticket_id = %ticket.id,
            fingerprint = %document.fingerprint,
            candidates = ranked.len(),
            confirmed = ranked.iter().filter(|c| c.adjudication.is_duplicate).count(),
            degraded = degraded_verdicts,
            total_ms = timings.total_ms,
            "duplicate detection complete"
        );

        Ok(RankedResult {
            ticket_id: ticket.id,
            diagnostics: Diagnostics {
                kept_bytes: document.byte_len(),
                fingerprint: document.fingerprint,
                canonical_version: document.canonical_version,
                model_id: embedding.record.model_id,
                cache_hit: embedding.cache_hit,
                embedding_coalesced: embedding.coalesced,
                embedding_attempts: embedding.attempts,
                truncated: document.truncated,
                original_bytes: document.original_bytes,
                attachment_failures,
                candidate_count: ranked.len(),
                degraded_verdicts,
                shared: false,
                timings,
                processed_at: Utc::now(),
            },
            candidates: ranked,
        })
    }

    /// Stages shared by querying and indexing. The index entry is written
    /// only after a validated embedding exists.
    async fn prepare(
        &self,
        ticket_id: &str,
        force_reembed: bool,
        timings: &mut StageTimings,
    ) -> Result<Prepared, PipelineError> {
        let stage = Instant::now();
        let ticket = self.source.fetch_ticket(ticket_id).await?;
        timings.fetch_ms = elapsed_ms(stage);

        let stage = Instant::now();
        let (attachment_text, attachment_failures) = self.extract_attachments(&ticket).await;
        timings.extract_ms = elapsed_ms(stage);

        let stage = Instant::now();
        let document = consolidate(&ticket, &attachment_text, &self.cfg.normalizer)?;
        timings.normalize_ms = elapsed_ms(stage);

        let stage = Instant::now();
        let embedding = self
            .embedder
            .embed(&document.fingerprint, &document.text, force_reembed)
            .await?;
        timings.embed_ms = elapsed_ms(stage);
        debug!(
            ticket_id = %ticket.id,
            fingerprint = %document.fingerprint,
            cache_hit = embedding.cache_hit,
            attempts = embedding.attempts,
            "embedding ready"
        );

        let stage = Instant::now();
        let entry = IndexEntry::new(
            ticket.id.clone(),
            document.fingerprint.clone(),
            embedding.record.vector.clone(),
            entry_metadata(&ticket),
        )
        .with_document(document.text.clone());
        let index = Arc::clone(&self.index);
        tokio::task::spawn_blocking(move || index.upsert(&entry))
            .await
            .map_err(|e| PipelineError::IndexUnavailable(format!("index write task failed: {e}")))??;
        timings.upsert_ms = elapsed_ms(stage);

        Ok(Prepared {
            ticket,
            document,
            embedding,
            attachment_failures,
        })
    }

    /// Best-effort text for every attachment, keyed by attachment id.
    async fn extract_attachments(
        &self,
        ticket: &Ticket,
    ) -> (HashMap<String, String>, Vec<AttachmentFailure>) {
        let results = futures::future::join_all(ticket.attachments.iter().map(|attachment| async move {
            (attachment, self.extractor.extract_text(attachment).await)
        }))
        .await;

        let mut texts = HashMap::new();
        let mut failures = Vec::new();
        for (attachment, result) in results {
            match result {
                Ok(text) => {
                    texts.insert(attachment.id.clone(), text);
                }
                Err(err) => {
                    warn!(
                        ticket_id = %ticket.id,
                        attachment = %attachment.filename,
                        error = %err,
                        "attachment text unavailable"
                    );
                    failures.push(AttachmentFailure {
                        attachment_id: attachment.id.clone(),
                        filename: attachment.filename.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        (texts, failures)
    }

    /// Nearest other tickets. The scan runs on the blocking pool.
    async fn query_neighbours(
        &self,
        ticket_id: &str,
        vector: &[f32],
        options: &ProcessOptions,
    ) -> Result<Vec<SimilarityCandidate>, PipelineError> {
        let index = Arc::clone(&self.index);
        let ticket_id = ticket_id.to_string();
        let vector = vector.to_vec();
        let filter = options.filter.clone();
        let top_k = options.top_k;
        let hits = tokio::task::spawn_blocking(move || {
            let mut request = QueryRequest::new(&vector, top_k).excluding(&ticket_id);
            if let Some(filter) = filter.as_ref() {
                request = request.with_filter(filter);
            }
            index.query(&request)
        })
        .await
        .map_err(|e| PipelineError::IndexUnavailable(format!("index query task failed: {e}")))??;
        Ok(hits)
    }

    /// Stored canonical text of each hit, `None` where it is missing.
    async fn load_documents(
        &self,
        hits: &[SimilarityCandidate],
    ) -> Result<Vec<Option<String>>, PipelineError> {
        let index = Arc::clone(&self.index);
        let ids: Vec<String> = hits.iter().map(|h| h.ticket_id.clone()).collect();
        tokio::task::spawn_blocking(move || {
            ids.iter()
                .map(|id| match index.get(id) {
                    Ok(Some(entry)) if !entry.document.is_empty() => Some(entry.document),
                    Ok(_) => None,
                    Err(err) => {
                        warn!(ticket_id = %id, error = %err, "could not load candidate document");
                        None
                    }
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| PipelineError::IndexUnavailable(format!("index read task failed: {e}")))
    }
}
