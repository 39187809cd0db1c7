use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::error::{EmbedError, ProviderError, StoreError};
use crate::flight::SingleFlight;
use crate::normalize::is_finite_vector;
use crate::provider::EmbeddingProvider;
use crate::resilience::{retry_async, RetryPolicy};
use crate::store::EmbeddingStore;
use crate::types::{EmbedOutcome, EmbedderStats, EmbeddingRecord};

type FlightResult = Result<(EmbeddingRecord, bool, u32), EmbedError>;

/// Cache-first embedding generation.
///
/// Lookups go to the [`EmbeddingStore`] by fingerprint. On a miss the
/// provider is called under the retry policy, and concurrent requests for
/// the same fingerprint share one provider call. Records from a different
/// model or dimension are treated as misses and overwritten.
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn EmbeddingStore>,
    retry: RetryPolicy,
    flights: SingleFlight<String, FlightResult>,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    coalesced: AtomicU64,
    provider_calls: AtomicU64,
    provider_failures: AtomicU64,
}

impl Embedder {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn EmbeddingStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            store,
            retry,
            flights: SingleFlight::new(),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
            provider_calls: AtomicU64::new(0),
            provider_failures: AtomicU64::new(0),
        }
    }

    pub fn model_id(&self) -> &str {
        self.provider.model_id()
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    pub fn store(&self) -> &Arc<dyn EmbeddingStore> {
        &self.store
    }

    /// Return the embedding for `text`, whose content fingerprint is
    /// `fingerprint`. With `force` the store is bypassed and the fresh
    /// vector replaces whatever was cached.
    pub async fn embed(
        &self,
        fingerprint: &str,
        text: &str,
        force: bool,
    ) -> Result<EmbedOutcome, EmbedError> {
        if !force {
            if let Some(record) = self.lookup(fingerprint) {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(EmbedOutcome {
                    record,
                    cache_hit: true,
                    coalesced: false,
                    attempts: 0,
                });
            }
        }
        self.cache_misses.fetch_add(1, Ordering::Relaxed);

        // Forced refreshes get their own flight so they never reuse a
        // concurrent cache read.
        let key = if force {
            format!("{fingerprint}#force")
        } else {
            fingerprint.to_string()
        };

        let (result, coalesced) = self
            .flights
            .run(key, || self.compute(fingerprint, text, force))
            .await;

        if coalesced {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
        }

        let (record, cache_hit, attempts) = result?;
        Ok(EmbedOutcome {
            record,
            cache_hit,
            coalesced,
            attempts,
        })
    }

    /// Drop the cached vector for `fingerprint`.
    pub fn invalidate(&self, fingerprint: &str) -> Result<(), StoreError> {
        self.store.remove(fingerprint)
    }

    /// Drop every cached vector not produced by the current model.
    pub fn purge_other_models(&self) -> Result<usize, StoreError> {
        let removed = self.store.purge_except_model(self.model_id())?;
        if removed > 0 {
            info!(removed, model = %self.model_id(), "purged embeddings from other models");
        }
        Ok(removed)
    }

    pub fn stats(&self) -> EmbedderStats {
        EmbedderStats {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            provider_calls: self.provider_calls.load(Ordering::Relaxed),
            provider_failures: self.provider_failures.load(Ordering::Relaxed),
        }
    }

    /// Store lookup that only returns records usable with the current model.
    /// Store failures degrade to a miss.
    fn lookup(&self, fingerprint: &str) -> Option<EmbeddingRecord> {
        match self.store.get(fingerprint) {
            Ok(Some(record)) if record.is_compatible(self.model_id(), self.dimension()) => {
                Some(record)
            }
            Ok(Some(record)) => {
                debug!(
                    fingerprint,
                    cached_model = %record.model_id,
                    model = %self.model_id(),
                    "cached embedding from another model, recomputing"
                );
                None
            }
            Ok(None) => None,
            Err(err) => {
                warn!(fingerprint, error = %err, "embedding store read failed, treating as miss");
                None
            }
        }
    }

    async fn compute(&self, fingerprint: &str, text: &str, force: bool) -> FlightResult {
        // Another flight may have filled the store between our miss and now.
        if !force {
            if let Some(record) = self.lookup(fingerprint) {
                return Ok((record, true, 0));
            }
        }

        let expected = self.dimension();
        let started = Instant::now();
        let outcome = retry_async(&self.retry, "embedding", |_| {
            self.provider_calls.fetch_add(1, Ordering::Relaxed);
            async move {
                let vector = self.provider.embed(text).await?;
                if vector.len() != expected {
                    return Err(ProviderError::Dimension {
                        expected,
                        actual: vector.len(),
                    });
                }
                if !is_finite_vector(&vector) {
                    return Err(ProviderError::Malformed("non-finite embedding value".into()));
                }
                Ok(vector)
            }
        })
        .await;

        let attempts = outcome.attempts;
        let vector = match outcome.result {
            Ok(vector) => vector,
            Err(ProviderError::Dimension { expected, actual }) => {
                self.provider_failures.fetch_add(1, Ordering::Relaxed);
                return Err(EmbedError::DimensionMismatch { expected, actual });
            }
            Err(last_error) => {
                self.provider_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    fingerprint,
                    attempts,
                    error = %last_error,
                    "embedding provider unavailable"
                );
                return Err(EmbedError::Unavailable {
                    attempts,
                    last_error,
                });
            }
        };

        let record = EmbeddingRecord::new(fingerprint, vector, self.model_id());
        if let Err(err) = self.store.put(&record) {
            warn!(fingerprint, error = %err, "failed to persist embedding");
        }

        info!(
            fingerprint,
            model = %record.model_id,
            attempts,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "embedding computed"
        );
        Ok((record, false, attempts))
    }
}
