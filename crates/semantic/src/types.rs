use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cached embedding, keyed by the content fingerprint it was computed from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingRecord {
    /// Fingerprint of the consolidated document text.
    pub fingerprint: String,
    pub vector: Vec<f32>,
    /// Model that produced [`vector`](Self::vector).
    pub model_id: String,
    /// Length of `vector`.
    pub dimension: usize,
    pub created_at: DateTime<Utc>,
}

impl EmbeddingRecord {
    pub fn new(fingerprint: impl Into<String>, vector: Vec<f32>, model_id: impl Into<String>) -> Self {
        let dimension = vector.len();
        Self {
            fingerprint: fingerprint.into(),
            vector,
            model_id: model_id.into(),
            dimension,
            created_at: Utc::now(),
        }
    }

    /// A record is reusable only for the model and dimension that made it.
    pub fn is_compatible(&self, model_id: &str, dimension: usize) -> bool {
        self.model_id == model_id && self.dimension == dimension && self.vector.len() == dimension
    }
}

/// What a single [`Embedder::embed`](crate::Embedder::embed) call did.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbedOutcome {
    pub record: EmbeddingRecord,
    /// Served from the store without calling the provider.
    pub cache_hit: bool,
    /// Joined another caller's in-flight computation.
    pub coalesced: bool,
    /// Provider attempts made by whoever computed the vector (0 on a cache hit).
    pub attempts: u32,
}

/// Running counters for an [`Embedder`](crate::Embedder).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmbedderStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub coalesced: u64,
    pub provider_calls: u64,
    pub provider_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_dimension_follows_vector() {
        let record = EmbeddingRecord::new("abc", vec![0.1, 0.2, 0.3], "text-embedding-004");
        assert_eq!(record.dimension, 3);
        assert!(record.is_compatible("text-embedding-004", 3));
        assert!(!record.is_compatible("text-embedding-004", 768));
        assert!(!record.is_compatible("other-model", 3));
    }

    #[test]
    fn record_serde_roundtrip() {
        let record = EmbeddingRecord::new("f00d", vec![0.5, -0.5], "stub");
        let json = serde_json::to_string(&record).unwrap();
        let back: EmbeddingRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }
}
