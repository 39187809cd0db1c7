use async_trait::async_trait;
use fxhash::hash64;

use crate::error::ProviderError;
use crate::normalize::l2_normalize_in_place;
use crate::provider::EmbeddingProvider;

pub const STUB_MODEL_ID: &str = "stub-hashed-bow";

/// Deterministic offline provider.
///
/// Hashes lowercase word tokens into `dimension` buckets with a sign bit
/// (feature hashing), so texts sharing vocabulary land close together under
/// cosine similarity. Text without any word characters falls back to a
/// sinusoid seeded by the hash of the whole input. Never fails and makes no
/// network calls; used for local runs and tests.
#[derive(Debug, Clone)]
pub struct StubEmbeddingProvider {
    model_id: String,
    dimension: usize,
}

impl StubEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            model_id: STUB_MODEL_ID.to_string(),
            dimension: dimension.max(1),
        }
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Synchronous core, shared with tests.
    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let dim = self.dimension;
        let mut v = vec![0f32; dim];
        let mut saw_token = false;

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            saw_token = true;
            let h = hash64(token.to_lowercase().as_bytes());
            let bucket = (h % dim as u64) as usize;
            let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }

        if !saw_token {
            let h = hash64(text.as_bytes());
            for (idx, value) in v.iter_mut().enumerate() {
                *value = ((h >> (idx % 32)) as f32 * 0.0001 + (idx + 1) as f32).sin();
            }
        }

        l2_normalize_in_place(&mut v);
        v
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbeddingProvider {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(self.vectorize(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn same_text_same_vector() {
        let stub = StubEmbeddingProvider::new(64);
        assert_eq!(
            stub.vectorize("Crash when saving project"),
            stub.vectorize("Crash when saving project")
        );
    }

    #[test]
    fn case_and_punctuation_do_not_matter() {
        let stub = StubEmbeddingProvider::new(64);
        assert_eq!(
            stub.vectorize("Crash, when SAVING project!"),
            stub.vectorize("crash when saving project")
        );
    }

    #[test]
    fn overlapping_vocabulary_scores_higher() {
        let stub = StubEmbeddingProvider::new(256);
        let a = stub.vectorize("editor crashes when saving a large project file");
        let b = stub.vectorize("crash when saving large project file in editor");
        let c = stub.vectorize("add dark theme to settings dialog");
        assert!(cosine(&a, &b) > cosine(&a, &c));
    }

    #[test]
    fn output_is_unit_length_with_declared_dimension() {
        let stub = StubEmbeddingProvider::new(384);
        for text in ["hello world", "", "   ", "!!!"] {
            let v = stub.vectorize(text);
            assert_eq!(v.len(), 384);
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-4, "norm {norm} for {text:?}");
        }
    }

    #[tokio::test]
    async fn provider_reports_identity() {
        let stub = StubEmbeddingProvider::new(16).with_model_id("stub-test");
        assert_eq!(stub.model_id(), "stub-test");
        assert_eq!(stub.dimension(), 16);
        assert_eq!(stub.embed("x").await.unwrap().len(), 16);
    }
}
