use std::collections::HashSet;

use async_trait::async_trait;
use semantic::ProviderError;

use crate::prompt::JudgeRequest;

/// A model that reads a [`JudgeRequest`] and answers with raw text, expected
/// to contain the verdict JSON. One attempt per call.
#[async_trait]
pub trait JudgeProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn judge(&self, request: &JudgeRequest) -> Result<String, ProviderError>;
}

/// Offline judge based on word overlap between the two texts.
///
/// Answers in the same JSON format as a hosted model so the full parsing
/// path is exercised. Useful for local runs without credentials.
#[derive(Debug, Clone)]
pub struct OverlapJudgeProvider {
    /// Jaccard overlap at or above which the pair is called a duplicate.
    pub threshold: f32,
}

impl Default for OverlapJudgeProvider {
    fn default() -> Self {
        Self { threshold: 0.6 }
    }
}

impl OverlapJudgeProvider {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    fn words(text: &str) -> HashSet<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2)
            .map(str::to_lowercase)
            .collect()
    }

    pub fn overlap(a: &str, b: &str) -> f32 {
        let (a, b) = (Self::words(a), Self::words(b));
        let union = a.union(&b).count();
        if union == 0 {
            return 0.0;
        }
        a.intersection(&b).count() as f32 / union as f32
    }
}

#[async_trait]
impl JudgeProvider for OverlapJudgeProvider {
    fn name(&self) -> &str {
        "overlap"
    }

    async fn judge(&self, request: &JudgeRequest) -> Result<String, ProviderError> {
        let overlap = Self::overlap(&request.query_text, &request.candidate_text);
        let body = serde_json::json!({
            "is_duplicate": overlap >= self.threshold,
            "confidence": overlap,
            "explanation": format!("word overlap {overlap:.2} against threshold {:.2}", self.threshold),
        });
        Ok(body.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{CandidateDocument, QueryDocument};
    use crate::verdict::parse_verdict;

    #[test]
    fn overlap_bounds() {
        assert_eq!(OverlapJudgeProvider::overlap("crash on save", "crash on save"), 1.0);
        assert_eq!(OverlapJudgeProvider::overlap("alpha beta", "gamma delta"), 0.0);
        assert_eq!(OverlapJudgeProvider::overlap("", ""), 0.0);
    }

    #[tokio::test]
    async fn answers_in_verdict_format() {
        let judge = OverlapJudgeProvider::default();
        let query = QueryDocument::new("GM-2", "Editor crashes when saving large project");
        let candidate =
            CandidateDocument::new("GM-1", "Editor crashes when saving large project", 0.99);
        let request = JudgeRequest::new(&query, &candidate, "Editor crashes when saving large project");

        let raw = judge.judge(&request).await.unwrap();
        let judgement = parse_verdict(&raw).unwrap();
        assert!(judgement.is_duplicate);
        assert_eq!(judgement.confidence, Some(1.0));
    }
}
