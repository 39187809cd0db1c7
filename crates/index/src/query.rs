use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::EntryMetadata;

/// A nearest-neighbor request.
#[derive(Debug, Clone)]
pub struct QueryRequest<'a> {
    pub vector: &'a [f32],
    /// Maximum number of candidates returned.
    pub k: usize,
    pub filter: Option<&'a MetadataFilter>,
    /// Ticket that issued the query; never part of its own result set.
    pub exclude_ticket_id: Option<&'a str>,
}

impl<'a> QueryRequest<'a> {
    pub fn new(vector: &'a [f32], k: usize) -> Self {
        Self {
            vector,
            k,
            filter: None,
            exclude_ticket_id: None,
        }
    }

    pub fn excluding(mut self, ticket_id: &'a str) -> Self {
        self.exclude_ticket_id = Some(ticket_id);
        self
    }

    pub fn with_filter(mut self, filter: &'a MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Result entry for a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityCandidate {
    pub ticket_id: String,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
    /// 1-based position in the result set.
    pub rank: usize,
    pub metadata: EntryMetadata,
}

/// Restricts a query to entries whose metadata matches.
///
/// Empty lists mean "no constraint". String comparisons ignore ASCII case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataFilter {
    pub statuses: Vec<String>,
    pub priorities: Vec<String>,
    pub resolutions: Vec<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

impl MetadataFilter {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn matches(&self, metadata: &EntryMetadata) -> bool {
        fn allowed(list: &[String], value: Option<&str>) -> bool {
            list.is_empty()
                || value.is_some_and(|v| list.iter().any(|item| item.eq_ignore_ascii_case(v)))
        }

        if !allowed(&self.statuses, metadata.status.as_deref())
            || !allowed(&self.priorities, metadata.priority.as_deref())
            || !allowed(&self.resolutions, metadata.resolution.as_deref())
        {
            return false;
        }
        if let Some(after) = self.created_after {
            if metadata.created_at.map_or(true, |created| created < after) {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if metadata.created_at.map_or(true, |created| created >= before) {
                return false;
            }
        }
        true
    }
}

/// Cosine similarity. Zero-magnitude or mismatched vectors score `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (dot, norm_a, norm_b) = a.iter().zip(b.iter()).fold(
        (0f64, 0f64, 0f64),
        |(dot, na, nb), (&x, &y)| {
            let (x, y) = (x as f64, y as f64);
            (dot + x * y, na + x * x, nb + y * y)
        },
    );
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
}

/// Result ordering: score descending, then most recently created ticket
/// first (undated entries last), then ticket id ascending.
pub(crate) fn compare_hits(
    a: (f32, Option<DateTime<Utc>>, &str),
    b: (f32, Option<DateTime<Utc>>, &str),
) -> Ordering {
    b.0.total_cmp(&a.0)
        .then_with(|| match (a.1, b.1) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.2.cmp(b.2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cosine_is_symmetric_and_scale_free() {
        let a = [0.3, -1.2, 4.0];
        let b = [2.0, 0.5, 0.25];
        assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));

        let scaled: Vec<f32> = a.iter().map(|v| v * 10.0).collect();
        assert!((cosine_similarity(&a, &scaled) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn ties_prefer_newest_then_id() {
        let old = Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap());
        let new = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());

        assert_eq!(
            compare_hits((0.9, old, "GM-1"), (0.9, new, "GM-2")),
            Ordering::Greater
        );
        assert_eq!(
            compare_hits((0.9, None, "GM-1"), (0.9, old, "GM-2")),
            Ordering::Greater
        );
        assert_eq!(
            compare_hits((0.9, None, "GM-1"), (0.9, None, "GM-2")),
            Ordering::Less
        );
        assert_eq!(
            compare_hits((0.95, None, "GM-9"), (0.9, new, "GM-2")),
            Ordering::Less
        );
    }

    #[test]
    fn filter_matches_case_insensitively() {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let metadata = EntryMetadata {
            status: Some("Closed".into()),
            created_at: Some(created),
            ..Default::default()
        };

        let filter = MetadataFilter {
            statuses: vec!["closed".into()],
            ..Default::default()
        };
        assert!(filter.matches(&metadata));

        let filter = MetadataFilter {
            resolutions: vec!["Fixed".into()],
            ..Default::default()
        };
        assert!(!filter.matches(&metadata));

        let filter = MetadataFilter {
            created_after: Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()),
            ..Default::default()
        };
        assert!(!filter.matches(&metadata));
        assert!(MetadataFilter::default().matches(&metadata));
        assert!(MetadataFilter::default().is_empty());
    }
}
