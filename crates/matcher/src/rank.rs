//! Merge index hits with their verdicts into the final order.

use adjudicate::{AdjudicationVerdict, Verdict};
use index::SimilarityCandidate;

use crate::types::RankedCandidate;

fn group(verdict: &Verdict) -> u8 {
    match verdict {
        Verdict::Confirmed => 0,
        Verdict::Failed(_) => 1,
        Verdict::Refuted => 2,
    }
}

/// Order candidates: confirmed duplicates, then undecided ones, then
/// refuted ones. Within a group higher similarity wins; the sort is stable
/// so the index order settles anything left.
///
/// `verdicts` are matched to `hits` by position.
pub fn rank_candidates(
    hits: Vec<SimilarityCandidate>,
    verdicts: Vec<AdjudicationVerdict>,
) -> Vec<RankedCandidate> {
    let mut verdicts = verdicts.into_iter();
    let mut ranked: Vec<RankedCandidate> = hits
        .into_iter()
        .map(|hit| {
            let adjudication = match verdicts.next() {
                Some(v) if v.ticket_id == hit.ticket_id => v,
                _ => AdjudicationVerdict::failed(&hit.ticket_id, "no verdict returned"),
            };
            RankedCandidate {
                rank: 0,
                low_confidence: adjudication.verdict.is_failed(),
                ticket_id: hit.ticket_id,
                similarity: hit.score,
                index_rank: hit.rank,
                adjudication,
                metadata: hit.metadata,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        group(&a.adjudication.verdict)
            .cmp(&group(&b.adjudication.verdict))
            .then_with(|| b.similarity.total_cmp(&a.similarity))
    });
    for (idx, candidate) in ranked.iter_mut().enumerate() {
        candidate.rank = idx + 1;
    }
    ranked
}
