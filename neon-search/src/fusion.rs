//! Weighted Reciprocal Rank Fusion of semantic and keyword candidates.
//!
//! Fusion is pure and synchronous: it takes two ordered candidate lists and
//! produces [`RankedResult`]s. Each list contributes
//! `weight × 1 / (RRF_K + rank)` per chunk; a chunk missing from a list
//! contributes nothing for that list.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::document::{ChunkId, ChunkRow, RankedResult, TextHit, VectorHit};

/// RRF smoothing constant. Fixed.
pub const RRF_K: f64 = 60.0;

/// A candidate from a single retrieval signal with its 1-based rank.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub row: ChunkRow,
    pub rank: usize,
    /// Similarity (`1 - distance`) for semantic candidates, raw relevance
    /// for keyword candidates.
    pub score: f64,
}

/// Rank nearest-neighbour hits in the order the store returned them.
pub fn semantic_candidates(hits: Vec<VectorHit>) -> Vec<Candidate> {
    hits.into_iter()
        .enumerate()
        .map(|(i, hit)| Candidate { row: hit.row, rank: i + 1, score: 1.0 - hit.distance })
        .collect()
}

/// Rank full-text hits in the order the store returned them.
pub fn keyword_candidates(hits: Vec<TextHit>) -> Vec<Candidate> {
    hits.into_iter()
        .enumerate()
        .map(|(i, hit)| Candidate { row: hit.row, rank: i + 1, score: hit.relevance })
        .collect()
}

/// The weighted RRF term for one signal. An absent rank contributes 0.
pub fn rrf_term(weight: f64, rank: Option<usize>) -> f64 {
    match rank {
        Some(rank) => weight * (1.0 / (RRF_K + rank as f64)),
        None => 0.0,
    }
}

#[derive(Debug)]
struct Fused {
    row: ChunkRow,
    semantic: Option<(usize, f64)>,
    keyword: Option<(usize, f64)>,
}

/// Merge both candidate lists by chunk id and return the top `limit`
/// results by combined score.
///
/// Ties are broken by semantic score, then keyword score (both descending),
/// then chunk id ascending. If a chunk appears more than once in a list its
/// best-ranked entry is used.
pub fn fuse(
    semantic: Vec<Candidate>,
    keyword: Vec<Candidate>,
    semantic_weight: f64,
    keyword_weight: f64,
    limit: usize,
) -> Vec<RankedResult> {
    let mut merged: HashMap<ChunkId, Fused> =
        HashMap::with_capacity(semantic.len() + keyword.len());

    for candidate in semantic {
        merged.entry(candidate.row.chunk_id).or_insert(Fused {
            row: candidate.row,
            semantic: Some((candidate.rank, candidate.score)),
            keyword: None,
        });
    }

    for candidate in keyword {
        merged
            .entry(candidate.row.chunk_id)
            .and_modify(|fused| {
                if fused.keyword.is_none() {
                    fused.keyword = Some((candidate.rank, candidate.score));
                }
            })
            .or_insert(Fused {
                row: candidate.row,
                semantic: None,
                keyword: Some((candidate.rank, candidate.score)),
            });
    }

    let mut results: Vec<RankedResult> = merged
        .into_values()
        .map(|fused| {
            let semantic_rank = fused.semantic.map(|(rank, _)| rank);
            let keyword_rank = fused.keyword.map(|(rank, _)| rank);
            let combined_score = rrf_term(semantic_weight, semantic_rank)
                + rrf_term(keyword_weight, keyword_rank);
            let ChunkRow { chunk_id, document_id, chunk, title } = fused.row;
            RankedResult {
                id: chunk_id,
                document_id,
                chunk,
                title,
                semantic_score: fused.semantic.map_or(0.0, |(_, score)| score),
                keyword_score: fused.keyword.map_or(0.0, |(_, score)| score),
                combined_score,
            }
        })
        .collect();

    results.sort_by(compare_ranked);
    results.truncate(limit);
    results
}

/// Total order used for fused results.
pub fn compare_ranked(a: &RankedResult, b: &RankedResult) -> Ordering {
    b.combined_score
        .total_cmp(&a.combined_score)
        .then_with(|| b.semantic_score.total_cmp(&a.semantic_score))
        .then_with(|| b.keyword_score.total_cmp(&a.keyword_score))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: ChunkId) -> ChunkRow {
        ChunkRow {
            chunk_id: id,
            document_id: id * 10,
            chunk: format!("chunk {id}"),
            title: format!("doc {id}"),
        }
    }

    fn candidate(id: ChunkId, rank: usize, score: f64) -> Candidate {
        Candidate { row: row(id), rank, score }
    }

    fn round6(x: f64) -> f64 {
        (x * 1e6).round() / 1e6
    }

    #[test]
    fn three_chunk_scenario() {
        // A = 1, B = 2, C = 3
        let semantic = vec![candidate(1, 1, 0.9), candidate(2, 2, 0.8), candidate(3, 3, 0.7)];
        let keyword = vec![candidate(2, 1, 0.5), candidate(3, 2, 0.4)];

        let results = fuse(semantic, keyword, 0.7, 0.3, 3);
        let ids: Vec<ChunkId> = results.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);

        assert_eq!(round6(results[0].combined_score), 0.016208);
        assert_eq!(round6(results[1].combined_score), 0.015950);
        assert_eq!(round6(results[2].combined_score), 0.011475);

        let a = &results[2];
        assert_eq!(a.keyword_score, 0.0);
        assert_eq!(a.semantic_score, 0.9);
    }

    #[test]
    fn semantic_only_chunk_is_kept_with_zero_keyword_score() {
        let results = fuse(vec![candidate(7, 4, 0.42)], vec![], 0.7, 0.3, 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].keyword_score, 0.0);
        assert!((results[0].combined_score - 0.7 / 64.0).abs() < 1e-15);
    }

    #[test]
    fn keyword_only_chunk_uses_keyword_term_only() {
        let results = fuse(vec![], vec![candidate(5, 2, 0.3)], 0.7, 0.3, 10);
        assert_eq!(results[0].semantic_score, 0.0);
        assert!((results[0].combined_score - 0.3 / 62.0).abs() < 1e-15);
    }

    #[test]
    fn first_in_both_lists_gets_maximum_score() {
        let semantic = vec![candidate(1, 1, 0.99), candidate(2, 2, 0.5)];
        let keyword = vec![candidate(1, 1, 0.8), candidate(2, 2, 0.1)];
        let results = fuse(semantic, keyword, 0.7, 0.3, 10);
        assert_eq!(results[0].id, 1);
        assert!((results[0].combined_score - (0.7 / 61.0 + 0.3 / 61.0)).abs() < 1e-12);
    }

    #[test]
    fn ties_break_on_semantic_then_keyword_then_id() {
        // Same ranks on opposite lists with equal weights yield equal combined scores.
        let semantic = vec![candidate(1, 1, 0.6), candidate(2, 2, 0.9)];
        let keyword = vec![candidate(2, 1, 0.2), candidate(1, 2, 0.2)];
        let results = fuse(semantic, keyword, 0.5, 0.5, 10);
        assert_eq!(results[0].combined_score, results[1].combined_score);
        assert_eq!(results[0].id, 2);

        let semantic = vec![candidate(4, 1, 0.5)];
        let keyword = vec![candidate(3, 1, 0.5)];
        let results = fuse(semantic, keyword, 0.5, 0.5, 10);
        // Equal combined score; 4 has semantic 0.5 vs 0.0
        assert_eq!(results[0].id, 4);

        let results = fuse(vec![candidate(9, 1, 0.1), candidate(8, 1, 0.1)], vec![], 1.0, 0.0, 10);
        assert_eq!(results.iter().map(|r| r.id).collect::<Vec<_>>(), vec![8, 9]);
    }

    #[test]
    fn negative_similarity_is_not_clamped() {
        let hits = vec![VectorHit { row: row(1), distance: 1.4 }];
        let candidates = semantic_candidates(hits);
        assert!((candidates[0].score - (-0.4)).abs() < 1e-12);
        let results = fuse(candidates, vec![], 0.7, 0.3, 1);
        assert!(results[0].semantic_score < 0.0);
    }

    #[test]
    fn truncates_to_limit() {
        let semantic: Vec<Candidate> =
            (1..=8).map(|i| candidate(i, i as usize, 1.0 - i as f64 / 10.0)).collect();
        let results = fuse(semantic, vec![], 0.7, 0.3, 3);
        assert_eq!(results.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn absent_rank_contributes_nothing() {
        assert_eq!(rrf_term(0.7, None), 0.0);
        assert_eq!(rrf_term(0.0, Some(1)), 0.0);
        assert!((rrf_term(1.0, Some(40)) - 0.01).abs() < 1e-15);
    }
}
