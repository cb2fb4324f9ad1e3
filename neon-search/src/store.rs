//! Search store trait: the document/embedding collaborator of the ranker.

use async_trait::async_trait;

use crate::document::{TextHit, VectorHit};
use crate::error::{Result, SearchError};

/// Read access to a corpus of documents and their embedding chunks.
///
/// The store owns the data and its referential integrity: every chunk belongs
/// to exactly one document and is removed with it. The ranker only reads.
///
/// # Example
///
/// ```rust,ignore
/// use neon_search::{InMemorySearchStore, SearchStore};
///
/// let store = InMemorySearchStore::new(384);
/// let hits = store.nearest_by_vector(&query_embedding, 20).await?;
/// let matches = store.match_by_text("postgres branching", 20).await?;
/// ```
#[async_trait]
pub trait SearchStore: Send + Sync {
    /// Short backend name used in errors and logs.
    fn backend_name(&self) -> &str;

    /// The fixed embedding dimension of the corpus.
    fn dimensions(&self) -> usize;

    /// Return up to `k` chunks closest to `embedding` by cosine distance,
    /// ordered by ascending distance.
    async fn nearest_by_vector(&self, embedding: &[f32], k: usize) -> Result<Vec<VectorHit>>;

    /// Return up to `k` chunks whose document's searchable text matches
    /// `query`, ordered by descending relevance. Non-matching chunks are
    /// excluded, never returned with a zero score.
    async fn match_by_text(&self, query: &str, k: usize) -> Result<Vec<TextHit>>;
}

/// Check that `embedding` has `expected` components, all of them finite.
///
/// Stores call this before accepting a chunk and the ranker before issuing a
/// query, so cosine distances are never NaN.
pub(crate) fn check_embedding(expected: usize, embedding: &[f32]) -> Result<()> {
    if embedding.len() != expected {
        return Err(SearchError::DimensionMismatch { expected, actual: embedding.len() });
    }
    match embedding.iter().position(|x| !x.is_finite()) {
        Some(index) => Err(SearchError::NonFiniteEmbedding { index, value: embedding[index] }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_embedding_rejects_wrong_length_and_non_finite() {
        assert!(check_embedding(2, &[0.5, -1.0]).is_ok());
        assert!(matches!(
            check_embedding(3, &[0.5, -1.0]),
            Err(SearchError::DimensionMismatch { expected: 3, actual: 2 })
        ));
        assert!(matches!(
            check_embedding(3, &[0.5, f32::NAN, f32::INFINITY]),
            Err(SearchError::NonFiniteEmbedding { index: 1, .. })
        ));
        assert!(matches!(
            check_embedding(2, &[f32::NEG_INFINITY, 0.0]),
            Err(SearchError::NonFiniteEmbedding { index: 0, .. })
        ));
    }
}
