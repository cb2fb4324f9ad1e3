//! Property tests for in-memory retrieval ordering and hybrid ranking bounds.

use std::cmp::Ordering;
use std::sync::Arc;

use neon_search::document::{NewDocument, NewEmbeddingChunk};
use neon_search::fusion::compare_ranked;
use neon_search::{HybridQuery, HybridRanker, InMemorySearchStore, SearchConfig, SearchError, SearchStore};
use proptest::prelude::*;

const DIM: usize = 8;

const WORDS: &[&str] = &["neon", "branch", "vector", "index", "postgres", "serverless", "pool"];

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map(
        "non-zero embedding",
        |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-4 {
                return None;
            }
            for val in &mut v {
                *val /= norm;
            }
            Some(v)
        },
    )
}

/// Generate document text from a small vocabulary so keyword queries hit.
fn arb_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(proptest::sample::select(WORDS), 1..8).prop_map(|w| w.join(" "))
}

/// A document with one to three chunks.
fn arb_document() -> impl Strategy<Value = (String, Vec<Vec<f32>>)> {
    (arb_text(), proptest::collection::vec(arb_normalized_embedding(DIM), 1..4))
}

fn build_store(
    rt: &tokio::runtime::Runtime,
    documents: &[(String, Vec<Vec<f32>>)],
) -> Arc<InMemorySearchStore> {
    rt.block_on(async {
        let store = Arc::new(InMemorySearchStore::new(DIM));
        for (i, (text, embeddings)) in documents.iter().enumerate() {
            let doc = store.insert_document(NewDocument::new(format!("doc {i}"), text.clone())).await;
            for (index, embedding) in embeddings.iter().enumerate() {
                store
                    .insert_chunk(NewEmbeddingChunk::new(
                        doc,
                        index as i32,
                        format!("chunk {i}/{index}"),
                        embedding.clone(),
                    ))
                    .await
                    .unwrap();
            }
        }
        store
    })
}

fn ranker(store: Arc<InMemorySearchStore>) -> HybridRanker {
    HybridRanker::builder()
        .config(SearchConfig::builder().dimensions(DIM).build().unwrap())
        .store(store)
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn nearest_by_vector_is_ascending_and_bounded(
        documents in proptest::collection::vec(arb_document(), 1..10),
        query in arb_normalized_embedding(DIM),
        k in 1usize..25,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let store = build_store(&rt, &documents);
        let total: usize = documents.iter().map(|(_, e)| e.len()).sum();

        let hits = rt.block_on(store.nearest_by_vector(&query, k)).unwrap();

        prop_assert_eq!(hits.len(), k.min(total));
        for window in hits.windows(2) {
            prop_assert!(
                window[0].distance <= window[1].distance,
                "hits not in ascending order: {} > {}",
                window[0].distance,
                window[1].distance,
            );
        }
    }

    #[test]
    fn hybrid_results_are_sorted_and_bounded(
        documents in proptest::collection::vec(arb_document(), 1..10),
        query_embedding in arb_normalized_embedding(DIM),
        query_words in proptest::collection::vec(proptest::sample::select(WORDS), 1..3),
        limit in 1usize..12,
        semantic_weight in 0.0f64..=1.0,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let ranker = ranker(build_store(&rt, &documents));

        let request = HybridQuery::new(query_words.join(" "), query_embedding)
            .with_limit(limit)
            .with_weights(semantic_weight, 1.0 - semantic_weight);
        let results = rt.block_on(ranker.hybrid_search(&request)).unwrap();

        prop_assert!(results.len() <= limit);
        for window in results.windows(2) {
            prop_assert_ne!(compare_ranked(&window[0], &window[1]), Ordering::Greater);
            prop_assert!(window[0].combined_score >= window[1].combined_score);
        }

        // Every result is bounded by the score of a chunk ranked first in both lists.
        let max = semantic_weight / 61.0 + (1.0 - semantic_weight) / 61.0;
        for result in &results {
            prop_assert!(result.combined_score <= max + 1e-12);
        }
    }

    #[test]
    fn weights_not_summing_to_one_always_fail(
        limit in 0usize..50,
        semantic_weight in 0.0f64..=1.0,
        offset in prop_oneof![-0.5f64..-1e-6, 1e-6f64..0.5],
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let ranker = ranker(Arc::new(InMemorySearchStore::new(DIM)));

        let request = HybridQuery::new("neon", vec![0.5; DIM])
            .with_limit(limit)
            .with_weights(semantic_weight, 1.0 - semantic_weight + offset);
        let result = rt.block_on(ranker.hybrid_search(&request));

        let is_invalid_weights = matches!(result, Err(SearchError::InvalidWeights { .. }));
        prop_assert!(is_invalid_weights);
    }
}
