//! Hybrid ranker: semantic and keyword retrieval fused with weighted RRF.
//!
//! The [`HybridRanker`] validates a request, runs both candidate retrievals
//! against its [`SearchStore`] concurrently, over-fetching `2 × limit` from
//! each, and hands the two ordered lists to [`fusion::fuse`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use neon_search::{HybridQuery, HybridRanker, InMemorySearchStore, SearchConfig};
//!
//! let ranker = HybridRanker::builder()
//!     .config(SearchConfig::builder().dimensions(384).build()?)
//!     .store(Arc::new(InMemorySearchStore::new(384)))
//!     .build()?;
//!
//! let results = ranker
//!     .hybrid_search(&HybridQuery::new("branch reset", query_embedding).with_limit(5))
//!     .await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::{SearchConfig, validate_weights};
use crate::document::{KeywordResult, RankedResult, SemanticResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{Result, SearchError};
use crate::fusion;
use crate::store::{SearchStore, check_embedding};

/// A hybrid search request. Unset fields take the ranker's configured defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HybridQuery {
    pub query: String,
    pub query_embedding: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword_weight: Option<f64>,
}

impl HybridQuery {
    pub fn new(query: impl Into<String>, query_embedding: Vec<f32>) -> Self {
        Self {
            query: query.into(),
            query_embedding,
            limit: None,
            semantic_weight: None,
            keyword_weight: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set both weights; they must sum to 1.
    pub fn with_weights(mut self, semantic: f64, keyword: f64) -> Self {
        self.semantic_weight = Some(semantic);
        self.keyword_weight = Some(keyword);
        self
    }
}

/// Fully resolved request parameters.
#[derive(Debug, Clone, Copy)]
struct Resolved {
    limit: usize,
    semantic_weight: f64,
    keyword_weight: f64,
}

/// Stateless, read-only hybrid search over a [`SearchStore`].
///
/// Construct one via [`HybridRanker::builder()`]. Cheap to share behind an
/// `Arc`; concurrent calls share no mutable state.
pub struct HybridRanker {
    config: SearchConfig,
    store: Arc<dyn SearchStore>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
}

impl std::fmt::Debug for HybridRanker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridRanker")
            .field("config", &self.config)
            .field("store", &self.store.backend_name())
            .field("embedding_provider", &self.embedding_provider.is_some())
            .finish()
    }
}

impl HybridRanker {
    /// Create a new [`HybridRankerBuilder`].
    pub fn builder() -> HybridRankerBuilder {
        HybridRankerBuilder::default()
    }

    /// Return a reference to the ranker configuration.
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Return a reference to the underlying store.
    pub fn store(&self) -> &Arc<dyn SearchStore> {
        &self.store
    }

    fn check_query(query: &str) -> Result<()> {
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        Ok(())
    }

    fn check_limit(limit: usize) -> Result<()> {
        if limit == 0 {
            return Err(SearchError::InvalidLimit);
        }
        Ok(())
    }

    fn resolve(&self, request: &HybridQuery) -> Result<Resolved> {
        let semantic_weight = request.semantic_weight.unwrap_or(self.config.semantic_weight);
        let keyword_weight = request.keyword_weight.unwrap_or(self.config.keyword_weight);
        validate_weights(semantic_weight, keyword_weight)?;
        check_embedding(self.config.dimensions, &request.query_embedding)?;
        Self::check_query(&request.query)?;
        let limit = request.limit.unwrap_or(self.config.default_limit);
        Self::check_limit(limit)?;
        Ok(Resolved { limit, semantic_weight, keyword_weight })
    }

    /// Apply the configured per-call timeout to a retrieval future.
    async fn bounded<T>(&self, retrieval: impl Future<Output = Result<T>>) -> Result<T> {
        match self.config.request_timeout {
            Some(timeout) => tokio::time::timeout(timeout, retrieval).await.map_err(|_| {
                SearchError::backend(
                    self.store.backend_name(),
                    format!("retrieval timed out after {timeout:?}"),
                )
            })?,
            None => retrieval.await,
        }
    }

    fn log_store_error(&self, operation: &str, e: &SearchError) {
        error!(backend = self.store.backend_name(), operation, error = %e, "candidate retrieval failed");
    }

    /// Run semantic and keyword retrieval concurrently and fuse the results.
    ///
    /// Returns at most `limit` results ordered by combined score descending,
    /// ties broken by semantic score, keyword score, then chunk id.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidWeights`], [`SearchError::DimensionMismatch`],
    /// [`SearchError::NonFiniteEmbedding`], [`SearchError::EmptyQuery`] or
    /// [`SearchError::InvalidLimit`] for bad input, and [`SearchError::BackendUnavailable`] if either retrieval fails.
    /// No partial results are returned.
    pub async fn hybrid_search(&self, request: &HybridQuery) -> Result<Vec<RankedResult>> {
        let resolved = self.resolve(request).inspect_err(|e| {
            debug!(error = %e, "rejected hybrid search request");
        })?;
        let candidates = resolved.limit.saturating_mul(2);

        let retrieval = async {
            tokio::try_join!(
                self.store.nearest_by_vector(&request.query_embedding, candidates),
                self.store.match_by_text(&request.query, candidates),
            )
        };
        let (vector_hits, text_hits) = self
            .bounded(retrieval)
            .await
            .inspect_err(|e| self.log_store_error("hybrid_search", e))?;

        debug!(
            semantic_candidates = vector_hits.len(),
            keyword_candidates = text_hits.len(),
            "retrieved candidates"
        );

        let results = fusion::fuse(
            fusion::semantic_candidates(vector_hits),
            fusion::keyword_candidates(text_hits),
            resolved.semantic_weight,
            resolved.keyword_weight,
            resolved.limit,
        );

        info!(
            result_count = results.len(),
            limit = resolved.limit,
            semantic_weight = resolved.semantic_weight,
            keyword_weight = resolved.keyword_weight,
            "hybrid search completed"
        );
        Ok(results)
    }

    /// Nearest chunks by cosine distance, ordered by similarity descending.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::DimensionMismatch`],
    /// [`SearchError::NonFiniteEmbedding`], [`SearchError::InvalidLimit`] or
    /// [`SearchError::BackendUnavailable`].
    pub async fn semantic_search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<SemanticResult>> {
        check_embedding(self.config.dimensions, query_embedding)?;
        Self::check_limit(limit)?;

        let hits = self
            .bounded(self.store.nearest_by_vector(query_embedding, limit))
            .await
            .inspect_err(|e| self.log_store_error("semantic_search", e))?;

        let mut results: Vec<SemanticResult> = hits.into_iter().map(SemanticResult::from).collect();
        results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity).then_with(|| a.id.cmp(&b.id)));
        results.truncate(limit);

        info!(result_count = results.len(), limit, "semantic search completed");
        Ok(results)
    }

    /// Chunks whose document matches `query`, ordered by relevance descending.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::EmptyQuery`], [`SearchError::InvalidLimit`] or
    /// [`SearchError::BackendUnavailable`].
    pub async fn keyword_search(&self, query: &str, limit: usize) -> Result<Vec<KeywordResult>> {
        Self::check_query(query)?;
        Self::check_limit(limit)?;

        let hits = self
            .bounded(self.store.match_by_text(query, limit))
            .await
            .inspect_err(|e| self.log_store_error("keyword_search", e))?;

        let mut results: Vec<KeywordResult> = hits.into_iter().map(KeywordResult::from).collect();
        results.sort_by(|a, b| b.relevance.total_cmp(&a.relevance).then_with(|| a.id.cmp(&b.id)));
        results.truncate(limit);

        info!(result_count = results.len(), limit, "keyword search completed");
        Ok(results)
    }

    /// Embed `query` with the attached provider, then run
    /// [`hybrid_search`](Self::hybrid_search) with the default weights.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if no embedding provider is attached
    /// and [`SearchError::Embedding`] if embedding fails, in addition to the
    /// errors of [`hybrid_search`](Self::hybrid_search).
    pub async fn search_text(&self, query: &str, limit: Option<usize>) -> Result<Vec<RankedResult>> {
        Self::check_query(query)?;
        let provider = self.embedding_provider.as_ref().ok_or_else(|| {
            SearchError::Config("search_text requires an embedding provider".to_string())
        })?;
        let query_embedding = provider.embed(query).await.inspect_err(|e| {
            error!(error = %e, "query embedding failed");
        })?;

        let mut request = HybridQuery::new(query, query_embedding);
        request.limit = limit;
        self.hybrid_search(&request).await
    }
}

/// Builder for constructing a [`HybridRanker`].
///
/// The store is required; the configuration defaults to
/// [`SearchConfig::default()`] and the embedding provider is optional.
#[derive(Default)]
pub struct HybridRankerBuilder {
    config: Option<SearchConfig>,
    store: Option<Arc<dyn SearchStore>>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
}

impl HybridRankerBuilder {
    /// Set the ranker configuration.
    pub fn config(mut self, config: SearchConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the search store.
    pub fn store(mut self, store: Arc<dyn SearchStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Attach a provider used by [`HybridRanker::search_text`].
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Build the [`HybridRanker`].
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if no store is set, and
    /// [`SearchError::DimensionMismatch`] if the store or embedding provider
    /// dimension differs from the configured one.
    pub fn build(self) -> Result<HybridRanker> {
        let config = self.config.unwrap_or_default();
        let store =
            self.store.ok_or_else(|| SearchError::Config("store is required".to_string()))?;

        if store.dimensions() != config.dimensions {
            return Err(SearchError::DimensionMismatch {
                expected: config.dimensions,
                actual: store.dimensions(),
            });
        }
        if let Some(provider) = &self.embedding_provider {
            if provider.dimensions() != config.dimensions {
                return Err(SearchError::DimensionMismatch {
                    expected: config.dimensions,
                    actual: provider.dimensions(),
                });
            }
        }

        Ok(HybridRanker { config, store, embedding_provider: self.embedding_provider })
    }
}
