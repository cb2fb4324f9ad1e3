//! Error types for the `neon-search` crate.

use thiserror::Error;

/// Errors that can occur while ranking search results.
///
/// Input errors (`InvalidWeights`, `DimensionMismatch`, `NonFiniteEmbedding`,
/// `EmptyQuery`, `InvalidLimit`) are reported before any store call. Storage failures are
/// passed through as [`SearchError::BackendUnavailable`]. None are retried.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The semantic and keyword weights are negative, non-finite, or do not sum to 1.
    #[error("Invalid weights: semantic ({semantic}) + keyword ({keyword}) must be non-negative and sum to 1")]
    InvalidWeights {
        /// The requested semantic weight.
        semantic: f64,
        /// The requested keyword weight.
        keyword: f64,
    },

    /// A vector's length does not match the configured embedding dimension.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The dimension configured for the corpus.
        expected: usize,
        /// The dimension that was supplied.
        actual: usize,
    },

    /// A vector component is NaN or infinite.
    #[error("Embedding component {index} is not finite ({value})")]
    NonFiniteEmbedding {
        /// Position of the first offending component.
        index: usize,
        /// The offending value.
        value: f32,
    },

    /// The query text is empty or whitespace-only.
    #[error("Query text must not be empty")]
    EmptyQuery,

    /// The requested result count is zero.
    #[error("Limit must be greater than zero")]
    InvalidLimit,

    /// The underlying store failed (connection loss, timeout, malformed response).
    #[error("Backend unavailable ({backend}): {message}")]
    BackendUnavailable {
        /// The store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The store rejected a write because of a data integrity rule.
    #[error("Integrity error ({backend}): {message}")]
    Integrity {
        /// The store backend that produced the error.
        backend: String,
        /// A description of the violated rule.
        message: String,
    },

    /// An error occurred during query embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SearchError {
    pub(crate) fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendUnavailable { backend: backend.into(), message: message.into() }
    }

    /// Whether the error was caused by caller input rather than the backend.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidWeights { .. }
                | Self::DimensionMismatch { .. }
                | Self::NonFiniteEmbedding { .. }
                | Self::EmptyQuery
                | Self::InvalidLimit
        )
    }
}

/// A convenience result type for search operations.
pub type Result<T> = std::result::Result<T, SearchError>;
