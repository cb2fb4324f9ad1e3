//! Configuration for the hybrid ranker.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

/// Embedding dimension of OpenAI `text-embedding-3-small`.
pub const DEFAULT_DIMENSIONS: usize = 1536;

/// Number of results returned when a request does not set a limit.
pub const DEFAULT_LIMIT: usize = 10;

pub const DEFAULT_SEMANTIC_WEIGHT: f64 = 0.7;
pub const DEFAULT_KEYWORD_WEIGHT: f64 = 0.3;

/// Postgres text search configuration used for keyword matching.
pub const DEFAULT_TEXT_SEARCH_CONFIG: &str = "english";

/// Allowed deviation of `semantic_weight + keyword_weight` from 1.
pub const WEIGHT_TOLERANCE: f64 = 1e-9;

/// Configuration parameters for the hybrid ranker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    /// Fixed embedding dimension of the corpus.
    pub dimensions: usize,
    /// Result count used when a request leaves the limit unset.
    pub default_limit: usize,
    /// Default weight of the semantic RRF term.
    pub semantic_weight: f64,
    /// Default weight of the keyword RRF term.
    pub keyword_weight: f64,
    /// Postgres `regconfig` name passed to `websearch_to_tsquery`.
    pub text_search_config: String,
    /// Upper bound on the candidate retrieval phase of a single call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<Duration>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_DIMENSIONS,
            default_limit: DEFAULT_LIMIT,
            semantic_weight: DEFAULT_SEMANTIC_WEIGHT,
            keyword_weight: DEFAULT_KEYWORD_WEIGHT,
            text_search_config: DEFAULT_TEXT_SEARCH_CONFIG.to_string(),
            request_timeout: None,
        }
    }
}

impl SearchConfig {
    /// Create a new builder for constructing a [`SearchConfig`].
    pub fn builder() -> SearchConfigBuilder {
        SearchConfigBuilder::default()
    }

    /// Build a configuration from `NEON_SEARCH_*` environment variables,
    /// falling back to defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if a variable cannot be parsed or the
    /// resulting configuration is invalid.
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::builder();
        if let Some(dims) = env_parse::<usize>("NEON_SEARCH_DIMENSIONS")? {
            builder = builder.dimensions(dims);
        }
        if let Some(limit) = env_parse::<usize>("NEON_SEARCH_LIMIT")? {
            builder = builder.default_limit(limit);
        }
        let semantic = env_parse::<f64>("NEON_SEARCH_SEMANTIC_WEIGHT")?;
        let keyword = env_parse::<f64>("NEON_SEARCH_KEYWORD_WEIGHT")?;
        match (semantic, keyword) {
            (Some(s), Some(k)) => builder = builder.weights(s, k),
            (Some(s), None) => builder = builder.weights(s, 1.0 - s),
            (None, Some(k)) => builder = builder.weights(1.0 - k, k),
            (None, None) => {}
        }
        if let Ok(ts_config) = std::env::var("NEON_SEARCH_TS_CONFIG") {
            builder = builder.text_search_config(ts_config);
        }
        if let Some(ms) = env_parse::<u64>("NEON_SEARCH_TIMEOUT_MS")? {
            builder = builder.request_timeout(Duration::from_millis(ms));
        }
        builder.build()
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if:
    /// - `dimensions == 0`
    /// - `default_limit == 0`
    /// - `text_search_config` is empty
    ///
    /// Returns [`SearchError::InvalidWeights`] if the weights are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.dimensions == 0 {
            return Err(SearchError::Config("dimensions must be greater than zero".to_string()));
        }
        if self.default_limit == 0 {
            return Err(SearchError::Config("default_limit must be greater than zero".to_string()));
        }
        if self.text_search_config.trim().is_empty() {
            return Err(SearchError::Config("text_search_config must not be empty".to_string()));
        }
        validate_weights(self.semantic_weight, self.keyword_weight)
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| SearchError::Config(format!("{key}={raw:?} is invalid: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Check that two RRF weights are non-negative, finite and sum to 1.
///
/// # Errors
///
/// Returns [`SearchError::InvalidWeights`] otherwise.
pub fn validate_weights(semantic: f64, keyword: f64) -> Result<()> {
    let valid = semantic.is_finite()
        && keyword.is_finite()
        && semantic >= 0.0
        && keyword >= 0.0
        && ((semantic + keyword) - 1.0).abs() <= WEIGHT_TOLERANCE;
    if valid { Ok(()) } else { Err(SearchError::InvalidWeights { semantic, keyword }) }
}

/// Builder for constructing a validated [`SearchConfig`].
#[derive(Debug, Clone, Default)]
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    /// Set the embedding dimension of the corpus.
    pub fn dimensions(mut self, dimensions: usize) -> Self {
        self.config.dimensions = dimensions;
        self
    }

    /// Set the result count used when a request does not specify one.
    pub fn default_limit(mut self, limit: usize) -> Self {
        self.config.default_limit = limit;
        self
    }

    /// Set the default semantic and keyword weights.
    pub fn weights(mut self, semantic: f64, keyword: f64) -> Self {
        self.config.semantic_weight = semantic;
        self.config.keyword_weight = keyword;
        self
    }

    /// Set the Postgres text search configuration (e.g. `english`, `simple`).
    pub fn text_search_config(mut self, name: impl Into<String>) -> Self {
        self.config.text_search_config = name.into();
        self
    }

    /// Bound the time spent in candidate retrieval per call.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    /// Build the [`SearchConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`SearchConfig::validate`].
    pub fn build(self) -> Result<SearchConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SearchConfig::builder().build().unwrap();
        assert_eq!(config, SearchConfig::default());
        assert_eq!(config.dimensions, 1536);
        assert_eq!(config.default_limit, 10);
    }

    #[test]
    fn rejects_zero_dimensions_and_limit() {
        assert!(matches!(
            SearchConfig::builder().dimensions(0).build(),
            Err(SearchError::Config(_))
        ));
        assert!(matches!(
            SearchConfig::builder().default_limit(0).build(),
            Err(SearchError::Config(_))
        ));
    }

    #[test]
    fn weights_must_sum_to_one() {
        assert!(validate_weights(0.7, 0.3).is_ok());
        assert!(validate_weights(1.0, 0.0).is_ok());
        assert!(validate_weights(0.1 + 0.2, 0.7).is_ok());
        assert!(matches!(
            validate_weights(0.7, 0.4),
            Err(SearchError::InvalidWeights { .. })
        ));
        assert!(validate_weights(1.2, -0.2).is_err());
        assert!(validate_weights(f64::NAN, 0.3).is_err());
        assert!(SearchConfig::builder().weights(0.5, 0.6).build().is_err());
    }
}
