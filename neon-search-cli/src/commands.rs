use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use neon_search::{
    EmbeddingProvider, HybridQuery, HybridRanker, OpenAIEmbeddingProvider, PgSearchStore,
    SearchConfig,
};
use serde::Serialize;
use tracing::info;

/// A connected store and the ranker over it.
pub struct Context {
    store: Arc<PgSearchStore>,
    ranker: HybridRanker,
}

impl Context {
    pub async fn connect(database_url: &str, dimensions: usize) -> Result<Self> {
        let mut config = SearchConfig::from_env().context("invalid search configuration")?;
        config.dimensions = dimensions;
        config.validate().context("invalid search configuration")?;

        let store = Arc::new(
            PgSearchStore::connect(database_url, &config)
                .await
                .context("failed to connect to database")?,
        );
        let ranker = HybridRanker::builder().config(config).store(store.clone()).build()?;
        Ok(Self { store, ranker })
    }

    pub async fn migrate(&self) -> Result<()> {
        self.store.migrate().await.context("migration failed")?;
        info!(dimensions = self.ranker.config().dimensions, "schema is up to date");
        Ok(())
    }

    /// Load a query embedding from `file`, or embed `query` with OpenAI.
    async fn query_embedding(&self, query: &str, file: Option<&Path>) -> Result<Vec<f32>> {
        let embedding: Vec<f32> = match file {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("{} is not a JSON array of numbers", path.display()))?
            }
            None => {
                let provider = OpenAIEmbeddingProvider::from_env()?
                    .with_dimensions(self.ranker.config().dimensions);
                provider.embed(query).await?
            }
        };
        Ok(embedding)
    }

    pub async fn search(
        &self,
        query: &str,
        embedding_file: Option<&Path>,
        limit: Option<usize>,
        weights: Option<(f64, f64)>,
    ) -> Result<()> {
        if query.trim().is_empty() {
            bail!("query must not be empty");
        }
        let mut request = HybridQuery::new(query, self.query_embedding(query, embedding_file).await?);
        request.limit = limit;
        if let Some((semantic, keyword)) = weights {
            request = request.with_weights(semantic, keyword);
        }
        print_json(&self.ranker.hybrid_search(&request).await?)
    }

    pub async fn semantic(
        &self,
        query: &str,
        embedding_file: Option<&Path>,
        limit: usize,
    ) -> Result<()> {
        let embedding = self.query_embedding(query, embedding_file).await?;
        print_json(&self.ranker.semantic_search(&embedding, limit).await?)
    }

    pub async fn keyword(&self, query: &str, limit: usize) -> Result<()> {
        print_json(&self.ranker.keyword_search(query, limit).await?)
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
