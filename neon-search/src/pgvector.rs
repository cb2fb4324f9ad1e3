//! pgvector (PostgreSQL) search store backend.
//!
//! Provides [`PgSearchStore`] which implements [`SearchStore`] using
//! [sqlx](https://docs.rs/sqlx) against a Postgres database (for example a
//! Neon branch) with the [pgvector](https://github.com/pgvector/pgvector)
//! extension and built-in full-text search.
//!
//! # Schema
//!
//! [`PgSearchStore::migrate`] creates:
//!
//! - `documents` with a generated `fts tsvector` column over title and
//!   content, indexed with GIN
//! - `embeddings` with a `vector(N)` column indexed with HNSW
//!   (`vector_cosine_ops`) and a `document_id` foreign key with
//!   `ON DELETE CASCADE`
//!
//! # Example
//!
//! ```rust,ignore
//! use neon_search::pgvector::PgSearchStore;
//!
//! let store = PgSearchStore::connect(&std::env::var("DATABASE_URL")?, config).await?;
//! store.migrate().await?;
//! let hits = store.nearest_by_vector(&query_embedding, 20).await?;
//! ```

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::config::SearchConfig;
use crate::document::{
    ChunkId, ChunkRow, DocumentId, NewDocument, NewEmbeddingChunk, TextHit, VectorHit,
};
use crate::error::{Result, SearchError};
use crate::store::{SearchStore, check_embedding};

const BACKEND: &str = "pgvector";

const MAX_CONNECTIONS: u32 = 5;

/// A [`SearchStore`] backed by PostgreSQL with the pgvector extension.
#[derive(Debug, Clone)]
pub struct PgSearchStore {
    pool: PgPool,
    dimensions: usize,
    text_search_config: String,
}

impl PgSearchStore {
    /// Connect to the given database URL.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::BackendUnavailable`] if the connection fails.
    pub async fn connect(database_url: &str, config: &SearchConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(database_url)
            .await
            .map_err(Self::map_err)?;
        Ok(Self::from_pool(pool, config))
    }

    /// Create a store from an existing connection pool.
    pub fn from_pool(pool: PgPool, config: &SearchConfig) -> Self {
        Self {
            pool,
            dimensions: config.dimensions,
            text_search_config: config.text_search_config.clone(),
        }
    }

    fn map_err(e: sqlx::Error) -> SearchError {
        SearchError::backend(BACKEND, e.to_string())
    }

    /// Convert an identifier to the `SERIAL` column type. Identifiers outside
    /// its range cannot exist in the table.
    fn serial_id(id: i64) -> Option<i32> {
        i32::try_from(id).ok()
    }

    fn sql_limit(k: usize) -> i64 {
        i64::try_from(k).unwrap_or(i64::MAX)
    }

    /// Render a vector in pgvector's text input format, e.g. `[1,2.5,3]`.
    fn vector_literal(embedding: &[f32]) -> String {
        let parts: Vec<String> = embedding.iter().map(f32::to_string).collect();
        format!("[{}]", parts.join(","))
    }

    /// Create the extension, tables and indexes. Safe to run repeatedly.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::BackendUnavailable`] if any statement fails.
    pub async fn migrate(&self) -> Result<()> {
        // regconfig names cannot be bound as parameters inside a generated
        // column expression.
        let ts_config = self.text_search_config.replace('\'', "''");
        let dimensions = self.dimensions;

        let statements = [
            "CREATE EXTENSION IF NOT EXISTS vector".to_string(),
            format!(
                "CREATE TABLE IF NOT EXISTS documents (\
                    id SERIAL PRIMARY KEY, \
                    title TEXT NOT NULL, \
                    content TEXT NOT NULL, \
                    url VARCHAR(2048), \
                    fts TSVECTOR GENERATED ALWAYS AS (\
                        to_tsvector('{ts_config}', coalesce(title, '') || ' ' || coalesce(content, ''))\
                    ) STORED, \
                    metadata TEXT, \
                    created_at TIMESTAMPTZ NOT NULL DEFAULT now(), \
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()\
                )"
            ),
            "CREATE INDEX IF NOT EXISTS documents_fts_idx ON documents USING gin (fts)".to_string(),
            format!(
                "CREATE TABLE IF NOT EXISTS embeddings (\
                    id SERIAL PRIMARY KEY, \
                    document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE, \
                    chunk_index INTEGER NOT NULL DEFAULT 0, \
                    chunk TEXT NOT NULL, \
                    embedding vector({dimensions}) NOT NULL, \
                    created_at TIMESTAMPTZ NOT NULL DEFAULT now()\
                )"
            ),
            "CREATE INDEX IF NOT EXISTS embeddings_vector_idx \
                ON embeddings USING hnsw (embedding vector_cosine_ops)"
                .to_string(),
            "CREATE INDEX IF NOT EXISTS embeddings_document_idx ON embeddings (document_id)"
                .to_string(),
        ];

        for statement in &statements {
            sqlx::query(statement).execute(&self.pool).await.map_err(Self::map_err)?;
        }

        debug!(dimensions, ts_config = %self.text_search_config, "migrated search schema");
        Ok(())
    }

    /// Insert a document and return its identifier.
    pub async fn insert_document(&self, document: &NewDocument) -> Result<DocumentId> {
        let row = sqlx::query(
            "INSERT INTO documents (title, content, url, metadata) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(&document.title)
        .bind(&document.content)
        .bind(&document.url)
        .bind(&document.metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(Self::map_err)?;

        let id: i32 = row.get("id");
        Ok(i64::from(id))
    }

    /// Insert an embedding chunk and return its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::DimensionMismatch`] or
    /// [`SearchError::NonFiniteEmbedding`] before touching the database if the
    /// embedding is malformed, and [`SearchError::Integrity`] if the document
    /// id is outside the `SERIAL` range.
    pub async fn insert_chunk(&self, chunk: &NewEmbeddingChunk) -> Result<ChunkId> {
        check_embedding(self.dimensions, &chunk.embedding)?;
        let document_id = Self::serial_id(chunk.document_id).ok_or_else(|| SearchError::Integrity {
            backend: BACKEND.to_string(),
            message: format!("document {} does not exist", chunk.document_id),
        })?;

        let row = sqlx::query(
            "INSERT INTO embeddings (document_id, chunk_index, chunk, embedding) \
             VALUES ($1, $2, $3, $4::vector) RETURNING id",
        )
        .bind(document_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.chunk)
        .bind(Self::vector_literal(&chunk.embedding))
        .fetch_one(&self.pool)
        .await
        .map_err(Self::map_err)?;

        let id: i32 = row.get("id");
        Ok(i64::from(id))
    }

    /// Delete a document; its embeddings are removed by the foreign key cascade.
    ///
    /// Returns whether a document was deleted.
    pub async fn delete_document(&self, id: DocumentId) -> Result<bool> {
        let Some(id) = Self::serial_id(id) else {
            return Ok(false);
        };
        let result = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Self::map_err)?;
        Ok(result.rows_affected() > 0)
    }
}

fn chunk_row(row: &sqlx::postgres::PgRow) -> std::result::Result<ChunkRow, sqlx::Error> {
    let chunk_id: i32 = row.try_get("id")?;
    let document_id: i32 = row.try_get("document_id")?;
    Ok(ChunkRow {
        chunk_id: i64::from(chunk_id),
        document_id: i64::from(document_id),
        chunk: row.try_get("chunk")?,
        title: row.try_get("title")?,
    })
}

#[async_trait]
impl SearchStore for PgSearchStore {
    fn backend_name(&self) -> &str {
        BACKEND
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn nearest_by_vector(&self, embedding: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        // <=> is cosine distance: 0 = identical
        let rows = sqlx::query(
            "SELECT e.id, e.document_id, e.chunk, d.title, \
                    (e.embedding <=> $1::vector)::float8 AS distance \
             FROM embeddings e \
             JOIN documents d ON e.document_id = d.id \
             ORDER BY e.embedding <=> $1::vector, e.id \
             LIMIT $2",
        )
        .bind(Self::vector_literal(embedding))
        .bind(Self::sql_limit(k))
        .fetch_all(&self.pool)
        .await
        .map_err(Self::map_err)?;

        rows.iter()
            .map(|row| {
                Ok(VectorHit { row: chunk_row(row)?, distance: row.try_get("distance")? })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(Self::map_err)
    }

    async fn match_by_text(&self, query: &str, k: usize) -> Result<Vec<TextHit>> {
        let rows = sqlx::query(
            "SELECT e.id, e.document_id, e.chunk, d.title, \
                    ts_rank(d.fts, websearch_to_tsquery($1::regconfig, $2))::float8 AS relevance \
             FROM embeddings e \
             JOIN documents d ON e.document_id = d.id \
             WHERE d.fts @@ websearch_to_tsquery($1::regconfig, $2) \
             ORDER BY relevance DESC, e.id \
             LIMIT $3",
        )
        .bind(&self.text_search_config)
        .bind(query)
        .bind(Self::sql_limit(k))
        .fetch_all(&self.pool)
        .await
        .map_err(Self::map_err)?;

        rows.iter()
            .map(|row| {
                Ok(TextHit { row: chunk_row(row)?, relevance: row.try_get("relevance")? })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(Self::map_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_literal_format() {
        assert_eq!(PgSearchStore::vector_literal(&[1.0, 2.5, -3.0]), "[1,2.5,-3]");
        assert_eq!(PgSearchStore::vector_literal(&[]), "[]");
    }

    #[test]
    fn ids_and_limits_never_wrap() {
        assert_eq!(PgSearchStore::serial_id(7), Some(7));
        assert_eq!(PgSearchStore::serial_id((1i64 << 32) + 1), None);
        assert_eq!(PgSearchStore::serial_id(-(1i64 << 40)), None);
        assert_eq!(PgSearchStore::sql_limit(20), 20);
        assert_eq!(PgSearchStore::sql_limit(usize::MAX), i64::MAX);
    }

    fn lazy_store() -> PgSearchStore {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/neon_search")
            .unwrap();
        PgSearchStore::from_pool(pool, &SearchConfig::builder().dimensions(2).build().unwrap())
    }

    #[tokio::test]
    async fn out_of_range_document_ids_are_not_truncated() {
        let store = lazy_store();

        // Both return before any connection is attempted.
        assert!(!store.delete_document((1i64 << 32) + 1).await.unwrap());
        assert!(matches!(
            store.insert_chunk(&NewEmbeddingChunk::new((1i64 << 32) + 1, 0, "c", vec![1.0, 0.0])).await,
            Err(SearchError::Integrity { .. })
        ));
        assert!(matches!(
            store.insert_chunk(&NewEmbeddingChunk::new(1, 0, "c", vec![f32::NAN, 0.0])).await,
            Err(SearchError::NonFiniteEmbedding { index: 0, .. })
        ));
    }
}
