//! # neon-search
//!
//! Hybrid search for Postgres corpora stored on Neon: pgvector semantic
//! retrieval and full-text keyword retrieval fused with weighted Reciprocal
//! Rank Fusion.
//!
//! ## Overview
//!
//! - [`HybridRanker`] validates requests, runs both retrievals concurrently
//!   and fuses them
//! - [`fusion`] holds the pure RRF math over two ranked candidate lists
//! - [`SearchStore`] abstracts the document/embedding store
//! - [`InMemorySearchStore`] is a complete store for development and tests
//! - `pgvector::PgSearchStore` (feature `pgvector`) runs against Postgres
//! - `openai::OpenAIEmbeddingProvider` (feature `openai`) embeds query text
//!
//! ## Features
//!
//! - `pgvector` – Postgres store via `sqlx`
//! - `openai` – OpenAI query embeddings via `reqwest`
//! - `full` – everything

pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod fusion;
pub mod inmemory;
pub mod ranker;
pub mod store;
pub mod text;

#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "pgvector")]
pub mod pgvector;

pub use config::{SearchConfig, SearchConfigBuilder};
pub use document::{
    ChunkId, ChunkRow, Document, DocumentId, EmbeddingChunk, KeywordResult, NewDocument,
    NewEmbeddingChunk, RankedResult, SemanticResult, TextHit, VectorHit,
};
pub use embedding::EmbeddingProvider;
pub use error::{Result, SearchError};
pub use fusion::RRF_K;
pub use inmemory::InMemorySearchStore;
pub use ranker::{HybridQuery, HybridRanker, HybridRankerBuilder};
pub use store::SearchStore;

#[cfg(feature = "openai")]
pub use openai::OpenAIEmbeddingProvider;
#[cfg(feature = "pgvector")]
pub use pgvector::PgSearchStore;
