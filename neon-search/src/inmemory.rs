//! In-memory search store using cosine distance and lexeme matching.
//!
//! This module provides [`InMemorySearchStore`], a [`SearchStore`] backed by
//! `BTreeMap`s protected by a `tokio::sync::RwLock`. It is suitable for
//! development, testing, and small corpora.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::{
    ChunkId, ChunkRow, Document, DocumentId, EmbeddingChunk, NewDocument, NewEmbeddingChunk,
    TextHit, VectorHit,
};
use crate::error::{Result, SearchError};
use crate::store::{SearchStore, check_embedding};
use crate::text::{LexemeVector, TextQuery};

const BACKEND: &str = "InMemory";

#[derive(Debug)]
struct StoredDocument {
    document: Document,
    searchable: LexemeVector,
}

#[derive(Debug, Default)]
struct Corpus {
    documents: BTreeMap<DocumentId, StoredDocument>,
    chunks: BTreeMap<ChunkId, EmbeddingChunk>,
    next_document_id: DocumentId,
    next_chunk_id: ChunkId,
}

impl Corpus {
    fn title_of(&self, document_id: DocumentId) -> String {
        self.documents.get(&document_id).map(|d| d.document.title.clone()).unwrap_or_default()
    }

    fn row(&self, chunk: &EmbeddingChunk) -> ChunkRow {
        ChunkRow {
            chunk_id: chunk.id,
            document_id: chunk.document_id,
            chunk: chunk.chunk.clone(),
            title: self.title_of(chunk.document_id),
        }
    }
}

/// An in-memory [`SearchStore`].
///
/// Identifiers are assigned sequentially from 1. Each document's searchable
/// text is derived from its title and content and recomputed on update.
/// Deleting a document deletes its chunks.
///
/// # Example
///
/// ```rust,ignore
/// use neon_search::{InMemorySearchStore, NewDocument, NewEmbeddingChunk};
///
/// let store = InMemorySearchStore::new(3);
/// let doc = store.insert_document(NewDocument::new("Branching", "Neon branches are copy-on-write")).await;
/// store.insert_chunk(NewEmbeddingChunk::new(doc, 0, "Neon branches", vec![0.1, 0.2, 0.3])).await?;
/// ```
#[derive(Debug)]
pub struct InMemorySearchStore {
    dimensions: usize,
    corpus: RwLock<Corpus>,
    unavailable: AtomicBool,
}

impl InMemorySearchStore {
    /// Create a new empty store for embeddings of the given dimension.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            corpus: RwLock::new(Corpus { next_document_id: 1, next_chunk_id: 1, ..Default::default() }),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make subsequent reads fail with [`SearchError::BackendUnavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, AtomicOrdering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(AtomicOrdering::SeqCst) {
            return Err(SearchError::backend(BACKEND, "store is marked unavailable"));
        }
        Ok(())
    }

    /// Insert a document and return its identifier.
    pub async fn insert_document(&self, new: NewDocument) -> DocumentId {
        let mut corpus = self.corpus.write().await;
        let id = corpus.next_document_id;
        corpus.next_document_id += 1;
        let searchable = LexemeVector::for_document(&new.title, &new.content);
        let document = Document {
            id,
            title: new.title,
            content: new.content,
            url: new.url,
            metadata: new.metadata,
        };
        corpus.documents.insert(id, StoredDocument { document, searchable });
        debug!(document.id = id, "inserted document");
        id
    }

    /// Replace a document's title and content, recomputing its searchable text.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Integrity`] if the document does not exist.
    pub async fn update_document(
        &self,
        id: DocumentId,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<()> {
        let mut corpus = self.corpus.write().await;
        let stored = corpus.documents.get_mut(&id).ok_or_else(|| missing_document(id))?;
        stored.document.title = title.into();
        stored.document.content = content.into();
        stored.searchable =
            LexemeVector::for_document(&stored.document.title, &stored.document.content);
        Ok(())
    }

    /// Delete a document and all of its chunks.
    ///
    /// Returns the number of chunks removed, or `None` if the document did
    /// not exist.
    pub async fn delete_document(&self, id: DocumentId) -> Option<usize> {
        let mut corpus = self.corpus.write().await;
        corpus.documents.remove(&id)?;
        let before = corpus.chunks.len();
        corpus.chunks.retain(|_, chunk| chunk.document_id != id);
        let removed = before - corpus.chunks.len();
        debug!(document.id = id, chunks_removed = removed, "deleted document");
        Some(removed)
    }

    /// Insert an embedding chunk for an existing document.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::DimensionMismatch`] if the embedding has the
    /// wrong length, [`SearchError::NonFiniteEmbedding`] if a component is NaN
    /// or infinite, and [`SearchError::Integrity`] if the owning document does
    /// not exist.
    pub async fn insert_chunk(&self, new: NewEmbeddingChunk) -> Result<ChunkId> {
        check_embedding(self.dimensions, &new.embedding)?;
        let mut corpus = self.corpus.write().await;
        if !corpus.documents.contains_key(&new.document_id) {
            return Err(missing_document(new.document_id));
        }
        let id = corpus.next_chunk_id;
        corpus.next_chunk_id += 1;
        corpus.chunks.insert(
            id,
            EmbeddingChunk {
                id,
                document_id: new.document_id,
                chunk_index: new.chunk_index,
                chunk: new.chunk,
                embedding: new.embedding,
            },
        );
        Ok(id)
    }

    /// Look up a document by identifier.
    pub async fn document(&self, id: DocumentId) -> Option<Document> {
        self.corpus.read().await.documents.get(&id).map(|d| d.document.clone())
    }

    /// All chunks of a document ordered by chunk index.
    pub async fn chunks_for_document(&self, id: DocumentId) -> Vec<EmbeddingChunk> {
        let corpus = self.corpus.read().await;
        let mut chunks: Vec<EmbeddingChunk> =
            corpus.chunks.values().filter(|c| c.document_id == id).cloned().collect();
        chunks.sort_by_key(|c| (c.chunk_index, c.id));
        chunks
    }

    /// Total number of stored chunks.
    pub async fn chunk_count(&self) -> usize {
        self.corpus.read().await.chunks.len()
    }
}

fn missing_document(id: DocumentId) -> SearchError {
    SearchError::Integrity {
        backend: BACKEND.to_string(),
        message: format!("document {id} does not exist"),
    }
}

/// Compute cosine distance (`1 - cosine similarity`) between two vectors.
///
/// Returns 1.0 if either vector has zero magnitude.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let norm_a: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

#[async_trait]
impl SearchStore for InMemorySearchStore {
    fn backend_name(&self) -> &str {
        BACKEND
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn nearest_by_vector(&self, embedding: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        self.check_available()?;
        let corpus = self.corpus.read().await;

        let mut scored: Vec<(f64, &EmbeddingChunk)> = corpus
            .chunks
            .values()
            .map(|chunk| (cosine_distance(&chunk.embedding, embedding), chunk))
            .collect();

        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(distance, chunk)| VectorHit { row: corpus.row(chunk), distance })
            .collect())
    }

    async fn match_by_text(&self, query: &str, k: usize) -> Result<Vec<TextHit>> {
        self.check_available()?;
        let parsed = TextQuery::parse(query);
        if parsed.is_empty() {
            debug!(query, "text query has no lexemes");
            return Ok(Vec::new());
        }

        let corpus = self.corpus.read().await;

        let mut hits: Vec<(f64, &EmbeddingChunk)> = corpus
            .chunks
            .values()
            .filter_map(|chunk| {
                let document = corpus.documents.get(&chunk.document_id)?;
                parsed
                    .matches(&document.searchable)
                    .then(|| (parsed.rank(&document.searchable), chunk))
            })
            .collect();

        hits.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
        hits.truncate(k);

        Ok(hits
            .into_iter()
            .map(|(relevance, chunk)| TextHit { row: corpus.row(chunk), relevance })
            .collect())
    }
}
