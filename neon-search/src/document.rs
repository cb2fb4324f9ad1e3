//! Data types for documents, embedding chunks, and ranked results.

use serde::{Deserialize, Serialize};

/// Identifier of a [`Document`].
pub type DocumentId = i64;

/// Identifier of an [`EmbeddingChunk`].
pub type ChunkId = i64;

/// A source document. Its searchable text is derived from `title` and
/// `content` by the store and is never set by callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: DocumentId,
    /// The document title.
    pub title: String,
    /// The full text content.
    pub content: String,
    /// Optional URL pointing to the original source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Optional JSON metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

/// A document to insert; the store assigns the identifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NewDocument {
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

impl NewDocument {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self { title: title.into(), content: content.into(), ..Default::default() }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }
}

/// A slice of a [`Document`] with its vector embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingChunk {
    /// Unique identifier for the chunk.
    pub id: ChunkId,
    /// The ID of the owning [`Document`].
    pub document_id: DocumentId,
    /// Zero-based position among the chunks of the same document.
    pub chunk_index: i32,
    /// The chunk text.
    pub chunk: String,
    /// The semantic embedding of `chunk`.
    pub embedding: Vec<f32>,
}

/// A chunk to insert; the store assigns the identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewEmbeddingChunk {
    pub document_id: DocumentId,
    pub chunk_index: i32,
    pub chunk: String,
    pub embedding: Vec<f32>,
}

impl NewEmbeddingChunk {
    pub fn new(
        document_id: DocumentId,
        chunk_index: i32,
        chunk: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        Self { document_id, chunk_index, chunk: chunk.into(), embedding }
    }
}

/// The columns every retrieval returns for a chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkRow {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub chunk: String,
    /// Title of the owning document.
    pub title: String,
}

/// A nearest-neighbour hit. Smaller distance means more similar.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub row: ChunkRow,
    /// Cosine distance to the query vector.
    pub distance: f64,
}

/// A full-text match with its relevance score (higher is more relevant).
#[derive(Debug, Clone, PartialEq)]
pub struct TextHit {
    pub row: ChunkRow,
    pub relevance: f64,
}

/// A fused hybrid search result.
///
/// Both component scores are kept alongside the combined score so callers
/// can tune weights.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RankedResult {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub chunk: String,
    pub title: String,
    /// `1 - distance`, or 0 if the chunk was not a semantic candidate.
    pub semantic_score: f64,
    /// Raw text relevance, or 0 if the chunk was not a keyword candidate.
    pub keyword_score: f64,
    pub combined_score: f64,
}

/// A semantic-only search result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SemanticResult {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub chunk: String,
    pub title: String,
    pub similarity: f64,
}

/// A keyword-only search result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KeywordResult {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub chunk: String,
    pub title: String,
    pub relevance: f64,
}

impl From<VectorHit> for SemanticResult {
    fn from(hit: VectorHit) -> Self {
        let ChunkRow { chunk_id, document_id, chunk, title } = hit.row;
        Self { id: chunk_id, document_id, chunk, title, similarity: 1.0 - hit.distance }
    }
}

impl From<TextHit> for KeywordResult {
    fn from(hit: TextHit) -> Self {
        let ChunkRow { chunk_id, document_id, chunk, title } = hit.row;
        Self { id: chunk_id, document_id, chunk, title, relevance: hit.relevance }
    }
}
