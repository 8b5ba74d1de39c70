//! Data types for chunks, vector records, references, and reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Page-level metadata attached to a [`Chunk`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    /// 1-indexed page number the chunk was cut from.
    pub page: u32,
}

/// A token window of one page's text.
///
/// Produced by a [`Chunker`](crate::chunking::Chunker) without an embedding;
/// the embedding is attached during ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// The decoded text of the window.
    pub text: String,
    /// Page metadata.
    pub metadata: ChunkMetadata,
    /// The vector embedding, once computed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// A chunk persisted in the chunk store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredChunk {
    /// The owning document.
    pub document_id: String,
    /// The owning user.
    pub user_id: String,
    /// The original file name of the document.
    pub filename: String,
    /// Position of the chunk within its document, in creation order.
    pub chunk_index: usize,
    /// The chunk text.
    pub text: String,
    /// Page metadata.
    pub metadata: ChunkMetadata,
    /// The chunk embedding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Metadata stored alongside every vector in the index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorMetadata {
    pub document_id: String,
    pub user_id: String,
    pub filename: String,
    pub page_num: u32,
    pub chunk_index: usize,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// A vector and its metadata, keyed by a deterministic id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorRecord {
    /// `{document_id}_chunk_{chunk_index}`, see [`vector_id`].
    pub id: String,
    /// The embedding values.
    pub values: Vec<f32>,
    /// The record metadata.
    pub metadata: VectorMetadata,
}

impl VectorRecord {
    /// Build the record for a stored chunk.
    ///
    /// Returns `None` when the chunk has no embedding.
    pub fn from_stored_chunk(chunk: &StoredChunk, timestamp: DateTime<Utc>) -> Option<Self> {
        let values = chunk.embedding.clone()?;
        Some(Self {
            id: vector_id(&chunk.document_id, chunk.chunk_index),
            values,
            metadata: VectorMetadata {
                document_id: chunk.document_id.clone(),
                user_id: chunk.user_id.clone(),
                filename: chunk.filename.clone(),
                page_num: chunk.metadata.page,
                chunk_index: chunk.chunk_index,
                text: chunk.text.clone(),
                timestamp,
            },
        })
    }
}

/// The vector record id for a chunk.
///
/// Deterministic in `(document_id, chunk_index)`, so re-upserting a chunk
/// overwrites its previous vector and deletion can address ids directly.
pub fn vector_id(document_id: &str, chunk_index: usize) -> String {
    format!("{document_id}_chunk_{chunk_index}")
}

/// A nearest-neighbour match returned by a vector store query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorMatch {
    pub id: String,
    /// Similarity score (higher is more similar).
    pub score: f32,
    pub metadata: VectorMetadata,
}

/// An equality predicate on vector metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetadataFilter {
    /// Only match vectors belonging to this document.
    pub document_id: String,
}

impl MetadataFilter {
    /// Filter on a single document id.
    pub fn document(document_id: impl Into<String>) -> Self {
        Self { document_id: document_id.into() }
    }

    /// Whether the metadata satisfies this filter.
    pub fn matches(&self, metadata: &VectorMetadata) -> bool {
        metadata.document_id == self.document_id
    }
}

/// A citation surfaced alongside an answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reference {
    pub text: String,
    pub filename: String,
    pub page_num: u32,
    pub document_id: String,
    /// Similarity of the cited chunk to the search input, in `[-1, 1]`.
    pub similarity_score: f64,
}

impl From<&VectorMatch> for Reference {
    fn from(m: &VectorMatch) -> Self {
        Self {
            text: m.metadata.text.clone(),
            filename: m.metadata.filename.clone(),
            page_num: m.metadata.page_num,
            document_id: m.metadata.document_id.clone(),
            similarity_score: f64::from(m.score),
        }
    }
}

/// One uploaded document as seen in a user's file list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentSummary {
    pub document_id: String,
    pub filename: String,
    pub user_id: String,
}

/// Outcome of ingesting one document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestReport {
    pub document_id: String,
    pub filename: String,
    pub page_count: usize,
    pub chunk_count: usize,
    pub vector_count: usize,
}

/// Outcome of deleting one document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeletionReport {
    pub document_id: String,
    pub filename: String,
    pub chunks_deleted: u64,
    pub vectors_deleted: u64,
}
