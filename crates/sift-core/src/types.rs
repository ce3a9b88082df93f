//! Data-plane value types: documents, chunks, and query results.

use serde::{Deserialize, Serialize};

/// A source document as produced by a loader: opaque text plus the caller's
/// typed metadata record.
#[derive(Debug, Clone)]
pub struct Document<M> {
    /// Full document text. Loaders must not yield empty content.
    pub content: String,
    /// Caller metadata; `metadata.document_key` identifies the document
    /// within its source scope.
    pub metadata: M,
}

impl<M> Document<M> {
    pub fn new(content: impl Into<String>, metadata: M) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }
}

/// A fragment of one document's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Trimmed, non-empty fragment text.
    pub content: String,
    /// Position within the document: dense, starting at 0, increasing in
    /// emission order.
    pub index: u32,
}

impl Chunk {
    pub fn new(content: impl Into<String>, index: u32) -> Self {
        Self {
            content: content.into(),
            index,
        }
    }
}

/// A chunk annotated with its embedding vector. Dimensionality is fixed per
/// configured embedder; the table DDL declares it, the store does not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    pub content: String,
    pub index: u32,
    pub embedding: Vec<f32>,
}

impl EmbeddedChunk {
    #[must_use]
    pub fn new(chunk: Chunk, embedding: Vec<f32>) -> Self {
        Self {
            content: chunk.content,
            index: chunk.index,
            embedding,
        }
    }
}

/// One ranked search hit.
#[derive(Debug, Clone)]
pub struct QueryResult<M> {
    pub chunk: Chunk,
    /// Similarity to the query, clamped into `[0, 1]`.
    pub similarity: f64,
    pub metadata: M,
}
