//! The pipeline's write seam.
//!
//! The pipeline writes through [`ChunkSink`] rather than a concrete store,
//! so its retry, batching, and isolation behavior is testable against an
//! in-memory sink. [`ChunkStore`] is the production implementation.

use async_trait::async_trait;
use serde::Serialize;

use sift_core::types::EmbeddedChunk;
use sift_store::{ChunkStore, StoreError};

/// Replaces the stored generation of one document with fully embedded
/// chunks, atomically.
#[async_trait]
pub trait ChunkSink<M>: Send + Sync {
    /// Replace every stored chunk of the document identified by
    /// `metadata`'s document key (within the sink's source scope) with
    /// `chunks`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`]; the pipeline classifies it for retry via
    /// [`StoreError::is_transient`].
    async fn replace_document(
        &self,
        metadata: &M,
        chunks: &[EmbeddedChunk],
    ) -> Result<(), StoreError>;
}

#[async_trait]
impl<M: Serialize + Send + Sync> ChunkSink<M> for ChunkStore<M> {
    async fn replace_document(
        &self,
        metadata: &M,
        chunks: &[EmbeddedChunk],
    ) -> Result<(), StoreError> {
        self.insert(metadata, chunks).await
    }
}
