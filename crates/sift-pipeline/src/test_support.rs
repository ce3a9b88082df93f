//! Shared test fixtures: a concrete metadata type, its schema, and an
//! in-memory [`ChunkSink`] with scriptable transient failures.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use sift_core::field::FieldType;
use sift_core::schema::MetadataSchema;
use sift_core::types::EmbeddedChunk;
use sift_store::{DatabaseError, StoreError};

use crate::sink::ChunkSink;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct TestMetadata {
    pub path: String,
    #[serde(rename = "repositoryIndexDbId")]
    pub repository_index_db_id: i64,
}

pub(crate) fn test_schema() -> MetadataSchema {
    MetadataSchema::builder("path")
        .field("path", FieldType::Text)
        .field("repositoryIndexDbId", FieldType::Integer)
        .source_key("repositoryIndexDbId")
        .build()
        .unwrap()
}

/// In-memory sink with replace semantics keyed by the document path.
pub(crate) struct MemorySink {
    documents: Mutex<BTreeMap<String, Vec<EmbeddedChunk>>>,
    transient_budget: AtomicU32,
    writes: AtomicU32,
}

impl MemorySink {
    pub(crate) fn new() -> Self {
        Self {
            documents: Mutex::new(BTreeMap::new()),
            transient_budget: AtomicU32::new(0),
            writes: AtomicU32::new(0),
        }
    }

    /// The first `n` writes fail with a retriable database timeout.
    pub(crate) fn with_transient_failures(self, n: u32) -> Self {
        self.transient_budget.store(n, Ordering::SeqCst);
        self
    }

    pub(crate) fn chunks_for(&self, key: &str) -> Vec<EmbeddedChunk> {
        self.documents
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Total write attempts, including failed ones.
    pub(crate) fn writes(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    fn store(&self, key: String, chunks: &[EmbeddedChunk]) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let remaining = self.transient_budget.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_budget.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Database(DatabaseError::Timeout {
                operation: "insert",
            }));
        }
        self.documents.lock().unwrap().insert(key, chunks.to_vec());
        Ok(())
    }
}

#[async_trait]
impl ChunkSink<TestMetadata> for MemorySink {
    async fn replace_document(
        &self,
        metadata: &TestMetadata,
        chunks: &[EmbeddedChunk],
    ) -> Result<(), StoreError> {
        self.store(metadata.path.clone(), chunks)
    }
}

#[async_trait]
impl ChunkSink<serde_json::Value> for MemorySink {
    async fn replace_document(
        &self,
        metadata: &serde_json::Value,
        chunks: &[EmbeddedChunk],
    ) -> Result<(), StoreError> {
        let key = metadata
            .get("path")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("<unknown>")
            .to_string();
        self.store(key, chunks)
    }
}
