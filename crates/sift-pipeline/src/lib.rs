//! # sift-pipeline
//!
//! The ingest side of the sift data plane: drive one end-to-end run that
//! streams documents from a loader, splits each into chunks, embeds the
//! chunks in batches, and replaces the document's stored generation in a
//! single transaction.
//!
//! Failures are isolated per document: a document that keeps failing after
//! the retry budget is recorded in the run's [`IngestResult`] and the run
//! moves on. Only two things end a run early: an error from the loader
//! stream itself, and the caller's cancellation token.
//!
//! Embedding always completes before the store transaction opens; the sink
//! receives fully embedded chunks and a failed embed never touches the
//! database.

pub mod error;
pub mod loader;
pub mod pipeline;
pub mod sink;

#[cfg(test)]
mod test_support;

pub use error::{IngestError, LoaderError};
pub use loader::{DocumentLoader, DocumentStream};
pub use pipeline::{
    AttemptReport, DocumentFailure, IngestPipeline, IngestProgress, IngestResult, PipelineConfig,
};
pub use sink::ChunkSink;
