//! The document producer contract.
//!
//! A loader is an asynchronous producer of documents: crawling a repository,
//! walking an export, paging an API. The pipeline consumes the stream until
//! it ends; it may be finite or unbounded. Producers own their source-side
//! rate limiting and retries, and must not yield documents with empty
//! content.

use futures::stream::BoxStream;

use sift_core::types::Document;

use crate::error::LoaderError;

/// The stream shape every loader produces.
pub type DocumentStream<'a, S> = BoxStream<'a, Result<Document<S>, LoaderError>>;

/// An asynchronous source of documents.
///
/// An `Err` item terminates the ingest run; per-document failures the
/// producer can recover from should be handled (or skipped) inside the
/// loader instead.
pub trait DocumentLoader: Send + Sync {
    /// Metadata type carried by produced documents.
    type Metadata;
    /// Loader-specific load parameters (a path, a cursor, a query).
    type Params;

    /// Start producing documents lazily.
    fn load(&self, params: Self::Params) -> DocumentStream<'_, Self::Metadata>;
}
