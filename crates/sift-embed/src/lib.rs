//! # sift-embed
//!
//! Text-to-vector embedding for the sift data plane.
//!
//! The [`Embedder`] trait is the seam every other crate programs against:
//! the query service embeds questions through it, the ingest pipeline embeds
//! chunk batches through it. [`RemoteEmbedder`] is the reference adapter for
//! a hosted embedding API over HTTPS with a bearer token; [`StubEmbedder`]
//! is a deterministic test double.
//!
//! Adapters are stateless from the caller's perspective. Transient provider
//! failures (rate limits, 5xx, timeouts) are retried internally with
//! exponential backoff; everything else surfaces immediately as a typed
//! [`EmbedError`].

pub mod error;
pub mod remote;
pub mod stub;

use async_trait::async_trait;

pub use error::EmbedError;
pub use remote::{RemoteEmbedder, RemoteEmbedderConfig};
pub use stub::StubEmbedder;

/// Converts text into fixed-dimension vectors of finite floats.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single non-empty text.
    ///
    /// # Errors
    ///
    /// Returns [`EmbedError::InvalidInput`] for empty text, or a provider
    /// error that survived the adapter's internal retries.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Embed a batch of texts, preserving order: `result[i]` is the vector
    /// for `texts[i]`. An empty batch returns an empty vector without any
    /// external call.
    ///
    /// # Errors
    ///
    /// Same failure surface as [`embed`](Embedder::embed).
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}
