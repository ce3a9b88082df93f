//! Per-document and run-level ingest errors.

use thiserror::Error;

use sift_core::error::ValidationError;
use sift_embed::EmbedError;
use sift_store::StoreError;

/// Failure raised by a document loader's stream. Always terminates the run;
/// per-document retry never applies to the source itself.
#[derive(Debug, Error)]
#[error("document loader failed: {0}")]
pub struct LoaderError(#[from] pub anyhow::Error);

impl LoaderError {
    /// Wrap any error as a loader failure.
    pub fn new(error: impl Into<anyhow::Error>) -> Self {
        Self(error.into())
    }
}

/// Failure while ingesting one document (or, for [`IngestError::Loader`],
/// the stream itself).
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Loader(#[from] LoaderError),
}

impl IngestError {
    /// Whether the per-document retry policy may re-attempt.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Embed(e) => e.is_transient(),
            Self::Store(e) => e.is_transient(),
            Self::Validation(_) | Self::Loader(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transience_delegates_to_the_source_taxonomy() {
        let transient = IngestError::Embed(EmbedError::Timeout);
        assert!(transient.is_transient());

        let fatal = IngestError::Embed(EmbedError::QuotaExceeded);
        assert!(!fatal.is_transient());

        let loader = IngestError::Loader(LoaderError::new(std::io::Error::other("gone")));
        assert!(!loader.is_transient());
    }
}
