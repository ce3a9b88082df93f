//! Embedder error taxonomy.

use std::time::Duration;

use thiserror::Error;

/// Failure from an embedding provider or adapter.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// The input text was empty or otherwise unembeddable. Not retriable.
    #[error("invalid embedder input: {0}")]
    InvalidInput(String),

    /// The credentials were rejected. Not retriable.
    #[error("embedding request unauthorized")]
    Unauthorized,

    /// The provider throttled the request. Retriable; `retry_after` carries
    /// the provider's pacing hint when it sent one.
    #[error("embedding rate limit exceeded")]
    RateLimited { retry_after: Option<Duration> },

    /// The account's quota is exhausted. Not retriable.
    #[error("embedding quota exceeded")]
    QuotaExceeded,

    /// Provider-side error. Retriable when the status is a 5xx.
    #[error("embedding API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The provider answered 200 but the payload was unusable (wrong count,
    /// wrong dimensionality, non-finite values). Not retriable.
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    /// The request exceeded the per-call timeout. Retriable.
    #[error("embedding request timed out")]
    Timeout,

    /// Transport-level failure (connection reset, DNS, TLS). Retriable.
    #[error("embedding transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl EmbedError {
    /// Whether the pipeline's retry policy may re-attempt after this error.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Timeout | Self::Transport(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::InvalidInput(_)
            | Self::Unauthorized
            | Self::QuotaExceeded
            | Self::InvalidResponse(_) => false,
        }
    }

    /// The provider's pacing hint, if this is a rate-limit error carrying
    /// one.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}
