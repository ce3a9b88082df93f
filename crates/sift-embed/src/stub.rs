//! Deterministic embedder double for tests.
//!
//! Returns one fixed vector for every text, so similarity-dependent
//! assertions are stable. Failures are scriptable: a poison substring makes
//! matching texts fail with a non-retriable error, and a transient-failure
//! budget makes the first N batch calls fail with a retriable 503.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use crate::Embedder;
use crate::error::EmbedError;

/// Scriptable [`Embedder`] double.
pub struct StubEmbedder {
    vector: Vec<f32>,
    poison: Option<String>,
    transient_budget: AtomicU32,
    batch_calls: AtomicU32,
}

impl StubEmbedder {
    /// A stub returning `vector` for every text.
    #[must_use]
    pub const fn fixed(vector: Vec<f32>) -> Self {
        Self {
            vector,
            poison: None,
            transient_budget: AtomicU32::new(0),
            batch_calls: AtomicU32::new(0),
        }
    }

    /// Any text containing `substring` fails with
    /// [`EmbedError::InvalidInput`] (non-retriable).
    #[must_use]
    pub fn with_poison(mut self, substring: impl Into<String>) -> Self {
        self.poison = Some(substring.into());
        self
    }

    /// The first `n` batch calls fail with a retriable 503.
    #[must_use]
    pub fn with_transient_failures(self, n: u32) -> Self {
        self.transient_budget.store(n, Ordering::SeqCst);
        self
    }

    /// Number of non-empty batch calls made so far.
    #[must_use]
    pub fn batch_calls(&self) -> u32 {
        self.batch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbedError::InvalidResponse("empty stub batch".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.batch_calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.transient_budget.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_budget.store(remaining - 1, Ordering::SeqCst);
            return Err(EmbedError::Api {
                status: 503,
                message: "stub transient failure".to_string(),
            });
        }

        if let Some(poison) = &self.poison
            && let Some(i) = texts.iter().position(|t| t.contains(poison))
        {
            return Err(EmbedError::InvalidInput(format!(
                "poisoned text at position {i}"
            )));
        }

        Ok(vec![self.vector.clone(); texts.len()])
    }
}
