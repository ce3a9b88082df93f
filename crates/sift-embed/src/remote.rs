//! Reference adapter for a hosted embedding API.
//!
//! Speaks the common `/embeddings` wire shape (model + input array in, one
//! vector per input out) over HTTPS with a bearer token. Transient failures
//! are retried with exponential backoff; a `Retry-After` header on a 429
//! overrides the backoff delay for that attempt.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use sift_core::error::ConfigError;

use crate::Embedder;
use crate::error::EmbedError;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(8);

/// Configuration for [`RemoteEmbedder`].
#[derive(Debug, Clone)]
pub struct RemoteEmbedderConfig {
    /// API root; the adapter appends `/embeddings`.
    pub base_url: String,
    /// Bearer token.
    pub api_key: String,
    /// Embedding model identifier.
    pub model: String,
    /// Expected output dimensionality. When set, it is both sent to the
    /// provider and enforced on every returned vector.
    pub dimensions: Option<u32>,
    /// Total attempts per batch, counting the first. Minimum 1.
    pub max_retries: u32,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for RemoteEmbedderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            model: String::new(),
            dimensions: None,
            max_retries: 3,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Embedder backed by a hosted embedding API.
pub struct RemoteEmbedder {
    client: reqwest::Client,
    config: RemoteEmbedderConfig,
    endpoint: String,
}

impl RemoteEmbedder {
    /// Build the adapter and its HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when the API key or model is
    /// empty, `max_retries` is zero, or the HTTP client cannot be built.
    pub fn new(config: RemoteEmbedderConfig) -> Result<Self, ConfigError> {
        if config.api_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                option: "api_key",
                reason: "must not be empty".to_string(),
            });
        }
        if config.model.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                option: "model",
                reason: "must not be empty".to_string(),
            });
        }
        if config.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                option: "max_retries",
                reason: "must be at least 1".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                option: "timeout",
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        let endpoint = format!("{}/embeddings", config.base_url.trim_end_matches('/'));

        Ok(Self {
            client,
            config,
            endpoint,
        })
    }

    /// One request, no retries.
    async fn request_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: texts,
            dimensions: self.config.dimensions,
            encoding_format: "float",
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmbedError::Timeout
                } else {
                    EmbedError::Transport(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::status_error(status.as_u16(), response).await);
        }

        let payload: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::InvalidResponse(format!("malformed body: {e}")))?;
        let vectors = order_rows(texts.len(), payload.data)?;
        validate_vectors(self.config.dimensions, &vectors)?;
        Ok(vectors)
    }

    /// Read the pacing hint and error body off a non-2xx response, then
    /// classify it.
    async fn status_error(status: u16, response: reqwest::Response) -> EmbedError {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ApiErrorBody>(&body)
            .ok()
            .and_then(|b| b.error);
        let message = detail
            .as_ref()
            .and_then(|d| d.message.clone())
            .unwrap_or_else(|| truncate(&body));
        classify_status(status, retry_after, detail.as_ref(), message)
    }

    async fn call_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut attempt = 1;
        let mut delay = INITIAL_BACKOFF;
        loop {
            match self.request_batch(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let pause = e.retry_after().unwrap_or(delay);
                    debug!(
                        attempt,
                        error = %e,
                        pause_ms = u64::try_from(pause.as_millis()).unwrap_or(u64::MAX),
                        "retrying embedding request"
                    );
                    tokio::time::sleep(pause).await;
                    delay = (delay * 2).min(MAX_BACKOFF);
                    attempt += 1;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "embedding request failed");
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if text.trim().is_empty() {
            return Err(EmbedError::InvalidInput("text is empty".to_string()));
        }
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbedError::InvalidResponse("empty batch result".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        for (i, text) in texts.iter().enumerate() {
            if text.trim().is_empty() {
                return Err(EmbedError::InvalidInput(format!(
                    "text at position {i} is empty"
                )));
            }
        }
        self.call_with_retry(texts).await
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<u32>,
    encoding_format: &'static str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
    code: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl ApiErrorDetail {
    fn is_quota(&self) -> bool {
        let quota = |s: &String| s.contains("quota");
        self.code.as_ref().is_some_and(quota) || self.kind.as_ref().is_some_and(quota)
    }
}

/// Map a non-2xx status (plus whatever the body revealed) to a typed error.
fn classify_status(
    status: u16,
    retry_after: Option<Duration>,
    detail: Option<&ApiErrorDetail>,
    message: String,
) -> EmbedError {
    match status {
        401 | 403 => EmbedError::Unauthorized,
        429 if detail.is_some_and(ApiErrorDetail::is_quota) => EmbedError::QuotaExceeded,
        429 => EmbedError::RateLimited { retry_after },
        400 | 422 => EmbedError::InvalidInput(message),
        408 => EmbedError::Timeout,
        _ => EmbedError::Api { status, message },
    }
}

/// Re-order provider rows by their `index` field into input order.
fn order_rows(expected: usize, rows: Vec<EmbeddingRow>) -> Result<Vec<Vec<f32>>, EmbedError> {
    if rows.len() != expected {
        return Err(EmbedError::InvalidResponse(format!(
            "expected {expected} embeddings, got {}",
            rows.len()
        )));
    }
    let mut vectors: Vec<Option<Vec<f32>>> = vec![None; expected];
    for row in rows {
        let slot = vectors
            .get_mut(row.index)
            .ok_or_else(|| {
                EmbedError::InvalidResponse(format!("embedding index {} out of range", row.index))
            })?;
        if slot.replace(row.embedding).is_some() {
            return Err(EmbedError::InvalidResponse(format!(
                "duplicate embedding index {}",
                row.index
            )));
        }
    }
    // Every slot is filled: counts match and indices were unique and in range.
    Ok(vectors.into_iter().flatten().collect())
}

/// Reject empty, wrong-dimension, or non-finite vectors.
fn validate_vectors(dimensions: Option<u32>, vectors: &[Vec<f32>]) -> Result<(), EmbedError> {
    for (i, vector) in vectors.iter().enumerate() {
        if vector.is_empty() {
            return Err(EmbedError::InvalidResponse(format!(
                "embedding {i} is empty"
            )));
        }
        if let Some(dims) = dimensions
            && vector.len() != dims as usize
        {
            return Err(EmbedError::InvalidResponse(format!(
                "embedding {i} has {} dimensions, expected {dims}",
                vector.len()
            )));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(EmbedError::InvalidResponse(format!(
                "embedding {i} contains a non-finite value"
            )));
        }
    }
    Ok(())
}

fn truncate(body: &str) -> String {
    const LIMIT: usize = 200;
    if body.len() <= LIMIT {
        body.to_string()
    } else {
        let mut cut = LIMIT;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &body[..cut])
    }
}
