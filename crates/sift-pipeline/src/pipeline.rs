//! The ingest orchestrator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::{Stream, StreamExt, future};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use sift_chunk::LineChunker;
use sift_core::schema::MetadataSchema;
use sift_core::types::{Document, EmbeddedChunk};
use sift_embed::{EmbedError, Embedder};

use crate::error::{IngestError, LoaderError};
use crate::sink::ChunkSink;

/// Pipeline tuning. All options have defaults.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum texts per embedder batch call.
    pub batch_size: usize,
    /// Total attempts per document, counting the first.
    pub max_retries: u32,
    /// Initial backoff between attempts; doubled each retry.
    pub retry_delay: Duration,
    /// Upper bound for one embedder batch call.
    pub embed_timeout: Duration,
    /// Documents processed in parallel. 1 preserves stream order.
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            embed_timeout: Duration::from_secs(60),
            concurrency: 1,
        }
    }
}

/// Counters handed to the progress callback after every document.
/// `processed_documents` is monotonically non-decreasing across calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestProgress {
    pub processed_documents: u64,
    pub successful_documents: u64,
    pub failed_documents: u64,
    pub total_chunks: u64,
}

/// One failed attempt, reported to the error callback before any backoff.
#[derive(Debug)]
pub struct AttemptReport<'a> {
    pub document_key: &'a str,
    pub error: &'a IngestError,
    /// False on the final attempt (or when the error is not transient).
    pub will_retry: bool,
    /// 1-based attempt number.
    pub attempt: u32,
}

/// A document that exhausted its retry budget.
#[derive(Debug)]
pub struct DocumentFailure {
    pub document_key: String,
    pub error: IngestError,
}

/// Outcome of one ingest run.
#[derive(Debug, Default)]
pub struct IngestResult {
    pub total_documents: u64,
    pub successful_documents: u64,
    pub failed_documents: u64,
    /// Chunks written across all successful documents.
    pub total_chunks: u64,
    pub errors: Vec<DocumentFailure>,
    /// True when the caller's cancellation token stopped the run early.
    pub cancelled: bool,
}

type ProgressCallback = Arc<dyn Fn(IngestProgress) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&AttemptReport<'_>) + Send + Sync>;

/// Orchestrates one ingestion run: stream documents, and per document
/// chunk → batch-embed → one transactional store write, with per-document
/// retry and failure isolation.
///
/// `S` is the loader's metadata type, `M` the store's; they coincide unless
/// a transform is configured (the separate constructors make the type
/// system enforce this at construction).
pub struct IngestPipeline<S, M> {
    chunker: LineChunker,
    embedder: Arc<dyn Embedder>,
    sink: Arc<dyn ChunkSink<M>>,
    schema: Arc<MetadataSchema>,
    transform: Arc<dyn Fn(S) -> M + Send + Sync>,
    config: PipelineConfig,
    on_progress: ProgressCallback,
    on_error: ErrorCallback,
}

impl<M> IngestPipeline<M, M>
where
    M: Serialize + Send + Sync + 'static,
{
    /// A pipeline whose loader and store share one metadata type.
    #[must_use]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        sink: Arc<dyn ChunkSink<M>>,
        schema: MetadataSchema,
    ) -> Self {
        Self::with_transform(embedder, sink, schema, |metadata| metadata)
    }
}

impl<S, M> IngestPipeline<S, M>
where
    S: Send + 'static,
    M: Serialize + Send + Sync + 'static,
{
    /// A pipeline that maps loader metadata into store metadata before
    /// ingestion.
    pub fn with_transform(
        embedder: Arc<dyn Embedder>,
        sink: Arc<dyn ChunkSink<M>>,
        schema: MetadataSchema,
        transform: impl Fn(S) -> M + Send + Sync + 'static,
    ) -> Self {
        Self {
            chunker: LineChunker::default(),
            embedder,
            sink,
            schema: Arc::new(schema),
            transform: Arc::new(transform),
            config: PipelineConfig::default(),
            on_progress: Arc::new(|_| {}),
            on_error: Arc::new(|_| {}),
        }
    }

    #[must_use]
    pub fn with_chunker(mut self, chunker: LineChunker) -> Self {
        self.chunker = chunker;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Invoked after every document, success or failure.
    #[must_use]
    pub fn on_progress(mut self, callback: impl Fn(IngestProgress) + Send + Sync + 'static) -> Self {
        self.on_progress = Arc::new(callback);
        self
    }

    /// Invoked on every failed attempt, before any backoff sleep.
    #[must_use]
    pub fn on_error(
        mut self,
        callback: impl Fn(&AttemptReport<'_>) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Arc::new(callback);
        self
    }

    /// Drive one run over a loader's stream.
    ///
    /// Per-document failures are retried (transient ones, up to the budget)
    /// and then recorded in the result; they never abort the run. An error
    /// from the stream itself terminates the run. Cancelling the token
    /// stops consuming the stream, abandons pending retries, and returns
    /// the partial result with `cancelled` set; in-flight store
    /// transactions complete or roll back on their own.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Loader`] when the stream yields an error.
    #[instrument(skip_all)]
    pub async fn run<St>(
        &self,
        documents: St,
        cancel: CancellationToken,
    ) -> Result<IngestResult, IngestError>
    where
        St: Stream<Item = Result<Document<S>, LoaderError>> + Send,
    {
        let state = RunState::default();
        let loader_error: Mutex<Option<LoaderError>> = Mutex::new(None);
        let state_ref = &state;
        let cancel_ref = &cancel;
        let loader_error_ref = &loader_error;

        let documents = documents
            .take_until(cancel.clone().cancelled_owned())
            .map(|item| match item {
                Ok(document) => Some(document),
                Err(error) => {
                    *lock(loader_error_ref) = Some(error);
                    None
                }
            })
            .take_while(|item| future::ready(item.is_some()))
            .filter_map(future::ready);

        documents
            .for_each_concurrent(self.config.concurrency.max(1), move |document| async move {
                self.process_document(document, cancel_ref, state_ref).await;
            })
            .await;

        if let Some(error) = lock(&loader_error).take() {
            warn!(error = %error, "loader stream failed; terminating run");
            return Err(IngestError::Loader(error));
        }

        let result = state.into_result(cancel.is_cancelled());
        info!(
            total = result.total_documents,
            succeeded = result.successful_documents,
            failed = result.failed_documents,
            chunks = result.total_chunks,
            cancelled = result.cancelled,
            "ingest run finished"
        );
        Ok(result)
    }

    async fn process_document(
        &self,
        document: Document<S>,
        cancel: &CancellationToken,
        state: &RunState,
    ) {
        let metadata = (self.transform)(document.metadata);
        let (key, result) = match self.schema.validate(&metadata) {
            Ok(validated) => {
                let key = validated.document_key().to_string();
                let result = self
                    .ingest_one(&document.content, &metadata, &key, cancel)
                    .await;
                (key, result)
            }
            Err(error) => (
                self.fallback_key(&metadata),
                Err(IngestError::Validation(error)),
            ),
        };
        state.finish(key, result, &self.on_progress);
    }

    /// The per-document attempt loop: transient failures back off and
    /// retry, everything else (and the final attempt) fails the document.
    async fn ingest_one(
        &self,
        content: &str,
        metadata: &M,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<u64, IngestError> {
        let mut attempt = 1u32;
        let mut delay = self.config.retry_delay;
        loop {
            match self.try_once(content, metadata).await {
                Ok(written) => {
                    debug!(document_key = key, chunks = written, "document ingested");
                    return Ok(written);
                }
                Err(error) => {
                    let will_retry = error.is_transient()
                        && attempt < self.config.max_retries
                        && !cancel.is_cancelled();
                    (self.on_error)(&AttemptReport {
                        document_key: key,
                        error: &error,
                        will_retry,
                        attempt,
                    });
                    if !will_retry {
                        warn!(document_key = key, attempt, error = %error, "document failed");
                        return Err(error);
                    }
                    tokio::select! {
                        () = cancel.cancelled() => return Err(error),
                        () = tokio::time::sleep(delay) => {}
                    }
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
            }
        }
    }

    /// One attempt: chunk, embed in order-preserving batches, then hand the
    /// fully embedded chunks to the sink in a single write. A document that
    /// chunks to nothing is skipped without touching the sink, leaving any
    /// prior generation in place.
    async fn try_once(&self, content: &str, metadata: &M) -> Result<u64, IngestError> {
        let chunks = self.chunker.chunk(content);
        if chunks.is_empty() {
            return Ok(0);
        }

        let batch_size = self.config.batch_size.max(1);
        let mut embedded = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = tokio::time::timeout(
                self.config.embed_timeout,
                self.embedder.embed_batch(&texts),
            )
            .await
            .map_err(|_| IngestError::Embed(EmbedError::Timeout))??;
            if vectors.len() != batch.len() {
                return Err(EmbedError::InvalidResponse(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                ))
                .into());
            }
            for (chunk, embedding) in batch.iter().zip(vectors) {
                embedded.push(EmbeddedChunk::new(chunk.clone(), embedding));
            }
        }

        self.sink.replace_document(metadata, &embedded).await?;
        Ok(u64::try_from(embedded.len()).unwrap_or(u64::MAX))
    }

    /// Best-effort document key for reporting when validation failed.
    fn fallback_key(&self, metadata: &M) -> String {
        let field = self.schema.columns().document_key_field();
        serde_json::to_value(metadata)
            .ok()
            .and_then(|image| image.get(field).cloned())
            .map_or_else(
                || "<unknown>".to_string(),
                |value| match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                },
            )
    }
}

#[derive(Default)]
struct RunState {
    processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    chunks: AtomicU64,
    failures: Mutex<Vec<DocumentFailure>>,
    /// Serializes progress observation so callbacks see non-decreasing
    /// counters even with concurrent documents.
    progress: Mutex<()>,
}

impl RunState {
    fn finish(&self, key: String, result: Result<u64, IngestError>, on_progress: &ProgressCallback) {
        self.processed.fetch_add(1, Ordering::SeqCst);
        match result {
            Ok(written) => {
                self.succeeded.fetch_add(1, Ordering::SeqCst);
                self.chunks.fetch_add(written, Ordering::SeqCst);
            }
            Err(error) => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                lock(&self.failures).push(DocumentFailure {
                    document_key: key,
                    error,
                });
            }
        }
        let guard = lock(&self.progress);
        on_progress(self.snapshot());
        drop(guard);
    }

    fn snapshot(&self) -> IngestProgress {
        IngestProgress {
            processed_documents: self.processed.load(Ordering::SeqCst),
            successful_documents: self.succeeded.load(Ordering::SeqCst),
            failed_documents: self.failed.load(Ordering::SeqCst),
            total_chunks: self.chunks.load(Ordering::SeqCst),
        }
    }

    fn into_result(self, cancelled: bool) -> IngestResult {
        IngestResult {
            total_documents: self.processed.into_inner(),
            successful_documents: self.succeeded.into_inner(),
            failed_documents: self.failed.into_inner(),
            total_chunks: self.chunks.into_inner(),
            errors: self.failures.into_inner().unwrap_or_else(PoisonError::into_inner),
            cancelled,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::stream;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use sift_chunk::{ChunkerConfig, LineChunker};
    use sift_embed::StubEmbedder;

    use crate::test_support::{MemorySink, TestMetadata, test_schema};

    use super::*;

    fn doc(path: &str, content: &str) -> Document<TestMetadata> {
        Document::new(
            content,
            TestMetadata {
                path: path.to_string(),
                repository_index_db_id: 7,
            },
        )
    }

    fn tiny_chunker() -> LineChunker {
        LineChunker::new(ChunkerConfig {
            max_lines: 1,
            overlap: 0,
            max_chunk_size: 1000,
            min_chunk_size: 0,
        })
        .unwrap()
    }

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            retry_delay: Duration::from_millis(1),
            ..PipelineConfig::default()
        }
    }

    fn pipeline(
        embedder: Arc<StubEmbedder>,
        sink: Arc<MemorySink>,
    ) -> IngestPipeline<TestMetadata, TestMetadata> {
        IngestPipeline::new(embedder, sink, test_schema())
            .with_chunker(tiny_chunker())
            .with_config(fast_config())
    }

    fn ok_stream(
        documents: Vec<Document<TestMetadata>>,
    ) -> impl Stream<Item = Result<Document<TestMetadata>, LoaderError>> {
        stream::iter(documents.into_iter().map(Ok))
    }

    #[tokio::test]
    async fn ingests_every_document_and_counts_chunks() {
        let embedder = Arc::new(StubEmbedder::fixed(vec![1.0, 0.0, 0.0]));
        let sink = Arc::new(MemorySink::new());
        let pipeline = pipeline(embedder, Arc::clone(&sink));

        let result = pipeline
            .run(
                ok_stream(vec![doc("a.ts", "one\ntwo"), doc("b.ts", "three")]),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.total_documents, 2);
        assert_eq!(result.successful_documents, 2);
        assert_eq!(result.failed_documents, 0);
        assert_eq!(result.total_chunks, 3);
        assert!(result.errors.is_empty());
        assert!(!result.cancelled);

        assert_eq!(sink.chunks_for("a.ts").len(), 2);
        assert_eq!(sink.chunks_for("b.ts").len(), 1);
    }

    #[tokio::test]
    async fn one_poisoned_document_does_not_stop_the_others() {
        let embedder = Arc::new(StubEmbedder::fixed(vec![1.0, 0.0, 0.0]).with_poison("poison"));
        let sink = Arc::new(MemorySink::new());
        let pipeline = pipeline(embedder, Arc::clone(&sink));

        let result = pipeline
            .run(
                ok_stream(vec![
                    doc("d1.ts", "fine"),
                    doc("d2.ts", "poison pill"),
                    doc("d3.ts", "also fine"),
                ]),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.total_documents, 3);
        assert_eq!(result.successful_documents, 2);
        assert_eq!(result.failed_documents, 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].document_key, "d2.ts");

        assert_eq!(sink.chunks_for("d1.ts").len(), 1);
        assert!(sink.chunks_for("d2.ts").is_empty());
        assert_eq!(sink.chunks_for("d3.ts").len(), 1);
    }

    #[tokio::test]
    async fn transient_embed_failures_are_retried() {
        let embedder =
            Arc::new(StubEmbedder::fixed(vec![1.0, 0.0, 0.0]).with_transient_failures(1));
        let sink = Arc::new(MemorySink::new());
        let reports: Arc<Mutex<Vec<(bool, u32)>>> = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&reports);

        let pipeline = pipeline(embedder, Arc::clone(&sink)).on_error(move |report| {
            lock(&seen).push((report.will_retry, report.attempt));
        });

        let result = pipeline
            .run(ok_stream(vec![doc("a.ts", "text")]), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.successful_documents, 1);
        assert_eq!(*lock(&reports), vec![(true, 1)]);
        assert_eq!(sink.chunks_for("a.ts").len(), 1);
    }

    #[tokio::test]
    async fn non_transient_failures_are_not_retried() {
        let embedder = Arc::new(StubEmbedder::fixed(vec![1.0, 0.0, 0.0]).with_poison("bad"));
        let sink = Arc::new(MemorySink::new());
        let reports: Arc<Mutex<Vec<(bool, u32)>>> = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&reports);

        let pipeline = pipeline(Arc::clone(&embedder), sink).on_error(move |report| {
            lock(&seen).push((report.will_retry, report.attempt));
        });

        let result = pipeline
            .run(ok_stream(vec![doc("a.ts", "bad text")]), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.failed_documents, 1);
        assert_eq!(*lock(&reports), vec![(false, 1)]);
        assert_eq!(embedder.batch_calls(), 1);
    }

    #[tokio::test]
    async fn transient_store_failures_are_retried() {
        let embedder = Arc::new(StubEmbedder::fixed(vec![1.0, 0.0, 0.0]));
        let sink = Arc::new(MemorySink::new().with_transient_failures(1));
        let pipeline = pipeline(embedder, Arc::clone(&sink));

        let result = pipeline
            .run(ok_stream(vec![doc("a.ts", "text")]), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.successful_documents, 1);
        assert_eq!(sink.writes(), 2, "one failed write plus one retry");
    }

    #[rstest]
    #[case::budget_exhausted(3, 10, 3, false)]
    #[case::recovers_on_final_attempt(3, 2, 3, true)]
    #[case::single_attempt_means_no_retry(1, 1, 1, false)]
    #[tokio::test]
    async fn retry_budget_is_total_attempts(
        #[case] max_retries: u32,
        #[case] transient_failures: u32,
        #[case] expected_calls: u32,
        #[case] succeeds: bool,
    ) {
        let embedder = Arc::new(
            StubEmbedder::fixed(vec![1.0, 0.0, 0.0]).with_transient_failures(transient_failures),
        );
        let sink = Arc::new(MemorySink::new());
        let pipeline = pipeline(Arc::clone(&embedder), sink).with_config(PipelineConfig {
            max_retries,
            ..fast_config()
        });

        let result = pipeline
            .run(ok_stream(vec![doc("a.ts", "text")]), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.successful_documents, u64::from(succeeds));
        assert_eq!(result.failed_documents, u64::from(!succeeds));
        assert_eq!(embedder.batch_calls(), expected_calls);
    }

    #[tokio::test]
    async fn chunk_batches_preserve_order_and_size() {
        let embedder = Arc::new(StubEmbedder::fixed(vec![1.0, 0.0, 0.0]));
        let sink = Arc::new(MemorySink::new());
        let pipeline = pipeline(Arc::clone(&embedder), Arc::clone(&sink)).with_config(
            PipelineConfig {
                batch_size: 2,
                ..fast_config()
            },
        );

        let result = pipeline
            .run(
                ok_stream(vec![doc("a.ts", "l1\nl2\nl3\nl4\nl5")]),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.total_chunks, 5);
        assert_eq!(embedder.batch_calls(), 3, "5 chunks in batches of 2");
        let stored = sink.chunks_for("a.ts");
        let indices: Vec<u32> = stored.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert_eq!(stored[0].content, "l1");
        assert_eq!(stored[4].content, "l5");
    }

    #[tokio::test]
    async fn empty_documents_are_skipped_without_touching_the_sink() {
        let embedder = Arc::new(StubEmbedder::fixed(vec![1.0, 0.0, 0.0]));
        let sink = Arc::new(MemorySink::new());
        let pipeline = pipeline(Arc::clone(&embedder), Arc::clone(&sink));

        let result = pipeline
            .run(ok_stream(vec![doc("a.ts", "\n\n")]), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.successful_documents, 1);
        assert_eq!(result.total_chunks, 0);
        assert_eq!(sink.writes(), 0);
        assert_eq!(embedder.batch_calls(), 0);
    }

    #[tokio::test]
    async fn invalid_metadata_fails_the_document_with_its_key() {
        let embedder = Arc::new(StubEmbedder::fixed(vec![1.0, 0.0, 0.0]));
        // Feed a raw JSON document violating the declared integer type.
        let pipeline: IngestPipeline<serde_json::Value, serde_json::Value> =
            IngestPipeline::new(embedder, Arc::new(MemorySink::new()), test_schema())
                .with_chunker(tiny_chunker())
                .with_config(fast_config());

        let documents = vec![Document::new(
            "content",
            serde_json::json!({ "path": "a.ts", "repositoryIndexDbId": "not-a-number" }),
        )];
        let result = pipeline
            .run(
                stream::iter(documents.into_iter().map(Ok)),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.failed_documents, 1);
        assert_eq!(result.errors[0].document_key, "a.ts");
        assert!(matches!(result.errors[0].error, IngestError::Validation(_)));
    }

    #[tokio::test]
    async fn loader_error_terminates_the_run() {
        let embedder = Arc::new(StubEmbedder::fixed(vec![1.0, 0.0, 0.0]));
        let sink = Arc::new(MemorySink::new());
        let pipeline = pipeline(embedder, Arc::clone(&sink));

        let items: Vec<Result<Document<TestMetadata>, LoaderError>> = vec![
            Ok(doc("first.ts", "text")),
            Err(LoaderError::new(std::io::Error::other("socket closed"))),
            Ok(doc("never.ts", "text")),
        ];
        let err = pipeline
            .run(stream::iter(items), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Loader(_)));
        assert_eq!(sink.chunks_for("first.ts").len(), 1);
        assert!(sink.chunks_for("never.ts").is_empty());
    }

    #[tokio::test]
    async fn cancellation_stops_consuming_the_stream() {
        let embedder = Arc::new(StubEmbedder::fixed(vec![1.0, 0.0, 0.0]));
        let sink = Arc::new(MemorySink::new());
        let cancel = CancellationToken::new();
        let trip = cancel.clone();

        // Cancel from the progress callback after the first document.
        let pipeline = pipeline(embedder, Arc::clone(&sink)).on_progress(move |_| trip.cancel());

        let result = pipeline
            .run(
                ok_stream(vec![
                    doc("a.ts", "text"),
                    doc("b.ts", "text"),
                    doc("c.ts", "text"),
                ]),
                cancel,
            )
            .await
            .unwrap();

        assert!(result.cancelled);
        assert_eq!(result.total_documents, 1);
        assert!(sink.chunks_for("b.ts").is_empty());
        assert!(sink.chunks_for("c.ts").is_empty());
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_complete() {
        let embedder = Arc::new(StubEmbedder::fixed(vec![1.0, 0.0, 0.0]));
        let sink = Arc::new(MemorySink::new());
        let snapshots: Arc<Mutex<Vec<IngestProgress>>> = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&snapshots);

        let pipeline = pipeline(embedder, sink)
            .on_progress(move |progress| lock(&seen).push(progress));

        pipeline
            .run(
                ok_stream(vec![
                    doc("a.ts", "text"),
                    doc("b.ts", "text"),
                    doc("c.ts", "text"),
                ]),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let snapshots = lock(&snapshots);
        assert_eq!(snapshots.len(), 3);
        for pair in snapshots.windows(2) {
            assert!(pair[1].processed_documents >= pair[0].processed_documents);
        }
        assert_eq!(snapshots.last().unwrap().processed_documents, 3);
    }

    #[tokio::test]
    async fn metadata_transform_maps_loader_metadata_into_store_metadata() {
        let embedder = Arc::new(StubEmbedder::fixed(vec![1.0, 0.0, 0.0]));
        let sink = Arc::new(MemorySink::new());

        let pipeline: IngestPipeline<String, TestMetadata> = IngestPipeline::with_transform(
            embedder,
            Arc::clone(&sink) as Arc<dyn ChunkSink<TestMetadata>>,
            test_schema(),
            |path: String| TestMetadata {
                path,
                repository_index_db_id: 7,
            },
        )
        .with_chunker(tiny_chunker())
        .with_config(fast_config());

        let documents = vec![Document::new("text", "mapped.ts".to_string())];
        let result = pipeline
            .run(
                stream::iter(documents.into_iter().map(Ok)),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.successful_documents, 1);
        assert_eq!(sink.chunks_for("mapped.ts").len(), 1);
    }

    #[tokio::test]
    async fn reingestion_replaces_the_previous_generation_in_the_sink() {
        let embedder = Arc::new(StubEmbedder::fixed(vec![1.0, 0.0, 0.0]));
        let sink = Arc::new(MemorySink::new());
        let pipeline = pipeline(embedder, Arc::clone(&sink));

        pipeline
            .run(
                ok_stream(vec![doc("a.ts", "one\ntwo\nthree")]),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        pipeline
            .run(ok_stream(vec![doc("a.ts", "only")]), CancellationToken::new())
            .await
            .unwrap();

        let stored = sink.chunks_for("a.ts");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content, "only");
    }
}
