//! Integration tests for the refinement pipeline.
//!
//! Every test runs against an in-process mock backend, so the suite needs no
//! API keys and makes no network calls. The mocks cover the interesting
//! backend behaviours: success, slow responses, transient failures, and
//! permanent failures.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use async_trait::async_trait;
use ocr_polish::{
    refine, refine_sync, refine_text, refine_text_stream, refine_to_file, BackendError,
    ChunkOutcome, Correction, CorrectionBackend, CorrectionOptions, CostGatePolicy, ProgressSnapshot,
    RefineConfig, RefineError, RefineOutput, RefineProgressCallback,
};
use std::io::Write;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Build `n` short paragraphs, each small enough to become its own chunk
/// under a tight token budget.
fn paragraph_doc(n: usize) -> String {
    (0..n)
        .map(|i| format!("Paragraph number {i} with several more words inside."))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// A zero delay schedule that records which retry ordinals were consulted.
fn recording_delay(log: Arc<Mutex<Vec<u32>>>) -> Arc<dyn Fn(u32) -> Duration + Send + Sync> {
    Arc::new(move |ordinal| {
        log.lock().unwrap().push(ordinal);
        Duration::ZERO
    })
}

fn write_temp(contents: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().expect("create temp file");
    f.write_all(contents.as_bytes()).expect("write temp file");
    f
}

// ── Mock backends ────────────────────────────────────────────────────────────

/// Succeeds on every call, prefixing the text and recording what it received.
struct EchoBackend {
    received: Arc<Mutex<Vec<String>>>,
    calls: Arc<AtomicUsize>,
}

impl EchoBackend {
    fn new() -> Self {
        Self {
            received: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl CorrectionBackend for EchoBackend {
    fn model_id(&self) -> &str {
        "gpt-4.1"
    }

    async fn correct_text(
        &self,
        text: &str,
        _options: &CorrectionOptions,
    ) -> Result<Correction, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.received.lock().unwrap().push(text.to_string());
        Ok(Correction {
            text: format!("corrected: {text}"),
            input_tokens: 100,
            output_tokens: 50,
        })
    }
}

/// Fails permanently for any chunk containing the word "damaged"; refines
/// everything else.
struct PartialBackend;

#[async_trait]
impl CorrectionBackend for PartialBackend {
    fn model_id(&self) -> &str {
        "gpt-4.1"
    }

    async fn correct_text(
        &self,
        text: &str,
        _options: &CorrectionOptions,
    ) -> Result<Correction, BackendError> {
        if text.contains("damaged") {
            return Err(BackendError::Fatal {
                detail: "401 invalid api key".to_string(),
            });
        }
        Ok(Correction {
            text: format!("corrected: {text}"),
            input_tokens: 100,
            output_tokens: 50,
        })
    }
}

/// Fails with a transient error for the first `failures` calls, then succeeds.
struct FlakyBackend {
    attempts: AtomicU32,
    failures: u32,
}

#[async_trait]
impl CorrectionBackend for FlakyBackend {
    fn model_id(&self) -> &str {
        "gpt-4.1"
    }

    async fn correct_text(
        &self,
        text: &str,
        _options: &CorrectionOptions,
    ) -> Result<Correction, BackendError> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(BackendError::Transient {
                detail: format!("503 service unavailable (attempt {n})"),
            });
        }
        Ok(Correction {
            text: format!("corrected: {text}"),
            input_tokens: 80,
            output_tokens: 40,
        })
    }
}

/// Finishes later chunks first: the paragraph number embedded in the text
/// determines the delay, so chunk 0 is the slowest in its batch.
struct ReverseDelayBackend;

#[async_trait]
impl CorrectionBackend for ReverseDelayBackend {
    fn model_id(&self) -> &str {
        "gpt-4.1"
    }

    async fn correct_text(
        &self,
        text: &str,
        _options: &CorrectionOptions,
    ) -> Result<Correction, BackendError> {
        let idx: u64 = text
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect::<String>()
            .parse()
            .unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(100u64.saturating_sub(idx * 10))).await;
        Ok(Correction {
            text: format!("corrected: {text}"),
            input_tokens: 10,
            output_tokens: 10,
        })
    }
}

// ── Input handling ───────────────────────────────────────────────────────────

#[tokio::test]
async fn refine_nonexistent_file_is_file_not_found() {
    let config = RefineConfig::builder()
        .backend(Arc::new(EchoBackend::new()))
        .build()
        .expect("valid config");

    let err = refine("/definitely/not/a/real/scan.txt", &config)
        .await
        .expect_err("missing file must be an error");
    assert!(matches!(err, RefineError::FileNotFound { .. }));
}

#[tokio::test]
async fn refine_reads_local_file_and_normalizes_before_the_backend() {
    let file = write_temp("Tl1e qu1ck brown f0x jumps\nover the lazy dog and keeps\nrunning until the sentence ends.\n");

    let backend = EchoBackend::new();
    let received = Arc::clone(&backend.received);
    let config = RefineConfig::builder()
        .backend(Arc::new(backend))
        .build()
        .expect("valid config");

    let output = refine(file.path().to_string_lossy(), &config)
        .await
        .expect("refinement must succeed");

    // Confusables and line breaks must be repaired before any call is made.
    let seen = received.lock().unwrap().clone();
    assert!(!seen.is_empty());
    for text in &seen {
        assert!(
            !text.contains("Tl1e") && !text.contains("qu1ck") && !text.contains("f0x"),
            "backend must only see normalized text, got: {text:?}"
        );
    }
    assert!(output.normalized.contains("The quick brown fox"));
    assert!(output.text.contains("corrected: "));
    assert!(output.text.ends_with('\n'), "document must end with a newline");
    assert!(output.stats.total_cost > 0.0);
}

// ── Fail-open behaviour ──────────────────────────────────────────────────────

#[tokio::test]
async fn fallback_keeps_the_original_chunk_text_verbatim() {
    let text = "This first paragraph is perfectly fine.\n\n\
                This chunk is damaged beyond repair.\n\n\
                This closing paragraph is also fine.";

    let config = RefineConfig::builder()
        .backend(Arc::new(PartialBackend))
        .max_tokens_per_chunk(8)
        .retry_delay(Arc::new(|_| Duration::ZERO))
        .build()
        .expect("valid config");

    let output = refine_text(text, &config).await.expect("run must not fail");

    assert_eq!(output.stats.total_chunks, 3);
    assert_eq!(output.stats.refined_chunks, 2);
    assert_eq!(output.stats.fallback_chunks, 1);

    let fallen: Vec<&ChunkOutcome> = output.chunks.iter().filter(|o| !o.succeeded()).collect();
    assert_eq!(fallen.len(), 1);
    assert_eq!(fallen[0].index, 1);
    assert_eq!(fallen[0].text, "This chunk is damaged beyond repair.");
    assert_eq!(fallen[0].input_tokens, 0, "no successful call, nothing billed");
    assert_eq!(fallen[0].cost, 0.0);

    // The original content survives into the final document.
    assert!(output.text.contains("This chunk is damaged beyond repair."));
    assert!(output.text.contains("corrected: This first paragraph is perfectly fine."));
}

#[tokio::test]
async fn stats_bill_only_succeeded_calls() {
    let text = "A healthy opening paragraph sits here.\n\n\
                This chunk is damaged beyond repair.\n\n\
                A healthy closing paragraph sits here.";

    let config = RefineConfig::builder()
        .backend(Arc::new(PartialBackend))
        .max_tokens_per_chunk(8)
        .retry_delay(Arc::new(|_| Duration::ZERO))
        .build()
        .expect("valid config");

    let output = refine_text(text, &config).await.expect("run must not fail");

    // Two refined chunks at 100 in / 50 out each; the fallback chunk bills 0.
    assert_eq!(output.stats.total_input_tokens, 200);
    assert_eq!(output.stats.total_output_tokens, 100);

    // gpt-4.1: $0.002 in / $0.008 out per 1K tokens.
    let expected = 2.0 * (0.1 * 0.002 + 0.05 * 0.008);
    assert!(
        (output.stats.total_cost - expected).abs() < 1e-9,
        "expected ${expected}, got ${}",
        output.stats.total_cost
    );
}

// ── Ordering under concurrency ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn outcomes_stay_in_source_order_with_concurrent_batches() {
    let config = RefineConfig::builder()
        .backend(Arc::new(ReverseDelayBackend))
        .max_tokens_per_chunk(8)
        .concurrency(2)
        .retry_delay(Arc::new(|_| Duration::ZERO))
        .build()
        .expect("valid config");

    let output = refine_text(&paragraph_doc(5), &config)
        .await
        .expect("run must succeed");

    assert_eq!(output.stats.total_chunks, 5);
    assert_eq!(output.stats.fallback_chunks, 0);
    for (i, outcome) in output.chunks.iter().enumerate() {
        assert_eq!(outcome.index, i, "chunk {i} out of order");
        assert!(outcome.text.contains(&format!("number {i}")));
    }

    // The assembled document repeats the source order too.
    let positions: Vec<usize> = (0..5)
        .map(|i| output.text.find(&format!("number {i}")).expect("chunk text present"))
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}

// ── Retry behaviour ──────────────────────────────────────────────────────────

#[tokio::test]
async fn transient_failures_consult_the_backoff_schedule_in_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let config = RefineConfig::builder()
        .backend(Arc::new(FlakyBackend {
            attempts: AtomicU32::new(0),
            failures: 2,
        }))
        .max_retries(3)
        .retry_delay(recording_delay(Arc::clone(&log)))
        .build()
        .expect("valid config");

    let output = refine_text("A single short paragraph to correct.", &config)
        .await
        .expect("run must succeed");

    assert_eq!(output.stats.total_chunks, 1);
    assert_eq!(output.stats.refined_chunks, 1);
    assert_eq!(output.chunks[0].retries, 2, "first two attempts failed");

    // Delay before attempt 2 uses ordinal 0, before attempt 3 ordinal 1.
    assert_eq!(log.lock().unwrap().as_slice(), &[0, 1]);
}

#[tokio::test]
async fn exhausted_retries_fall_back_instead_of_failing_the_run() {
    let config = RefineConfig::builder()
        .backend(Arc::new(FlakyBackend {
            attempts: AtomicU32::new(0),
            failures: u32::MAX,
        }))
        .max_retries(2)
        .retry_delay(Arc::new(|_| Duration::ZERO))
        .build()
        .expect("valid config");

    let output = refine_text("A single short paragraph to correct.", &config)
        .await
        .expect("fallback must not fail the run");

    assert_eq!(output.stats.fallback_chunks, 1);
    assert_eq!(output.chunks[0].text, "A single short paragraph to correct.");
    assert!(output.chunks[0].error.is_some());
}

// ── Cost gate ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn default_gate_policy_aborts_over_the_ceiling_without_spending() {
    let backend = EchoBackend::new();
    let calls = Arc::clone(&backend.calls);
    let config = RefineConfig::builder()
        .backend(Arc::new(backend))
        .cost_ceiling(0.0)
        .build()
        .expect("valid config");
    assert_eq!(config.cost_gate, CostGatePolicy::RequireExplicitProceed);

    let err = refine_text("Some scanned text worth refining today.", &config)
        .await
        .expect_err("default policy must abort over the ceiling");

    match err {
        RefineError::CostCeilingExceeded { projected, ceiling } => {
            assert!(projected > 0.0);
            assert_eq!(ceiling, 0.0);
        }
        other => panic!("expected CostCeilingExceeded, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0, "no call may precede the gate");
}

// ── Output handling ──────────────────────────────────────────────────────────

#[tokio::test]
async fn refine_to_file_writes_the_final_document_atomically() {
    let input = write_temp("A paragraph destined for a file on disk.\n");
    let dir = tempfile::tempdir().expect("create temp dir");
    let out_path = dir.path().join("nested").join("refined.txt");

    let config = RefineConfig::builder()
        .backend(Arc::new(EchoBackend::new()))
        .build()
        .expect("valid config");

    let stats = refine_to_file(input.path().to_string_lossy(), &out_path, &config)
        .await
        .expect("refine_to_file must succeed");

    assert_eq!(stats.refined_chunks, stats.total_chunks);
    let written = std::fs::read_to_string(&out_path).expect("output file must exist");
    assert!(written.contains("corrected: "));
    assert!(written.ends_with('\n'));
    assert!(
        !out_path.with_extension("txt.tmp").exists(),
        "temp file must be renamed away"
    );
}

#[tokio::test]
async fn output_round_trips_through_json() {
    let config = RefineConfig::builder()
        .backend(Arc::new(EchoBackend::new()))
        .max_tokens_per_chunk(8)
        .build()
        .expect("valid config");

    let output = refine_text(&paragraph_doc(3), &config)
        .await
        .expect("run must succeed");

    let json = serde_json::to_string_pretty(&output).expect("RefineOutput must serialise");
    let back: RefineOutput = serde_json::from_str(&json).expect("JSON must deserialise back");
    assert_eq!(back.stats.total_chunks, output.stats.total_chunks);
    assert_eq!(back.chunks.len(), output.chunks.len());
    assert_eq!(back.text, output.text);
}

// ── Progress callbacks ───────────────────────────────────────────────────────

struct CountingCallback {
    run_started: AtomicUsize,
    chunk_starts: AtomicUsize,
    chunk_completes: AtomicUsize,
    batches: AtomicUsize,
    batch_done_counts: Mutex<Vec<usize>>,
    refined_at_end: AtomicUsize,
}

impl CountingCallback {
    fn new() -> Self {
        Self {
            run_started: AtomicUsize::new(0),
            chunk_starts: AtomicUsize::new(0),
            chunk_completes: AtomicUsize::new(0),
            batches: AtomicUsize::new(0),
            batch_done_counts: Mutex::new(Vec::new()),
            refined_at_end: AtomicUsize::new(0),
        }
    }
}

impl RefineProgressCallback for CountingCallback {
    fn on_run_start(&self, total_chunks: usize, _projected_cost: f64) {
        self.run_started.store(total_chunks, Ordering::SeqCst);
    }
    fn on_chunk_start(&self, _chunk_index: usize, _total_chunks: usize) {
        self.chunk_starts.fetch_add(1, Ordering::SeqCst);
    }
    fn on_chunk_complete(&self, _chunk_index: usize, _total_chunks: usize, _refined_len: usize) {
        self.chunk_completes.fetch_add(1, Ordering::SeqCst);
    }
    fn on_batch_complete(&self, snapshot: &ProgressSnapshot) {
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.batch_done_counts.lock().unwrap().push(snapshot.chunks_done);
    }
    fn on_run_complete(&self, _total_chunks: usize, refined_count: usize) {
        self.refined_at_end.store(refined_count, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn progress_callbacks_fire_for_every_chunk_and_batch() {
    let cb = Arc::new(CountingCallback::new());
    let config = RefineConfig::builder()
        .backend(Arc::new(EchoBackend::new()))
        .max_tokens_per_chunk(8)
        .concurrency(2)
        .progress_callback(Arc::clone(&cb) as Arc<dyn RefineProgressCallback>)
        .build()
        .expect("valid config");

    let output = refine_text(&paragraph_doc(4), &config)
        .await
        .expect("run must succeed");

    assert_eq!(output.stats.total_chunks, 4);
    assert_eq!(cb.run_started.load(Ordering::SeqCst), 4);
    assert_eq!(cb.chunk_starts.load(Ordering::SeqCst), 4);
    assert_eq!(cb.chunk_completes.load(Ordering::SeqCst), 4);
    assert_eq!(cb.batches.load(Ordering::SeqCst), 2, "4 chunks at concurrency 2");
    assert_eq!(cb.batch_done_counts.lock().unwrap().as_slice(), &[2, 4]);
    assert_eq!(cb.refined_at_end.load(Ordering::SeqCst), 4);
}

// ── Streaming API ────────────────────────────────────────────────────────────

#[tokio::test]
async fn stream_delivers_every_chunk_in_source_order() {
    use futures::StreamExt;

    let config = RefineConfig::builder()
        .backend(Arc::new(EchoBackend::new()))
        .max_tokens_per_chunk(8)
        .concurrency(2)
        .build()
        .expect("valid config");

    let stream = refine_text_stream(&paragraph_doc(5), &config)
        .await
        .expect("stream creation must succeed");
    let outcomes: Vec<ChunkOutcome> = stream.collect().await;

    assert_eq!(outcomes.len(), 5);
    for (i, outcome) in outcomes.iter().enumerate() {
        assert_eq!(outcome.index, i);
        assert!(outcome.succeeded());
        assert!(outcome.text.starts_with("corrected: "));
    }
}

// ── Synchronous wrapper ──────────────────────────────────────────────────────

#[test]
fn refine_sync_works_without_an_ambient_runtime() {
    let file = write_temp("A paragraph for the blocking entry point.\n");
    let config = RefineConfig::builder()
        .backend(Arc::new(EchoBackend::new()))
        .build()
        .expect("valid config");

    let output = refine_sync(file.path().to_string_lossy(), &config)
        .expect("refine_sync must succeed");
    assert!(output.text.contains("corrected: "));
    assert_eq!(output.stats.fallback_chunks, 0);
}
