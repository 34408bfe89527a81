//! Streaming refinement API: emit chunk outcomes as batches complete.
//!
//! ## Why stream?
//!
//! Large documents take minutes. A stream-based API lets callers display
//! corrected text progressively, wire up progress bars, or write chunks to
//! disk incrementally instead of buffering the whole document in memory.
//!
//! Unlike the eager [`crate::refine::refine`] which returns only after all
//! chunks finish, [`refine_stream`] yields [`ChunkOutcome`] items as each
//! batch settles. Within a batch, outcomes are emitted in source order, so
//! the stream as a whole is ordered by chunk index.

use crate::backend::{resolve_backend, CorrectionOptions};
use crate::config::{ParagraphSplitStage, RefineConfig};
use crate::error::RefineError;
use crate::output::ChunkOutcome;
use crate::pipeline::client::RetryPolicy;
use crate::pipeline::normalize::normalize;
use crate::pipeline::schedule::process_batch;
use crate::pipeline::{input, segment};
use crate::progress::ProgressSnapshot;
use crate::usage::{project_run_cost, UsageLedger};
use std::pin::Pin;
use std::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tracing::{info, warn};

/// A boxed stream of chunk outcomes, ordered by chunk index.
pub type OutcomeStream = Pin<Box<dyn Stream<Item = ChunkOutcome> + Send>>;

/// Refine a text file or URL, streaming chunk outcomes as they are ready.
///
/// # Returns
/// - `Ok(OutcomeStream)` — a stream of [`ChunkOutcome`] in source order
/// - `Err(RefineError)` — fatal error (file not found, no backend, cost
///   ceiling exceeded)
///
/// # Example
/// ```rust,no_run
/// use ocr_polish::{refine_stream, RefineConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = RefineConfig::default();
/// let mut stream = refine_stream("scan.txt", &config).await?;
/// while let Some(outcome) = stream.next().await {
///     println!("Chunk {}: {} chars", outcome.index, outcome.text.len());
/// }
/// # Ok(())
/// # }
/// ```
pub async fn refine_stream(
    input_str: impl AsRef<str>,
    config: &RefineConfig,
) -> Result<OutcomeStream, RefineError> {
    let input_str = input_str.as_ref();
    info!("Starting streaming refinement: {}", input_str);
    let raw = input::resolve_input(input_str, config.download_timeout_secs).await?;
    refine_text_stream(&raw, config).await
}

/// Streaming equivalent of [`crate::refine::refine_text`] for in-memory text.
///
/// Normalization, segmentation, backend resolution, and the pre-flight cost
/// gate all run eagerly, so every fatal error surfaces from this call rather
/// than mid-stream. The returned stream itself cannot fail: chunk-level
/// problems arrive as outcomes carrying their original text.
pub async fn refine_text_stream(
    raw: &str,
    config: &RefineConfig,
) -> Result<OutcomeStream, RefineError> {
    let mut norm_opts = config.normalize.clone();
    norm_opts.split_oversized = config.paragraph_split == ParagraphSplitStage::Normalize;
    let normalized = normalize(raw, &norm_opts);

    let chunks = segment::segment(&normalized, config.max_tokens_per_chunk, &config.estimator);
    if chunks.is_empty() {
        return Ok(Box::pin(tokio_stream::iter(Vec::new())));
    }

    let backend = resolve_backend(config)?;

    let estimated_input: usize = chunks.iter().map(|c| c.estimated_tokens).sum();
    let entry = config.prices.resolve(backend.model_id());
    let projected = project_run_cost(estimated_input, entry);
    if projected > config.cost_ceiling {
        if config.cost_gate.allows_overrun() {
            warn!(
                "Projected cost ${:.4} exceeds ceiling ${:.2}; proceeding per policy",
                projected, config.cost_ceiling
            );
        } else {
            return Err(RefineError::CostCeilingExceeded {
                projected,
                ceiling: config.cost_ceiling,
            });
        }
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(chunks.len(), projected);
    }

    let (tx, rx) = tokio::sync::mpsc::channel(config.concurrency.max(1));
    let config = config.clone();

    tokio::spawn(async move {
        let total = chunks.len();
        let options = CorrectionOptions::from_config(&config);
        let policy = RetryPolicy::from_config(&config);
        let ledger = UsageLedger::new();
        let start = Instant::now();
        let mut done = 0usize;
        let mut refined = 0usize;

        for batch in chunks.chunks(config.concurrency) {
            let outcomes =
                process_batch(&backend, batch, total, &options, &policy, &config, &ledger).await;
            done += outcomes.len();
            refined += outcomes.iter().filter(|o| o.succeeded()).count();

            let totals = ledger.snapshot();
            let snapshot = ProgressSnapshot::compute(
                done,
                total,
                start.elapsed().as_secs_f64(),
                totals.cost,
                totals.input_tokens,
                totals.output_tokens,
            );
            if let Some(ref cb) = config.progress_callback {
                cb.on_batch_complete(&snapshot);
            }

            for outcome in outcomes {
                // Receiver dropped: the consumer stopped listening, so stop
                // spending on correction calls.
                if tx.send(outcome).await.is_err() {
                    return;
                }
            }
        }

        if let Some(ref cb) = config.progress_callback {
            cb.on_run_complete(total, refined);
        }
    });

    Ok(Box::pin(ReceiverStream::new(rx)))
}
