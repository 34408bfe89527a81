//! Batch-synchronous scheduling of chunk corrections.
//!
//! Chunks are dispatched in batches of `concurrency`; every call in a batch
//! must settle before the next batch starts. The barrier between batches is
//! deliberate: it bounds in-flight work, gives rate-limited APIs a breathing
//! rhythm, and provides a natural point to publish a consistent
//! [`ProgressSnapshot`] with cumulative cost figures.
//!
//! Results land in index-addressed slots, so the output order is the source
//! order regardless of which call inside a batch finishes first.

use crate::backend::{CorrectionBackend, CorrectionOptions};
use crate::config::RefineConfig;
use crate::error::ChunkError;
use crate::output::ChunkOutcome;
use crate::pipeline::client::{refine_chunk, RetryPolicy};
use crate::pipeline::segment::Chunk;
use crate::progress::ProgressSnapshot;
use crate::usage::UsageLedger;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

/// Run one batch concurrently and return its outcomes sorted by index.
///
/// The per-chunk timeout covers the whole correction including internal
/// retries; a chunk that exceeds it falls back to its original content and
/// the batch (and run) continues.
pub(crate) async fn process_batch(
    backend: &Arc<dyn CorrectionBackend>,
    batch: &[Chunk],
    total_chunks: usize,
    options: &CorrectionOptions,
    policy: &RetryPolicy,
    config: &RefineConfig,
    ledger: &UsageLedger,
) -> Vec<ChunkOutcome> {
    let chunk_timeout = Duration::from_secs(config.chunk_timeout_secs);

    let futures = batch.iter().map(|chunk| {
        let backend = Arc::clone(backend);
        async move {
            if let Some(ref cb) = config.progress_callback {
                cb.on_chunk_start(chunk.index, total_chunks);
            }

            let outcome = match timeout(
                chunk_timeout,
                refine_chunk(&backend, chunk, options, policy, &config.prices, ledger),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(
                        "Chunk {}: timed out after {}s, keeping original text",
                        chunk.index, config.chunk_timeout_secs
                    );
                    ChunkOutcome {
                        index: chunk.index,
                        text: chunk.content.clone(),
                        input_tokens: 0,
                        output_tokens: 0,
                        cost: 0.0,
                        retries: 0,
                        duration_ms: chunk_timeout.as_millis() as u64,
                        error: Some(ChunkError::Timeout {
                            chunk: chunk.index,
                            secs: config.chunk_timeout_secs,
                        }),
                    }
                }
            };

            if let Some(ref cb) = config.progress_callback {
                match &outcome.error {
                    None => cb.on_chunk_complete(chunk.index, total_chunks, outcome.text.len()),
                    Some(e) => cb.on_chunk_fallback(chunk.index, total_chunks, &e.to_string()),
                }
            }

            outcome
        }
    });

    let mut outcomes = join_all(futures).await;
    outcomes.sort_by_key(|o| o.index);
    outcomes
}

/// Dispatch all chunks batch by batch, returning outcomes in source order.
pub(crate) async fn run_batches(
    backend: &Arc<dyn CorrectionBackend>,
    chunks: &[Chunk],
    config: &RefineConfig,
    ledger: &UsageLedger,
) -> Vec<ChunkOutcome> {
    let total = chunks.len();
    let options = CorrectionOptions::from_config(config);
    let policy = RetryPolicy::from_config(config);
    let start = Instant::now();

    // Index-addressed slots: outcome i always lands at position i.
    let mut slots: Vec<Option<ChunkOutcome>> = Vec::with_capacity(total);
    slots.resize_with(total, || None);
    let mut done = 0usize;

    for batch in chunks.chunks(config.concurrency) {
        let outcomes =
            process_batch(backend, batch, total, &options, &policy, config, ledger).await;
        done += outcomes.len();

        for outcome in outcomes {
            let idx = outcome.index;
            debug_assert!(slots[idx].is_none(), "duplicate outcome for chunk {idx}");
            slots[idx] = Some(outcome);
        }

        let totals = ledger.snapshot();
        let snapshot = ProgressSnapshot::compute(
            done,
            total,
            start.elapsed().as_secs_f64(),
            totals.cost,
            totals.input_tokens,
            totals.output_tokens,
        );
        debug!(
            "Batch complete: {}/{} chunks, ${:.4} so far (projected ${:.4})",
            snapshot.chunks_done,
            snapshot.total_chunks,
            snapshot.cost_so_far,
            snapshot.projected_total_cost
        );
        if let Some(ref cb) = config.progress_callback {
            cb.on_batch_complete(&snapshot);
        }
    }

    slots.into_iter().flatten().collect()
}
