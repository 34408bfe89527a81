//! Correction dispatch for a single chunk: retries, billing, fallback.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient and frequent under
//! concurrent load. Exponential backoff (`retry_unit * 2^k` before the
//! `k+2`-th attempt) avoids thundering-herd: with a 1 s unit and 3 total
//! attempts the wait sequence is 1 s → 2 s, totalling 3 s of back-off per
//! chunk. Fatal errors (bad credentials) skip the remaining attempts.
//!
//! ## Fail-open
//!
//! [`refine_chunk`] always returns a [`ChunkOutcome`]; it never propagates
//! an error upward. When every attempt fails, the outcome carries the
//! original chunk text so the final document keeps the content uncorrected
//! rather than losing it.

use crate::backend::{CorrectionBackend, CorrectionOptions};
use crate::config::RefineConfig;
use crate::error::ChunkError;
use crate::output::ChunkOutcome;
use crate::pipeline::segment::Chunk;
use crate::pricing::PriceTable;
use crate::usage::UsageLedger;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Maps a retry ordinal (0 = the wait before the second attempt) to a delay.
pub type RetryDelayFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Attempt count and backoff schedule for chunk corrections.
#[derive(Clone)]
pub struct RetryPolicy {
    total_attempts: u32,
    delay: RetryDelayFn,
}

impl RetryPolicy {
    /// Exponential backoff: retry ordinal `k` waits `unit * 2^k`.
    pub fn new(total_attempts: u32, unit: Duration) -> Self {
        Self {
            total_attempts: total_attempts.max(1),
            delay: Arc::new(move |k| unit * 2u32.saturating_pow(k)),
        }
    }

    /// Custom backoff schedule. Tests inject a zero delay here.
    pub fn with_delay_fn(total_attempts: u32, delay: RetryDelayFn) -> Self {
        Self {
            total_attempts: total_attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &RefineConfig) -> Self {
        match &config.retry_delay {
            Some(delay) => Self::with_delay_fn(config.max_retries, Arc::clone(delay)),
            None => Self::new(
                config.max_retries,
                Duration::from_millis(config.retry_unit_ms),
            ),
        }
    }

    /// Total correction attempts per chunk, including the first.
    pub fn total_attempts(&self) -> u32 {
        self.total_attempts
    }

    /// Delay before attempt `k + 2`.
    pub fn delay_for(&self, k: u32) -> Duration {
        (self.delay)(k)
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("total_attempts", &self.total_attempts)
            .field("delay", &"<fn>")
            .finish()
    }
}

/// Send one chunk through the backend, retrying per `policy`.
///
/// Billing happens the moment a call returns usage, before the content is
/// inspected: an empty correction is still a billed call, so the ledger
/// records it even though the chunk falls back to its original text.
pub async fn refine_chunk(
    backend: &Arc<dyn CorrectionBackend>,
    chunk: &Chunk,
    options: &CorrectionOptions,
    policy: &RetryPolicy,
    prices: &PriceTable,
    ledger: &UsageLedger,
) -> ChunkOutcome {
    let start = Instant::now();
    let mut last_err: Option<String> = None;
    let mut attempts = 0u32;

    for attempt in 0..policy.total_attempts() {
        if attempt > 0 {
            let backoff = policy.delay_for(attempt - 1);
            warn!(
                "Chunk {}: retry {}/{} after {:?}",
                chunk.index,
                attempt,
                policy.total_attempts() - 1,
                backoff
            );
            sleep(backoff).await;
        }
        attempts = attempt + 1;

        match backend.correct_text(&chunk.content, options).await {
            Ok(correction) => {
                let cost = prices.cost(
                    backend.model_id(),
                    u64::from(correction.input_tokens),
                    u64::from(correction.output_tokens),
                );
                ledger.record(correction.input_tokens, correction.output_tokens, cost);

                let duration = start.elapsed();
                debug!(
                    "Chunk {}: {} input tokens, {} output tokens, {:?}",
                    chunk.index, correction.input_tokens, correction.output_tokens, duration
                );

                if correction.text.trim().is_empty() {
                    // Billed, but nothing usable came back. Keep the original.
                    warn!("Chunk {}: backend returned an empty correction", chunk.index);
                    return ChunkOutcome {
                        index: chunk.index,
                        text: chunk.content.clone(),
                        input_tokens: correction.input_tokens,
                        output_tokens: correction.output_tokens,
                        cost,
                        retries: attempt,
                        duration_ms: duration.as_millis() as u64,
                        error: Some(ChunkError::EmptyResponse { chunk: chunk.index }),
                    };
                }

                return ChunkOutcome {
                    index: chunk.index,
                    text: correction.text,
                    input_tokens: correction.input_tokens,
                    output_tokens: correction.output_tokens,
                    cost,
                    retries: attempt,
                    duration_ms: duration.as_millis() as u64,
                    error: None,
                };
            }
            Err(e) => {
                warn!(
                    "Chunk {}: attempt {} failed: {}",
                    chunk.index,
                    attempt + 1,
                    e
                );
                let transient = e.is_transient();
                last_err = Some(e.to_string());
                if !transient {
                    break;
                }
            }
        }
    }

    // All attempts failed; fall back to the original content.
    let duration = start.elapsed();
    let detail = last_err.unwrap_or_else(|| "Unknown error".to_string());

    ChunkOutcome {
        index: chunk.index,
        text: chunk.content.clone(),
        input_tokens: 0,
        output_tokens: 0,
        cost: 0.0,
        retries: attempts.saturating_sub(1),
        duration_ms: duration.as_millis() as u64,
        error: Some(ChunkError::RetriesExhausted {
            chunk: chunk.index,
            retries: attempts,
            detail,
        }),
    }
}
