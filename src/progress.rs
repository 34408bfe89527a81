//! Progress-callback trait for per-chunk refinement events.
//!
//! Inject an [`Arc<dyn RefineProgressCallback>`] via
//! [`crate::config::RefineConfigBuilder::progress_callback`] to receive
//! real-time events as the pipeline works through the chunks.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a Tokio broadcast channel, a WebSocket, a database
//! record, or a terminal progress bar without the library knowing anything
//! about how the host application communicates. The trait is `Send + Sync`
//! so it works correctly when chunks are corrected concurrently.
//!
//! # Example
//!
//! ```rust
//! use ocr_polish::{RefineProgressCallback, ProgressSnapshot, RefineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl RefineProgressCallback for CountingCallback {
//!     fn on_batch_complete(&self, snapshot: &ProgressSnapshot) {
//!         self.completed.store(snapshot.chunks_done, Ordering::SeqCst);
//!         eprintln!(
//!             "{}/{} chunks, ${:.4} so far",
//!             snapshot.chunks_done, snapshot.total_chunks, snapshot.cost_so_far
//!         );
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = RefineConfig::builder()
//!     .progress_callback(counter as Arc<dyn RefineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Point-in-time view of a run, published after every completed batch.
///
/// The projection extrapolates linearly from the batches finished so far:
/// `projected_total_cost = cost_so_far / chunks_done * total_chunks`. Early
/// snapshots are noisy and settle as batches accumulate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Chunks attempted so far (refined or fallen back).
    pub chunks_done: usize,
    /// Total chunks in the run.
    pub total_chunks: usize,
    /// Wall-clock seconds since dispatch started.
    pub elapsed_secs: f64,
    /// Throughput so far.
    pub chunks_per_sec: f64,
    /// Estimated seconds until the last chunk completes.
    pub eta_secs: f64,
    /// Dollars accumulated so far (succeeded calls only).
    pub cost_so_far: f64,
    /// Linear projection of the whole run's cost.
    pub projected_total_cost: f64,
    /// Input tokens billed so far.
    pub input_tokens: u64,
    /// Output tokens billed so far.
    pub output_tokens: u64,
}

impl ProgressSnapshot {
    /// Compute a snapshot from raw run counters.
    pub fn compute(
        chunks_done: usize,
        total_chunks: usize,
        elapsed_secs: f64,
        cost_so_far: f64,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Self {
        let chunks_per_sec = if elapsed_secs > 0.0 {
            chunks_done as f64 / elapsed_secs
        } else {
            0.0
        };
        let remaining = total_chunks.saturating_sub(chunks_done);
        let eta_secs = if chunks_per_sec > 0.0 {
            remaining as f64 / chunks_per_sec
        } else {
            0.0
        };
        let projected_total_cost = if chunks_done > 0 {
            cost_so_far / chunks_done as f64 * total_chunks as f64
        } else {
            0.0
        };
        Self {
            chunks_done,
            total_chunks,
            elapsed_secs,
            chunks_per_sec,
            eta_secs,
            cost_so_far,
            projected_total_cost,
            input_tokens,
            output_tokens,
        }
    }
}

/// Called by the refinement pipeline as it works through the chunks.
///
/// Implementations must be `Send + Sync` (chunks within a batch run
/// concurrently). All methods have default no-op implementations so callers
/// only override what they care about.
///
/// # Thread safety
///
/// `on_chunk_start`, `on_chunk_complete`, and `on_chunk_fallback` may be
/// called concurrently from different tasks within one batch. Implementations
/// must protect shared mutable state with appropriate synchronisation
/// primitives (e.g. `Mutex`, `AtomicUsize`). `on_batch_complete` is called
/// between batches, never concurrently with the per-chunk methods.
pub trait RefineProgressCallback: Send + Sync {
    /// Called once before any chunk is dispatched.
    ///
    /// # Arguments
    /// * `total_chunks`    — number of chunks that will be corrected
    /// * `projected_cost`  — the pre-flight cost projection in dollars
    fn on_run_start(&self, total_chunks: usize, projected_cost: f64) {
        let _ = (total_chunks, projected_cost);
    }

    /// Called just before a chunk's correction call is sent.
    ///
    /// # Arguments
    /// * `chunk_index`  — 0-indexed chunk position
    /// * `total_chunks` — total chunks in the run
    fn on_chunk_start(&self, chunk_index: usize, total_chunks: usize) {
        let _ = (chunk_index, total_chunks);
    }

    /// Called when a chunk is successfully refined.
    ///
    /// # Arguments
    /// * `chunk_index`  — 0-indexed chunk position
    /// * `total_chunks` — total chunks in the run
    /// * `refined_len`  — byte length of the refined text
    fn on_chunk_complete(&self, chunk_index: usize, total_chunks: usize, refined_len: usize) {
        let _ = (chunk_index, total_chunks, refined_len);
    }

    /// Called when a chunk falls back to its original content.
    ///
    /// # Arguments
    /// * `chunk_index`  — 0-indexed chunk position
    /// * `total_chunks` — total chunks in the run
    /// * `error`        — human-readable reason for the fallback
    fn on_chunk_fallback(&self, chunk_index: usize, total_chunks: usize, error: &str) {
        let _ = (chunk_index, total_chunks, error);
    }

    /// Called after each batch with cumulative progress and cost figures.
    fn on_batch_complete(&self, snapshot: &ProgressSnapshot) {
        let _ = snapshot;
    }

    /// Called once after all chunks have been attempted.
    ///
    /// # Arguments
    /// * `total_chunks`  — total chunks in the run
    /// * `refined_count` — chunks refined without falling back
    fn on_run_complete(&self, total_chunks: usize, refined_count: usize) {
        let _ = (total_chunks, refined_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl RefineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::RefineConfig`].
pub type ProgressCallback = Arc<dyn RefineProgressCallback>;
