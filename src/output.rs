//! Result types produced by a refinement run.
//!
//! A run never loses content: every chunk yields a [`ChunkOutcome`] whether
//! its correction call succeeded or not, and the outcome always carries the
//! text that ends up in the final document (refined on success, the original
//! chunk content on fallback).

use crate::error::ChunkError;
use serde::{Deserialize, Serialize};

/// The result of attempting to refine one chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkOutcome {
    /// The chunk's position in source order.
    pub index: usize,
    /// Text contributed to the final document. On fallback this is the
    /// original chunk content, verbatim.
    pub text: String,
    /// Input tokens billed for this chunk (0 when no call succeeded).
    pub input_tokens: u32,
    /// Output tokens billed for this chunk.
    pub output_tokens: u32,
    /// Dollar cost of this chunk's successful call, if any.
    pub cost: f64,
    /// Retry attempts consumed beyond the first (0 = first attempt worked).
    pub retries: u32,
    /// Wall-clock duration of the chunk's correction, including retries.
    pub duration_ms: u64,
    /// Why the chunk fell back, when it did.
    pub error: Option<ChunkError>,
}

impl ChunkOutcome {
    /// Whether the chunk was actually refined (no fallback).
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate statistics for a completed run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefineStats {
    /// Chunks the input was segmented into.
    pub total_chunks: usize,
    /// Chunks refined by the backend.
    pub refined_chunks: usize,
    /// Chunks that fell back to their original content.
    pub fallback_chunks: usize,
    /// Total input tokens billed across all succeeded calls.
    pub total_input_tokens: u64,
    /// Total output tokens billed across all succeeded calls.
    pub total_output_tokens: u64,
    /// Total dollar cost of the run.
    pub total_cost: f64,
    /// End-to-end wall-clock time.
    pub total_duration_ms: u64,
    /// Time spent in the normalization pass.
    pub normalize_duration_ms: u64,
    /// Time spent segmenting the normalized text.
    pub segment_duration_ms: u64,
    /// Time spent dispatching correction calls.
    pub refine_duration_ms: u64,
}

impl RefineStats {
    /// Fold per-chunk outcomes into aggregate counters. Timing fields are
    /// filled in by the caller.
    pub(crate) fn from_outcomes(outcomes: &[ChunkOutcome]) -> Self {
        let mut stats = Self {
            total_chunks: outcomes.len(),
            ..Self::default()
        };
        for outcome in outcomes {
            if outcome.succeeded() {
                stats.refined_chunks += 1;
            } else {
                stats.fallback_chunks += 1;
            }
            stats.total_input_tokens += u64::from(outcome.input_tokens);
            stats.total_output_tokens += u64::from(outcome.output_tokens);
            stats.total_cost += outcome.cost;
        }
        stats
    }
}

/// Everything a refinement run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineOutput {
    /// The final document: all chunk texts joined with blank lines.
    pub text: String,
    /// The normalized text as it stood before any correction call. Useful
    /// for diffing what the backend changed, or as the deliverable when no
    /// backend is configured.
    pub normalized: String,
    /// Per-chunk outcomes in source order.
    pub chunks: Vec<ChunkOutcome>,
    /// Aggregate run statistics.
    pub stats: RefineStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(index: usize, error: Option<ChunkError>) -> ChunkOutcome {
        ChunkOutcome {
            index,
            text: format!("chunk {index}"),
            input_tokens: 100,
            output_tokens: 50,
            cost: 0.01,
            retries: 0,
            duration_ms: 5,
            error,
        }
    }

    #[test]
    fn stats_fold_counts_and_totals() {
        let outcomes = vec![
            outcome(0, None),
            outcome(1, Some(ChunkError::EmptyResponse { chunk: 1 })),
            outcome(2, None),
        ];
        let stats = RefineStats::from_outcomes(&outcomes);
        assert_eq!(stats.total_chunks, 3);
        assert_eq!(stats.refined_chunks, 2);
        assert_eq!(stats.fallback_chunks, 1);
        assert_eq!(stats.total_input_tokens, 300);
        assert_eq!(stats.total_output_tokens, 150);
        assert!((stats.total_cost - 0.03).abs() < 1e-12);
    }

    #[test]
    fn succeeded_reflects_error_presence() {
        assert!(outcome(0, None).succeeded());
        assert!(!outcome(0, Some(ChunkError::Timeout { chunk: 0, secs: 180 })).succeeded());
    }

    #[test]
    fn empty_run_stats_are_zero() {
        let stats = RefineStats::from_outcomes(&[]);
        assert_eq!(stats.total_chunks, 0);
        assert_eq!(stats.total_cost, 0.0);
    }
}
