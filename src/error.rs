//! Error types for the ocr-polish library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`RefineError`] — **Fatal**: the run cannot proceed at all (unreadable
//!   input, invalid configuration, no backend, pre-flight cost rejection).
//!   Returned as `Err(RefineError)` from the top-level `refine*` functions.
//!
//! * [`ChunkError`] — **Non-fatal**: a single chunk failed (retries exhausted,
//!   empty response, timeout) but every other chunk is fine. Stored inside
//!   [`crate::output::ChunkOutcome`] together with the original chunk text, so
//!   a run never loses content to one bad call.
//!
//! The separation encodes the fail-open contract: once chunks are dispatched,
//! nothing that happens to an individual chunk can terminate the run.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the ocr-polish library.
///
/// Chunk-level failures use [`ChunkError`] and are stored in
/// [`crate::output::ChunkOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum RefineError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists but is not valid UTF-8 text.
    #[error("Input file is not valid UTF-8 text: '{path}'")]
    NotUtf8 { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Backend errors ────────────────────────────────────────────────────
    /// The configured correction backend is not initialised (missing API key etc.).
    #[error("Correction backend '{provider}' is not configured.\n{hint}")]
    BackendNotConfigured { provider: String, hint: String },

    // ── Pre-flight errors ─────────────────────────────────────────────────
    /// The projected run cost exceeds the configured ceiling.
    ///
    /// The only abort path after input resolution: no chunk has been
    /// dispatched when this is returned.
    #[error(
        "Projected cost ${projected:.4} exceeds the ceiling of ${ceiling:.2}.\n\
         Raise the ceiling or set the cost gate policy to Proceed to continue anyway."
    )]
    CostCeilingExceeded { projected: f64, ceiling: f64 },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output text file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single chunk.
///
/// Stored alongside [`crate::output::ChunkOutcome`] when a chunk falls back
/// to its original content. The run always continues.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ChunkError {
    /// Every retry attempt failed; the original chunk text was kept.
    #[error("Chunk {chunk}: correction failed after {retries} attempts: {detail}")]
    RetriesExhausted {
        chunk: usize,
        retries: u32,
        detail: String,
    },

    /// The backend answered but the corrected text was empty or missing.
    #[error("Chunk {chunk}: backend returned an empty correction")]
    EmptyResponse { chunk: usize },

    /// The call (including all internal retries) exceeded the per-chunk timeout.
    #[error("Chunk {chunk}: correction timed out after {secs}s")]
    Timeout { chunk: usize, secs: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_ceiling_display() {
        let e = RefineError::CostCeilingExceeded {
            projected: 12.3456,
            ceiling: 10.0,
        };
        let msg = e.to_string();
        assert!(msg.contains("$12.3456"), "got: {msg}");
        assert!(msg.contains("$10.00"), "got: {msg}");
    }

    #[test]
    fn retries_exhausted_display() {
        let e = ChunkError::RetriesExhausted {
            chunk: 7,
            retries: 3,
            detail: "HTTP 503".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("Chunk 7"));
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("HTTP 503"));
    }

    #[test]
    fn timeout_display() {
        let e = ChunkError::Timeout { chunk: 2, secs: 180 };
        assert!(e.to_string().contains("180s"));
        assert!(e.to_string().contains("Chunk 2"));
    }
}
