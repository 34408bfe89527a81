//! Eager (full-document) refinement entry points.
//!
//! ## Why eager vs. streaming?
//!
//! This module provides the simpler API: wait for all chunks, then return.
//! It collects every [`ChunkOutcome`] into memory and assembles the final
//! document before returning. Use [`crate::stream::refine_stream`] instead
//! when you want chunk outcomes progressively, e.g. to show corrected text
//! as it arrives.

use crate::backend::resolve_backend;
use crate::config::{ParagraphSplitStage, RefineConfig};
use crate::error::RefineError;
use crate::output::{ChunkOutcome, RefineOutput, RefineStats};
use crate::pipeline::normalize::{normalize, split_oversized_paragraphs};
use crate::pipeline::schedule::run_batches;
use crate::pipeline::{input, segment};
use crate::usage::{project_run_cost, UsageLedger};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Refine a text file or URL.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `input_str` — Local file path or HTTP/HTTPS URL to a text file
/// * `config`    — Refinement configuration
///
/// # Returns
/// `Ok(RefineOutput)` on success, even if some chunks fell back to their
/// original content (check `output.stats.fallback_chunks`).
///
/// # Errors
/// Returns `Err(RefineError)` only for fatal errors:
/// - File not found / permission denied / not UTF-8
/// - No correction backend could be resolved
/// - Projected cost exceeds the ceiling under an aborting gate policy
pub async fn refine(
    input_str: impl AsRef<str>,
    config: &RefineConfig,
) -> Result<RefineOutput, RefineError> {
    let input_str = input_str.as_ref();
    info!("Starting refinement: {}", input_str);
    let raw = input::resolve_input(input_str, config.download_timeout_secs).await?;
    refine_text(&raw, config).await
}

/// Refine raw OCR text already held in memory.
pub async fn refine_text(raw: &str, config: &RefineConfig) -> Result<RefineOutput, RefineError> {
    let total_start = Instant::now();

    // ── Step 1: Normalize ────────────────────────────────────────────────
    let normalize_start = Instant::now();
    let mut norm_opts = config.normalize.clone();
    norm_opts.split_oversized = config.paragraph_split == ParagraphSplitStage::Normalize;
    let normalized = normalize(raw, &norm_opts);
    let normalize_duration_ms = normalize_start.elapsed().as_millis() as u64;
    debug!(
        "Normalized {} bytes to {} bytes in {}ms",
        raw.len(),
        normalized.len(),
        normalize_duration_ms
    );

    // ── Step 2: Segment ──────────────────────────────────────────────────
    let segment_start = Instant::now();
    let chunks = segment::segment(&normalized, config.max_tokens_per_chunk, &config.estimator);
    let segment_duration_ms = segment_start.elapsed().as_millis() as u64;
    if chunks.is_empty() {
        info!("Input is empty after normalization; nothing to refine");
        return Ok(RefineOutput {
            text: String::new(),
            normalized,
            chunks: Vec::new(),
            stats: RefineStats {
                normalize_duration_ms,
                segment_duration_ms,
                total_duration_ms: total_start.elapsed().as_millis() as u64,
                ..RefineStats::default()
            },
        });
    }
    log_chunk_sizes(&chunks);

    // ── Step 3: Resolve backend ──────────────────────────────────────────
    let backend = resolve_backend(config)?;

    // ── Step 4: Pre-flight cost gate ─────────────────────────────────────
    let estimated_input: usize = chunks.iter().map(|c| c.estimated_tokens).sum();
    let entry = config.prices.resolve(backend.model_id());
    let projected = project_run_cost(estimated_input, entry);
    info!(
        "Projected cost for {} chunks (~{} input tokens) on '{}': ${:.4}",
        chunks.len(),
        estimated_input,
        backend.model_id(),
        projected
    );
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

    // ── Step 5: Dispatch chunks ──────────────────────────────────────────
    let ledger = UsageLedger::new();
    let refine_start = Instant::now();
    let outcomes = run_batches(&backend, &chunks, config, &ledger).await;
    let refine_duration_ms = refine_start.elapsed().as_millis() as u64;

    // ── Step 6: Assemble final document ──────────────────────────────────
    let text = assemble_document(&outcomes, config);

    // ── Step 7: Compute stats ────────────────────────────────────────────
    let mut stats = RefineStats::from_outcomes(&outcomes);
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    stats.normalize_duration_ms = normalize_duration_ms;
    stats.segment_duration_ms = segment_duration_ms;
    stats.refine_duration_ms = refine_duration_ms;

    info!(
        "Refinement complete: {}/{} chunks refined, ${:.4}, {}ms total",
        stats.refined_chunks, stats.total_chunks, stats.total_cost, stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(stats.total_chunks, stats.refined_chunks);
    }

    Ok(RefineOutput {
        text,
        normalized,
        chunks: outcomes,
        stats,
    })
}

/// Refine a text file or URL and write the result directly to a file.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn refine_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &RefineConfig,
) -> Result<RefineStats, RefineError> {
    let output = refine(input_str, config).await?;
    let path = output_path.as_ref();
    write_atomic(path, &output.text).await?;
    Ok(output.stats)
}

/// Synchronous wrapper around [`refine`].
///
/// Creates a temporary tokio runtime internally.
pub fn refine_sync(
    input_str: impl AsRef<str>,
    config: &RefineConfig,
) -> Result<RefineOutput, RefineError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| RefineError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(refine(input_str, config))
}

/// Write `contents` to `path` atomically (temp file in the same directory,
/// then rename).
pub(crate) async fn write_atomic(path: &Path, contents: &str) -> Result<(), RefineError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RefineError::OutputWriteFailed {
                    path: path.to_path_buf(),
                    source: e,
                })?;
        }
    }

    let tmp_path = path.with_extension("txt.tmp");
    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(|e| RefineError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| RefineError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Join chunk texts into the final document, optionally re-splitting
/// oversized paragraphs when the split is configured for assembly time.
fn assemble_document(outcomes: &[ChunkOutcome], config: &RefineConfig) -> String {
    let mut text = outcomes
        .iter()
        .map(|o| o.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    if config.paragraph_split == ParagraphSplitStage::Assembly {
        text = split_oversized_paragraphs(&text, config.normalize.max_sentences_per_paragraph);
    }

    if !text.is_empty() {
        text.push('\n');
    }
    text
}

/// Log min/max/mean estimated chunk sizes; an unbalanced segmentation shows
/// up here long before it shows up as a cost anomaly.
fn log_chunk_sizes(chunks: &[segment::Chunk]) {
    let min = chunks.iter().map(|c| c.estimated_tokens).min().unwrap_or(0);
    let max = chunks.iter().map(|c| c.estimated_tokens).max().unwrap_or(0);
    let total: usize = chunks.iter().map(|c| c.estimated_tokens).sum();
    let mean = total / chunks.len().max(1);
    info!(
        "Segmented into {} chunks (est. tokens: min {}, mean {}, max {})",
        chunks.len(),
        min,
        mean,
        max
    );
}
