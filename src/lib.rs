//! # ocr-polish
//!
//! Refine noisy OCR text into clean prose using LLM proof-reading.
//!
//! ## Why this crate?
//!
//! OCR output is damaged in two distinct ways. The *shape* is wrong: hard
//! line breaks mid-sentence, hyphens at line ends, page numbers and running
//! headers embedded in the text. And the *characters* are wrong: `l`/`1`,
//! `o`/`0`, and friends. The shape damage is mechanical and fixed by cheap
//! deterministic rules; the character damage needs judgement, which is what
//! an LLM proof-reader provides. This crate does both, in that order, and
//! never loses content: any chunk whose correction fails keeps its original
//! text in the final document.
//!
//! ## Pipeline Overview
//!
//! ```text
//! raw OCR text
//!  │
//!  ├─ 1. Input      resolve local file or download from URL
//!  ├─ 2. Normalize  10-stage deterministic cleanup (lines, artifacts, confusables)
//!  ├─ 3. Segment    split into token-budgeted chunks at paragraph boundaries
//!  ├─ 4. Gate       project run cost, enforce the ceiling policy
//!  ├─ 5. Refine     batched concurrent LLM calls with retry + per-chunk timeout
//!  └─ 6. Output     reassembled document + per-chunk outcomes and cost stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ocr_polish::{refine, RefineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = RefineConfig::default();
//!     let output = refine("scan.txt", &config).await?;
//!     println!("{}", output.text);
//!     eprintln!(
//!         "{} chunks, ${:.4}, tokens: {} in / {} out",
//!         output.stats.total_chunks,
//!         output.stats.total_cost,
//!         output.stats.total_input_tokens,
//!         output.stats.total_output_tokens
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocrpolish` binary (clap + indicatif + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! ocr-polish = { version = "0.1", default-features = false }
//! ```
//!
//! ## Choosing a Model
//!
//! | Model | $/1K tokens (in/out) | Best for |
//! |-------|---------------------|----------|
//! | `gpt-4.1`                   | $0.002/$0.008  | Default — accurate, cheap |
//! | `claude-3-5-haiku-20241022` | $0.0008/$0.004 | Cheapest acceptable quality |
//! | `claude-sonnet-4-20250514`  | $0.003/$0.015  | Heavily damaged scans |
//! | `gpt-4o`                    | $0.005/$0.015  | Alternative mid-tier |
//!
//! A 100-page scanned book (~150K tokens) costs roughly **$0.90** with
//! `gpt-4.1`. The pre-flight gate projects this before any call is made.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod pricing;
pub mod progress;
pub mod prompts;
pub mod refine;
pub mod stream;
pub mod usage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{
    BackendError, Correction, CorrectionBackend, CorrectionOptions, LlmBackend,
};
pub use config::{
    CostGatePolicy, ParagraphSplitStage, RefineConfig, RefineConfigBuilder,
};
pub use error::{ChunkError, RefineError};
pub use output::{ChunkOutcome, RefineOutput, RefineStats};
pub use pipeline::normalize::{normalize, NormalizeOptions};
pub use pipeline::segment::{segment, Chunk};
pub use pipeline::tokens::TokenEstimator;
pub use pricing::{PriceEntry, PriceTable};
pub use progress::{
    NoopProgressCallback, ProgressCallback, ProgressSnapshot, RefineProgressCallback,
};
pub use refine::{refine, refine_sync, refine_text, refine_to_file};
pub use stream::{refine_stream, refine_text_stream, OutcomeStream};
pub use usage::{UsageLedger, UsageTotals};
