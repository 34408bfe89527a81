//! Pipeline stages for OCR text refinement.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. change the token estimator) without touching
//! other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ normalize ──▶ segment ──▶ schedule ──▶ client
//! (URL/path) (heuristics)  (chunks)    (batches)   (LLM + retry)
//! ```
//!
//! 1. [`input`]     — load the user-supplied path or URL as raw text
//! 2. [`normalize`] — deterministic cleanup rules for OCR damage (line
//!    breaks, page artifacts, character confusions)
//! 3. [`tokens`]    — token estimation used for budgeting
//! 4. [`segment`]   — split normalized text into token-budgeted chunks
//! 5. [`schedule`]  — batch-synchronous concurrent dispatch with per-chunk
//!    timeouts and progress snapshots
//! 6. [`client`]    — drive the correction call with retry/backoff; the only
//!    stage with network I/O

pub mod client;
pub mod input;
pub mod normalize;
pub mod schedule;
pub mod segment;
pub mod tokens;
