//! System prompt for the correction call.
//!
//! Centralising the prompt here keeps it in one place and lets unit tests
//! inspect it without a live backend. Callers can override it via
//! [`crate::config::RefineConfig::system_prompt`]; the constant is used only
//! when no override is provided.

/// Default system instruction sent with every chunk.
///
/// The instruction is deliberately narrow: correct, never rewrite. Asking the
/// model to "improve" text makes it paraphrase, which breaks the guarantee
/// that output content maps one-to-one onto input content.
pub const SYSTEM_PROMPT: &str = "You are a proof-reader. Return the text corrected for spelling, \
punctuation and OCR errors only. Preserve all headings and blank lines. \
DO NOT summarise or omit content.";
