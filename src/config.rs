//! Configuration types for OCR text refinement.
//!
//! All run behaviour is controlled through [`RefineConfig`], built via its
//! [`RefineConfigBuilder`]. Keeping every knob in one struct makes it trivial
//! to share configs across threads, log them, and diff two runs to understand
//! why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A twenty-field constructor is unreadable and breaks on every new field.
//! The builder pattern lets callers set only what they care about and rely on
//! well-documented defaults for the rest.

use crate::backend::CorrectionBackend;
use crate::error::RefineError;
use crate::pipeline::client::RetryDelayFn;
use crate::pipeline::normalize::NormalizeOptions;
use crate::pipeline::tokens::TokenEstimator;
use crate::pricing::PriceTable;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration for an OCR refinement run.
///
/// Built via [`RefineConfig::builder()`] or using
/// [`RefineConfig::default()`].
///
/// # Example
/// ```rust
/// use ocr_polish::RefineConfig;
///
/// let config = RefineConfig::builder()
///     .max_tokens_per_chunk(3000)
///     .concurrency(8)
///     .model("gpt-4.1")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct RefineConfig {
    /// Token budget per chunk under the configured estimator. Default: 2500.
    ///
    /// The budget bounds the *input* side of each correction call. 2 500
    /// estimated tokens leaves comfortable headroom for the system prompt
    /// and the echoed correction inside an 8K context, and keeps a failed
    /// call cheap to retry. Raise it toward 3 000 for large-context models
    /// to cut per-call overhead.
    pub max_tokens_per_chunk: usize,

    /// Maximum tokens the backend may generate per chunk. Default: 4000.
    ///
    /// Proof-reading echoes the text back, so output length tracks input
    /// length. 4 000 covers a full 2 500-token chunk with margin; setting
    /// this below the chunk budget silently truncates corrections.
    pub max_output_tokens: usize,

    /// Number of concurrent correction calls within a batch. Default: 5.
    ///
    /// Correction APIs are network-bound, not CPU-bound. Five calls at once
    /// cuts wall-clock time roughly 4x over sequential dispatch without
    /// tripping the default rate limits of the major providers. If you hit
    /// rate-limit errors (`429`), lower this; if the API is fast and your
    /// quota is wide, raise it.
    pub concurrency: usize,

    /// Model identifier, e.g. "gpt-4.1", "claude-3-5-haiku-20241022".
    /// If None, uses the provider default.
    pub model: Option<String>,

    /// Provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `backend`, the provider is resolved from the
    /// environment.
    pub provider_name: Option<String>,

    /// Pre-constructed correction backend. Takes precedence over
    /// `provider_name`.
    pub backend: Option<Arc<dyn CorrectionBackend>>,

    /// Sampling temperature for correction calls. Default: 0.1.
    ///
    /// Low temperature keeps the model faithful to the input text, which is
    /// exactly what proof-reading wants. Higher values introduce creativity
    /// that manifests as rewording.
    pub temperature: f32,

    /// Total correction attempts per chunk. Default: 3.
    ///
    /// Attempt 1 runs immediately; attempt `a` waits `retry_unit_ms * 2^(a-2)`
    /// first. Most 5xx and timeout errors are transient, and three attempts
    /// catch the vast majority. Permanent errors (bad API key, 400) are not
    /// retried. Must be at least 1.
    pub max_retries: u32,

    /// Base unit for exponential retry backoff in milliseconds. Default: 1000.
    ///
    /// Delays double per retry: 1 s, 2 s, 4 s. Exponential backoff avoids the
    /// thundering-herd problem where N concurrent workers retry simultaneously
    /// and immediately overwhelm a recovering API endpoint.
    pub retry_unit_ms: u64,

    /// Override the backoff schedule entirely. Maps a retry ordinal (0 for
    /// the delay before the second attempt) to a delay. Tests inject a zero
    /// delay here; production code normally leaves this None.
    pub retry_delay: Option<RetryDelayFn>,

    /// Per-chunk wall-clock timeout in seconds, covering all retries.
    /// Default: 180.
    ///
    /// A chunk that exceeds this falls back to its original content; the
    /// timeout never fails the run.
    pub chunk_timeout_secs: u64,

    /// Pre-flight cost ceiling in dollars. Default: 10.0.
    pub cost_ceiling: f64,

    /// What to do when the projected cost exceeds the ceiling.
    /// Default: [`CostGatePolicy::RequireExplicitProceed`].
    pub cost_gate: CostGatePolicy,

    /// Per-model pricing used for the pre-flight projection and the run
    /// ledger.
    pub prices: PriceTable,

    /// Token estimation strategy for segmentation and budgeting.
    pub estimator: TokenEstimator,

    /// Per-stage switches for the normalization pass.
    pub normalize: NormalizeOptions,

    /// Where the oversized-paragraph split runs.
    /// Default: [`ParagraphSplitStage::Normalize`].
    pub paragraph_split: ParagraphSplitStage,

    /// Custom system prompt. If None, uses the built-in proof-reader prompt.
    pub system_prompt: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional progress callback receiving per-chunk and per-batch events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_chunk: 2500,
            max_output_tokens: 4000,
            concurrency: 5,
            model: None,
            provider_name: None,
            backend: None,
            temperature: 0.1,
            max_retries: 3,
            retry_unit_ms: 1000,
            retry_delay: None,
            chunk_timeout_secs: 180,
            cost_ceiling: 10.0,
            cost_gate: CostGatePolicy::default(),
            prices: PriceTable::default(),
            estimator: TokenEstimator::default(),
            normalize: NormalizeOptions::default(),
            paragraph_split: ParagraphSplitStage::default(),
            system_prompt: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for RefineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefineConfig")
            .field("max_tokens_per_chunk", &self.max_tokens_per_chunk)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("backend", &self.backend.as_ref().map(|_| "<dyn CorrectionBackend>"))
            .field("temperature", &self.temperature)
            .field("max_retries", &self.max_retries)
            .field("retry_unit_ms", &self.retry_unit_ms)
            .field("chunk_timeout_secs", &self.chunk_timeout_secs)
            .field("cost_ceiling", &self.cost_ceiling)
            .field("cost_gate", &self.cost_gate)
            .field("estimator", &self.estimator)
            .field("paragraph_split", &self.paragraph_split)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .finish()
    }
}

impl RefineConfig {
    /// Create a new builder for `RefineConfig`.
    pub fn builder() -> RefineConfigBuilder {
        RefineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`RefineConfig`].
#[derive(Debug)]
pub struct RefineConfigBuilder {
    config: RefineConfig,
}

impl RefineConfigBuilder {
    pub fn max_tokens_per_chunk(mut self, n: usize) -> Self {
        self.config.max_tokens_per_chunk = n.max(1);
        self
    }

    pub fn max_output_tokens(mut self, n: usize) -> Self {
        self.config.max_output_tokens = n;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn backend(mut self, backend: Arc<dyn CorrectionBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.max(1);
        self
    }

    pub fn retry_unit_ms(mut self, ms: u64) -> Self {
        self.config.retry_unit_ms = ms;
        self
    }

    pub fn retry_delay(mut self, delay: RetryDelayFn) -> Self {
        self.config.retry_delay = Some(delay);
        self
    }

    pub fn chunk_timeout_secs(mut self, secs: u64) -> Self {
        self.config.chunk_timeout_secs = secs.max(1);
        self
    }

    pub fn cost_ceiling(mut self, dollars: f64) -> Self {
        self.config.cost_ceiling = dollars;
        self
    }

    pub fn cost_gate(mut self, policy: CostGatePolicy) -> Self {
        self.config.cost_gate = policy;
        self
    }

    pub fn prices(mut self, table: PriceTable) -> Self {
        self.config.prices = table;
        self
    }

    pub fn estimator(mut self, estimator: TokenEstimator) -> Self {
        self.config.estimator = estimator;
        self
    }

    pub fn normalize(mut self, opts: NormalizeOptions) -> Self {
        self.config.normalize = opts;
        self
    }

    pub fn paragraph_split(mut self, stage: ParagraphSplitStage) -> Self {
        self.config.paragraph_split = stage;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.config.progress_callback = Some(callback);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RefineConfig, RefineError> {
        let c = &self.config;
        if c.max_tokens_per_chunk == 0 {
            return Err(RefineError::InvalidConfig(
                "Chunk token budget must be ≥ 1".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(RefineError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.max_retries == 0 {
            return Err(RefineError::InvalidConfig(
                "Total attempts must be ≥ 1".into(),
            ));
        }
        if !c.cost_ceiling.is_finite() || c.cost_ceiling < 0.0 {
            return Err(RefineError::InvalidConfig(format!(
                "Cost ceiling must be a non-negative dollar amount, got {}",
                c.cost_ceiling
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// What to do when the pre-flight projection exceeds the cost ceiling.
///
/// The projection happens before any chunk is dispatched, so an abort here
/// spends nothing. Interactive confirmation is deliberately not a variant:
/// the library never blocks on a terminal. A CLI that wants confirmation
/// asks first and then builds the config with [`CostGatePolicy::Proceed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CostGatePolicy {
    /// Log a warning and continue the run.
    Proceed,
    /// Abort with [`crate::error::RefineError::CostCeilingExceeded`].
    Abort,
    /// Abort like [`CostGatePolicy::Abort`]; the name signals that the
    /// caller is expected to re-run with `Proceed` after an explicit
    /// decision. (default)
    #[default]
    RequireExplicitProceed,
}

impl CostGatePolicy {
    /// Whether a run over the ceiling is allowed to continue.
    pub fn allows_overrun(&self) -> bool {
        matches!(self, CostGatePolicy::Proceed)
    }
}

/// Where the oversized-paragraph split runs.
///
/// Splitting during normalization changes the text *before* segmentation,
/// giving the segmenter more boundaries to cut at. Splitting at assembly
/// leaves the backend the original paragraph shapes and reformats only the
/// final document. This setting overrides
/// [`NormalizeOptions::split_oversized`] for pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParagraphSplitStage {
    /// Split during the normalization pass, before segmentation. (default)
    #[default]
    Normalize,
    /// Split the assembled document after all corrections return.
    Assembly,
    /// Never split paragraphs.
    Off,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds() {
        let config = RefineConfig::builder().build().unwrap();
        assert_eq!(config.max_tokens_per_chunk, 2500);
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.chunk_timeout_secs, 180);
        assert!((config.cost_ceiling - 10.0).abs() < 1e-12);
        assert_eq!(config.cost_gate, CostGatePolicy::RequireExplicitProceed);
    }

    #[test]
    fn setters_clamp_degenerate_values() {
        let config = RefineConfig::builder()
            .concurrency(0)
            .max_retries(0)
            .max_tokens_per_chunk(0)
            .temperature(5.0)
            .build()
            .unwrap();
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.max_tokens_per_chunk, 1);
        assert!((config.temperature - 2.0).abs() < 1e-6);
    }

    #[test]
    fn negative_ceiling_rejected() {
        let result = RefineConfig::builder().cost_ceiling(-1.0).build();
        assert!(matches!(result, Err(RefineError::InvalidConfig(_))));
    }

    #[test]
    fn only_proceed_allows_overrun() {
        assert!(CostGatePolicy::Proceed.allows_overrun());
        assert!(!CostGatePolicy::Abort.allows_overrun());
        assert!(!CostGatePolicy::RequireExplicitProceed.allows_overrun());
    }

    #[test]
    fn debug_omits_backend_internals() {
        let config = RefineConfig::default();
        let dbg = format!("{config:?}");
        assert!(dbg.contains("max_tokens_per_chunk"));
        assert!(!dbg.contains("PriceTable {"));
    }
}
