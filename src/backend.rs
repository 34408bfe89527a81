//! Correction backend abstraction and the edgequake-llm implementation.
//!
//! The pipeline never talks to an LLM provider directly; it goes through
//! [`CorrectionBackend`], a one-method seam that takes chunk text and returns
//! corrected text plus token usage. The seam exists for two reasons: tests
//! substitute a scripted backend without any network, and callers can wrap
//! the real backend with middleware (caching, rate-limiting) the library
//! does not need to know about.
//!
//! Errors from a backend are pre-classified as [`BackendError::Transient`]
//! or [`BackendError::Fatal`] so the retry loop does not have to guess:
//! transient errors are retried with backoff, fatal ones (bad credentials,
//! malformed request) fail the chunk immediately.

use crate::config::RefineConfig;
use crate::error::RefineError;
use crate::prompts::SYSTEM_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use thiserror::Error;

/// Model used when the caller names a provider but no model.
pub const DEFAULT_MODEL: &str = "gpt-4.1";

/// Per-call parameters passed to the backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectionOptions {
    /// Sampling temperature.
    pub temperature: f32,
    /// Output token cap for the call.
    pub max_output_tokens: usize,
}

impl CorrectionOptions {
    pub fn from_config(config: &RefineConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        }
    }
}

/// A successful correction with its billed usage.
#[derive(Debug, Clone)]
pub struct Correction {
    /// The corrected text. May be empty; the caller decides what an empty
    /// correction means.
    pub text: String,
    /// Input (prompt) tokens billed for the call.
    pub input_tokens: u32,
    /// Output (completion) tokens billed for the call.
    pub output_tokens: u32,
}

/// A failed correction call, classified by retryability.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Worth retrying: rate limit, overloaded backend, network blip.
    #[error("{detail}")]
    Transient { detail: String },
    /// Retrying cannot help: bad credentials, malformed request.
    #[error("{detail}")]
    Fatal { detail: String },
}

impl BackendError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Transient { .. })
    }
}

/// The seam between the pipeline and whatever corrects text.
#[async_trait]
pub trait CorrectionBackend: Send + Sync {
    /// Model identifier used for price lookups and logging.
    fn model_id(&self) -> &str;

    /// Correct one chunk of text.
    async fn correct_text(
        &self,
        text: &str,
        options: &CorrectionOptions,
    ) -> Result<Correction, BackendError>;
}

/// [`CorrectionBackend`] backed by an edgequake-llm chat provider.
///
/// Each call sends two messages: the proof-reader system prompt and the
/// chunk text as the user turn. The response content is the correction.
pub struct LlmBackend {
    provider: Arc<dyn LLMProvider>,
    model: String,
    system_prompt: String,
}

impl LlmBackend {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        model: impl Into<String>,
        system_prompt: Option<String>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            system_prompt: system_prompt.unwrap_or_else(|| SYSTEM_PROMPT.to_string()),
        }
    }
}

#[async_trait]
impl CorrectionBackend for LlmBackend {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn correct_text(
        &self,
        text: &str,
        options: &CorrectionOptions,
    ) -> Result<Correction, BackendError> {
        let messages = vec![
            ChatMessage::system(&self.system_prompt),
            ChatMessage::user(text),
        ];
        let completion_options = CompletionOptions {
            temperature: Some(options.temperature),
            max_tokens: Some(options.max_output_tokens),
            ..Default::default()
        };

        match self.provider.chat(&messages, Some(&completion_options)).await {
            Ok(response) => Ok(Correction {
                text: response.content,
                input_tokens: response.prompt_tokens as u32,
                output_tokens: response.completion_tokens as u32,
            }),
            Err(e) => Err(classify_provider_error(&format!("{e}"))),
        }
    }
}

/// Classify a provider error message as transient or fatal.
///
/// Providers do not expose structured error kinds through the trait object,
/// so classification keys on the message text. Anything that smells like an
/// authentication or request-shape problem is fatal; everything else
/// (429, 5xx, timeouts, connection resets) is worth retrying.
fn classify_provider_error(detail: &str) -> BackendError {
    let lowered = detail.to_lowercase();
    let fatal = ["401", "403", "unauthorized", "forbidden", "invalid api key", "authentication"]
        .iter()
        .any(|marker| lowered.contains(marker));

    if fatal {
        BackendError::Fatal {
            detail: detail.to_string(),
        }
    } else {
        BackendError::Transient {
            detail: detail.to_string(),
        }
    }
}

/// Instantiate a named provider with the given model.
fn create_text_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, RefineError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        RefineError::BackendNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the correction backend, from most-specific to least-specific.
///
/// The four-level fallback chain lets library users and CLI users each set
/// exactly as much or as little as they need:
///
/// 1. **Pre-built backend** (`config.backend`) — the caller constructed the
///    backend entirely; we use it as-is. Useful in tests or when the caller
///    needs custom middleware.
///
/// 2. **Named provider + model** (`config.provider_name`) — the caller named
///    a provider (e.g. `"openai"`) and optional model. We call
///    [`ProviderFactory::create_llm_provider`] which reads the corresponding
///    API key (`OPENAI_API_KEY`, etc.) from the environment.
///
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`) —
///    both env vars set means the caller chose a provider and model at the
///    execution-environment level (Makefile, shell script, CI). Checked
///    before full auto-detection so the model choice is honoured even when
///    multiple API keys are present.
///
/// 4. **Full auto-detection** (`ProviderFactory::from_env`) — the factory
///    scans all known API key variables and picks the first available
///    provider. Convenient for `ocrpolish scan.txt` with no other
///    configuration. An OpenAI key is preferred when present so users with
///    multiple provider keys get a predictable default.
pub fn resolve_backend(config: &RefineConfig) -> Result<Arc<dyn CorrectionBackend>, RefineError> {
    // 1) User-provided backend takes priority
    if let Some(ref backend) = config.backend {
        return Ok(Arc::clone(backend));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    // 2) Provider name + model
    if let Some(ref name) = config.provider_name {
        let provider = create_text_provider(name, model)?;
        return Ok(Arc::new(LlmBackend::new(
            provider,
            model,
            config.system_prompt.clone(),
        )));
    }

    // 3) Auto-detect from environment; honour EDGEQUAKE_LLM_PROVIDER +
    // EDGEQUAKE_MODEL when both set
    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            let model = config.model.as_deref().unwrap_or(&env_model);
            let provider = create_text_provider(&prov, model)?;
            return Ok(Arc::new(LlmBackend::new(
                provider,
                model,
                config.system_prompt.clone(),
            )));
        }
    }

    // Prefer OpenAI explicitly when an OpenAI API key is present.
    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let provider = create_text_provider("openai", model)?;
            return Ok(Arc::new(LlmBackend::new(
                provider,
                model,
                config.system_prompt.clone(),
            )));
        }
    }

    // 4) Full auto-detection
    let (provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| RefineError::BackendNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(Arc::new(LlmBackend::new(
        provider,
        model,
        config.system_prompt.clone(),
    )))
}
