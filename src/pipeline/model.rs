//! VLM interaction: send an [`AnalysisRequest`] and return the reply text.
//!
//! The orchestrator treats the model as a black box with one operation,
//! [`VisionModel::complete`], and performs a single call per document.
//! Timeouts and retry/backoff belong to the client, not to the pipeline, so
//! they live in [`LlmVisionModel`].
//!
//! ## Retry Strategy
//!
//! Exponential backoff (`retry_backoff_ms * 2^(attempt-1)`): with a 500 ms base
//! and 3 retries the waits are 500 ms → 1 s → 2 s. A single wait never exceeds
//! [`MAX_BACKOFF_MS`].

use crate::config::AnalysisConfig;
use crate::error::TamperError;
use crate::pipeline::prompt::AnalysisRequest;
use async_trait::async_trait;
use edgequake_llm::{CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// A completed model call.
#[derive(Debug, Clone, Default)]
pub struct ModelReply {
    pub content: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// Ordered multimodal messages in, free text out.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Fails with [`TamperError::ModelCall`] on provider, network or auth failure.
    async fn complete(&self, request: &AnalysisRequest) -> Result<ModelReply, TamperError>;
}

/// [`VisionModel`] backed by an edgequake-llm provider.
pub struct LlmVisionModel {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    max_retries: u32,
    retry_backoff_ms: u64,
    api_timeout: Duration,
}

impl LlmVisionModel {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &AnalysisConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            api_timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    /// Resolve the provider from `config` and the environment.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self, TamperError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
    }
}

#[async_trait]
impl VisionModel for LlmVisionModel {
    async fn complete(&self, request: &AnalysisRequest) -> Result<ModelReply, TamperError> {
        let start = Instant::now();
        let messages = request.to_chat_messages();
        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_delay(self.retry_backoff_ms, attempt);
                warn!(
                    "Model call: retry {}/{} after {}ms",
                    attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match timeout(self.api_timeout, self.provider.chat(&messages, Some(&self.options))).await {
                Ok(Ok(response)) => {
                    debug!(
                        "Model call: {} chunks, {} input tokens, {} output tokens, {:?}",
                        request.chunk_count(),
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(ModelReply {
                        content: response.content,
                        prompt_tokens: response.prompt_tokens,
                        completion_tokens: response.completion_tokens,
                    });
                }
                Ok(Err(e)) => {
                    let err_msg = format!("{}", e);
                    warn!("Model call: attempt {} failed: {}", attempt + 1, err_msg);
                    last_err = Some(err_msg);
                }
                Err(_) => {
                    let err_msg = format!("timed out after {}s", self.api_timeout.as_secs());
                    warn!("Model call: attempt {} {}", attempt + 1, err_msg);
                    last_err = Some(err_msg);
                }
            }
        }

        Err(TamperError::ModelCall(format!(
            "{} (after {} retries)",
            last_err.unwrap_or_else(|| "Unknown error".to_string()),
            self.max_retries
        )))
    }
}

/// Longest wait between two attempts.
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Wait before retry number `attempt` (1-based).
fn backoff_delay(base_ms: u64, attempt: u32) -> u64 {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS)
}

/// Build `CompletionOptions` from the analysis config.
fn build_options(config: &AnalysisConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. `config.provider`, used as-is.
/// 2. `config.provider_name` + `config.model` via [`ProviderFactory`].
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set.
/// 4. OpenAI when `OPENAI_API_KEY` is set.
/// 5. [`ProviderFactory::from_env`] auto-detection.
pub fn resolve_provider(config: &AnalysisConfig) -> Result<Arc<dyn LLMProvider>, TamperError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| TamperError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, AZURE_OPENAI_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

/// Vision model used when only a provider is named.
pub const DEFAULT_MODEL: &str = "gpt-4o";

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, TamperError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        TamperError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let config = AnalysisConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.7));
        assert_eq!(opts.max_tokens, Some(800));
    }

    #[test]
    fn build_options_follow_builder() {
        let config = AnalysisConfig::builder()
            .temperature(0.0)
            .max_tokens(1200)
            .build()
            .unwrap();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(1200));
    }

    #[test]
    fn backoff_doubles_from_base() {
        let waits: Vec<u64> = (1..=3).map(|a| backoff_delay(500, a)).collect();
        assert_eq!(waits, vec![500, 1000, 2000]);
    }

    #[test]
    fn backoff_is_capped_for_late_attempts() {
        assert_eq!(backoff_delay(500, 7), 30_000);
        assert_eq!(backoff_delay(500, 64), MAX_BACKOFF_MS);
        assert_eq!(backoff_delay(500, u32::MAX), MAX_BACKOFF_MS);
        assert_eq!(backoff_delay(u64::MAX, 2), MAX_BACKOFF_MS);
        assert_eq!(backoff_delay(0, 40), 0);
    }
}
