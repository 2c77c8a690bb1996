//! Configuration types for tamper analysis.
//!
//! All pipeline behaviour is controlled through [`AnalysisConfig`], built via
//! its [`AnalysisConfigBuilder`]. The store, rasteriser and model client are
//! *not* configured here: they are constructed by the caller and handed to
//! [`crate::process::Pipeline::new`], so nothing in the library reads
//! process-wide settings on its own.

use crate::error::TamperError;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Upper bound accepted by [`AnalysisConfigBuilder::max_retries`].
pub const MAX_RETRIES: u32 = 10;

/// Configuration for a tamper-analysis run.
///
/// # Example
/// ```rust
/// use tamper_scan::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .strip_height(200)
///     .dpi(300)
///     .model("gpt-4o")
///     .build()
///     .unwrap();
/// assert_eq!(config.strip_height, 200);
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Height in pixels of each horizontal strip sent to the model. Default: 150.
    ///
    /// Changing this changes the numbering the model reports against, so
    /// reports produced with different strip heights are not comparable.
    pub strip_height: u32,

    /// Rendering DPI used when rasterising the first PDF page. Range: 72–600. Default: 300.
    ///
    /// Tampering shows up in glyph edges and spacing; 300 DPI keeps those
    /// visible. Raster inputs (PNG/JPEG) are used at their native resolution.
    pub dpi: u32,

    /// Cap on either rendered dimension in pixels. Default: 4000.
    pub max_rendered_pixels: u32,

    /// Encoding of the persisted overlay image. Default: PNG.
    pub overlay_format: OverlayFormat,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Custom instruction message. If None, uses [`crate::prompts::TAMPER_DETECTION_PROMPT`].
    pub system_prompt: Option<String>,

    /// LLM model identifier, e.g. "gpt-4o".
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "azure", "anthropic").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.7.
    pub temperature: f32,

    /// Maximum completion tokens. Default: 800.
    ///
    /// The reply is a short verdict plus one JSON object; 800 tokens leaves
    /// room for commentary on a dozen flagged strips.
    pub max_tokens: usize,

    /// Retries of a failed model call inside the model client. Range: 0–10. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Per model call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            strip_height: 150,
            dpi: 300,
            max_rendered_pixels: 4000,
            overlay_format: OverlayFormat::default(),
            password: None,
            system_prompt: None,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.7,
            max_tokens: 800,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("strip_height", &self.strip_height)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("overlay_format", &self.overlay_format)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn strip_height(mut self, px: u32) -> Self {
        self.config.strip_height = px;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn overlay_format(mut self, format: OverlayFormat) -> Self {
        self.config.overlay_format = format;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
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

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    /// Clamped to [`MAX_RETRIES`].
    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(MAX_RETRIES);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, TamperError> {
        let c = &self.config;
        if c.strip_height == 0 {
            return Err(TamperError::InvalidConfig(
                "Strip height must be ≥ 1 pixel".into(),
            ));
        }
        if c.dpi < 72 || c.dpi > 600 {
            return Err(TamperError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.max_tokens == 0 {
            return Err(TamperError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(TamperError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Image encoding of the persisted overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayFormat {
    /// Lossless, keeps thin borders crisp. (default)
    #[default]
    Png,
    /// Smaller files; the alpha channel is flattened.
    Jpeg,
}

impl OverlayFormat {
    /// File extension used in the overlay artifact key.
    pub fn extension(&self) -> &'static str {
        match self {
            OverlayFormat::Png => "png",
            OverlayFormat::Jpeg => "jpg",
        }
    }
}
