//! Vision-LLM OCR engine: the default [`OcrModelProvider`].
//!
//! The "model" is a remote vision provider reached through `edgequake-llm`.
//! Loading resolves the provider (and its credentials) once; generation
//! sends one page image per chat request.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient and frequent under
//! concurrent load. Exponential backoff (`retry_backoff_ms * 2^(attempt-1)`,
//! capped at one minute) with 500 ms base and 3 retries waits 500 ms → 1 s →
//! 2 s per page.

use crate::config::{ConversionConfig, AUTO_MODEL, DEFAULT_VISION_MODEL};
use crate::engine::EngineError;
use crate::model::{Generation, OcrModel, OcrModelProvider, OcrProcessor, PixelValues};
use crate::pipeline::encode::encode_page;
use crate::pipeline::postprocess::clean_page_text;
use crate::prompts::DEFAULT_OCR_PROMPT;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use image::{DynamicImage, RgbImage};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Request settings shared by every page of every job.
#[derive(Debug, Clone)]
struct VisionSettings {
    system_prompt: String,
    temperature: f32,
    max_retries: u32,
    retry_backoff_ms: u64,
}

/// Resolves a vision provider when the model is loaded.
#[derive(Clone)]
pub struct VisionOcrProvider {
    preset: Option<Arc<dyn LLMProvider>>,
    settings: VisionSettings,
}

impl VisionOcrProvider {
    pub fn from_config(config: &ConversionConfig) -> Self {
        Self {
            preset: config.provider.clone(),
            settings: VisionSettings {
                system_prompt: config
                    .system_prompt
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OCR_PROMPT.to_string()),
                temperature: config.temperature,
                max_retries: config.max_retries,
                retry_backoff_ms: config.retry_backoff_ms,
            },
        }
    }
}

impl OcrModelProvider for VisionOcrProvider {
    fn load(
        &self,
        model_name: &str,
    ) -> Result<(Arc<dyn OcrProcessor>, Arc<dyn OcrModel>), EngineError> {
        let provider = match self.preset {
            Some(ref p) => Arc::clone(p),
            None => resolve_provider(model_name)?,
        };
        debug!("Vision OCR model resolved for '{}'", model_name);
        let model = VisionOcrModel {
            provider,
            settings: self.settings.clone(),
        };
        Ok((Arc::new(VisionProcessor), Arc::new(model)))
    }
}

/// Split `provider/model` into its parts. A bare name is a model only.
fn split_model_name(name: &str) -> (Option<&str>, Option<&str>) {
    if name.is_empty() || name == AUTO_MODEL {
        return (None, None);
    }
    match name.split_once('/') {
        Some((p, m)) if !p.is_empty() && !m.is_empty() => (Some(p), Some(m)),
        _ => (None, Some(name)),
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, EngineError> {
    ProviderFactory::create_llm_provider(provider_name, model)
        .map_err(|e| EngineError::Model(format!("provider '{provider_name}': {e}")))
}

/// Resolve the vision provider, from most-specific to least-specific:
///
/// 1. `provider/model` named explicitly
/// 2. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` both set
/// 3. `OPENAI_API_KEY` present, with the named model or the default one
/// 4. `ProviderFactory::from_env` auto-detection
fn resolve_provider(model_name: &str) -> Result<Arc<dyn LLMProvider>, EngineError> {
    let (provider, model) = split_model_name(model_name);

    if let Some(p) = provider {
        return create_vision_provider(p, model.unwrap_or(DEFAULT_VISION_MODEL));
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_vision_provider(&prov, model.unwrap_or(&env_model));
        }
    }

    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        if !key.is_empty() {
            return create_vision_provider("openai", model.unwrap_or(DEFAULT_VISION_MODEL));
        }
    }

    let (llm_provider, _embedding) = ProviderFactory::from_env().map_err(|e| {
        EngineError::Model(format!(
            "no vision provider could be auto-detected; set OPENAI_API_KEY, \
             ANTHROPIC_API_KEY, or name a provider ({e})"
        ))
    })?;
    Ok(llm_provider)
}

/// Pixel conversion for the vision model: RGB8 in, cleaned text out.
pub struct VisionProcessor;

impl OcrProcessor for VisionProcessor {
    fn prepare(&self, image: &DynamicImage) -> Result<PixelValues, EngineError> {
        Ok(PixelValues::from_image(image))
    }

    fn decode(&self, generation: Generation) -> Result<String, EngineError> {
        match generation {
            Generation::Text(text) => Ok(clean_page_text(&text)),
            Generation::Tokens(_) => Err(EngineError::Model(
                "vision provider returned token ids, expected text".into(),
            )),
        }
    }
}

/// One chat request per page against the resolved provider.
pub struct VisionOcrModel {
    provider: Arc<dyn LLMProvider>,
    settings: VisionSettings,
}

impl VisionOcrModel {
    async fn transcribe(&self, pixels: &PixelValues, max_new_tokens: usize) -> Result<String, EngineError> {
        let rgb = RgbImage::from_raw(pixels.width, pixels.height, pixels.data.clone())
            .ok_or_else(|| EngineError::Model("pixel buffer does not match its dimensions".into()))?;
        let image_data = encode_page(&DynamicImage::ImageRgb8(rgb))
            .map_err(|e| EngineError::Model(format!("PNG encode failed: {e}")))?;

        // The image carries the content; the user turn text stays empty.
        let messages = vec![
            ChatMessage::system(self.settings.system_prompt.as_str()),
            ChatMessage::user_with_images("", vec![image_data]),
        ];
        let options = build_options(&self.settings, max_new_tokens);

        let mut last_err: Option<String> = None;
        for attempt in 0..=self.settings.max_retries {
            if attempt > 0 {
                let backoff = retry_backoff(self.settings.retry_backoff_ms, attempt);
                warn!(
                    "OCR request retry {}/{} after {:?}",
                    attempt, self.settings.max_retries, backoff
                );
                sleep(backoff).await;
            }

            match self.provider.chat(&messages, Some(&options)).await {
                Ok(response) => {
                    debug!(
                        "OCR page: {} input tokens, {} output tokens",
                        response.prompt_tokens, response.completion_tokens
                    );
                    return Ok(response.content);
                }
                Err(e) => {
                    warn!("OCR request attempt {} failed: {}", attempt + 1, e);
                    last_err = Some(e.to_string());
                }
            }
        }

        Err(EngineError::Model(format!(
            "vision request failed after {} retries: {}",
            self.settings.max_retries,
            last_err.unwrap_or_else(|| "unknown error".to_string())
        )))
    }
}

impl OcrModel for VisionOcrModel {
    fn generate(&self, pixels: &PixelValues, max_new_tokens: usize) -> Result<Generation, EngineError> {
        // Called on the blocking pool; drive the request on the caller's runtime.
        let handle = Handle::try_current()
            .map_err(|e| EngineError::Model(format!("no async runtime for vision request: {e}")))?;
        handle
            .block_on(self.transcribe(pixels, max_new_tokens))
            .map(Generation::Text)
    }
}

/// Longest wait between two OCR attempts.
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(60);

/// Wait before retry number `attempt` (1-based): `base_ms * 2^(attempt-1)`,
/// capped at [`MAX_RETRY_BACKOFF`].
fn retry_backoff(base_ms: u64, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(base_ms.saturating_mul(factor)).min(MAX_RETRY_BACKOFF)
}

fn build_options(settings: &VisionSettings, max_new_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(settings.temperature),
        max_tokens: Some(max_new_tokens),
        ..Default::default()
    }
}
