//! Configuration types for PDF-to-DOCX conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. One struct carries the classifier
//! thresholds, the OCR knobs, the native converter settings, and the job
//! workspace location, so a single value can be shared by every job a
//! [`crate::Converter`] runs.

use crate::classify::ClassifierSettings;
use crate::error::Pdf2DocxError;
use crate::pipeline::assemble::TextStyle;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Model used when a provider is named without a model.
pub const DEFAULT_VISION_MODEL: &str = "gpt-4.1-nano";

/// Model name that asks the vision provider to auto-detect from the environment.
pub const AUTO_MODEL: &str = "auto";

/// Configuration for a PDF-to-DOCX conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdf2docx::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .ocr_dpi(150)
///     .max_concurrent_ocr_jobs(1)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Leading pages inspected by the classifier. Default: 5.
    pub classifier_sample_pages: usize,

    /// A page counts as digital when its trimmed text is longer than this
    /// many characters. Default: 50.
    ///
    /// Title pages and diagram-heavy documents fall below the threshold and
    /// take the OCR path. That is the accepted cost of a cheap classifier.
    pub classifier_min_text_chars: usize,

    /// Rasterisation DPI for scanned pages. Range: 72–400. Default: 150.
    ///
    /// 150 rather than the usual 300: each page's pixels plus the model's
    /// activations must fit in memory one page at a time.
    pub ocr_dpi: u32,

    /// Bounding box a page image is shrunk into before inference. Default: 1200×1600.
    pub max_image_width: u32,
    pub max_image_height: u32,

    /// Maximum tokens the OCR model may generate per page. Default: 500.
    pub max_new_tokens: usize,

    /// OCR model identifier, e.g. "gpt-4.1-nano". If None, uses provider default.
    pub model: Option<String>,

    /// Vision provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed vision provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for the vision model. Default: 0.0.
    pub temperature: f32,

    /// Retries per page on a transient model API failure. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Custom OCR system prompt. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Font for transcribed paragraphs. Default: Arial 11 pt.
    pub text_style: TextStyle,

    /// Concurrent OCR jobs allowed per converter. Default: 2.
    pub max_concurrent_ocr_jobs: usize,

    /// Explicit path to the `soffice` executable.
    pub soffice_path: Option<PathBuf>,

    /// Watchdog for the LibreOffice subprocess, in seconds. Default: 300.
    /// `None` lets the process run to completion however long it takes.
    pub native_timeout_secs: Option<u64>,

    /// Parent directory for job workspaces. Default: the system temp dir.
    pub temp_root: Option<PathBuf>,

    /// Directory containing the pdfium shared library.
    pub pdfium_lib_dir: Option<PathBuf>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional progress callback. Default: None.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            classifier_sample_pages: 5,
            classifier_min_text_chars: 50,
            ocr_dpi: 150,
            max_image_width: 1200,
            max_image_height: 1600,
            max_new_tokens: 500,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_retries: 3,
            retry_backoff_ms: 500,
            system_prompt: None,
            text_style: TextStyle::default(),
            max_concurrent_ocr_jobs: 2,
            soffice_path: None,
            native_timeout_secs: Some(300),
            temp_root: None,
            pdfium_lib_dir: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("classifier_sample_pages", &self.classifier_sample_pages)
            .field("classifier_min_text_chars", &self.classifier_min_text_chars)
            .field("ocr_dpi", &self.ocr_dpi)
            .field("max_image_width", &self.max_image_width)
            .field("max_image_height", &self.max_image_height)
            .field("max_new_tokens", &self.max_new_tokens)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("max_concurrent_ocr_jobs", &self.max_concurrent_ocr_jobs)
            .field("soffice_path", &self.soffice_path)
            .field("native_timeout_secs", &self.native_timeout_secs)
            .field("temp_root", &self.temp_root)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn classifier_settings(&self) -> ClassifierSettings {
        ClassifierSettings {
            sample_pages: self.classifier_sample_pages,
            min_text_chars: self.classifier_min_text_chars,
        }
    }

    /// Name handed to the OCR model provider: `provider/model`, `model`, or
    /// [`AUTO_MODEL`].
    pub fn ocr_model_name(&self) -> String {
        match (&self.provider_name, &self.model) {
            (Some(p), Some(m)) => format!("{p}/{m}"),
            (Some(p), None) => format!("{p}/{DEFAULT_VISION_MODEL}"),
            (None, Some(m)) => m.clone(),
            (None, None) => AUTO_MODEL.to_string(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn classifier_sample_pages(mut self, n: usize) -> Self {
        self.config.classifier_sample_pages = n.max(1);
        self
    }

    pub fn classifier_min_text_chars(mut self, n: usize) -> Self {
        self.config.classifier_min_text_chars = n;
        self
    }

    pub fn ocr_dpi(mut self, dpi: u32) -> Self {
        self.config.ocr_dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_image_size(mut self, width: u32, height: u32) -> Self {
        self.config.max_image_width = width.max(32);
        self.config.max_image_height = height.max(32);
        self
    }

    pub fn max_new_tokens(mut self, n: usize) -> Self {
        self.config.max_new_tokens = n.max(1);
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

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn text_style(mut self, style: TextStyle) -> Self {
        self.config.text_style = style;
        self
    }

    pub fn max_concurrent_ocr_jobs(mut self, n: usize) -> Self {
        self.config.max_concurrent_ocr_jobs = n.max(1);
        self
    }

    pub fn soffice_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.soffice_path = Some(path.into());
        self
    }

    pub fn native_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.config.native_timeout_secs = secs;
        self
    }

    pub fn temp_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_root = Some(dir.into());
        self
    }

    pub fn pdfium_lib_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_dir = Some(dir.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Pdf2DocxError> {
        let c = &self.config;
        if c.ocr_dpi < 72 || c.ocr_dpi > 400 {
            return Err(Pdf2DocxError::InvalidConfig(format!(
                "OCR DPI must be 72–400, got {}",
                c.ocr_dpi
            )));
        }
        if c.classifier_sample_pages == 0 {
            return Err(Pdf2DocxError::InvalidConfig(
                "Classifier must sample at least one page".into(),
            ));
        }
        if c.max_new_tokens == 0 {
            return Err(Pdf2DocxError::InvalidConfig(
                "max_new_tokens must be ≥ 1".into(),
            ));
        }
        if c.max_concurrent_ocr_jobs == 0 {
            return Err(Pdf2DocxError::InvalidConfig(
                "max_concurrent_ocr_jobs must be ≥ 1".into(),
            ));
        }
        if c.native_timeout_secs == Some(0) {
            return Err(Pdf2DocxError::InvalidConfig(
                "native_timeout_secs must be ≥ 1 when set".into(),
            ));
        }
        if let Some(ref root) = c.temp_root {
            if !root.is_dir() {
                return Err(Pdf2DocxError::InvalidConfig(format!(
                    "temp_root '{}' is not a directory",
                    root.display()
                )));
            }
        }
        Ok(self.config)
    }
}
