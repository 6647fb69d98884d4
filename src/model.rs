//! OCR model contracts and the process-wide model cache.
//!
//! Loading an OCR model is expensive (weights on disk, or provider
//! resolution plus credentials), so a [`crate::Converter`] loads it at most
//! once and shares the handle between all of its jobs.
//!
//! ## Acquisition
//!
//! [`ModelCache::get_model`] is a double-checked lock:
//!
//! 1. Fast path: the handle is already published in a [`OnceLock`], return
//!    a clone without locking.
//! 2. Slow path: take the async init mutex, check again (another task may
//!    have finished loading while we waited), then load on the blocking pool
//!    and publish.
//!
//! A failed load publishes nothing. The next caller retries the load.

use crate::engine::EngineError;
use crate::error::Pdf2DocxError;
use image::DynamicImage;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// A page prepared for inference: tightly packed RGB8 pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelValues {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl PixelValues {
    pub fn from_image(image: &DynamicImage) -> Self {
        let rgb = image.to_rgb8();
        Self {
            width: rgb.width(),
            height: rgb.height(),
            data: rgb.into_raw(),
        }
    }
}

/// Raw model output before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    /// Token ids from a local sequence-to-sequence model.
    Tokens(Vec<u32>),
    /// Text from a model that decodes on its own side.
    Text(String),
}

/// Turns page images into model input and model output into text.
pub trait OcrProcessor: Send + Sync {
    fn prepare(&self, image: &DynamicImage) -> Result<PixelValues, EngineError>;

    /// Decode a generation to text, skipping special tokens.
    fn decode(&self, generation: Generation) -> Result<String, EngineError>;
}

/// The image-to-text model itself.
pub trait OcrModel: Send + Sync {
    /// Generate at most `max_new_tokens` tokens for one page.
    fn generate(&self, pixels: &PixelValues, max_new_tokens: usize)
        -> Result<Generation, EngineError>;
}

/// Loads a named processor/model pair. Called from the blocking pool.
pub trait OcrModelProvider: Send + Sync {
    fn load(&self, model_name: &str)
        -> Result<(Arc<dyn OcrProcessor>, Arc<dyn OcrModel>), EngineError>;
}

/// A loaded processor/model pair. Cheap to clone.
#[derive(Clone)]
pub struct ModelHandle {
    pub name: String,
    pub processor: Arc<dyn OcrProcessor>,
    pub model: Arc<dyn OcrModel>,
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle").field("name", &self.name).finish()
    }
}

impl ModelHandle {
    /// Transcribe one prepared page. Blocking.
    pub fn transcribe(
        &self,
        image: &DynamicImage,
        max_new_tokens: usize,
    ) -> Result<String, EngineError> {
        let pixels = self.processor.prepare(image)?;
        let generation = self.model.generate(&pixels, max_new_tokens)?;
        self.processor.decode(generation)
    }
}

/// Lazily loads and then shares one OCR model.
pub struct ModelCache {
    provider: Arc<dyn OcrModelProvider>,
    model_name: String,
    slot: OnceLock<ModelHandle>,
    init_lock: Mutex<()>,
    load_attempts: AtomicUsize,
}

impl fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelCache")
            .field("model_name", &self.model_name)
            .field("loaded", &self.is_loaded())
            .field("load_attempts", &self.load_attempts())
            .finish()
    }
}

impl ModelCache {
    pub fn new(provider: Arc<dyn OcrModelProvider>, model_name: impl Into<String>) -> Self {
        Self {
            provider,
            model_name: model_name.into(),
            slot: OnceLock::new(),
            init_lock: Mutex::new(()),
            load_attempts: AtomicUsize::new(0),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.get().is_some()
    }

    /// Number of times the provider's `load` was invoked.
    pub fn load_attempts(&self) -> usize {
        self.load_attempts.load(Ordering::SeqCst)
    }

    /// Return the shared model, loading it on first use.
    ///
    /// # Errors
    /// [`Pdf2DocxError::ModelLoadFailed`] when the provider fails or its load
    /// task panics. Nothing is cached in that case.
    pub async fn get_model(&self) -> Result<ModelHandle, Pdf2DocxError> {
        if let Some(handle) = self.slot.get() {
            return Ok(handle.clone());
        }

        let _guard = self.init_lock.lock().await;
        if let Some(handle) = self.slot.get() {
            debug!("OCR model '{}' loaded by a concurrent caller", self.model_name);
            return Ok(handle.clone());
        }

        let attempt = self.load_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Loading OCR model '{}' (attempt {})", self.model_name, attempt);
        let start = Instant::now();

        let provider = Arc::clone(&self.provider);
        let name = self.model_name.clone();
        let loaded = tokio::task::spawn_blocking(move || provider.load(&name))
            .await
            .map_err(|e| self.load_failed(format!("loader task failed: {e}")))?;

        let (processor, model) = loaded.map_err(|e| self.load_failed(e.to_string()))?;

        let handle = ModelHandle {
            name: self.model_name.clone(),
            processor,
            model,
        };
        // Only the init-lock holder ever sets the slot.
        let _ = self.slot.set(handle.clone());
        info!(
            "OCR model '{}' ready in {:?}",
            self.model_name,
            start.elapsed()
        );
        Ok(handle)
    }

    fn load_failed(&self, detail: String) -> Pdf2DocxError {
        warn!("Loading OCR model '{}' failed: {}", self.model_name, detail);
        Pdf2DocxError::ModelLoadFailed {
            model: self.model_name.clone(),
            detail,
        }
    }
}
