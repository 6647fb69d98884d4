//! OCR backend: rasterise every page, transcribe pages one at a time, and
//! assemble the transcriptions into a new document.
//!
//! ## Data Flow
//!
//! ```text
//! render ──▶ encode::prepare_page ──▶ model (prepare → generate → decode) ──▶ assemble
//! (pdfium)   (fit 1200×1600, RGB8)                                            (docx-rs)
//! ```
//!
//! Page preparation and inference share one blocking-pool task per page; the
//! async side only hands pages over and collects text.
//!
//! Pages are processed strictly in order and never concurrently within a
//! job, so peak memory is one page plus the model. Across jobs, a semaphore
//! caps how many OCR conversions run at once. Any failing step aborts the
//! job; no partial document is written.

use super::output_path_for;
use crate::config::ConversionConfig;
use crate::engine::PageRasterizer;
use crate::error::{OcrStage, Pdf2DocxError};
use crate::model::ModelCache;
use crate::pipeline::assemble::{DocumentLayout, PageDocument, TextStyle};
use crate::pipeline::encode::prepare_page;
use crate::progress::ProgressCallback;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// The document an OCR run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrArtifact {
    pub path: PathBuf,
    pub layout: DocumentLayout,
}

/// Rasterise-and-transcribe conversion.
pub struct OcrBackend {
    rasterizer: Arc<dyn PageRasterizer>,
    models: Arc<ModelCache>,
    permits: Arc<Semaphore>,
    dpi: u32,
    max_image_width: u32,
    max_image_height: u32,
    max_new_tokens: usize,
    text_style: TextStyle,
}

impl OcrBackend {
    pub fn new(
        rasterizer: Arc<dyn PageRasterizer>,
        models: Arc<ModelCache>,
        config: &ConversionConfig,
    ) -> Self {
        Self {
            rasterizer,
            models,
            permits: Arc::new(Semaphore::new(config.max_concurrent_ocr_jobs.max(1))),
            dpi: config.ocr_dpi,
            max_image_width: config.max_image_width,
            max_image_height: config.max_image_height,
            max_new_tokens: config.max_new_tokens,
            text_style: config.text_style.clone(),
        }
    }

    /// OCR jobs that could start right now without waiting.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Convert `input` into `output_dir/<stem>.docx`.
    ///
    /// # Errors
    /// * [`Pdf2DocxError::OcrStageFailed`] for rasterisation, inference, or
    ///   save failures
    /// * [`Pdf2DocxError::ModelLoadFailed`] when the model cannot be built
    pub async fn convert(
        &self,
        job_id: &str,
        input: &Path,
        output_dir: &Path,
        progress: Option<&ProgressCallback>,
    ) -> Result<OcrArtifact, Pdf2DocxError> {
        let output_path = output_path_for(input, output_dir)?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| Pdf2DocxError::Internal(format!("OCR semaphore closed: {e}")))?;
        let start = Instant::now();

        // ── Step 1: Rasterise ────────────────────────────────────────────
        let rasterizer = Arc::clone(&self.rasterizer);
        let pdf_path = input.to_path_buf();
        let dpi = self.dpi;
        let images = tokio::task::spawn_blocking(move || rasterizer.pages_to_images(&pdf_path, dpi))
            .await
            .map_err(|e| stage_failed(OcrStage::Rasterize, format!("task failed: {e}")))?
            .map_err(|e| stage_failed(OcrStage::Rasterize, e.to_string()))?;

        let total_pages = images.len();
        info!("Job {}: rasterised {} pages at {} DPI", job_id, total_pages, dpi);
        if let Some(cb) = progress {
            cb.on_ocr_start(job_id, total_pages);
        }

        // ── Step 2: Transcribe, one page at a time ───────────────────────
        let mut texts = Vec::with_capacity(total_pages);
        for (idx, image) in images.into_iter().enumerate() {
            let page_num = idx + 1;
            let model = self.models.get_model().await?;

            let (max_w, max_h) = (self.max_image_width, self.max_image_height);
            let max_new_tokens = self.max_new_tokens;
            let page_start = Instant::now();
            let text = tokio::task::spawn_blocking(move || {
                let prepared = prepare_page(image, max_w, max_h);
                model.transcribe(&prepared, max_new_tokens)
            })
            .await
            .map_err(|e| {
                stage_failed(OcrStage::Inference { page: page_num }, format!("task failed: {e}"))
            })?
            .map_err(|e| stage_failed(OcrStage::Inference { page: page_num }, e.to_string()))?;

            let chars = text.chars().count();
            debug!(
                "Job {}: page {}/{} → {} chars in {:?}",
                job_id,
                page_num,
                total_pages,
                chars,
                page_start.elapsed()
            );
            if let Some(cb) = progress {
                cb.on_page_complete(job_id, page_num, total_pages, chars);
            }
            texts.push(text);
        }

        // ── Step 3: Assemble and save ────────────────────────────────────
        let document = PageDocument::from_pages(&texts, self.text_style.clone());
        let layout = document.layout();
        let save_path = output_path.clone();
        tokio::task::spawn_blocking(move || document.save(&save_path))
            .await
            .map_err(|e| stage_failed(OcrStage::Save, format!("task failed: {e}")))?
            .map_err(|e| stage_failed(OcrStage::Save, e.to_string()))?;

        info!(
            "Job {}: OCR document with {} pages written in {:?}",
            job_id,
            layout.paragraphs,
            start.elapsed()
        );
        Ok(OcrArtifact {
            path: output_path,
            layout,
        })
    }
}

fn stage_failed(stage: OcrStage, detail: String) -> Pdf2DocxError {
    Pdf2DocxError::OcrStageFailed { stage, detail }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineError;
    use crate::model::{Generation, OcrModel, OcrModelProvider, OcrProcessor, PixelValues};
    use image::DynamicImage;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Pages of distinct widths so the model can tell them apart.
    struct WidthRasterizer(Vec<u32>);

    impl PageRasterizer for WidthRasterizer {
        fn pages_to_images(&self, _path: &Path, _dpi: u32) -> Result<Vec<DynamicImage>, EngineError> {
            Ok(self.0.iter().map(|&w| DynamicImage::new_luma8(w, 40)).collect())
        }
    }

    /// One large square page, like a 300 DPI poster scan.
    struct SquareRasterizer(u32);

    impl PageRasterizer for SquareRasterizer {
        fn pages_to_images(&self, _path: &Path, _dpi: u32) -> Result<Vec<DynamicImage>, EngineError> {
            Ok(vec![DynamicImage::new_rgba8(self.0, self.0)])
        }
    }

    struct BrokenRasterizer;

    impl PageRasterizer for BrokenRasterizer {
        fn pages_to_images(&self, _path: &Path, _dpi: u32) -> Result<Vec<DynamicImage>, EngineError> {
            Err(EngineError::Open("truncated file".into()))
        }
    }

    struct Passthrough;

    impl OcrProcessor for Passthrough {
        fn prepare(&self, image: &DynamicImage) -> Result<PixelValues, EngineError> {
            assert!(matches!(image, DynamicImage::ImageRgb8(_)));
            Ok(PixelValues::from_image(image))
        }

        fn decode(&self, generation: Generation) -> Result<String, EngineError> {
            match generation {
                Generation::Text(t) => Ok(t),
                Generation::Tokens(_) => Err(EngineError::Model("tokens".into())),
            }
        }
    }

    /// Reports each page's width; fails on a chosen width.
    struct WidthModel {
        fail_on_width: Option<u32>,
        seen: Arc<Mutex<Vec<(u32, usize)>>>,
    }

    impl OcrModel for WidthModel {
        fn generate(&self, pixels: &PixelValues, max_new_tokens: usize) -> Result<Generation, EngineError> {
            self.seen.lock().unwrap().push((pixels.width, max_new_tokens));
            if Some(pixels.width) == self.fail_on_width {
                return Err(EngineError::Model("out of memory".into()));
            }
            Ok(Generation::Text(format!("page width {}", pixels.width)))
        }
    }

    struct Provider {
        fail_on_width: Option<u32>,
        seen: Arc<Mutex<Vec<(u32, usize)>>>,
    }

    impl OcrModelProvider for Provider {
        fn load(&self, _name: &str) -> Result<(Arc<dyn OcrProcessor>, Arc<dyn OcrModel>), EngineError> {
            Ok((
                Arc::new(Passthrough),
                Arc::new(WidthModel {
                    fail_on_width: self.fail_on_width,
                    seen: Arc::clone(&self.seen),
                }),
            ))
        }
    }

    fn backend(
        rasterizer: Arc<dyn PageRasterizer>,
        fail_on_width: Option<u32>,
    ) -> (OcrBackend, Arc<Mutex<Vec<(u32, usize)>>>, Arc<ModelCache>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let models = Arc::new(ModelCache::new(
            Arc::new(Provider {
                fail_on_width,
                seen: Arc::clone(&seen),
            }),
            "fake",
        ));
        let backend = OcrBackend::new(rasterizer, Arc::clone(&models), &ConversionConfig::default());
        (backend, seen, models)
    }

    fn dirs() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("scan.pdf");
        std::fs::write(&input, b"%PDF-1.4\n").unwrap();
        let out = tmp.path().join("output");
        std::fs::create_dir(&out).unwrap();
        (tmp, input, out)
    }

    #[tokio::test]
    async fn pages_are_transcribed_in_order() {
        let (_tmp, input, out) = dirs();
        let (backend, seen, _) = backend(Arc::new(WidthRasterizer(vec![10, 20, 30])), None);

        let artifact = backend.convert("job", &input, &out, None).await.unwrap();

        assert_eq!(artifact.path, out.join("scan.docx"));
        assert!(artifact.path.is_file());
        assert_eq!(
            artifact.layout,
            DocumentLayout {
                paragraphs: 3,
                page_breaks: 2
            }
        );
        let widths: Vec<u32> = seen.lock().unwrap().iter().map(|(w, _)| *w).collect();
        assert_eq!(widths, vec![10, 20, 30]);
        assert!(seen.lock().unwrap().iter().all(|(_, t)| *t == 500));
    }

    #[tokio::test]
    async fn oversized_pages_are_shrunk_before_inference() {
        let (_tmp, input, out) = dirs();
        let rasterizer = Arc::new(WidthRasterizer(vec![2400]));
        let (backend, seen, _) = backend(rasterizer, None);

        backend.convert("job", &input, &out, None).await.unwrap();
        assert_eq!(seen.lock().unwrap()[0].0, 1200);
    }

    #[tokio::test]
    async fn inference_failure_names_the_page_and_writes_nothing() {
        let (_tmp, input, out) = dirs();
        let (backend, _, _) = backend(Arc::new(WidthRasterizer(vec![10, 20, 30])), Some(20));

        let err = backend.convert("job", &input, &out, None).await.unwrap_err();
        assert!(matches!(
            err,
            Pdf2DocxError::OcrStageFailed {
                stage: OcrStage::Inference { page: 2 },
                ..
            }
        ));
        assert!(!out.join("scan.docx").exists());
    }

    #[tokio::test]
    async fn rasterise_failure_skips_model_load() {
        let (_tmp, input, out) = dirs();
        let (backend, _, models) = backend(Arc::new(BrokenRasterizer), None);

        let err = backend.convert("job", &input, &out, None).await.unwrap_err();
        assert!(matches!(
            err,
            Pdf2DocxError::OcrStageFailed {
                stage: OcrStage::Rasterize,
                ..
            }
        ));
        assert_eq!(models.load_attempts(), 0);
    }

    #[tokio::test]
    async fn permit_is_returned_after_a_job() {
        let (_tmp, input, out) = dirs();
        let (backend, _, _) = backend(Arc::new(WidthRasterizer(vec![10])), None);
        assert_eq!(backend.available_permits(), 2);
        backend.convert("job", &input, &out, None).await.unwrap();
        assert_eq!(backend.available_permits(), 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn large_page_preparation_leaves_the_scheduler_free() {
        let (_tmp, input, out) = dirs();
        let (backend, seen, _) = backend(Arc::new(SquareRasterizer(5000)), None);

        let done = Arc::new(AtomicBool::new(false));
        let ticker = {
            let done = Arc::clone(&done);
            tokio::spawn(async move {
                let mut last = Instant::now();
                let mut worst = Duration::ZERO;
                while !done.load(Ordering::SeqCst) {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    let now = Instant::now();
                    worst = worst.max(now - last);
                    last = now;
                }
                worst
            })
        };

        backend.convert("job", &input, &out, None).await.unwrap();
        done.store(true, Ordering::SeqCst);
        let worst = ticker.await.unwrap();

        assert!(worst < Duration::from_millis(250), "scheduler stalled for {worst:?}");
        assert_eq!(seen.lock().unwrap()[0].0, 1200);
    }
}
