//! The conversion orchestrator.
//!
//! A [`Converter`] owns the engines, both backends, and the shared OCR model
//! cache. Each call to [`Converter::run_conversion`] is one job:
//!
//! ```text
//! acquire workspace ─▶ Classifying ─▶ Converting ─▶ Succeeded
//!        │                   │             │
//!        └───────────────────┴─────────────┴──────▶ Failed (workspace released)
//! ```
//!
//! 1. **Acquire**: stage the input into a private workspace
//! 2. **Classify**: digital or scanned (never fails; unreadable ⇒ scanned)
//! 3. **Dispatch**: `Digital → Native`, `Scanned → Ocr`
//! 4. **Verify**: the artifact must exist inside the job's output directory
//!
//! On success the caller receives a [`ConvertedDocument`] that keeps the
//! workspace alive until it is released or persisted. On failure the
//! workspace is already gone.

use crate::backend::native::NativeBackend;
use crate::backend::ocr::OcrBackend;
use crate::classify::classify_blocking;
use crate::config::ConversionConfig;
use crate::engine::{DocumentIntrospector, PageRasterizer};
use crate::error::Pdf2DocxError;
use crate::job::{BackendKind, Classification, ConversionJob, JobError};
use crate::model::{ModelCache, OcrModelProvider};
use crate::pipeline::assemble::DocumentLayout;
use crate::pipeline::llm::VisionOcrProvider;
use crate::pipeline::render::PdfiumEngine;
use crate::progress::ProgressCallback;
use crate::resources::{InputSource, JobResources};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

/// The external engines a [`Converter`] drives.
#[derive(Clone)]
pub struct Engines {
    pub introspector: Arc<dyn DocumentIntrospector>,
    pub rasterizer: Arc<dyn PageRasterizer>,
    pub model_provider: Arc<dyn OcrModelProvider>,
}

impl Engines {
    /// pdfium for introspection and rendering, a vision LLM for OCR.
    pub fn from_config(config: &ConversionConfig) -> Self {
        let pdfium = Arc::new(PdfiumEngine::new(config.pdfium_lib_dir.clone()));
        Self {
            introspector: pdfium.clone(),
            rasterizer: pdfium,
            model_provider: Arc::new(VisionOcrProvider::from_config(config)),
        }
    }
}

/// A failed job: the error, plus the job record when one was created.
///
/// `job` is `None` when the input was rejected before a workspace existed
/// (missing file, not a PDF, download failure).
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ConversionFailure {
    pub job: Option<ConversionJob>,
    pub error: Pdf2DocxError,
}

/// A successful job and its artifact.
///
/// The DOCX lives in the job workspace; read or [`persist_to`] it before
/// calling [`release`] or dropping this value.
///
/// [`persist_to`]: ConvertedDocument::persist_to
/// [`release`]: ConvertedDocument::release
#[derive(Debug)]
pub struct ConvertedDocument {
    path: PathBuf,
    job: ConversionJob,
    layout: Option<DocumentLayout>,
    resources: JobResources,
}

impl ConvertedDocument {
    /// The DOCX inside the job workspace.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn job(&self) -> &ConversionJob {
        &self.job
    }

    /// Paragraph/page-break counts, for OCR output only.
    pub fn layout(&self) -> Option<DocumentLayout> {
        self.layout
    }

    /// Remove the workspace. Idempotent.
    pub fn release(&self) -> bool {
        self.resources.release()
    }

    /// Copy the artifact to `dest` atomically (uniquely named temp file in
    /// the destination directory, then rename), then release the workspace.
    pub async fn persist_to(self, dest: impl AsRef<Path>) -> Result<ConversionJob, Pdf2DocxError> {
        let dest = dest.as_ref().to_path_buf();
        let source = self.path.clone();
        let target = dest.clone();
        tokio::task::spawn_blocking(move || copy_atomically(&source, &target))
            .await
            .map_err(|e| Pdf2DocxError::Internal(format!("persist task failed: {e}")))?
            .map_err(|source| Pdf2DocxError::OutputWriteFailed {
                path: dest.clone(),
                source,
            })?;

        info!("Job {}: wrote {}", self.job.id, dest.display());
        self.resources.release();
        Ok(self.job)
    }
}

/// Copy `src` over `dest` through a temp file next to `dest`.
///
/// The temp name is unique per call, so concurrent writers to the same
/// destination never share a partial file; the last rename wins whole.
fn copy_atomically(src: &Path, dest: &Path) -> io::Result<()> {
    let parent = match dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(p) => {
            std::fs::create_dir_all(p)?;
            p.to_path_buf()
        }
        None => PathBuf::from("."),
    };

    let mut builder = tempfile::Builder::new();
    builder.prefix(".pdf2docx-").suffix(".docx.tmp");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o644));
    }
    let mut tmp = builder.tempfile_in(&parent)?;

    let mut reader = File::open(src)?;
    io::copy(&mut reader, tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

/// Classifies PDFs and converts them to DOCX.
///
/// Cheap to share behind an `Arc`; every job is independent except for the
/// OCR model, which is loaded once and reused.
pub struct Converter {
    config: ConversionConfig,
    introspector: Arc<dyn DocumentIntrospector>,
    native: NativeBackend,
    ocr: OcrBackend,
    models: Arc<ModelCache>,
}

impl Converter {
    /// A converter using pdfium, LibreOffice, and the configured vision model.
    pub fn new(config: ConversionConfig) -> Self {
        let engines = Engines::from_config(&config);
        Self::with_engines(config, engines)
    }

    /// A converter with substitute engines.
    pub fn with_engines(config: ConversionConfig, engines: Engines) -> Self {
        let models = Arc::new(ModelCache::new(engines.model_provider, config.ocr_model_name()));
        let ocr = OcrBackend::new(engines.rasterizer, Arc::clone(&models), &config);
        Self {
            native: NativeBackend::from_config(&config),
            introspector: engines.introspector,
            ocr,
            models,
            config,
        }
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// The shared OCR model cache.
    pub fn model_cache(&self) -> &Arc<ModelCache> {
        &self.models
    }

    /// Run the classifier alone.
    pub async fn classify_input(
        &self,
        input: impl Into<InputSource>,
    ) -> Result<Classification, Pdf2DocxError> {
        let resources = self.acquire(&input.into()).await?;
        let verdict = classify_blocking(
            Arc::clone(&self.introspector),
            resources.input_path().to_path_buf(),
            self.config.classifier_settings(),
        )
        .await;
        resources.release();
        Ok(verdict)
    }

    /// Convert one PDF, returning the artifact still inside its workspace.
    pub async fn run_conversion(
        &self,
        input: impl Into<InputSource>,
    ) -> Result<ConvertedDocument, ConversionFailure> {
        let source = input.into();
        let start = Instant::now();
        info!("Starting conversion: {}", source);

        let resources = match self.acquire(&source).await {
            Ok(r) => r,
            Err(error) => {
                error!("Rejected '{}': {}", source, error);
                return Err(ConversionFailure { job: None, error });
            }
        };

        let mut job = ConversionJob::new(
            resources.id(),
            resources.input_path().to_path_buf(),
            resources.output_dir().to_path_buf(),
        );
        let progress = self.config.progress_callback.as_ref();
        if let Some(cb) = progress {
            cb.on_job_start(&job.id);
        }

        match self.drive(&mut job, progress).await {
            Ok(layout) => {
                let path = job
                    .result_path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| job.output_dir.clone());
                info!(
                    "Job {} succeeded via {:?} in {:?}",
                    job.id,
                    job.backend_used(),
                    start.elapsed()
                );
                if let Some(cb) = progress {
                    cb.on_job_complete(&job.id, true);
                }
                Ok(ConvertedDocument {
                    path,
                    job,
                    layout,
                    resources,
                })
            }
            Err(error) => {
                error!(
                    "Job {} ({}) failed with {:?} after {:?}: {}",
                    job.id,
                    source,
                    error.kind(),
                    start.elapsed(),
                    error
                );
                if let Err(e) = job.fail(JobError::from(&error)) {
                    warn!("Job {}: {}", job.id, e);
                }
                resources.release();
                if let Some(cb) = progress {
                    cb.on_job_complete(&job.id, false);
                }
                Err(ConversionFailure {
                    job: Some(job),
                    error,
                })
            }
        }
    }

    /// [`run_conversion`](Self::run_conversion), then copy the DOCX to `dest`.
    pub async fn convert_to_file(
        &self,
        input: impl Into<InputSource>,
        dest: impl AsRef<Path>,
    ) -> Result<ConversionJob, ConversionFailure> {
        let document = self.run_conversion(input).await?;
        let job = document.job().clone();
        document
            .persist_to(dest)
            .await
            .map_err(|error| ConversionFailure {
                job: Some(job),
                error,
            })
    }

    async fn acquire(&self, source: &InputSource) -> Result<JobResources, Pdf2DocxError> {
        JobResources::acquire(
            source,
            self.config.temp_root.as_deref(),
            self.config.download_timeout_secs,
        )
        .await
    }

    /// Classify, dispatch, verify. Leaves the job `Succeeded` on `Ok`.
    async fn drive(
        &self,
        job: &mut ConversionJob,
        progress: Option<&ProgressCallback>,
    ) -> Result<Option<DocumentLayout>, Pdf2DocxError> {
        // ── Step 1: Classify ─────────────────────────────────────────────
        job.begin_classifying()?;
        let verdict = classify_blocking(
            Arc::clone(&self.introspector),
            job.input_path.clone(),
            self.config.classifier_settings(),
        )
        .await;
        job.record_classification(verdict)?;

        let backend = BackendKind::for_classification(verdict)
            .ok_or_else(|| Pdf2DocxError::Internal("classifier returned no verdict".into()))?;
        info!("Job {}: {:?} → {:?} backend", job.id, verdict, backend);
        if let Some(cb) = progress {
            cb.on_classified(&job.id, verdict, backend);
        }

        // ── Step 2: Convert ──────────────────────────────────────────────
        job.begin_converting(backend)?;
        let (path, layout) = match backend {
            BackendKind::Native => (
                self.native.convert(&job.input_path, &job.output_dir).await?,
                None,
            ),
            BackendKind::Ocr => {
                let artifact = self
                    .ocr
                    .convert(&job.id, &job.input_path, &job.output_dir, progress)
                    .await?;
                (artifact.path, Some(artifact.layout))
            }
            BackendKind::None => {
                return Err(Pdf2DocxError::Internal("no backend selected".into()));
            }
        };

        // ── Step 3: Verify ───────────────────────────────────────────────
        job.succeed(path)?;
        Ok(layout)
    }
}
