//! # edgequake-pdf2docx
//!
//! Convert PDF documents to editable Word (DOCX) files, choosing the engine
//! per document.
//!
//! ## Why two backends?
//!
//! A PDF with a real text layer converts best through LibreOffice, which
//! keeps fonts, tables, and layout. A scanned PDF has no text to keep:
//! LibreOffice would produce a document full of images. Those pages are
//! rasterised and transcribed by an OCR model instead, one paragraph per
//! page.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Stage     copy / download into a private job workspace
//!  ├─ 2. Classify  text on any of the first 5 pages? (pdfium, spawn_blocking)
//!  ├─ 3a. Native   digital ⇒ soffice --headless --convert-to docx
//!  ├─ 3b. OCR      scanned ⇒ rasterise @150 DPI → model per page → docx-rs
//!  └─ 4. Verify    artifact exists inside the job output directory
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2docx::{ConversionConfig, Converter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // OCR provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let converter = Converter::new(ConversionConfig::default());
//!     let job = converter.convert_to_file("scan.pdf", "scan.docx").await?;
//!     eprintln!("{:?} via {:?}", job.classification(), job.backend_used());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2docx` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdf2docx = { version = "0.1", default-features = false }
//! ```
//!
//! ## Runtime Requirements
//!
//! * pdfium shared library (`PDFIUM_LIB_PATH`, working directory, or system)
//! * LibreOffice for digital documents (`PDF2DOCX_SOFFICE_PATH` or `PATH`)
//! * a vision model provider for scanned documents

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod classify;
pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod job;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod resources;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use classify::ClassifierSettings;
pub use config::{ConversionConfig, ConversionConfigBuilder};
pub use convert::{ConversionFailure, ConvertedDocument, Converter, Engines};
pub use engine::{DocumentIntrospector, DocumentText, EngineError, PageRasterizer};
pub use error::{ErrorKind, OcrStage, Pdf2DocxError};
pub use job::{BackendKind, Classification, ConversionJob, JobError, JobStatus};
pub use model::{Generation, ModelCache, ModelHandle, OcrModel, OcrModelProvider, OcrProcessor, PixelValues};
pub use pipeline::assemble::{DocumentLayout, TextStyle};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use resources::{InputSource, JobResources};
