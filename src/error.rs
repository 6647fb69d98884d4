//! Error types for the edgequake-pdf2docx library.
//!
//! Two layers of error exist:
//!
//! * [`Pdf2DocxError`]: everything the library can report to a caller.
//!   Every variant maps onto exactly one [`ErrorKind`], which is what gets
//!   recorded on the [`crate::job::ConversionJob`] and what an outer network
//!   layer would translate into a status code.
//!
//! * [`crate::engine::EngineError`]: the narrow error type returned by the
//!   external capabilities (pdfium, the OCR model). Backends wrap it into the
//!   matching `Pdf2DocxError` variant together with the stage that failed.
//!
//! Classification never fails: an unreadable document is classified as
//! scanned. Cleanup failures are logged and never surface here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-pdf2docx library.
#[derive(Debug, Error)]
pub enum Pdf2DocxError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── Resource errors ───────────────────────────────────────────────────
    /// The job workspace (input copy, output directory) could not be set up.
    #[error("Failed to prepare job workspace: {detail}")]
    ResourceAcquisitionFailed { detail: String },

    // ── Native backend errors ─────────────────────────────────────────────
    /// No LibreOffice executable could be located.
    #[error(
        "LibreOffice (soffice) is required to convert digital PDFs but was not found.\n\
Install: macOS: 'brew install --cask libreoffice', Linux: 'apt install libreoffice'.\n\
If it is installed in a custom location, set PDF2DOCX_SOFFICE_PATH to the soffice executable."
    )]
    ConverterNotFound,

    /// The headless converter exited non-zero, timed out, or produced no file.
    #[error("Native conversion failed (exit code {}): {detail}", .exit_code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    NativeConversionFailed {
        exit_code: Option<i32>,
        detail: String,
    },

    // ── OCR backend errors ────────────────────────────────────────────────
    /// The OCR model could not be constructed.
    #[error("Failed to load OCR model '{model}': {detail}")]
    ModelLoadFailed { model: String, detail: String },

    /// Rasterisation, inference, or document save failed.
    #[error("OCR processing failed during {stage}: {detail}")]
    OcrStageFailed { stage: OcrStage, detail: String },

    // ── Orchestrator errors ───────────────────────────────────────────────
    /// A backend reported success but its artifact is missing or misplaced.
    #[error("Conversion reported success but output '{path}' is missing or outside the job directory")]
    OutputMissing { path: PathBuf },

    /// A job state transition was attempted from the wrong state.
    #[error("Invalid job transition: cannot {action} while {from:?}")]
    InvalidTransition {
        from: crate::job::JobStatus,
        action: &'static str,
    },

    /// Could not write the final DOCX to its destination.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pdf2DocxError {
    /// The coarse category recorded on a failed job.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Pdf2DocxError::FileNotFound { .. }
            | Pdf2DocxError::PermissionDenied { .. }
            | Pdf2DocxError::InvalidInput { .. }
            | Pdf2DocxError::DownloadFailed { .. }
            | Pdf2DocxError::DownloadTimeout { .. }
            | Pdf2DocxError::NotAPdf { .. } => ErrorKind::Validation,
            Pdf2DocxError::ResourceAcquisitionFailed { .. } => ErrorKind::ResourceAcquisitionFailed,
            Pdf2DocxError::ConverterNotFound | Pdf2DocxError::NativeConversionFailed { .. } => {
                ErrorKind::NativeConversionFailed
            }
            Pdf2DocxError::ModelLoadFailed { .. } => ErrorKind::ModelLoadFailed,
            Pdf2DocxError::OcrStageFailed { .. } => ErrorKind::OcrStageFailed,
            Pdf2DocxError::OutputMissing { .. } => ErrorKind::OutputMissing,
            Pdf2DocxError::OutputWriteFailed { .. } => ErrorKind::OutputWriteFailed,
            Pdf2DocxError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Pdf2DocxError::InvalidTransition { .. } | Pdf2DocxError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Error category recorded on a [`crate::job::ConversionJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input; normally caught before a job exists.
    Validation,
    ResourceAcquisitionFailed,
    NativeConversionFailed,
    ModelLoadFailed,
    OcrStageFailed,
    OutputMissing,
    OutputWriteFailed,
    InvalidConfig,
    Internal,
}

/// The step of the OCR backend that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrStage {
    Rasterize,
    Inference { page: usize },
    Save,
}

impl fmt::Display for OcrStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OcrStage::Rasterize => write!(f, "rasterisation"),
            OcrStage::Inference { page } => write!(f, "inference on page {page}"),
            OcrStage::Save => write!(f, "document save"),
        }
    }
}
