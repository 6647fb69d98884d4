//! The per-job record and its state machine.
//!
//! ```text
//! Created ──▶ Classifying ──▶ Converting ──▶ Succeeded
//!    │             │              │
//!    └─────────────┴──────────────┴────────▶ Failed
//! ```
//!
//! Every transition is a method that checks the current state and the
//! job's invariants and returns [`Pdf2DocxError::InvalidTransition`] when
//! misused, so an orchestrator bug shows up as an error rather than as a
//! job that reports a result it never produced.

use crate::error::{ErrorKind, Pdf2DocxError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Classifier verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    #[default]
    Unclassified,
    /// Extractable text layer present.
    Digital,
    /// Raster-only pages.
    Scanned,
}

/// Backend chosen at dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    None,
    /// Headless LibreOffice.
    Native,
    /// Rasterise + OCR model.
    Ocr,
}

impl BackendKind {
    /// The one backend a verdict selects.
    pub fn for_classification(classification: Classification) -> Option<Self> {
        match classification {
            Classification::Digital => Some(BackendKind::Native),
            Classification::Scanned => Some(BackendKind::Ocr),
            Classification::Unclassified => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Created,
    Classifying,
    Converting,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// Why a job failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&Pdf2DocxError> for JobError {
    fn from(e: &Pdf2DocxError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// One end-to-end conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionJob {
    pub id: String,
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
    classification: Classification,
    backend_used: BackendKind,
    status: JobStatus,
    result_path: Option<PathBuf>,
    error: Option<JobError>,
}

impl ConversionJob {
    pub fn new(id: impl Into<String>, input_path: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            id: id.into(),
            input_path,
            output_dir,
            classification: Classification::Unclassified,
            backend_used: BackendKind::None,
            status: JobStatus::Created,
            result_path: None,
            error: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn classification(&self) -> Classification {
        self.classification
    }

    pub fn backend_used(&self) -> BackendKind {
        self.backend_used
    }

    /// Present only when the job succeeded.
    pub fn result_path(&self) -> Option<&Path> {
        self.result_path.as_deref()
    }

    /// Present only when the job failed.
    pub fn error(&self) -> Option<&JobError> {
        self.error.as_ref()
    }

    fn invalid(&self, action: &'static str) -> Pdf2DocxError {
        Pdf2DocxError::InvalidTransition {
            from: self.status,
            action,
        }
    }

    pub fn begin_classifying(&mut self) -> Result<(), Pdf2DocxError> {
        if self.status != JobStatus::Created {
            return Err(self.invalid("begin classifying"));
        }
        self.status = JobStatus::Classifying;
        Ok(())
    }

    pub fn record_classification(&mut self, verdict: Classification) -> Result<(), Pdf2DocxError> {
        if self.status != JobStatus::Classifying
            || self.classification != Classification::Unclassified
            || verdict == Classification::Unclassified
        {
            return Err(self.invalid("record classification"));
        }
        self.classification = verdict;
        Ok(())
    }

    pub fn begin_converting(&mut self, backend: BackendKind) -> Result<(), Pdf2DocxError> {
        if self.status != JobStatus::Classifying
            || self.backend_used != BackendKind::None
            || BackendKind::for_classification(self.classification) != Some(backend)
        {
            return Err(self.invalid("begin converting"));
        }
        self.backend_used = backend;
        self.status = JobStatus::Converting;
        Ok(())
    }

    /// Mark the job succeeded. `path` must be an existing file inside
    /// `output_dir`.
    pub fn succeed(&mut self, path: PathBuf) -> Result<(), Pdf2DocxError> {
        if self.status != JobStatus::Converting {
            return Err(self.invalid("succeed"));
        }
        if !path.starts_with(&self.output_dir) || !path.is_file() {
            return Err(Pdf2DocxError::OutputMissing { path });
        }
        self.result_path = Some(path);
        self.status = JobStatus::Succeeded;
        Ok(())
    }

    /// Mark the job failed. Allowed from any non-terminal state.
    pub fn fail(&mut self, error: JobError) -> Result<(), Pdf2DocxError> {
        if self.status.is_terminal() {
            return Err(self.invalid("fail"));
        }
        self.error = Some(error);
        self.status = JobStatus::Failed;
        Ok(())
    }
}
