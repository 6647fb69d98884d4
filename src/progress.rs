//! Progress-callback trait for per-job conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as a job moves through classification and conversion, and as the
//! OCR backend works through pages.
//!
//! Callers can forward events to a terminal progress bar, a channel, or a
//! database row without the library knowing how the host application
//! communicates. Several jobs may run at once on one converter, so every
//! event carries the job id and implementations must be `Send + Sync`.

use crate::job::{BackendKind, Classification};
use std::sync::Arc;

/// Called by the orchestrator and the OCR backend as a job progresses.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once the job workspace exists, before classification.
    fn on_job_start(&self, job_id: &str) {
        let _ = job_id;
    }

    /// Called with the classifier's verdict and the backend it selects.
    fn on_classified(&self, job_id: &str, classification: Classification, backend: BackendKind) {
        let _ = (job_id, classification, backend);
    }

    /// Called once rasterisation finished and page inference starts.
    fn on_ocr_start(&self, job_id: &str, total_pages: usize) {
        let _ = (job_id, total_pages);
    }

    /// Called after a page was transcribed.
    ///
    /// # Arguments
    /// * `page_num`  : 1-indexed page number
    /// * `text_chars`: characters of text the model produced
    fn on_page_complete(&self, job_id: &str, page_num: usize, total_pages: usize, text_chars: usize) {
        let _ = (job_id, page_num, total_pages, text_chars);
    }

    /// Called once per job with the terminal outcome.
    fn on_job_complete(&self, job_id: &str, succeeded: bool) {
        let _ = (job_id, succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
