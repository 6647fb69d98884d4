//! Digital-vs-scanned classification.
//!
//! The verdict decides which backend runs: LibreOffice for documents with
//! extractable text, OCR for everything else. Only the leading pages are
//! inspected and nothing is rendered. A document the introspector cannot
//! read is treated as scanned.

use crate::engine::{DocumentIntrospector, DocumentText};
use crate::job::Classification;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Thresholds for [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierSettings {
    /// Leading pages inspected.
    pub sample_pages: usize,
    /// Trimmed characters a page needs to exceed to count as digital.
    pub min_text_chars: usize,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            sample_pages: 5,
            min_text_chars: 50,
        }
    }
}

/// Classify already-extracted page text.
///
/// The first sampled page with more than `min_text_chars` characters after
/// trimming makes the document digital. Zero pages is scanned.
pub fn classify_text(doc: &DocumentText, settings: &ClassifierSettings) -> Classification {
    let sampled = doc.page_count().min(settings.sample_pages);

    for idx in 0..sampled {
        let Some(text) = doc.page_text(idx) else {
            break;
        };
        let chars = text.trim().chars().count();
        if chars > settings.min_text_chars {
            debug!("Page {} has {} text chars → digital", idx + 1, chars);
            return Classification::Digital;
        }
    }

    Classification::Scanned
}

/// Open `path` and classify it. Never fails: introspection errors yield
/// [`Classification::Scanned`].
pub fn classify(
    introspector: &dyn DocumentIntrospector,
    path: &Path,
    settings: &ClassifierSettings,
) -> Classification {
    match introspector.open(path, settings.sample_pages) {
        Ok(doc) => classify_text(&doc, settings),
        Err(e) => {
            warn!(
                "Could not introspect '{}', treating as scanned: {}",
                path.display(),
                e
            );
            Classification::Scanned
        }
    }
}

/// [`classify`] on the blocking pool. A panic inside the introspector is
/// also treated as scanned.
pub async fn classify_blocking(
    introspector: Arc<dyn DocumentIntrospector>,
    path: PathBuf,
    settings: ClassifierSettings,
) -> Classification {
    let shown = path.display().to_string();
    match tokio::task::spawn_blocking(move || classify(introspector.as_ref(), &path, &settings)).await
    {
        Ok(verdict) => verdict,
        Err(e) => {
            warn!("Classifier task for '{}' failed, treating as scanned: {}", shown, e);
            Classification::Scanned
        }
    }
}
