//! Narrow contracts for the external engines the pipeline drives.
//!
//! The pipeline never talks to pdfium or an OCR model directly; it goes
//! through the traits below so tests (and alternative engines) can be
//! substituted via [`crate::convert::Engines`]. All methods are blocking and
//! are only ever called from `tokio::task::spawn_blocking`.
//!
//! The OCR model contracts live in [`crate::model`] next to the cache that
//! owns them.

use image::DynamicImage;
use std::path::Path;
use thiserror::Error;

/// Failure reported by an external engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The engine library could not be loaded.
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    /// The document could not be opened or parsed.
    #[error("cannot open document: {0}")]
    Open(String),

    /// A specific page failed.
    #[error("page {page}: {detail}")]
    Page { page: usize, detail: String },

    /// Model loading or inference failed.
    #[error("{0}")]
    Model(String),
}

/// Text extracted from the leading pages of a document.
///
/// `page_count` is the real page count of the document; `page_text` only
/// answers for the pages that were materialised when the document was opened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentText {
    page_count: usize,
    pages: Vec<String>,
}

impl DocumentText {
    pub fn new(page_count: usize, pages: Vec<String>) -> Self {
        Self { page_count, pages }
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Text of page `index` (0-based), if it was extracted.
    pub fn page_text(&self, index: usize) -> Option<&str> {
        self.pages.get(index).map(String::as_str)
    }
}

/// Opens a document and extracts per-page text.
pub trait DocumentIntrospector: Send + Sync {
    /// Open `path` and extract the text of at most `text_pages` leading pages.
    fn open(&self, path: &Path, text_pages: usize) -> Result<DocumentText, EngineError>;
}

/// Renders every page of a document to an image.
pub trait PageRasterizer: Send + Sync {
    /// Rasterise all pages of `path` at `dpi`, in page order.
    fn pages_to_images(&self, path: &Path, dpi: u32) -> Result<Vec<DynamicImage>, EngineError>;
}
