//! PDF access through pdfium: per-page text for the classifier and page
//! rasterisation for the OCR backend.
//!
//! ## Why bind per call?
//!
//! `Pdfium` wraps a dynamically loaded C++ library whose bindings are not
//! `Clone` and not guaranteed `Send`. Each blocking call therefore binds a
//! fresh `Pdfium` from the cached library location; re-binding an already
//! loaded library is cheap compared to opening and rendering a document.
//!
//! Everything in this module is blocking and must run under
//! `tokio::task::spawn_blocking`.

use crate::engine::{DocumentIntrospector, DocumentText, EngineError, PageRasterizer};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Upper bound on either edge of a rendered page, independent of DPI.
///
/// A poster-sized page at 150 DPI would otherwise allocate hundreds of
/// megabytes of pixels before the OCR preprocessing ever shrinks it.
const MAX_RENDER_EDGE_PX: f32 = 5000.0;

/// pdfium-backed [`DocumentIntrospector`] and [`PageRasterizer`].
#[derive(Debug, Clone, Default)]
pub struct PdfiumEngine {
    /// Directory containing the platform pdfium library, if not the default.
    lib_dir: Option<PathBuf>,
}

impl PdfiumEngine {
    pub fn new(lib_dir: Option<PathBuf>) -> Self {
        Self { lib_dir }
    }

    /// Bind to pdfium, most specific location first:
    /// explicit directory, `PDFIUM_LIB_PATH`, working directory, system library.
    fn bind(&self) -> Result<Pdfium, EngineError> {
        let explicit = self
            .lib_dir
            .clone()
            .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

        let bindings = match explicit {
            Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
                .map_err(|e| {
                    EngineError::Unavailable(format!(
                        "could not load pdfium from '{}': {}",
                        dir.display(),
                        e
                    ))
                })?,
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library())
                .map_err(|e| EngineError::Unavailable(format!("could not find pdfium: {}", e)))?,
        };

        Ok(Pdfium::new(bindings))
    }
}

impl DocumentIntrospector for PdfiumEngine {
    fn open(&self, path: &Path, text_pages: usize) -> Result<DocumentText, EngineError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| EngineError::Open(format!("{:?}", e)))?;

        let pages = document.pages();
        let page_count = pages.len() as usize;
        let wanted = page_count.min(text_pages);

        let mut texts = Vec::with_capacity(wanted);
        for idx in 0..wanted {
            let page = pages.get(idx as u16).map_err(|e| EngineError::Page {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;
            let text = page.text().map_err(|e| EngineError::Page {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;
            texts.push(text.all());
        }

        debug!(
            "Introspected {}: {} pages, text sampled from {}",
            path.display(),
            page_count,
            wanted
        );
        Ok(DocumentText::new(page_count, texts))
    }
}

impl PageRasterizer for PdfiumEngine {
    fn pages_to_images(&self, path: &Path, dpi: u32) -> Result<Vec<DynamicImage>, EngineError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| EngineError::Open(format!("{:?}", e)))?;

        let pages = document.pages();
        info!("PDF loaded for rasterisation: {} pages at {} DPI", pages.len(), dpi);

        let scale = dpi as f32 / 72.0;
        let mut images = Vec::with_capacity(pages.len() as usize);

        for (idx, page) in pages.iter().enumerate() {
            let width_px = (page.width().value * scale).min(MAX_RENDER_EDGE_PX).max(1.0);
            let height_px = (page.height().value * scale).min(MAX_RENDER_EDGE_PX).max(1.0);

            let render_config = PdfRenderConfig::new()
                .set_target_width(width_px as i32)
                .set_maximum_height(height_px as i32);

            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| EngineError::Page {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                })?;

            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            images.push(image);
        }

        Ok(images)
    }
}
