//! Pipeline stages shared by the backends.
//!
//! Each submodule implements exactly one transformation step, so each is
//! independently testable.
//!
//! ## Data Flow (OCR path)
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ llm ──▶ postprocess ──▶ assemble
//! (stage)   (pdfium)   (resize)   (VLM)   (cleanup)       (docx-rs)
//! ```
//!
//! 1. [`input`] : validate and stage the user's PDF into a job workspace
//! 2. [`render`]: pdfium text extraction and rasterisation; blocking
//! 3. [`encode`]: fit pages into the model's box, RGB8, PNG/base64
//! 4. [`llm`]   : the default OCR model: one vision chat request per page
//! 5. [`postprocess`]: deterministic cleanup of model quirks
//! 6. [`assemble`]: one paragraph per page, page breaks between, saved
//!    atomically

pub mod assemble;
pub mod encode;
pub mod input;
pub mod llm;
pub mod postprocess;
pub mod render;
