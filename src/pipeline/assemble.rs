//! DOCX assembly for OCR output: one paragraph per page, page breaks
//! between pages.
//!
//! The page sequence is first modelled as a flat list of [`Block`]s so the
//! ordering rules (no break before the first page, none after the last) can
//! be checked without opening a `.docx`. Only [`PageDocument::save`] touches
//! `docx-rs`.

use docx_rs::{BreakType, Docx, Paragraph, Run, RunFonts};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io;
use std::path::Path;
use tracing::debug;

/// Font applied to every transcribed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    pub font_family: String,
    pub font_size_pt: f32,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_family: "Arial".to_string(),
            font_size_pt: 11.0,
        }
    }
}

/// One element of the assembled body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Paragraph(String),
    PageBreak,
}

/// Paragraph and page-break counts of an assembled document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLayout {
    pub paragraphs: usize,
    pub page_breaks: usize,
}

/// The OCR output document before it is written to disk.
#[derive(Debug, Clone)]
pub struct PageDocument {
    blocks: Vec<Block>,
    style: TextStyle,
}

impl PageDocument {
    /// Build the block sequence for `pages`, in order.
    pub fn from_pages(pages: &[String], style: TextStyle) -> Self {
        let mut blocks = Vec::with_capacity(pages.len() * 2);
        for (i, text) in pages.iter().enumerate() {
            if i > 0 {
                blocks.push(Block::PageBreak);
            }
            blocks.push(Block::Paragraph(sanitize_xml_text(text)));
        }
        Self { blocks, style }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn layout(&self) -> DocumentLayout {
        let page_breaks = self
            .blocks
            .iter()
            .filter(|b| matches!(b, Block::PageBreak))
            .count();
        DocumentLayout {
            paragraphs: self.blocks.len() - page_breaks,
            page_breaks,
        }
    }

    /// Render the blocks into a `docx-rs` document.
    ///
    /// Lines inside one page become soft line breaks so each page stays a
    /// single paragraph.
    pub fn to_docx(&self) -> Docx {
        let half_points = (self.style.font_size_pt * 2.0).round().max(1.0) as usize;
        let fonts = || {
            RunFonts::new()
                .ascii(&self.style.font_family)
                .hi_ansi(&self.style.font_family)
                .cs(&self.style.font_family)
        };

        self.blocks.iter().fold(Docx::new(), |docx, block| match block {
            Block::Paragraph(text) => {
                let mut run = Run::new().size(half_points).fonts(fonts());
                for (i, line) in text.split('\n').enumerate() {
                    if i > 0 {
                        run = run.add_break(BreakType::TextWrapping);
                    }
                    run = run.add_text(line);
                }
                docx.add_paragraph(Paragraph::new().add_run(run))
            }
            Block::PageBreak => {
                docx.add_paragraph(Paragraph::new().add_run(Run::new().add_break(BreakType::Page)))
            }
        })
    }

    /// Write the document to `path` atomically (temp file + rename).
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let tmp_path = path.with_extension("docx.tmp");
        let result = File::create(&tmp_path).and_then(|file| {
            self.to_docx()
                .build()
                .pack(file)
                .map_err(|e| io::Error::other(e.to_string()))
        });

        if let Err(e) = result {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e);
        }

        std::fs::rename(&tmp_path, path)?;
        debug!("Saved {} ({:?})", path.display(), self.layout());
        Ok(())
    }
}

/// Drop characters that are illegal in XML 1.0 (everything below U+0020
/// except tab and newline).
fn sanitize_xml_text(text: &str) -> String {
    text.chars()
        .filter(|&c| c >= '\u{20}' || c == '\n' || c == '\t')
        .collect()
}
