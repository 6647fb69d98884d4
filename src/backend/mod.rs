//! The two conversion backends.
//!
//! Both take a staged PDF and a job output directory and write
//! `<output_dir>/<stem>.docx`:
//!
//! * [`native`]: headless LibreOffice, for documents with a text layer
//! * [`ocr`]: rasterise, transcribe each page, assemble a new document

pub mod native;
pub mod ocr;

use crate::error::Pdf2DocxError;
use std::path::{Path, PathBuf};

/// `output_dir/<stem of input>.docx`.
pub fn output_path_for(input: &Path, output_dir: &Path) -> Result<PathBuf, Pdf2DocxError> {
    let stem = input
        .file_stem()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Pdf2DocxError::InvalidInput {
            input: input.display().to_string(),
        })?;
    let mut name = stem.to_os_string();
    name.push(".docx");
    Ok(output_dir.join(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_uses_stem() {
        let p = output_path_for(Path::new("/w/input/scan.v2.pdf"), Path::new("/w/output")).unwrap();
        assert_eq!(p, PathBuf::from("/w/output/scan.v2.docx"));
    }

    #[test]
    fn nameless_input_is_rejected() {
        assert!(output_path_for(Path::new("/"), Path::new("/w/output")).is_err());
    }
}
