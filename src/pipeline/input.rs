//! Input staging: validate a user-supplied PDF and place it in a job's
//! `input/` directory.
//!
//! Both backends need a file-system path (pdfium and LibreOffice cannot read
//! from a byte buffer), and both must only ever see a private copy that the
//! job's cleanup can remove. We validate the PDF magic bytes (`%PDF`) before
//! staging so callers get a meaningful error rather than a pdfium crash.

use crate::error::Pdf2DocxError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Validate that `path` exists, is readable, and starts with `%PDF`.
pub fn validate_local(path: &Path) -> Result<(), Pdf2DocxError> {
    if !path.is_file() {
        return Err(Pdf2DocxError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let mut f = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Pdf2DocxError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(Pdf2DocxError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    };

    let mut head = Vec::with_capacity(4);
    f.by_ref()
        .take(4)
        .read_to_end(&mut head)
        .map_err(|_| Pdf2DocxError::FileNotFound {
            path: path.to_path_buf(),
        })?;
    check_magic(&head, path)?;

    debug!("Validated local PDF: {}", path.display());
    Ok(())
}

/// Reject anything that does not start with `%PDF`. Files shorter than the
/// magic are rejected too.
pub fn check_magic(head: &[u8], path: &Path) -> Result<(), Pdf2DocxError> {
    if head.len() >= 4 && &head[..4] == PDF_MAGIC {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = head.len().min(4);
    magic[..n].copy_from_slice(&head[..n]);
    Err(Pdf2DocxError::NotAPdf {
        path: path.to_path_buf(),
        magic,
    })
}

/// A safe file name for the staged copy.
///
/// Path separators and control characters become `_`, and a `.pdf`
/// extension is appended when missing so LibreOffice picks the PDF importer
/// and names its output `<stem>.docx`.
pub fn staged_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, '/' | '\\' | ':' | '"' | '\'') {
                '_'
            } else {
                c
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        return "input.pdf".to_string();
    }
    if cleaned.to_ascii_lowercase().ends_with(".pdf") {
        cleaned.to_string()
    } else {
        format!("{cleaned}.pdf")
    }
}

/// Copy a validated local file into `dest_dir`.
pub async fn stage_local(path: &Path, dest_dir: &Path) -> Result<PathBuf, Pdf2DocxError> {
    validate_local(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dest = dest_dir.join(staged_file_name(&name));

    tokio::fs::copy(path, &dest)
        .await
        .map_err(|e| Pdf2DocxError::ResourceAcquisitionFailed {
            detail: format!("copy '{}' into workspace: {e}", path.display()),
        })?;
    Ok(dest)
}

/// Write in-memory PDF bytes into `dest_dir` under `file_name`.
pub async fn stage_bytes(
    file_name: &str,
    bytes: &[u8],
    dest_dir: &Path,
) -> Result<PathBuf, Pdf2DocxError> {
    let dest = dest_dir.join(staged_file_name(file_name));
    check_magic(bytes, Path::new(file_name))?;
    tokio::fs::write(&dest, bytes)
        .await
        .map_err(|e| Pdf2DocxError::ResourceAcquisitionFailed {
            detail: format!("write '{}': {e}", dest.display()),
        })?;
    Ok(dest)
}

/// Download `url` into `dest_dir` and return the staged path.
pub async fn download_to(
    url: &str,
    dest_dir: &Path,
    timeout_secs: u64,
) -> Result<PathBuf, Pdf2DocxError> {
    if reqwest::Url::parse(url).is_err() {
        return Err(Pdf2DocxError::InvalidInput {
            input: url.to_string(),
        });
    }
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Pdf2DocxError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_send_err = |e: reqwest::Error| {
        if e.is_timeout() {
            Pdf2DocxError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            Pdf2DocxError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_send_err)?;

    if !response.status().is_success() {
        return Err(Pdf2DocxError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(map_send_err)?;
    let path = stage_bytes(&extract_filename(url), &bytes, dest_dir).await?;

    info!("Downloaded to: {}", path.display());
    Ok(path)
}

/// Extract a reasonable filename from the URL path.
fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_from_url() {
        assert_eq!(extract_filename("https://x.org/a/report.pdf?dl=1"), "report.pdf");
        assert_eq!(extract_filename("https://x.org/a/"), "downloaded.pdf");
    }

    #[test]
    fn staged_names_are_safe() {
        assert_eq!(staged_file_name("scan.pdf"), "scan.pdf");
        assert_eq!(staged_file_name("Scan.PDF"), "Scan.PDF");
        assert_eq!(staged_file_name("report"), "report.pdf");
        assert_eq!(staged_file_name("../../etc/passwd"), "_.._etc_passwd.pdf");
        assert_eq!(staged_file_name("   "), "input.pdf");
        assert_eq!(staged_file_name(".hidden"), "hidden.pdf");
    }

    #[test]
    fn magic_check() {
        assert!(check_magic(b"%PDF-1.7\n", Path::new("a.pdf")).is_ok());
        let err = check_magic(b"PK\x03\x04", Path::new("a.pdf")).unwrap_err();
        assert!(matches!(err, Pdf2DocxError::NotAPdf { magic, .. } if &magic == b"PK\x03\x04"));
        assert!(check_magic(b"%P", Path::new("a.pdf")).is_err());
    }

    #[test]
    fn validate_missing_file() {
        let err = validate_local(Path::new("/no/such/file.pdf")).unwrap_err();
        assert!(matches!(err, Pdf2DocxError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn stage_local_copies_into_dest() {
        let src_dir = tempfile::tempdir().unwrap();
        let dest_dir = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("memo.pdf");
        std::fs::write(&src, b"%PDF-1.4\n%%EOF\n").unwrap();

        let staged = stage_local(&src, dest_dir.path()).await.unwrap();
        assert_eq!(staged, dest_dir.path().join("memo.pdf"));
        assert_eq!(std::fs::read(&staged).unwrap(), b"%PDF-1.4\n%%EOF\n");
        assert!(src.exists());
    }

    #[tokio::test]
    async fn stage_bytes_rejects_non_pdf() {
        let dest_dir = tempfile::tempdir().unwrap();
        let err = stage_bytes("x.pdf", b"hello", dest_dir.path()).await.unwrap_err();
        assert!(matches!(err, Pdf2DocxError::NotAPdf { .. }));
        assert!(!dest_dir.path().join("x.pdf").exists());
    }
}
