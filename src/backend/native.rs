//! Native backend: headless LibreOffice (`soffice`) for digital PDFs.
//!
//! # System Requirement
//!
//! LibreOffice must be installed and locatable:
//! - **macOS**: `brew install --cask libreoffice`
//! - **Linux**: `apt install libreoffice` or `dnf install libreoffice`
//! - **Windows**: `winget install LibreOffice.LibreOffice`
//!
//! Each run gets a private user profile inside its output directory
//! (`-env:UserInstallation`). LibreOffice refuses to start a second instance
//! on a shared profile, so this is what lets several jobs convert at once.

use super::output_path_for;
use crate::config::ConversionConfig;
use crate::error::Pdf2DocxError;
use std::collections::HashSet;
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration, Instant};
use tracing::{debug, info, warn};

/// Import filter that opens a PDF in Writer rather than Draw.
const PDF_IMPORT_FILTER: &str = "writer_pdf_import";

/// Export target: Office Open XML text document.
const DOCX_EXPORT: &str = "docx:MS Word 2007 XML";

const PROFILE_DIR: &str = ".lo-profile";

/// Bytes of converter output kept in an error message.
const MAX_DIAGNOSTIC_CHARS: usize = 2000;

/// What a finished converter process left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl From<std::process::Output> for ProcessOutcome {
    fn from(output: std::process::Output) -> Self {
        Self {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

impl ProcessOutcome {
    /// stderr if it has anything to say, else stdout.
    fn diagnostic(&self) -> String {
        let text = if !self.stderr.trim().is_empty() {
            self.stderr.trim()
        } else if !self.stdout.trim().is_empty() {
            self.stdout.trim()
        } else {
            return "converter produced no output".to_string();
        };
        let count = text.chars().count();
        if count <= MAX_DIAGNOSTIC_CHARS {
            text.to_string()
        } else {
            let tail: String = text.chars().skip(count - MAX_DIAGNOSTIC_CHARS).collect();
            format!("…{tail}")
        }
    }
}

/// Map a finished process onto the conversion result.
///
/// Success requires a zero exit code *and* a non-empty file at `expected`;
/// LibreOffice exits 0 for some inputs it silently fails to convert.
pub fn interpret_outcome(
    outcome: &ProcessOutcome,
    expected: &Path,
) -> Result<PathBuf, Pdf2DocxError> {
    if outcome.exit_code != Some(0) {
        return Err(Pdf2DocxError::NativeConversionFailed {
            exit_code: outcome.exit_code,
            detail: outcome.diagnostic(),
        });
    }

    match std::fs::metadata(expected) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(expected.to_path_buf()),
        Ok(_) => Err(Pdf2DocxError::NativeConversionFailed {
            exit_code: Some(0),
            detail: format!("converter produced an empty '{}'", expected.display()),
        }),
        Err(_) => Err(Pdf2DocxError::NativeConversionFailed {
            exit_code: Some(0),
            detail: format!(
                "converter exited successfully but '{}' was not created ({})",
                expected.display(),
                outcome.diagnostic()
            ),
        }),
    }
}

/// The fixed argument list for one conversion.
pub fn build_args(
    input: &Path,
    output_dir: &Path,
    profile_dir: &Path,
) -> Result<Vec<OsString>, Pdf2DocxError> {
    let absolute = std::path::absolute(profile_dir).map_err(|e| Pdf2DocxError::Internal(
        format!("resolve profile dir '{}': {e}", profile_dir.display()),
    ))?;
    let profile_url = reqwest::Url::from_file_path(&absolute).map_err(|_| {
        Pdf2DocxError::Internal(format!(
            "profile dir '{}' cannot be expressed as a file URL",
            absolute.display()
        ))
    })?;

    Ok(vec![
        "--headless".into(),
        "--norestore".into(),
        format!("-env:UserInstallation={profile_url}").into(),
        format!("--infilter={PDF_IMPORT_FILTER}").into(),
        "--convert-to".into(),
        DOCX_EXPORT.into(),
        "--outdir".into(),
        output_dir.as_os_str().to_os_string(),
        input.as_os_str().to_os_string(),
    ])
}

/// Every place `soffice` might live, most specific first, deduplicated.
fn soffice_candidates() -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    let mut push_candidate = |path: PathBuf| {
        if seen.insert(path.clone()) {
            candidates.push(path);
        }
    };

    for var in ["PDF2DOCX_SOFFICE_PATH", "SOFFICE_PATH", "LIBREOFFICE_PATH"] {
        if let Some(value) = env::var_os(var).filter(|v| !v.is_empty()) {
            push_candidate(PathBuf::from(value));
        }
    }

    if cfg!(target_os = "macos") {
        push_candidate(PathBuf::from("/Applications/LibreOffice.app/Contents/MacOS/soffice"));
    }

    if cfg!(target_os = "linux") {
        push_candidate(PathBuf::from("/usr/lib/libreoffice/program/soffice"));
        push_candidate(PathBuf::from("/opt/libreoffice/program/soffice"));
    }

    if cfg!(target_os = "windows") {
        push_candidate(PathBuf::from("C:\\Program Files\\LibreOffice\\program\\soffice.exe"));
    }

    if let Some(path_env) = env::var_os("PATH") {
        for dir in env::split_paths(&path_env) {
            push_candidate(dir.join("soffice"));
            push_candidate(dir.join("libreoffice"));
            push_candidate(dir.join("soffice.exe"));
        }
    }

    candidates
}

/// Runs LibreOffice to convert one PDF.
#[derive(Debug, Clone)]
pub struct NativeBackend {
    soffice_path: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl NativeBackend {
    pub fn new(soffice_path: Option<PathBuf>, timeout_secs: Option<u64>) -> Self {
        Self {
            soffice_path,
            timeout: timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn from_config(config: &ConversionConfig) -> Self {
        Self::new(config.soffice_path.clone(), config.native_timeout_secs)
    }

    /// Find the converter executable.
    ///
    /// An explicitly configured path is authoritative: if it does not point
    /// at a file, the search stops there.
    pub fn locate(&self) -> Result<PathBuf, Pdf2DocxError> {
        if let Some(ref configured) = self.soffice_path {
            if configured.is_file() {
                return Ok(configured.clone());
            }
            warn!("Configured soffice '{}' does not exist", configured.display());
            return Err(Pdf2DocxError::ConverterNotFound);
        }

        soffice_candidates()
            .into_iter()
            .find(|c| c.is_file())
            .ok_or(Pdf2DocxError::ConverterNotFound)
    }

    /// Convert `input` into `output_dir/<stem>.docx`.
    ///
    /// # Errors
    /// * [`Pdf2DocxError::ConverterNotFound`] when no `soffice` is found
    /// * [`Pdf2DocxError::NativeConversionFailed`] on launch failure,
    ///   non-zero exit, watchdog expiry, or a missing output file
    pub async fn convert(&self, input: &Path, output_dir: &Path) -> Result<PathBuf, Pdf2DocxError> {
        let soffice = self.locate()?;
        let expected = output_path_for(input, output_dir)?;
        let profile_dir = output_dir.join(PROFILE_DIR);
        let args = build_args(input, output_dir, &profile_dir)?;

        info!(
            "Converting '{}' with {}",
            input.display(),
            soffice.display()
        );
        let start = Instant::now();

        let child = Command::new(&soffice)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Pdf2DocxError::NativeConversionFailed {
                exit_code: None,
                detail: format!("failed to launch '{}': {e}", soffice.display()),
            })?;
        let pid = child.id();

        let waited = match self.timeout {
            Some(limit) => match timeout(limit, child.wait_with_output()).await {
                Ok(r) => r,
                Err(_) => {
                    // Dropping the wait future drops the child, which kills it.
                    warn!("soffice (pid {:?}) exceeded {:?}, killed", pid, limit);
                    self.discard_profile(&profile_dir).await;
                    return Err(Pdf2DocxError::NativeConversionFailed {
                        exit_code: None,
                        detail: format!("timed out after {} seconds", limit.as_secs()),
                    });
                }
            },
            None => child.wait_with_output().await,
        };

        let output = waited.map_err(|e| Pdf2DocxError::NativeConversionFailed {
            exit_code: None,
            detail: format!("failed to wait for converter: {e}"),
        })?;
        self.discard_profile(&profile_dir).await;

        let outcome = ProcessOutcome::from(output);
        debug!(
            "soffice exited with {:?} after {:?}",
            outcome.exit_code,
            start.elapsed()
        );
        interpret_outcome(&outcome, &expected)
    }

    async fn discard_profile(&self, profile_dir: &Path) {
        if let Err(e) = tokio::fs::remove_dir_all(profile_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!("Could not remove '{}': {}", profile_dir.display(), e);
            }
        }
    }
}
