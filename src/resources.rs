//! Per-job workspace: a private temp directory holding the staged input and
//! the backend's output.
//!
//! ```text
//! <temp_root>/pdf2docx-XXXXXX/
//! ├── input/<name>.pdf      staged copy of the caller's PDF
//! └── output/               backends write <stem>.docx here
//! ```
//!
//! [`JobResources::release`] removes the whole tree. It is idempotent and
//! also runs on drop, so every exit path of a job (success, failure,
//! cancellation, panic) ends with the workspace gone. Removal failures are
//! logged and swallowed.

use crate::error::Pdf2DocxError;
use crate::pipeline::input;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;
use tracing::{debug, warn};

/// Where a job's PDF comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum InputSource {
    /// A local file. Copied into the workspace; the original is untouched.
    Path(PathBuf),
    /// An HTTP/HTTPS URL, downloaded into the workspace.
    Url(String),
    /// An in-memory upload.
    Bytes { file_name: String, bytes: Vec<u8> },
}

impl fmt::Debug for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::Path(p) => f.debug_tuple("Path").field(p).finish(),
            InputSource::Url(u) => f.debug_tuple("Url").field(u).finish(),
            InputSource::Bytes { file_name, bytes } => f
                .debug_struct("Bytes")
                .field("file_name", file_name)
                .field("len", &bytes.len())
                .finish(),
        }
    }
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::Path(p) => write!(f, "{}", p.display()),
            InputSource::Url(u) => f.write_str(u),
            InputSource::Bytes { file_name, bytes } => {
                write!(f, "{} ({} bytes)", file_name, bytes.len())
            }
        }
    }
}

impl From<&str> for InputSource {
    fn from(s: &str) -> Self {
        if input::is_url(s) {
            InputSource::Url(s.to_string())
        } else {
            InputSource::Path(PathBuf::from(s))
        }
    }
}

impl From<String> for InputSource {
    fn from(s: String) -> Self {
        InputSource::from(s.as_str())
    }
}

impl From<PathBuf> for InputSource {
    fn from(p: PathBuf) -> Self {
        InputSource::Path(p)
    }
}

impl From<&Path> for InputSource {
    fn from(p: &Path) -> Self {
        InputSource::Path(p.to_path_buf())
    }
}

impl InputSource {
    /// Base name the staged copy and the DOCX are derived from.
    pub fn file_name(&self) -> String {
        match self {
            InputSource::Path(p) => p
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            InputSource::Url(_) => String::new(),
            InputSource::Bytes { file_name, .. } => file_name.clone(),
        }
    }
}

/// The workspace owned by one job.
pub struct JobResources {
    id: String,
    root: PathBuf,
    input_path: PathBuf,
    output_dir: PathBuf,
    workspace: Mutex<Option<TempDir>>,
}

impl fmt::Debug for JobResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobResources")
            .field("id", &self.id)
            .field("root", &self.root)
            .field("released", &self.is_released())
            .finish()
    }
}

impl JobResources {
    /// Create the workspace under `temp_root` (or the system temp dir) and
    /// stage `source` into it.
    ///
    /// Nothing is left behind if staging fails.
    pub async fn acquire(
        source: &InputSource,
        temp_root: Option<&Path>,
        download_timeout_secs: u64,
    ) -> Result<Self, Pdf2DocxError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("pdf2docx-");
        let workspace = match temp_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| Pdf2DocxError::ResourceAcquisitionFailed {
            detail: format!("create job directory: {e}"),
        })?;

        let root = workspace.path().to_path_buf();
        let id = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "pdf2docx-job".to_string());

        let input_dir = root.join("input");
        let output_dir = root.join("output");
        for dir in [&input_dir, &output_dir] {
            tokio::fs::create_dir(dir)
                .await
                .map_err(|e| Pdf2DocxError::ResourceAcquisitionFailed {
                    detail: format!("create '{}': {e}", dir.display()),
                })?;
        }

        // `workspace` drops on every early return below, removing the tree.
        let input_path = match source {
            InputSource::Path(p) => input::stage_local(p, &input_dir).await?,
            InputSource::Url(u) => input::download_to(u, &input_dir, download_timeout_secs).await?,
            InputSource::Bytes { file_name, bytes } => {
                input::stage_bytes(file_name, bytes, &input_dir).await?
            }
        };

        debug!("Job {} workspace ready at {}", id, root.display());
        Ok(Self {
            id,
            root,
            input_path,
            output_dir,
            workspace: Mutex::new(Some(workspace)),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The staged PDF.
    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    /// Directory backends write into.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn is_released(&self) -> bool {
        self.workspace
            .lock()
            .map(|w| w.is_none())
            .unwrap_or_else(|poisoned| poisoned.into_inner().is_none())
    }

    /// Remove the workspace. Returns `true` on the call that actually
    /// released it, `false` on every later call.
    pub fn release(&self) -> bool {
        let taken = match self.workspace.lock() {
            Ok(mut w) => w.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(workspace) = taken else {
            return false;
        };

        let path = workspace.path().to_path_buf();
        match workspace.close() {
            Ok(()) => debug!("Job {} workspace removed", self.id),
            Err(e) => warn!(
                "Job {}: could not remove workspace '{}': {}",
                self.id,
                path.display(),
                e
            ),
        }
        true
    }
}

impl Drop for JobResources {
    fn drop(&mut self) {
        self.release();
    }
}
