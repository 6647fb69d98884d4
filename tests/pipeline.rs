//! Orchestrator tests with substitute engines.
//!
//! pdfium and the OCR model are replaced by in-process fakes; LibreOffice is
//! replaced by small shell scripts, so the native-path tests only run on
//! unix. Nothing here needs network access or external binaries.

use edgequake_pdf2docx::{
    BackendKind, Classification, ConversionConfig, ConversionProgressCallback, Converter,
    DocumentIntrospector, DocumentText, EngineError, Engines, ErrorKind, Generation, InputSource,
    JobStatus, OcrModel, OcrModelProvider, OcrProcessor, PageRasterizer, Pdf2DocxError,
    PixelValues,
};
use image::DynamicImage;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const DIGITAL_TEXT: &str =
    "Quarterly report. Revenue grew in every region and the outlook remains stable.";

// ── Fakes ────────────────────────────────────────────────────────────────

/// Every page carries the same text.
struct FixedText {
    pages: usize,
    text: &'static str,
}

impl DocumentIntrospector for FixedText {
    fn open(&self, _path: &Path, text_pages: usize) -> Result<DocumentText, EngineError> {
        let sampled = self.pages.min(text_pages);
        Ok(DocumentText::new(
            self.pages,
            vec![self.text.to_string(); sampled],
        ))
    }
}

struct Unreadable;

impl DocumentIntrospector for Unreadable {
    fn open(&self, _path: &Path, _text_pages: usize) -> Result<DocumentText, EngineError> {
        Err(EngineError::Open("xref table is damaged".into()))
    }
}

/// One blank page per width; the width identifies the page.
struct Pages(Vec<u32>);

impl PageRasterizer for Pages {
    fn pages_to_images(&self, _path: &Path, _dpi: u32) -> Result<Vec<DynamicImage>, EngineError> {
        Ok(self.0.iter().map(|&w| DynamicImage::new_luma8(w, 50)).collect())
    }
}

struct Passthrough;

impl OcrProcessor for Passthrough {
    fn prepare(&self, image: &DynamicImage) -> Result<PixelValues, EngineError> {
        Ok(PixelValues::from_image(image))
    }

    fn decode(&self, generation: Generation) -> Result<String, EngineError> {
        match generation {
            Generation::Text(text) => Ok(text),
            Generation::Tokens(_) => Err(EngineError::Model("unexpected token ids".into())),
        }
    }
}

/// Names the page after its width.
struct PageNamer;

impl OcrModel for PageNamer {
    fn generate(&self, pixels: &PixelValues, _max_new_tokens: usize) -> Result<Generation, EngineError> {
        let name = match pixels.width {
            100 => "ALPHA-PAGE",
            200 => "BRAVO-PAGE",
            300 => "CHARLIE-PAGE",
            _ => "OTHER-PAGE",
        };
        Ok(Generation::Text(name.to_string()))
    }
}

/// Counts loads; the first `failures` loads fail.
#[derive(Default)]
struct CountingProvider {
    loads: AtomicUsize,
    failures: usize,
}

impl CountingProvider {
    fn failing_first(failures: usize) -> Self {
        Self {
            loads: AtomicUsize::new(0),
            failures,
        }
    }
}

impl OcrModelProvider for CountingProvider {
    fn load(&self, _name: &str) -> Result<(Arc<dyn OcrProcessor>, Arc<dyn OcrModel>), EngineError> {
        let attempt = self.loads.fetch_add(1, Ordering::SeqCst);
        // Keep concurrent callers waiting on the cache lock for a moment.
        std::thread::sleep(std::time::Duration::from_millis(50));
        if attempt < self.failures {
            return Err(EngineError::Model("weights file is truncated".into()));
        }
        Ok((Arc::new(Passthrough), Arc::new(PageNamer)))
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl ConversionProgressCallback for Recorder {
    fn on_job_start(&self, _job_id: &str) {
        self.events.lock().unwrap().push("start".into());
    }

    fn on_classified(&self, _job_id: &str, classification: Classification, backend: BackendKind) {
        self.events
            .lock()
            .unwrap()
            .push(format!("classified {classification:?} {backend:?}"));
    }

    fn on_ocr_start(&self, _job_id: &str, total_pages: usize) {
        self.events.lock().unwrap().push(format!("ocr {total_pages}"));
    }

    fn on_page_complete(&self, _job_id: &str, page_num: usize, total_pages: usize, _chars: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("page {page_num}/{total_pages}"));
    }

    fn on_job_complete(&self, _job_id: &str, succeeded: bool) {
        self.events.lock().unwrap().push(format!("done {succeeded}"));
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn pdf(name: &str) -> InputSource {
    InputSource::Bytes {
        file_name: name.to_string(),
        bytes: b"%PDF-1.7\n%fake body\n".to_vec(),
    }
}

fn engines(
    introspector: Arc<dyn DocumentIntrospector>,
    widths: Vec<u32>,
    provider: Arc<dyn OcrModelProvider>,
) -> Engines {
    Engines {
        introspector,
        rasterizer: Arc::new(Pages(widths)),
        model_provider: provider,
    }
}

fn scanned_converter(temp_root: &Path, widths: Vec<u32>, provider: Arc<CountingProvider>) -> Converter {
    let config = ConversionConfig::builder()
        .temp_root(temp_root)
        .build()
        .unwrap();
    Converter::with_engines(
        config,
        engines(
            Arc::new(FixedText { pages: widths.len(), text: "" }),
            widths,
            provider,
        ),
    )
}

fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

fn document_xml(path: &Path) -> String {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .unwrap()
        .read_to_string(&mut xml)
        .unwrap();
    xml
}

// ── OCR path ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn single_scanned_page_becomes_one_paragraph() {
    let root = tempfile::tempdir().unwrap();
    let provider = Arc::new(CountingProvider::default());
    let converter = scanned_converter(root.path(), vec![100], provider.clone());

    let doc = converter.run_conversion(pdf("receipt.pdf")).await.unwrap();

    let job = doc.job();
    assert_eq!(job.status(), JobStatus::Succeeded);
    assert_eq!(job.classification(), Classification::Scanned);
    assert_eq!(job.backend_used(), BackendKind::Ocr);
    assert!(job.error().is_none());
    assert_eq!(doc.path().file_name().unwrap(), "receipt.docx");
    assert!(doc.path().starts_with(&job.output_dir));

    let layout = doc.layout().unwrap();
    assert_eq!(layout.paragraphs, 1);
    assert_eq!(layout.page_breaks, 0);
    let xml = document_xml(doc.path());
    assert!(xml.contains("ALPHA-PAGE"));
    assert!(!xml.contains(r#"w:type="page""#));

    assert!(doc.release());
    assert_eq!(entries(root.path()), 0);
}

#[tokio::test]
async fn pages_keep_their_order_with_breaks_between() {
    let root = tempfile::tempdir().unwrap();
    let provider = Arc::new(CountingProvider::default());
    let converter = scanned_converter(root.path(), vec![100, 200, 300], provider);

    let doc = converter.run_conversion(pdf("letters.pdf")).await.unwrap();
    let layout = doc.layout().unwrap();
    assert_eq!((layout.paragraphs, layout.page_breaks), (3, 2));

    let xml = document_xml(doc.path());
    let a = xml.find("ALPHA-PAGE").unwrap();
    let b = xml.find("BRAVO-PAGE").unwrap();
    let c = xml.find("CHARLIE-PAGE").unwrap();
    assert!(a < b && b < c);
    assert_eq!(xml.matches(r#"w:type="page""#).count(), 2);
    assert_eq!(xml[a..b].matches(r#"w:type="page""#).count(), 1);
    assert_eq!(xml[b..c].matches(r#"w:type="page""#).count(), 1);
}

#[tokio::test]
async fn unreadable_document_falls_back_to_ocr() {
    let root = tempfile::tempdir().unwrap();
    let config = ConversionConfig::builder()
        .temp_root(root.path())
        .build()
        .unwrap();
    let converter = Converter::with_engines(
        config,
        engines(
            Arc::new(Unreadable),
            vec![100],
            Arc::new(CountingProvider::default()),
        ),
    );

    let doc = converter.run_conversion(pdf("odd.pdf")).await.unwrap();
    assert_eq!(doc.job().classification(), Classification::Scanned);
    assert_eq!(doc.job().backend_used(), BackendKind::Ocr);
}

#[tokio::test]
async fn failed_model_load_is_retried_by_the_next_job() {
    let root = tempfile::tempdir().unwrap();
    let provider = Arc::new(CountingProvider::failing_first(1));
    let converter = scanned_converter(root.path(), vec![100], provider.clone());

    let failure = converter.run_conversion(pdf("first.pdf")).await.unwrap_err();
    assert!(matches!(failure.error, Pdf2DocxError::ModelLoadFailed { .. }));
    let job = failure.job.unwrap();
    assert_eq!(job.status(), JobStatus::Failed);
    assert_eq!(job.error().map(|e| e.kind), Some(ErrorKind::ModelLoadFailed));
    assert!(!converter.model_cache().is_loaded());
    assert_eq!(entries(root.path()), 0);

    let doc = converter.run_conversion(pdf("second.pdf")).await.unwrap();
    assert_eq!(doc.job().status(), JobStatus::Succeeded);
    assert!(converter.model_cache().is_loaded());
    assert_eq!(provider.loads.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_jobs_load_the_model_once() {
    let root = tempfile::tempdir().unwrap();
    let provider = Arc::new(CountingProvider::default());
    let converter = Arc::new(scanned_converter(
        root.path(),
        vec![100, 200],
        provider.clone(),
    ));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let converter = Arc::clone(&converter);
            tokio::spawn(async move { converter.run_conversion(pdf(&format!("scan-{i}.pdf"))).await })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        let doc = handle.await.unwrap().unwrap();
        assert_eq!(doc.job().status(), JobStatus::Succeeded);
        ids.push(doc.job().id.clone());
        doc.release();
    }

    assert_eq!(provider.loads.load(Ordering::SeqCst), 1);
    assert_eq!(converter.model_cache().load_attempts(), 1);
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 4);
    assert_eq!(entries(root.path()), 0);
}

#[tokio::test]
async fn ocr_progress_events_arrive_in_order() {
    let root = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let config = ConversionConfig::builder()
        .temp_root(root.path())
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let converter = Converter::with_engines(
        config,
        engines(
            Arc::new(FixedText { pages: 2, text: "  " }),
            vec![100, 200],
            Arc::new(CountingProvider::default()),
        ),
    );

    converter.run_conversion(pdf("two.pdf")).await.unwrap();

    assert_eq!(
        recorder.events(),
        vec![
            "start",
            "classified Scanned Ocr",
            "ocr 2",
            "page 1/2",
            "page 2/2",
            "done true",
        ]
    );
}

// ── Persisting ───────────────────────────────────────────────────────────

#[tokio::test]
async fn convert_to_file_copies_the_result_and_cleans_up() {
    let root = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let dest = out.path().join("nested").join("result.docx");
    let converter = scanned_converter(root.path(), vec![100, 200], Arc::new(CountingProvider::default()));

    let job = converter.convert_to_file(pdf("scan.pdf"), &dest).await.unwrap();

    assert_eq!(job.status(), JobStatus::Succeeded);
    assert!(dest.is_file());
    assert!(!dest.with_extension("docx.tmp").exists());
    assert!(document_xml(&dest).contains("BRAVO-PAGE"));
    assert!(!job.output_dir.exists());
    assert!(!job.input_path.exists());
    assert_eq!(entries(root.path()), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_jobs_writing_one_destination_do_not_corrupt_it() {
    let root = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let dest = out.path().join("report.docx");
    let converter = Arc::new(scanned_converter(
        root.path(),
        vec![100, 200, 300],
        Arc::new(CountingProvider::default()),
    ));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let converter = Arc::clone(&converter);
            let dest = dest.clone();
            tokio::spawn(async move {
                converter
                    .convert_to_file(pdf(&format!("dir{i}-report.pdf")), &dest)
                    .await
            })
        })
        .collect();
    for handle in handles {
        let job = handle.await.unwrap().unwrap();
        assert_eq!(job.status(), JobStatus::Succeeded);
    }

    let xml = document_xml(&dest);
    assert!(xml.contains("ALPHA-PAGE") && xml.contains("CHARLIE-PAGE"));
    assert_eq!(entries(out.path()), 1);
    assert_eq!(entries(root.path()), 0);
}

#[tokio::test]
async fn dropping_the_result_removes_the_workspace() {
    let root = tempfile::tempdir().unwrap();
    let converter = scanned_converter(root.path(), vec![100], Arc::new(CountingProvider::default()));

    let doc = converter.run_conversion(pdf("scan.pdf")).await.unwrap();
    let path = doc.path().to_path_buf();
    assert!(path.is_file());
    drop(doc);

    assert!(!path.exists());
    assert_eq!(entries(root.path()), 0);
}

#[tokio::test]
async fn non_pdf_bytes_are_rejected_before_a_job_exists() {
    let root = tempfile::tempdir().unwrap();
    let provider = Arc::new(CountingProvider::default());
    let converter = scanned_converter(root.path(), vec![100], provider.clone());

    let failure = converter
        .run_conversion(InputSource::Bytes {
            file_name: "notes.pdf".into(),
            bytes: b"just some text".to_vec(),
        })
        .await
        .unwrap_err();

    assert!(failure.job.is_none());
    assert_eq!(failure.error.kind(), ErrorKind::Validation);
    assert_eq!(provider.loads.load(Ordering::SeqCst), 0);
    assert_eq!(entries(root.path()), 0);
}

// ── Native path ──────────────────────────────────────────────────────────

#[cfg(unix)]
mod native {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Parses `--outdir` and writes `<stem>.docx` there, like soffice.
    const WRITES_DOCX: &str = r#"outdir=""
while [ $# -gt 0 ]; do
  case "$1" in
    --outdir) outdir="$2"; shift 2 ;;
    *) last="$1"; shift ;;
  esac
done
name=$(basename "$last")
printf 'PK converted by fake soffice' > "$outdir/${name%.*}.docx""#;

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("soffice");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn digital_converter(
        temp_root: &Path,
        soffice: PathBuf,
        provider: Arc<CountingProvider>,
    ) -> Converter {
        let config = ConversionConfig::builder()
            .temp_root(temp_root)
            .soffice_path(soffice)
            .build()
            .unwrap();
        Converter::with_engines(
            config,
            engines(
                Arc::new(FixedText {
                    pages: 3,
                    text: DIGITAL_TEXT,
                }),
                vec![100, 200, 300],
                provider,
            ),
        )
    }

    #[tokio::test]
    async fn digital_document_goes_through_libreoffice() {
        let bin = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let provider = Arc::new(CountingProvider::default());
        let converter = digital_converter(
            root.path(),
            script(bin.path(), WRITES_DOCX),
            provider.clone(),
        );

        let doc = converter.run_conversion(pdf("report.pdf")).await.unwrap();

        let job = doc.job();
        assert_eq!(job.status(), JobStatus::Succeeded);
        assert_eq!(job.classification(), Classification::Digital);
        assert_eq!(job.backend_used(), BackendKind::Native);
        assert_eq!(job.result_path(), Some(job.output_dir.join("report.docx").as_path()));
        assert!(doc.layout().is_none());
        assert_eq!(
            std::fs::read(doc.path()).unwrap(),
            b"PK converted by fake soffice"
        );
        // The per-run LibreOffice profile does not outlive the conversion.
        assert!(!job.output_dir.join(".lo-profile").exists());
        assert_eq!(provider.loads.load(Ordering::SeqCst), 0);

        doc.release();
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn libreoffice_failure_fails_the_job_and_cleans_up() {
        let bin = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let soffice = script(bin.path(), "echo 'Error: source file could not be loaded' >&2\nexit 1");
        let converter = digital_converter(root.path(), soffice, Arc::new(CountingProvider::default()));

        let failure = converter.run_conversion(pdf("report.pdf")).await.unwrap_err();

        match &failure.error {
            Pdf2DocxError::NativeConversionFailed { exit_code, detail } => {
                assert_eq!(*exit_code, Some(1));
                assert!(detail.contains("could not be loaded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let job = failure.job.unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.backend_used(), BackendKind::Native);
        assert_eq!(
            job.error().map(|e| e.kind),
            Some(ErrorKind::NativeConversionFailed)
        );
        assert!(!job.input_path.exists());
        assert!(!job.output_dir.exists());
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn silent_libreoffice_is_reported_as_failure() {
        let bin = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let converter = digital_converter(
            root.path(),
            script(bin.path(), "exit 0"),
            Arc::new(CountingProvider::default()),
        );

        let failure = converter.run_conversion(pdf("report.pdf")).await.unwrap_err();
        assert_eq!(failure.error.kind(), ErrorKind::NativeConversionFailed);
        assert_eq!(failure.job.unwrap().status(), JobStatus::Failed);
    }

    #[tokio::test]
    async fn missing_libreoffice_fails_the_job() {
        let root = tempfile::tempdir().unwrap();
        let converter = digital_converter(
            root.path(),
            PathBuf::from("/nonexistent/bin/soffice"),
            Arc::new(CountingProvider::default()),
        );

        let failure = converter.run_conversion(pdf("report.pdf")).await.unwrap_err();
        assert!(matches!(failure.error, Pdf2DocxError::ConverterNotFound));
        assert_eq!(failure.job.unwrap().classification(), Classification::Digital);
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn classify_only_leaves_nothing_behind() {
        let bin = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let converter = digital_converter(
            root.path(),
            script(bin.path(), WRITES_DOCX),
            Arc::new(CountingProvider::default()),
        );

        let verdict = converter.classify_input(pdf("report.pdf")).await.unwrap();
        assert_eq!(verdict, Classification::Digital);
        assert_eq!(entries(root.path()), 0);
    }
}
