//! CLI binary for edgequake-pdf2docx.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig`, runs one job per input, and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2docx::{
    BackendKind, Classification, ConversionConfig, ConversionJob, ConversionProgressCallback,
    Converter, InputSource, ProgressCallback,
};
use futures::stream::{self, StreamExt};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One spinner per running job; OCR jobs switch to a page bar once the page
/// count is known.
struct CliProgressCallback {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        })
    }

    fn with_bar(&self, job_id: &str, f: impl FnOnce(&ProgressBar)) {
        if let Ok(bars) = self.bars.lock() {
            if let Some(bar) = bars.get(job_id) {
                f(bar);
            }
        }
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_job_start(&self, job_id: &str) {
        let bar = self.multi.add(ProgressBar::new(0));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix(job_id.to_string());
        bar.set_message("classifying…");
        bar.enable_steady_tick(Duration::from_millis(80));
        if let Ok(mut bars) = self.bars.lock() {
            bars.insert(job_id.to_string(), bar);
        }
    }

    fn on_classified(&self, job_id: &str, classification: Classification, backend: BackendKind) {
        let msg = match (classification, backend) {
            (Classification::Digital, _) => "digital → LibreOffice".to_string(),
            (Classification::Scanned, _) => "scanned → OCR (rasterising…)".to_string(),
            (c, b) => format!("{c:?} → {b:?}"),
        };
        self.with_bar(job_id, |bar| bar.set_message(msg));
    }

    fn on_ocr_start(&self, job_id: &str, total_pages: usize) {
        self.with_bar(job_id, |bar| {
            bar.set_style(
                ProgressStyle::with_template(
                    "{spinner:.cyan} {prefix:.bold}  \
                     [{bar:32.green/238}] {pos:>3}/{len} pages  ⏱ {elapsed_precise}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏  ")
                .tick_strings(TICKS),
            );
            bar.set_length(total_pages as u64);
            bar.reset_eta();
        });
    }

    fn on_page_complete(&self, job_id: &str, page_num: usize, total_pages: usize, text_chars: usize) {
        self.with_bar(job_id, |bar| {
            bar.println(format!(
                "  {} {} page {:>3}/{:<3}  {}",
                green("✓"),
                dim(job_id),
                page_num,
                total_pages,
                dim(&format!("{text_chars:>5} chars")),
            ));
            bar.inc(1);
        });
    }

    fn on_job_complete(&self, job_id: &str, _succeeded: bool) {
        if let Ok(mut bars) = self.bars.lock() {
            if let Some(bar) = bars.remove(job_id) {
                bar.finish_and_clear();
                self.multi.remove(&bar);
            }
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert next to the input (report.pdf → report.docx)
  pdf2docx report.pdf

  # Choose the output file
  pdf2docx scan.pdf -o ~/Documents/scan.docx

  # Convert several files, four at a time, into one directory
  pdf2docx --jobs 4 --out-dir converted/ *.pdf

  # Only report which backend each file would use
  pdf2docx --classify-only *.pdf

  # Convert from URL
  pdf2docx https://example.com/paper.pdf -o paper.docx

  # Machine-readable job records
  pdf2docx --json a.pdf b.pdf > jobs.json

HOW FILES ARE ROUTED:
  A PDF is "digital" when one of its first 5 pages carries more than 50
  characters of extractable text. Digital PDFs are converted by LibreOffice
  (layout preserved). Everything else is "scanned": pages are rendered at
  150 DPI and transcribed by a vision model, one Word paragraph per page.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (OCR of scanned PDFs)
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override OCR provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override OCR model ID
  PDF2DOCX_SOFFICE_PATH   Path to the LibreOffice soffice executable
  PDFIUM_LIB_PATH         Directory containing libpdfium
  RUST_LOG                Log filter, overrides -v / -q
"#;

/// Convert PDF files and URLs to DOCX: LibreOffice for digital PDFs, vision
/// OCR for scanned ones.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2docx",
    version,
    about = "Convert PDF files and URLs to editable DOCX documents",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file paths or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Output file (single input only). Default: next to the input.
    #[arg(short, long, env = "PDF2DOCX_OUTPUT", conflicts_with = "out_dir")]
    output: Option<PathBuf>,

    /// Directory for output files.
    #[arg(long, env = "PDF2DOCX_OUT_DIR")]
    out_dir: Option<PathBuf>,

    /// Classify inputs as digital or scanned, no conversion.
    #[arg(long)]
    classify_only: bool,

    /// Print job records as JSON on stdout.
    #[arg(long, env = "PDF2DOCX_JSON")]
    json: bool,

    /// Inputs converted concurrently.
    #[arg(short, long, env = "PDF2DOCX_JOBS", default_value_t = 1,
          value_parser = clap::value_parser!(u16).range(1..))]
    jobs: u16,

    /// OCR conversions allowed at once.
    #[arg(long, env = "PDF2DOCX_OCR_JOBS", default_value_t = 2,
          value_parser = clap::value_parser!(u16).range(1..))]
    ocr_jobs: u16,

    /// OCR vision model ID (e.g. gpt-4.1-nano, gpt-4.1).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// OCR vision provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Rasterisation DPI for scanned pages (72–400).
    #[arg(long, env = "PDF2DOCX_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Max tokens the OCR model may generate per page.
    #[arg(long, env = "PDF2DOCX_MAX_NEW_TOKENS", default_value_t = 500)]
    max_new_tokens: usize,

    /// OCR model temperature (0.0–2.0).
    #[arg(long, env = "PDF2DOCX_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Retries per page on OCR API failure.
    #[arg(long, env = "PDF2DOCX_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Path to a text file containing a custom OCR system prompt.
    #[arg(long, env = "PDF2DOCX_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Path to the LibreOffice `soffice` executable.
    #[arg(long, env = "PDF2DOCX_SOFFICE_PATH")]
    soffice: Option<PathBuf>,

    /// LibreOffice watchdog in seconds; 0 disables it.
    #[arg(long, env = "PDF2DOCX_NATIVE_TIMEOUT", default_value_t = 300)]
    native_timeout: u64,

    /// Parent directory for job workspaces.
    #[arg(long, env = "PDF2DOCX_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// Directory containing the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2DOCX_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Disable progress bars.
    #[arg(long, env = "PDF2DOCX_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2DOCX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2DOCX_QUIET")]
    quiet: bool,
}

/// One line of `--json` output.
#[derive(Debug, Serialize)]
struct Report {
    input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    classification: Option<Classification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    job: Option<ConversionJob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    duration_ms: u64,
}

impl Report {
    fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when progress bars are active;
    // the bars provide the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.classify_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    if cli.output.is_some() && cli.inputs.len() > 1 {
        anyhow::bail!("--output takes a single input; use --out-dir for several");
    }
    if !cli.classify_only {
        let clashes =
            colliding_destinations(&cli.inputs, cli.output.as_deref(), cli.out_dir.as_deref());
        if let Some((dest, inputs)) = clashes.first() {
            anyhow::bail!(
                "{} would all be written to {}; convert them into separate --out-dir folders",
                inputs.join(", "),
                dest.display()
            );
        }
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;
    let converter = Arc::new(Converter::new(config));

    // ── Run one job per input ────────────────────────────────────────────
    let reports: Vec<Report> = stream::iter(cli.inputs.iter().cloned())
        .map(|input| {
            let converter = Arc::clone(&converter);
            let cli = &cli;
            async move {
                if cli.classify_only {
                    classify_one(&converter, input).await
                } else {
                    convert_one(&converter, cli, input).await
                }
            }
        })
        .buffer_unordered(cli.jobs as usize)
        .collect()
        .await;

    // ── Report ───────────────────────────────────────────────────────────
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&reports).context("Failed to serialise job reports")?
        );
    } else if !cli.quiet {
        for r in &reports {
            print_report(r);
        }
    }

    let failed = reports.iter().filter(|r| !r.succeeded()).count();
    if failed > 0 {
        anyhow::bail!("{} of {} inputs failed", failed, reports.len());
    }
    Ok(())
}

async fn classify_one(converter: &Converter, input: String) -> Report {
    let start = Instant::now();
    let result = converter.classify_input(InputSource::from(input.as_str())).await;
    let (classification, error) = match result {
        Ok(c) => (Some(c), None),
        Err(e) => (None, Some(e.to_string())),
    };
    Report {
        input,
        output: None,
        classification,
        job: None,
        error,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

async fn convert_one(converter: &Converter, cli: &Cli, input: String) -> Report {
    let start = Instant::now();
    let dest = destination_for(&input, cli.output.as_deref(), cli.out_dir.as_deref());

    match converter
        .convert_to_file(InputSource::from(input.as_str()), &dest)
        .await
    {
        Ok(job) => Report {
            input,
            output: Some(dest),
            classification: Some(job.classification()),
            job: Some(job),
            error: None,
            duration_ms: start.elapsed().as_millis() as u64,
        },
        Err(failure) => Report {
            input,
            output: None,
            classification: failure.job.as_ref().map(|j| j.classification()),
            job: failure.job,
            error: Some(failure.error.to_string()),
            duration_ms: start.elapsed().as_millis() as u64,
        },
    }
}

fn print_report(r: &Report) {
    let took = dim(&format!("{}ms", r.duration_ms));
    match (&r.error, &r.output, r.classification) {
        (Some(e), _, _) => eprintln!("{} {}  {}\n   {}", red("✘"), r.input, took, red(e)),
        (None, Some(out), c) => eprintln!(
            "{} {}  {}  →  {}  {}",
            green("✔"),
            r.input,
            dim(&format!("{:?}", c.unwrap_or_default()).to_lowercase()),
            bold(&out.display().to_string()),
            took
        ),
        (None, None, c) => println!(
            "{}\t{}",
            format!("{:?}", c.unwrap_or_default()).to_lowercase(),
            r.input
        ),
    }
}

/// Where the DOCX for `input` goes: `--output`, else `--out-dir/<stem>.docx`,
/// else next to a local input, else the working directory.
fn destination_for(input: &str, output: Option<&Path>, out_dir: Option<&Path>) -> PathBuf {
    if let Some(o) = output {
        return o.to_path_buf();
    }

    let source = InputSource::from(input);
    let name = match source {
        InputSource::Url(ref u) => u
            .split(['?', '#'])
            .next()
            .and_then(|s| s.rsplit('/').next())
            .filter(|s| !s.is_empty())
            .unwrap_or("document")
            .to_string(),
        _ => source.file_name(),
    };
    let stem = Path::new(&name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string());
    let file = format!("{stem}.docx");

    match (out_dir, &source) {
        (Some(dir), _) => dir.join(file),
        (None, InputSource::Path(p)) => p.with_file_name(file),
        (None, _) => PathBuf::from(file),
    }
}

/// Inputs that would overwrite each other's DOCX, grouped by destination.
fn colliding_destinations(
    inputs: &[String],
    output: Option<&Path>,
    out_dir: Option<&Path>,
) -> Vec<(PathBuf, Vec<String>)> {
    let mut by_dest: BTreeMap<PathBuf, Vec<String>> = BTreeMap::new();
    for input in inputs {
        by_dest
            .entry(destination_for(input, output, out_dir))
            .or_default()
            .push(input.clone());
    }
    by_dest.into_iter().filter(|(_, v)| v.len() > 1).collect()
}

/// Map CLI args to `ConversionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let system_prompt = if let Some(ref path) = cli.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let mut builder = ConversionConfig::builder()
        .ocr_dpi(cli.dpi)
        .max_new_tokens(cli.max_new_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .max_concurrent_ocr_jobs(cli.ocr_jobs as usize)
        .native_timeout_secs((cli.native_timeout > 0).then_some(cli.native_timeout))
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref p) = cli.soffice {
        builder = builder.soffice_path(p);
    }
    if let Some(ref d) = cli.temp_dir {
        builder = builder.temp_root(d);
    }
    if let Some(ref d) = cli.pdfium_lib {
        builder = builder.pdfium_lib_dir(d);
    }
    if let Some(ref m) = cli.model {
        builder = builder.model(m);
    }
    if let Some(ref p) = cli.provider {
        builder = builder.provider_name(p);
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
