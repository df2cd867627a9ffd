//! CLI binary for docmgr-ocr.
//!
//! A thin shim over the library crate that maps CLI flags (or a settings
//! file) to `PipelineConfig`, runs one job per stored name and prints the
//! recognised text.

use anyhow::{Context, Result};
use clap::Parser;
use docmgr_ocr::{
    load_languages, ocr_stream, DocumentRef, JobId, JobProgressCallback, JobStage, OcrJobResult,
    OcrPipeline, PipelineConfig, PipelineConfigBuilder, ProgressCallback,
};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one spinner showing the stage of the most recently
/// active job, and a log line per finished job. Jobs finish out of order
/// when `--concurrency` > 1, so names are tracked per job id.
struct CliProgressCallback {
    bar: ProgressBar,
    names: Mutex<HashMap<JobId, String>>,
    done: AtomicUsize,
    total: usize,
}

impl CliProgressCallback {
    fn new(total: usize) -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix(format!("0/{total}"));
        bar.set_message("starting…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            names: Mutex::new(HashMap::new()),
            done: AtomicUsize::new(0),
            total,
        })
    }

    fn name_of(&self, job: &JobId) -> String {
        self.names
            .lock()
            .ok()
            .and_then(|n| n.get(job).cloned())
            .unwrap_or_else(|| job.to_string())
    }
}

impl JobProgressCallback for CliProgressCallback {
    fn on_job_start(&self, job: &JobId, document: &DocumentRef) {
        if let Ok(mut names) = self.names.lock() {
            names.insert(job.clone(), document.original_name.clone());
        }
    }

    fn on_stage_start(&self, job: &JobId, stage: JobStage) {
        self.bar.set_message(format!("{}: {stage}", self.name_of(job)));
    }

    fn on_job_complete(&self, job: &JobId, result: &OcrJobResult) {
        let name = self
            .names
            .lock()
            .ok()
            .and_then(|mut n| n.remove(job))
            .unwrap_or_else(|| job.to_string());
        let secs = format!("{:.1}s", result.duration_ms as f64 / 1000.0);

        match &result.error {
            None => self.bar.println(format!(
                "  {} {:<32}  {}  {}",
                green("✓"),
                name,
                dim(&format!("{:>6} chars", result.text.chars().count())),
                dim(&secs),
            )),
            Some(e) => self.bar.println(format!(
                "  {} {:<32}  {}  {}",
                red("✗"),
                name,
                red(&e.to_string()),
                dim(&secs),
            )),
        }

        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        self.bar.set_prefix(format!("{done}/{}", self.total));
        if done == self.total {
            self.bar.finish_and_clear();
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # OCR a stored upload using appsettings.json next to the app
  docmgr-ocr --settings appsettings.json 9f1c2a.pdf

  # Folders on the command line; original name supplies the extension
  docmgr-ocr --uploads-folder uploads --ocr-output-folder ocr --work-folder work \
      --original-name invoice.pdf 9f1c2a

  # German text, cleaned up, as JSON
  docmgr-ocr --settings appsettings.json --language deu --normalize --json scan.tif

  # Several documents, four at a time
  docmgr-ocr --settings appsettings.json --concurrency 4 a.pdf b.png c.jpg

  # List the languages offered by the catalog
  docmgr-ocr --list-languages Languages.json

  # Remove artifacts left behind by crashed runs
  docmgr-ocr --settings appsettings.json --sweep

SETTINGS FILE KEYS:
  UploadsFolder     OCROutputFolder   WorkFilePath
  GhostscriptPath   TesseractPath     PDFPassword
  OcrLanguage       OcrTimeoutSecs    RasterTimeoutSecs
  Relative folders are joined to --app-root. Flags override the file.

ENVIRONMENT VARIABLES:
  Every flag can also be set as DOCMGR_<FLAG>, e.g. DOCMGR_UPLOADS_FOLDER.
  RUST_LOG overrides the log filter.
"#;

/// Extract text from stored documents with Ghostscript and Tesseract.
#[derive(Parser, Debug)]
#[command(
    name = "docmgr-ocr",
    version,
    about = "Extract text from stored documents with Ghostscript and Tesseract",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Stored document names inside the uploads folder.
    #[arg(required_unless_present_any = ["list_languages", "sweep"])]
    documents: Vec<String>,

    /// Name the document was uploaded as (single document only).
    #[arg(long, env = "DOCMGR_ORIGINAL_NAME")]
    original_name: Option<String>,

    /// JSON settings file in appsettings.json layout.
    #[arg(long, env = "DOCMGR_SETTINGS")]
    settings: Option<PathBuf>,

    /// Root that relative folders are resolved against.
    #[arg(long, env = "DOCMGR_APP_ROOT", default_value = ".")]
    app_root: PathBuf,

    /// Folder holding stored documents.
    #[arg(long, env = "DOCMGR_UPLOADS_FOLDER")]
    uploads_folder: Option<String>,

    /// Folder for OCR text output.
    #[arg(long, env = "DOCMGR_OCR_OUTPUT_FOLDER")]
    ocr_output_folder: Option<String>,

    /// Folder for intermediate rasters.
    #[arg(long, env = "DOCMGR_WORK_FOLDER")]
    work_folder: Option<String>,

    /// Directory containing the Ghostscript executable.
    #[arg(long, env = "DOCMGR_GHOSTSCRIPT_DIR")]
    ghostscript_dir: Option<PathBuf>,

    /// Directory containing the Tesseract executable.
    #[arg(long, env = "DOCMGR_TESSERACT_DIR")]
    tesseract_dir: Option<PathBuf>,

    /// Password for encrypted PDFs.
    #[arg(long, env = "DOCMGR_PDF_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// OCR language code, e.g. eng, deu, eng+fra.
    #[arg(short, long, env = "DOCMGR_LANGUAGE")]
    language: Option<String>,

    /// Deadline for one Tesseract run, in seconds.
    #[arg(long, env = "DOCMGR_OCR_TIMEOUT")]
    ocr_timeout: Option<u64>,

    /// Deadline for one Ghostscript run, in seconds.
    #[arg(long, env = "DOCMGR_RASTER_TIMEOUT")]
    raster_timeout: Option<u64>,

    /// Number of documents processed at once.
    #[arg(short, long, env = "DOCMGR_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Clean up recognised text (line endings, page breaks, blank runs).
    #[arg(long, env = "DOCMGR_NORMALIZE")]
    normalize: bool,

    /// Print results as JSON instead of plain text.
    #[arg(long, env = "DOCMGR_JSON")]
    json: bool,

    /// Print the language catalog in this file and exit.
    #[arg(long, value_name = "FILE")]
    list_languages: Option<PathBuf>,

    /// Delete stale artifacts from the work and OCR-output folders and exit.
    #[arg(long)]
    sweep: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "DOCMGR_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCMGR_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCMGR_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback that matters; keep INFO logs from
    // tearing it up unless asked for.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Language catalog ─────────────────────────────────────────────────
    if let Some(ref path) = cli.list_languages {
        let languages = load_languages(path)
            .with_context(|| format!("Failed to load language catalog {}", path.display()))?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&languages).context("Failed to serialise languages")?
            );
        } else {
            for l in &languages {
                println!("{:<12} {}", l.value, l.text);
            }
        }
        return Ok(());
    }

    if cli.original_name.is_some() && cli.documents.len() > 1 {
        anyhow::bail!("--original-name can only be used with a single document");
    }

    let progress_cb: Option<ProgressCallback> = if show_progress && !cli.sweep {
        Some(CliProgressCallback::new(cli.documents.len()) as ProgressCallback)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;
    let pipeline = OcrPipeline::new(config);

    // ── Sweep mode ───────────────────────────────────────────────────────
    if cli.sweep {
        let report = pipeline
            .sweep_stale_artifacts()
            .await
            .context("Artifact sweep failed")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to serialise report")?
            );
        } else if !cli.quiet {
            eprintln!(
                "Removed {} stale artifacts ({} could not be removed)",
                report.removed, report.failed
            );
        }
        return Ok(());
    }

    // ── Run jobs ─────────────────────────────────────────────────────────
    let documents: Vec<DocumentRef> = cli
        .documents
        .iter()
        .map(|stored| match cli.original_name {
            Some(ref original) => DocumentRef::new(stored, original),
            None => DocumentRef::stored(stored),
        })
        .collect();
    let total = documents.len();

    let mut jobs = ocr_stream(pipeline, documents);
    let mut results = Vec::with_capacity(total);
    while let Some(item) = jobs.next().await {
        results.push(item);
    }
    let failed = results.iter().filter(|(_, r)| !r.is_success()).count();

    if cli.json {
        let json: Vec<serde_json::Value> = results
            .iter()
            .map(|(doc, r)| serde_json::json!({ "document": doc, "result": r }))
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&json).context("Failed to serialise output")?
        );
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        for (doc, r) in &results {
            match &r.error {
                None => {
                    if total > 1 {
                        writeln!(handle, "==> {} <==", doc.stored_name)
                            .context("Failed to write to stdout")?;
                    }
                    handle
                        .write_all(r.text.as_bytes())
                        .context("Failed to write to stdout")?;
                    if !r.text.ends_with('\n') {
                        handle.write_all(b"\n").ok();
                    }
                }
                Some(e) if !show_progress => {
                    eprintln!("{} {}: {}", red("✗"), doc.stored_name, e);
                }
                Some(_) => {}
            }
        }
    }

    if !cli.quiet && !cli.json {
        eprintln!(
            "{}  {}/{} documents",
            if failed == 0 { green("✔") } else { red("✘") },
            bold(&(total - failed).to_string()),
            total
        );
    }

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Map settings file + CLI flags to `PipelineConfig`. Flags win.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder: PipelineConfigBuilder = match cli.settings {
        Some(ref path) => PipelineConfig::from_settings_file(path, &cli.app_root)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => PipelineConfig::builder().app_root(&cli.app_root),
    };

    if let Some(ref v) = cli.uploads_folder {
        builder = builder.uploads_folder(v);
    }
    if let Some(ref v) = cli.ocr_output_folder {
        builder = builder.ocr_output_folder(v);
    }
    if let Some(ref v) = cli.work_folder {
        builder = builder.work_folder(v);
    }
    if let Some(ref v) = cli.ghostscript_dir {
        builder = builder.ghostscript_dir(v);
    }
    if let Some(ref v) = cli.tesseract_dir {
        builder = builder.tesseract_dir(v);
    }
    if let Some(ref v) = cli.password {
        builder = builder.pdf_password(v);
    }
    if let Some(ref v) = cli.language {
        builder = builder.language(v);
    }
    if let Some(v) = cli.ocr_timeout {
        builder = builder.ocr_timeout_secs(v);
    }
    if let Some(v) = cli.raster_timeout {
        builder = builder.raster_timeout_secs(v);
    }
    if let Some(v) = cli.concurrency {
        builder = builder.concurrency(v);
    }
    if cli.normalize {
        builder = builder.normalize_text(true);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
