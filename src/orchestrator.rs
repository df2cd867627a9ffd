//! Per-document OCR jobs.
//!
//! [`OcrPipeline`] drives one document through
//!
//! ```text
//! EligibilityCheck → [Rasterize, PDFs only] → Recognize → RetrieveText → Cleanup
//! ```
//!
//! and always returns an [`OcrJobResult`]; no error or panic escapes `run`.
//!
//! ## Job task and cleanup
//!
//! The rasterize/recognize/retrieve stages run in their own tokio task, and
//! that task also owns cleanup. A panic in a stage is caught inside the task
//! and becomes an `Internal` job error. Because the task is detached, a
//! caller that drops `run` mid-job (a timeout, a disconnected client, a
//! dropped [`crate::JobStream`]) does not stop the `.tif` and `.txt` from
//! being removed.

use crate::config::PipelineConfig;
use crate::document::{DocumentRef, JobId};
use crate::error::OcrError;
use crate::languages::is_valid_language_code;
use crate::output::OcrJobResult;
use crate::pipeline::artifacts::{ArtifactStore, SweepReport};
use crate::pipeline::extension::{self, PDF_EXTENSION};
use crate::pipeline::paths::PathResolver;
use crate::pipeline::postprocess;
use crate::pipeline::process::{ProcessRunner, TokioProcessRunner};
use crate::pipeline::rasterize::PdfRasterizer;
use crate::pipeline::recognize::OcrEngine;
use crate::progress::JobStage;
use futures::FutureExt;
use std::any::Any;
use std::io::Write;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Runs OCR jobs against one configuration.
///
/// Cheap to clone; clones share the configuration and the process runner.
///
/// # Example
/// ```rust,no_run
/// use docmgr_ocr::{DocumentRef, OcrPipeline, PipelineConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PipelineConfig::builder()
///     .app_root("/srv/docmgr")
///     .uploads_folder("uploads")
///     .ocr_output_folder("ocr")
///     .work_folder("work")
///     .build()?;
/// let pipeline = OcrPipeline::new(config);
/// let result = pipeline.run(&DocumentRef::new("9f1c.pdf", "invoice.pdf")).await;
/// println!("{}", result.into_result()?);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct OcrPipeline {
    inner: Arc<Inner>,
}

struct Inner {
    config: PipelineConfig,
    paths: PathResolver,
    rasterizer: PdfRasterizer,
    engine: OcrEngine,
}

/// Everything a job touches, fixed by the eligibility check.
#[derive(Debug, Clone)]
struct JobPlan {
    /// The uploaded document.
    source: PathBuf,
    language: String,
    store: ArtifactStore,
    /// `Some` for PDFs: where the rasterizer writes the TIFF.
    raster_path: Option<PathBuf>,
    output_base: PathBuf,
    text_path: PathBuf,
}

impl OcrPipeline {
    /// A pipeline that runs the real external tools.
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_runner(config, Arc::new(TokioProcessRunner))
    }

    /// A pipeline whose external tools are executed by `runner`.
    pub fn with_runner(config: PipelineConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        let inner = Inner {
            paths: PathResolver::new(&config),
            rasterizer: PdfRasterizer::new(&config, Arc::clone(&runner)),
            engine: OcrEngine::new(&config, runner),
            config,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    /// OCR a stored document in the configured language.
    pub async fn run(&self, document: &DocumentRef) -> OcrJobResult {
        let language = self.inner.config.language.clone();
        self.run_with_language(document, &language).await
    }

    /// OCR a stored document in `language` (a Tesseract code such as `deu` or `eng+fra`).
    pub async fn run_with_language(&self, document: &DocumentRef, language: &str) -> OcrJobResult {
        let job = JobId::new();
        let start = Instant::now();
        info!(
            "Job {}: OCR of '{}' (uploaded as '{}')",
            job, document.stored_name, document.original_name
        );
        if let Some(ref cb) = self.inner.config.progress_callback {
            cb.on_job_start(&job, document);
        }

        let stage = self.inner.stage_start(&job, JobStage::EligibilityCheck);
        let plan = self.inner.plan(&job, document, language).await;
        self.inner.stage_complete(&job, JobStage::EligibilityCheck, stage);

        let result = match plan {
            Err(e) => {
                warn!("Job {}: {}", job, e);
                OcrJobResult::failure(job.clone(), &e, false, elapsed_ms(start))
            }
            Ok(plan) => {
                let rasterized = plan.raster_path.is_some();
                match self.spawn_job(&job, plan).await {
                    Ok(text) => OcrJobResult::success(job.clone(), text, rasterized, elapsed_ms(start)),
                    Err(e) => {
                        error!("Job {}: {}", job, e);
                        OcrJobResult::failure(job.clone(), &e, rasterized, elapsed_ms(start))
                    }
                }
            }
        };

        info!(
            "Job {}: finished {} in {}ms",
            job,
            if result.is_success() { "successfully" } else { "with error" },
            result.duration_ms
        );
        if let Some(ref cb) = self.inner.config.progress_callback {
            cb.on_job_complete(&job, &result);
        }
        result
    }

    /// Synchronous wrapper around [`OcrPipeline::run`].
    ///
    /// Creates a temporary tokio runtime internally; do not call from async code.
    pub fn run_sync(&self, document: &DocumentRef) -> OcrJobResult {
        match tokio::runtime::Runtime::new() {
            Ok(rt) => rt.block_on(self.run(document)),
            Err(e) => OcrJobResult::failure(
                JobId::new(),
                &OcrError::Internal(format!("Failed to create tokio runtime: {e}")),
                false,
                0,
            ),
        }
    }

    /// OCR a document held in memory.
    ///
    /// The bytes are written to a uniquely named file in the uploads root,
    /// carrying `original_name`'s extension, and that file is removed again
    /// once the job is done.
    pub async fn run_bytes(&self, bytes: &[u8], original_name: &str) -> OcrJobResult {
        let upload = match self.write_temp_upload(bytes, original_name).await {
            Ok(upload) => upload,
            Err(e) => {
                error!("Could not store in-memory upload '{}': {}", original_name, e);
                return OcrJobResult::failure(JobId::new(), &e, false, 0);
            }
        };
        let stored_name = upload
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let document = DocumentRef::new(stored_name, original_name);
        // `upload` is dropped (and the file deleted) once the job has returned
        self.run(&document).await
    }

    async fn write_temp_upload(
        &self,
        bytes: &[u8],
        original_name: &str,
    ) -> Result<tempfile::NamedTempFile, OcrError> {
        let uploads = self.inner.paths.uploads_root().await?;
        let suffix = Path::new(original_name)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let mut tmp = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(&suffix)
            .tempfile_in(&uploads)
            .map_err(|e| OcrError::io(&uploads, e))?;
        tmp.write_all(bytes)
            .and_then(|_| tmp.flush())
            .map_err(|e| OcrError::io(tmp.path(), e))?;
        Ok(tmp)
    }

    /// Remove leftover artifacts older than the configured age from the
    /// work and OCR-output roots.
    ///
    /// Refuses with a configuration error when either root is the uploads
    /// root, so stored documents are never candidates.
    pub async fn sweep_stale_artifacts(&self) -> Result<SweepReport, OcrError> {
        let uploads = same_dir_key(&self.inner.paths.uploads_root().await?).await;
        let ocr_root = self.inner.paths.ocr_output_root().await?;
        let work_root = self.inner.paths.work_root().await?;
        for (key, root) in [("OCROutputFolder", &ocr_root), ("WorkFilePath", &work_root)] {
            if same_dir_key(root).await == uploads {
                return Err(OcrError::InvalidConfig(format!(
                    "{key} ({}) is the uploads folder; refusing to sweep it",
                    root.display()
                )));
            }
        }
        let store = ArtifactStore::new(&ocr_root, &work_root);
        let max_age = Duration::from_secs(self.inner.config.artifact_max_age_secs);

        let mut report = store.sweep_stale(&work_root, max_age).await?;
        if ocr_root != work_root {
            report += store.sweep_stale(&ocr_root, max_age).await?;
        }
        Ok(report)
    }

    /// Rasterize, recognize, read back and clean up, in a detached task.
    async fn spawn_job(&self, job: &JobId, plan: JobPlan) -> Result<String, OcrError> {
        let inner = Arc::clone(&self.inner);
        let job = job.clone();
        let handle = tokio::spawn(async move {
            let outcome = AssertUnwindSafe(inner.stages(&job, &plan))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(OcrError::Internal(format!(
                        "job task panicked: {}",
                        panic_message(panic.as_ref())
                    )))
                });
            inner.cleanup(&job, &plan).await;
            outcome
        });
        match handle.await {
            Ok(outcome) => outcome,
            Err(join_err) => Err(OcrError::Internal(format!("job task failed: {join_err}"))),
        }
    }
}

impl Inner {
    /// Eligibility check: validate inputs and fix every path the job will use.
    async fn plan(&self, job: &JobId, document: &DocumentRef, language: &str) -> Result<JobPlan, OcrError> {
        if !document.has_plain_stored_name() {
            return Err(OcrError::InvalidDocumentName {
                name: document.stored_name.clone(),
            });
        }
        if !is_valid_language_code(language) {
            return Err(OcrError::InvalidConfig(format!(
                "OCR language '{language}' is not a valid language code"
            )));
        }

        let ext = document_extension(document).ok_or_else(|| OcrError::NotOcrable {
            name: document.original_name.clone(),
        })?;
        let is_pdf = ext == PDF_EXTENSION;
        debug!("Job {}: '{}' is eligible as {}", job, document.stored_name, ext);

        let source = self.paths.uploads_root().await?.join(&document.stored_name);
        if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
            return Err(OcrError::DocumentMissing { path: source });
        }

        let ocr_root = self.paths.ocr_output_root().await?;
        let work_root = if is_pdf {
            self.paths.work_root().await?
        } else {
            ocr_root.clone()
        };
        let store = ArtifactStore::new(&ocr_root, &work_root);
        let stem = job.artifact_stem(document);

        Ok(JobPlan {
            source,
            language: language.to_string(),
            raster_path: is_pdf.then(|| store.raster_artifact_path(&stem)),
            output_base: store.text_output_base(&stem),
            text_path: store.text_artifact_path(&stem),
            store,
        })
    }

    async fn stages(&self, job: &JobId, plan: &JobPlan) -> Result<String, OcrError> {
        let image = match &plan.raster_path {
            Some(tif) => {
                let stage = self.stage_start(job, JobStage::Rasterize);
                let rasterized = self.rasterizer.rasterize(&plan.source, tif).await;
                self.stage_complete(job, JobStage::Rasterize, stage);
                rasterized?;
                tif.as_path()
            }
            None => plan.source.as_path(),
        };

        let stage = self.stage_start(job, JobStage::Recognize);
        let recognized = self
            .engine
            .recognize(image, &plan.output_base, &plan.language)
            .await;
        self.stage_complete(job, JobStage::Recognize, stage);
        recognized?;

        let stage = self.stage_start(job, JobStage::RetrieveText);
        let mut text = plan.store.read_text(&plan.text_path).await;
        if self.config.normalize_text {
            text = postprocess::clean_text(&text);
        }
        self.stage_complete(job, JobStage::RetrieveText, stage);
        debug!("Job {}: recognised {} characters", job, text.chars().count());
        Ok(text)
    }

    /// Delete the job's artifacts. Failures are logged and never change the outcome.
    async fn cleanup(&self, job: &JobId, plan: &JobPlan) {
        let stage = self.stage_start(job, JobStage::Cleanup);
        let artifacts = std::iter::once(&plan.text_path).chain(plan.raster_path.as_ref());
        for path in artifacts {
            if let Err(e) = plan.store.delete(path).await {
                warn!("Job {}: cleanup failed: {}", job, e);
            }
        }
        self.stage_complete(job, JobStage::Cleanup, stage);
    }

    fn stage_start(&self, job: &JobId, stage: JobStage) -> Instant {
        debug!("Job {}: {} started", job, stage);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage_start(job, stage);
        }
        Instant::now()
    }

    fn stage_complete(&self, job: &JobId, stage: JobStage, started: Instant) {
        let ms = elapsed_ms(started);
        debug!("Job {}: {} finished in {}ms", job, stage, ms);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage_complete(job, stage, ms);
        }
    }
}

/// The document's OCR extension: from the stored name, else the original name.
fn document_extension(document: &DocumentRef) -> Option<String> {
    [&document.stored_name, &document.original_name]
        .into_iter()
        .map(|name| extension::canonical_extension(name.as_str()))
        .find(|ext| !ext.is_empty())
}

/// Canonical form of a directory for identity checks; the path itself if
/// it cannot be resolved.
async fn same_dir_key(dir: &Path) -> PathBuf {
    tokio::fs::canonicalize(dir)
        .await
        .unwrap_or_else(|_| dir.to_path_buf())
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
