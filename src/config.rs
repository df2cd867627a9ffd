//! Configuration types for the OCR pipeline.
//!
//! All pipeline behaviour is controlled through one [`PipelineConfig`],
//! built once at startup via [`PipelineConfigBuilder`] (or from a JSON
//! settings file through [`PipelineSettings`]) and handed by reference to
//! every component constructor. No component reads the environment or a
//! configuration map on its own.

use crate::error::OcrError;
use crate::languages::is_valid_language_code;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Default OCR language code.
pub const DEFAULT_LANGUAGE: &str = "eng";
/// Default OCR engine deadline in seconds.
pub const DEFAULT_OCR_TIMEOUT_SECS: u64 = 60;
/// Default rasterizer deadline in seconds.
pub const DEFAULT_RASTER_TIMEOUT_SECS: u64 = 1000;
/// Default age after which leftover artifacts are swept (2 hours).
pub const DEFAULT_ARTIFACT_MAX_AGE_SECS: u64 = 2 * 60 * 60;

/// Configuration for the OCR pipeline.
///
/// # Example
/// ```rust
/// use docmgr_ocr::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .app_root("/srv/docmgr")
///     .uploads_folder("uploads")
///     .ocr_output_folder("ocr")
///     .work_folder("work")
///     .language("eng+fra")
///     .build()
///     .unwrap();
/// assert_eq!(config.ocr_timeout_secs, 60);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Root that relative folder settings are joined to. Default: current directory.
    pub app_root: PathBuf,

    /// Folder holding stored (uploaded) documents. Required.
    pub uploads_folder: Option<String>,

    /// Folder receiving the OCR engine's `.txt` output. Required.
    pub ocr_output_folder: Option<String>,

    /// Folder receiving intermediate `.tif` rasters. Required for PDFs.
    pub work_folder: Option<String>,

    /// Directory containing the Ghostscript executable. `None` resolves via `PATH`.
    pub ghostscript_dir: Option<PathBuf>,

    /// Directory containing the Tesseract executable. `None` resolves via `PATH`.
    pub tesseract_dir: Option<PathBuf>,

    /// Password used to open encrypted PDFs.
    ///
    /// When unset, PDFs that look encrypted are rejected before the
    /// rasterizer is started.
    pub pdf_password: Option<String>,

    /// OCR language code passed as `-l`. Default: `eng`.
    pub language: String,

    /// Hard deadline for one OCR engine run. Default: 60.
    pub ocr_timeout_secs: u64,

    /// Hard deadline for one rasterizer run. Default: 1000.
    ///
    /// A 300 DPI render of a long scanned PDF is slow; this bound only exists
    /// to reclaim a hung Ghostscript.
    pub raster_timeout_secs: u64,

    /// Maximum number of jobs run at once by [`crate::batch`]. Default: 4.
    pub concurrency: usize,

    /// Clean up recognised text (line endings, form feeds, blank runs). Default: false.
    pub normalize_text: bool,

    /// Age after which leftover artifacts are removed by the sweep. Default: 7200.
    pub artifact_max_age_secs: u64,

    /// Optional per-job stage events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            app_root: PathBuf::from("."),
            uploads_folder: None,
            ocr_output_folder: None,
            work_folder: None,
            ghostscript_dir: None,
            tesseract_dir: None,
            pdf_password: None,
            language: DEFAULT_LANGUAGE.to_string(),
            ocr_timeout_secs: DEFAULT_OCR_TIMEOUT_SECS,
            raster_timeout_secs: DEFAULT_RASTER_TIMEOUT_SECS,
            concurrency: 4,
            normalize_text: false,
            artifact_max_age_secs: DEFAULT_ARTIFACT_MAX_AGE_SECS,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("app_root", &self.app_root)
            .field("uploads_folder", &self.uploads_folder)
            .field("ocr_output_folder", &self.ocr_output_folder)
            .field("work_folder", &self.work_folder)
            .field("ghostscript_dir", &self.ghostscript_dir)
            .field("tesseract_dir", &self.tesseract_dir)
            .field("pdf_password", &self.pdf_password.as_ref().map(|_| "<redacted>"))
            .field("language", &self.language)
            .field("ocr_timeout_secs", &self.ocr_timeout_secs)
            .field("raster_timeout_secs", &self.raster_timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("normalize_text", &self.normalize_text)
            .field("artifact_max_age_secs", &self.artifact_max_age_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn JobProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load a JSON settings file and turn it into a builder rooted at `app_root`.
    pub fn from_settings_file(
        path: impl AsRef<Path>,
        app_root: impl Into<PathBuf>,
    ) -> Result<PipelineConfigBuilder, OcrError> {
        let settings = PipelineSettings::from_file(path)?;
        Ok(settings.into_builder().app_root(app_root))
    }

    /// The configured password, treating an empty string as unset.
    pub fn effective_password(&self) -> Option<&str> {
        self.pdf_password.as_deref().filter(|p| !p.is_empty())
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn app_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.app_root = root.into();
        self
    }

    pub fn uploads_folder(mut self, folder: impl Into<String>) -> Self {
        self.config.uploads_folder = Some(folder.into());
        self
    }

    pub fn ocr_output_folder(mut self, folder: impl Into<String>) -> Self {
        self.config.ocr_output_folder = Some(folder.into());
        self
    }

    pub fn work_folder(mut self, folder: impl Into<String>) -> Self {
        self.config.work_folder = Some(folder.into());
        self
    }

    pub fn ghostscript_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.ghostscript_dir = Some(dir.into());
        self
    }

    pub fn tesseract_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.tesseract_dir = Some(dir.into());
        self
    }

    pub fn pdf_password(mut self, pwd: impl Into<String>) -> Self {
        self.config.pdf_password = Some(pwd.into());
        self
    }

    pub fn language(mut self, code: impl Into<String>) -> Self {
        self.config.language = code.into();
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_timeout_secs = secs;
        self
    }

    pub fn raster_timeout_secs(mut self, secs: u64) -> Self {
        self.config.raster_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn normalize_text(mut self, v: bool) -> Self {
        self.config.normalize_text = v;
        self
    }

    pub fn artifact_max_age_secs(mut self, secs: u64) -> Self {
        self.config.artifact_max_age_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// Folder settings are not checked here: a missing folder only matters
    /// to the operation that needs it, and is reported there as
    /// [`OcrError::MissingConfig`].
    pub fn build(self) -> Result<PipelineConfig, OcrError> {
        let c = &self.config;
        if !is_valid_language_code(&c.language) {
            return Err(OcrError::InvalidConfig(format!(
                "language code '{}' is not valid (expected e.g. 'eng' or 'eng+fra')",
                c.language
            )));
        }
        if c.ocr_timeout_secs == 0 || c.raster_timeout_secs == 0 {
            return Err(OcrError::InvalidConfig(
                "timeouts must be at least 1 second".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(OcrError::InvalidConfig("concurrency must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

// ── Settings file ────────────────────────────────────────────────────────

/// On-disk settings, keyed like the document manager's `appsettings.json`.
///
/// ```json
/// {
///   "UploadsFolder": "uploads",
///   "OCROutputFolder": "ocr",
///   "WorkFilePath": "work",
///   "GhostscriptPath": "/usr/bin",
///   "TesseractPath": "/usr/bin",
///   "PDFPassword": ""
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PipelineSettings {
    pub uploads_folder: Option<String>,
    #[serde(rename = "OCROutputFolder", alias = "OcrOutputFolder")]
    pub ocr_output_folder: Option<String>,
    #[serde(alias = "WorkFolder")]
    pub work_file_path: Option<String>,
    pub ghostscript_path: Option<PathBuf>,
    pub tesseract_path: Option<PathBuf>,
    #[serde(rename = "PDFPassword", alias = "PdfPassword")]
    pub pdf_password: Option<String>,
    pub ocr_language: Option<String>,
    pub ocr_timeout_secs: Option<u64>,
    pub raster_timeout_secs: Option<u64>,
}

impl PipelineSettings {
    /// Read settings from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, OcrError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| OcrError::io(path, e))?;
        serde_json::from_str(&text).map_err(|e| {
            OcrError::InvalidConfig(format!("settings file '{}': {}", path.display(), e))
        })
    }

    /// Map the settings onto a builder; unset entries keep builder defaults.
    pub fn into_builder(self) -> PipelineConfigBuilder {
        let mut b = PipelineConfig::builder();
        if let Some(v) = self.uploads_folder {
            b = b.uploads_folder(v);
        }
        if let Some(v) = self.ocr_output_folder {
            b = b.ocr_output_folder(v);
        }
        if let Some(v) = self.work_file_path {
            b = b.work_folder(v);
        }
        if let Some(v) = self.ghostscript_path {
            b = b.ghostscript_dir(v);
        }
        if let Some(v) = self.tesseract_path {
            b = b.tesseract_dir(v);
        }
        if let Some(v) = self.pdf_password.filter(|p| !p.is_empty()) {
            b = b.pdf_password(v);
        }
        if let Some(v) = self.ocr_language {
            b = b.language(v);
        }
        if let Some(v) = self.ocr_timeout_secs {
            b = b.ocr_timeout_secs(v);
        }
        if let Some(v) = self.raster_timeout_secs {
            b = b.raster_timeout_secs(v);
        }
        b
    }
}
