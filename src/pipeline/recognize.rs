//! Text recognition via the Tesseract command-line tool.
//!
//! Tesseract writes `<output_base>.txt` itself; this module only launches it
//! and turns what it printed into a typed outcome. Tesseract's exit code is
//! unreliable (it exits non-zero on warnings and zero on some fatal
//! conditions), so stderr is the authority: [`classify_stderr`] maps known
//! messages to error kinds and everything else is a warning.

use crate::config::PipelineConfig;
use crate::error::{OcrError, OcrErrorKind};
use crate::pipeline::process::{Invocation, ProcessRunner};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Tesseract executable name.
#[cfg(windows)]
pub const TESSERACT_EXE: &str = "tesseract.exe";
#[cfg(not(windows))]
pub const TESSERACT_EXE: &str = "tesseract";

/// Known fatal stderr messages. First match wins.
const STDERR_RULES: &[(&str, OcrErrorKind)] = &[
    ("Failed loading language", OcrErrorKind::LanguageUnavailable),
    ("could not create TXT output file", OcrErrorKind::OutputWriteFailed),
];

/// Map Tesseract stderr to a fatal error kind, if it reports one.
///
/// `None` means the output is benign or unrecognised.
pub fn classify_stderr(stderr: &str) -> Option<OcrErrorKind> {
    STDERR_RULES
        .iter()
        .find(|(needle, _)| stderr.contains(needle))
        .map(|(_, kind)| *kind)
}

/// Runs Tesseract on one image.
#[derive(Clone)]
pub struct OcrEngine {
    program: PathBuf,
    timeout: Duration,
    runner: Arc<dyn ProcessRunner>,
}

impl OcrEngine {
    pub fn new(config: &PipelineConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        let program = match &config.tesseract_dir {
            Some(dir) => dir.join(TESSERACT_EXE),
            None => PathBuf::from(TESSERACT_EXE),
        };
        Self {
            program,
            timeout: Duration::from_secs(config.ocr_timeout_secs),
            runner,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Recognise `image_path` into `<output_base>.txt`.
    ///
    /// # Panics
    ///
    /// If `image_path` or `language` is empty, or `image_path` does not
    /// exist. Callers check these first; reaching here without them is a bug.
    pub async fn recognize(
        &self,
        image_path: &Path,
        output_base: &Path,
        language: &str,
    ) -> Result<(), OcrError> {
        assert!(!image_path.as_os_str().is_empty(), "OCR image path is empty");
        assert!(!language.is_empty(), "OCR language is empty");
        assert!(
            image_path.exists(),
            "OCR image does not exist: {}",
            image_path.display()
        );

        let invocation = Invocation::new(&self.program, self.timeout)
            .arg(image_path)
            .arg(output_base)
            .arg("-l")
            .arg(language);
        info!("Recognising {} (language {})", image_path.display(), language);
        debug!("OCR command: {}", invocation.redacted());

        let outcome = self.runner.run(&invocation).await.map_err(|source| {
            error!("Failed to start Tesseract at {}: {}", self.program.display(), source);
            OcrError::Launch {
                tool: "Tesseract",
                program: self.program.clone(),
                source,
            }
        })?;

        if outcome.timed_out {
            error!(
                "Tesseract timed out after {}s on {}",
                self.timeout.as_secs(),
                image_path.display()
            );
            return Err(OcrError::Timeout {
                image: image_path.to_path_buf(),
                secs: self.timeout.as_secs(),
            });
        }

        if outcome.exit_code != Some(0) {
            warn!(
                "Tesseract exited with {:?} on {}",
                outcome.exit_code,
                image_path.display()
            );
        }

        let stderr = outcome.stderr.trim();
        match classify_stderr(stderr) {
            Some(kind) => {
                let err = stderr_error(kind, language, output_base);
                error!("Tesseract failed on {}: {} ({})", image_path.display(), err, stderr);
                Err(err)
            }
            None => {
                if !stderr.is_empty() {
                    warn!("Tesseract: {}", stderr);
                }
                Ok(())
            }
        }
    }
}

/// The error for a stderr classification.
fn stderr_error(kind: OcrErrorKind, language: &str, output_base: &Path) -> OcrError {
    match kind {
        OcrErrorKind::LanguageUnavailable => OcrError::LanguageUnavailable {
            language: language.to_string(),
        },
        OcrErrorKind::OutputWriteFailed => OcrError::OutputWriteFailed {
            output_base: output_base.to_path_buf(),
        },
        other => OcrError::Internal(format!("unhandled Tesseract stderr classification: {other}")),
    }
}
