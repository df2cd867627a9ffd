//! PDF rasterisation: render a PDF into a 300 DPI TIFF via Ghostscript.
//!
//! The OCR engine only reads images, so every PDF goes through here first.
//! Encrypted PDFs are caught before Ghostscript runs: without a password it
//! fails in ways that surface later as a confusing OCR-engine error, while
//! `EncryptedDocument` tells the user what to do.

use crate::config::PipelineConfig;
use crate::error::OcrError;
use crate::pipeline::process::{Invocation, ProcessRunner};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, error, info, warn};

/// Ghostscript console executable name.
#[cfg(windows)]
pub const GHOSTSCRIPT_EXE: &str = "gswin64c.exe";
#[cfg(not(windows))]
pub const GHOSTSCRIPT_EXE: &str = "gs";

/// Rendering resolution handed to Ghostscript.
pub const RASTER_DPI: u32 = 300;

/// How much of the file head the encryption heuristic inspects.
pub const ENCRYPT_SCAN_BYTES: u64 = 1_000_000;

const ENCRYPT_MARKER: &[u8] = b"/encrypt";

/// Runs Ghostscript to turn a PDF into a TIFF.
#[derive(Clone)]
pub struct PdfRasterizer {
    program: PathBuf,
    password: Option<String>,
    timeout: Duration,
    runner: Arc<dyn ProcessRunner>,
}

impl PdfRasterizer {
    pub fn new(config: &PipelineConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        let program = match &config.ghostscript_dir {
            Some(dir) => dir.join(GHOSTSCRIPT_EXE),
            None => PathBuf::from(GHOSTSCRIPT_EXE),
        };
        Self {
            program,
            password: config.effective_password().map(str::to_string),
            timeout: Duration::from_secs(config.raster_timeout_secs),
            runner,
        }
    }

    /// Path of the Ghostscript executable this rasterizer runs.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Render `pdf_path` into `output_tif`.
    ///
    /// The caller has already established that `pdf_path` is a PDF.
    pub async fn rasterize(&self, pdf_path: &Path, output_tif: &Path) -> Result<(), OcrError> {
        if self.password.is_none() && is_likely_encrypted(pdf_path).await {
            warn!(
                "PDF {} appears to be encrypted and no PDF password is configured",
                pdf_path.display()
            );
            return Err(OcrError::EncryptedDocument {
                path: pdf_path.to_path_buf(),
            });
        }

        let invocation = self.invocation(pdf_path, output_tif);
        info!("Rasterising {} → {}", pdf_path.display(), output_tif.display());
        debug!("Rasterizer command: {}", invocation.redacted());

        let outcome = self
            .runner
            .run(&invocation)
            .await
            .map_err(|source| {
                error!("Failed to start Ghostscript at {}: {}", self.program.display(), source);
                OcrError::Launch {
                    tool: "Ghostscript",
                    program: self.program.clone(),
                    source,
                }
            })?;

        if outcome.timed_out {
            error!(
                "Ghostscript timed out after {}s on {}",
                self.timeout.as_secs(),
                pdf_path.display()
            );
            return Err(OcrError::RasterTimeout {
                path: pdf_path.to_path_buf(),
                secs: self.timeout.as_secs(),
            });
        }

        if !outcome.success() {
            error!(
                "Ghostscript failed on {} (exit {:?}): {}",
                pdf_path.display(),
                outcome.exit_code,
                outcome.stdout.trim()
            );
            return Err(OcrError::RasterFailed {
                path: pdf_path.to_path_buf(),
                exit_code: outcome.exit_code,
                detail: outcome.stdout.trim().to_string(),
            });
        }

        if !tokio::fs::try_exists(output_tif).await.unwrap_or(false) {
            error!("Ghostscript reported success but wrote no {}", output_tif.display());
            return Err(OcrError::RasterFailed {
                path: pdf_path.to_path_buf(),
                exit_code: outcome.exit_code,
                detail: format!("no output image at '{}'", output_tif.display()),
            });
        }

        debug!("Rasterised {}", output_tif.display());
        Ok(())
    }

    fn invocation(&self, pdf_path: &Path, output_tif: &Path) -> Invocation {
        let mut output_arg = std::ffi::OsString::from("-sOutputFile=");
        output_arg.push(output_tif);

        let mut inv = Invocation::new(&self.program, self.timeout)
            .arg("-dNOPAUSE")
            .arg(format!("-r{RASTER_DPI}"))
            .arg("-sDEVICE=tiffscaled24")
            .arg("-sCompression=lzw")
            .arg("-dBATCH");
        if let Some(pwd) = &self.password {
            inv = inv.arg(format!("-sPDFPassword={pwd}"));
        }
        inv.arg(output_arg).arg(pdf_path)
    }
}

/// Heuristic encryption check: look for `/Encrypt` in the head of the file.
///
/// Reads at most [`ENCRYPT_SCAN_BYTES`]. Unreadable files count as not
/// encrypted; Ghostscript will report the real problem.
pub async fn is_likely_encrypted(pdf_path: &Path) -> bool {
    let file = match tokio::fs::File::open(pdf_path).await {
        Ok(f) => f,
        Err(e) => {
            debug!("Encryption check could not open {}: {}", pdf_path.display(), e);
            return false;
        }
    };
    let mut head = Vec::new();
    if let Err(e) = file.take(ENCRYPT_SCAN_BYTES).read_to_end(&mut head).await {
        debug!("Encryption check could not read {}: {}", pdf_path.display(), e);
        return false;
    }
    contains_encrypt_marker(&head)
}

fn contains_encrypt_marker(head: &[u8]) -> bool {
    head.windows(ENCRYPT_MARKER.len())
        .any(|w| w.eq_ignore_ascii_case(ENCRYPT_MARKER))
}
