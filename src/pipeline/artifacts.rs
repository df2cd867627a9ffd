//! Transient per-job files: the rasterised `.tif` and the OCR engine's `.txt`.

use crate::error::OcrError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

/// `<base>.<32 hex job id>.txt` or `.tif`: the only names a sweep may remove.
static RE_ARTIFACT_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^.+\.[0-9a-f]{32}\.(txt|tif)$").unwrap());

/// Whether `name` has the shape of a job artifact.
pub fn is_artifact_name(name: &str) -> bool {
    RE_ARTIFACT_NAME.is_match(name)
}

/// Names, reads and deletes job artifacts under the two artifact roots.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    ocr_root: PathBuf,
    work_root: PathBuf,
}

/// Outcome of [`ArtifactStore::sweep_stale`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub removed: usize,
    pub failed: usize,
}

impl std::ops::AddAssign for SweepReport {
    fn add_assign(&mut self, rhs: Self) {
        self.removed += rhs.removed;
        self.failed += rhs.failed;
    }
}

impl ArtifactStore {
    pub fn new(ocr_root: impl Into<PathBuf>, work_root: impl Into<PathBuf>) -> Self {
        Self {
            ocr_root: ocr_root.into(),
            work_root: work_root.into(),
        }
    }

    /// `<ocr root>/<stem>.txt`
    pub fn text_artifact_path(&self, stem: &str) -> PathBuf {
        self.ocr_root.join(format!("{stem}.txt"))
    }

    /// `<work root>/<stem>.tif`
    pub fn raster_artifact_path(&self, stem: &str) -> PathBuf {
        self.work_root.join(format!("{stem}.tif"))
    }

    /// Output base handed to the OCR engine, which appends `.txt` itself.
    pub fn text_output_base(&self, stem: &str) -> PathBuf {
        self.ocr_root.join(stem)
    }

    /// Read a text artifact. Any failure yields an empty string.
    ///
    /// The OCR engine writes no file for some blank pages, so absence is
    /// not an error.
    pub async fn read_text(&self, path: &Path) -> String {
        match tokio::fs::read(path).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                debug!("No text artifact at {}: {}", path.display(), e);
                String::new()
            }
        }
    }

    /// Delete an artifact. Already absent is success.
    pub async fn delete(&self, path: &Path) -> Result<(), OcrError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!("Deleted {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(OcrError::io(path, e)),
        }
    }

    /// Remove job artifacts in `dir` older than `max_age`.
    ///
    /// Only regular files named like an artifact (see [`is_artifact_name`])
    /// are considered; anything else in `dir` is left alone. Age is taken from the creation time where the platform records one,
    /// else the modification time. Per-file failures are counted, not raised.
    pub async fn sweep_stale(&self, dir: &Path, max_age: Duration) -> Result<SweepReport, OcrError> {
        let mut report = SweepReport::default();
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(OcrError::io(dir, e)),
        };
        let now = SystemTime::now();

        while let Some(entry) = entries.next_entry().await.map_err(|e| OcrError::io(dir, e))? {
            let path = entry.path();
            if !entry.file_name().to_str().is_some_and(is_artifact_name) {
                continue;
            }
            let meta = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) => {
                    debug!("Sweep could not stat {}: {}", path.display(), e);
                    report.failed += 1;
                    continue;
                }
            };
            let Ok(stamp) = meta.created().or_else(|_| meta.modified()) else {
                continue;
            };
            // A timestamp in the future counts as fresh.
            let age = now.duration_since(stamp).unwrap_or_default();
            if age <= max_age {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    debug!("Sweep could not delete {}: {}", path.display(), e);
                    report.failed += 1;
                }
            }
        }

        if report.removed > 0 || report.failed > 0 {
            info!(
                "Swept {}: {} removed, {} failed",
                dir.display(),
                report.removed,
                report.failed
            );
        }
        Ok(report)
    }
}
