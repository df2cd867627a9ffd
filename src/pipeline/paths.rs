//! Directory-root resolution for uploads, OCR output and work files.
//!
//! Each root comes from one configuration value. Relative values are joined
//! to the application root; absolute values are used as-is. The directory
//! is created on first use. An unset or blank value is a hard
//! [`OcrError::MissingConfig`]: guessing a root would scatter or lose files.

use crate::config::PipelineConfig;
use crate::error::OcrError;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Resolves the three filesystem roots the pipeline works in.
#[derive(Debug, Clone)]
pub struct PathResolver {
    app_root: PathBuf,
    uploads_folder: Option<String>,
    ocr_output_folder: Option<String>,
    work_folder: Option<String>,
}

impl PathResolver {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            app_root: config.app_root.clone(),
            uploads_folder: config.uploads_folder.clone(),
            ocr_output_folder: config.ocr_output_folder.clone(),
            work_folder: config.work_folder.clone(),
        }
    }

    /// Folder holding the stored documents.
    pub async fn uploads_root(&self) -> Result<PathBuf, OcrError> {
        self.resolve("UploadsFolder", self.uploads_folder.as_deref())
            .await
    }

    /// Folder receiving the OCR engine's text output.
    pub async fn ocr_output_root(&self) -> Result<PathBuf, OcrError> {
        self.resolve("OCROutputFolder", self.ocr_output_folder.as_deref())
            .await
    }

    /// Folder receiving intermediate rasters.
    pub async fn work_root(&self) -> Result<PathBuf, OcrError> {
        self.resolve("WorkFilePath", self.work_folder.as_deref())
            .await
    }

    async fn resolve(&self, key: &'static str, value: Option<&str>) -> Result<PathBuf, OcrError> {
        let dir = root_path(&self.app_root, key, value)?;
        // create_dir_all succeeds when the directory already exists, so
        // concurrent jobs may race here safely.
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| OcrError::io(&dir, e))?;
        debug!("{} resolved to {}", key, dir.display());
        Ok(dir)
    }
}

/// Pure part of root resolution: validate and absolutise a folder setting.
pub fn root_path(app_root: &Path, key: &'static str, value: Option<&str>) -> Result<PathBuf, OcrError> {
    let value = match value.map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => {
            error!("No configured {}", key);
            return Err(OcrError::MissingConfig { key });
        }
    };
    let p = Path::new(value);
    Ok(if p.is_absolute() {
        p.to_path_buf()
    } else {
        app_root.join(p)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_joins_app_root() {
        let p = root_path(Path::new("/srv/app"), "UploadsFolder", Some("uploads")).unwrap();
        assert_eq!(p, PathBuf::from("/srv/app/uploads"));
    }

    #[test]
    fn absolute_is_used_as_is() {
        let abs = std::env::temp_dir().join("docmgr-ocr-abs");
        let p = root_path(Path::new("/srv/app"), "WorkFilePath", abs.to_str()).unwrap();
        assert_eq!(p, abs);
    }

    #[test]
    fn unset_or_blank_is_missing_config() {
        for v in [None, Some(""), Some("   ")] {
            let err = root_path(Path::new("/srv"), "OCROutputFolder", v).unwrap_err();
            assert!(
                matches!(err, OcrError::MissingConfig { key: "OCROutputFolder" }),
                "{v:?}"
            );
        }
    }

    #[tokio::test]
    async fn resolver_creates_directories_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::builder()
            .app_root(dir.path())
            .uploads_folder("u")
            .ocr_output_folder("nested/ocr")
            .work_folder("w")
            .build()
            .unwrap();
        let resolver = PathResolver::new(&config);

        let ocr = resolver.ocr_output_root().await.unwrap();
        assert!(ocr.is_dir());
        assert_eq!(ocr, dir.path().join("nested/ocr"));

        let (a, b) = tokio::join!(resolver.work_root(), resolver.work_root());
        assert_eq!(a.unwrap(), b.unwrap());
        assert!(resolver.uploads_root().await.unwrap().is_dir());
    }

    #[tokio::test]
    async fn resolver_reports_missing_work_folder() {
        let config = PipelineConfig::builder()
            .uploads_folder("u")
            .build()
            .unwrap();
        let err = PathResolver::new(&config).work_root().await.unwrap_err();
        assert!(err.to_string().contains("WorkFilePath"));
    }
}
