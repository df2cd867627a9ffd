//! Error types for the docmgr-ocr library.
//!
//! Two types reflect two audiences:
//!
//! * [`OcrError`] is what every pipeline stage returns internally. It carries
//!   paths, exit codes and captured tool output so the log line written at the
//!   failure site is actionable.
//!
//! * [`JobError`] is the serialisable summary stored in
//!   [`crate::output::OcrJobResult`]. The orchestrator converts the first
//!   [`OcrError`] of a job into a `JobError` at its boundary, so callers only
//!   ever see a kind plus a human-readable message.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the OCR pipeline stages.
#[derive(Debug, Error)]
pub enum OcrError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// A required configuration value is unset or empty.
    #[error("Configuration key '{key}' is not set.\nSet it in the settings file or via the matching --flag / environment variable.")]
    MissingConfig { key: &'static str },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Eligibility errors ────────────────────────────────────────────────
    /// The stored name is not a plain file name inside the uploads root.
    #[error("Invalid document name '{name}': must be a plain file name without directory components")]
    InvalidDocumentName { name: String },

    /// The document's extension is not OCR-eligible.
    #[error("Document '{name}' cannot be OCRed: supported types are PDF, JPEG, PNG, BMP, TIFF and GIF")]
    NotOcrable { name: String },

    /// The stored document is not present in the uploads root.
    #[error("Document not found: '{path}'")]
    DocumentMissing { path: PathBuf },

    // ── Rasterizer errors ─────────────────────────────────────────────────
    /// The PDF looks encrypted and no password is configured.
    #[error("PDF '{path}' is encrypted.\nProvide a PDF password or remove the encryption before OCR.")]
    EncryptedDocument { path: PathBuf },

    /// The rasterizer exited unsuccessfully or produced no image.
    #[error("Rasterisation of '{path}' failed ({}): {detail}", exit_label(.exit_code))]
    RasterFailed {
        path: PathBuf,
        exit_code: Option<i32>,
        detail: String,
    },

    /// The rasterizer did not finish before the deadline and was killed.
    #[error("Rasterisation of '{path}' timed out after {secs}s")]
    RasterTimeout { path: PathBuf, secs: u64 },

    // ── OCR engine errors ─────────────────────────────────────────────────
    /// The OCR engine could not load the requested language data.
    #[error("Couldn't load OCR language '{language}'.\nInstall the traineddata file for it or pick another language.")]
    LanguageUnavailable { language: String },

    /// The OCR engine could not create its text output file.
    #[error("OCR engine could not create output file '{}.txt'", .output_base.display())]
    OutputWriteFailed { output_base: PathBuf },

    /// The OCR engine did not finish before the deadline and was killed.
    #[error("OCR of '{image}' timed out after {secs}s")]
    Timeout { image: PathBuf, secs: u64 },

    // ── Process / I/O errors ──────────────────────────────────────────────
    /// An external tool could not be started.
    #[error("Failed to start {tool} at '{program}': {source}\nCheck the configured tool directory.")]
    Launch {
        tool: &'static str,
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected filesystem failure.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (e.g. a panicked job task).
    #[error("Internal error: {0}")]
    Internal(String),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {c}"),
        None => "terminated by signal".to_string(),
    }
}

impl OcrError {
    /// Classify this error into its stable, serialisable kind.
    pub fn kind(&self) -> OcrErrorKind {
        match self {
            OcrError::MissingConfig { .. } | OcrError::InvalidConfig(_) => {
                OcrErrorKind::Configuration
            }
            OcrError::InvalidDocumentName { .. } | OcrError::NotOcrable { .. } => {
                OcrErrorKind::NotOcrable
            }
            OcrError::EncryptedDocument { .. } => OcrErrorKind::EncryptedDocument,
            OcrError::RasterFailed { .. } => OcrErrorKind::RasterFailed,
            OcrError::RasterTimeout { .. } => OcrErrorKind::RasterTimeout,
            OcrError::LanguageUnavailable { .. } => OcrErrorKind::LanguageUnavailable,
            OcrError::OutputWriteFailed { .. } => OcrErrorKind::OutputWriteFailed,
            OcrError::Timeout { .. } => OcrErrorKind::Timeout,
            OcrError::DocumentMissing { .. } | OcrError::Launch { .. } | OcrError::Io { .. } => {
                OcrErrorKind::Io
            }
            OcrError::Internal(_) => OcrErrorKind::Internal,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OcrError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Stable classification of a job failure.
///
/// None of these kinds is retried automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrErrorKind {
    /// Missing or invalid configuration. Fatal to the operation.
    Configuration,
    /// Extension not in the allow-list and not a PDF.
    NotOcrable,
    /// Encryption detected and no password configured.
    EncryptedDocument,
    /// Rasterizer exited unsuccessfully.
    RasterFailed,
    /// Rasterizer exceeded its deadline.
    RasterTimeout,
    /// OCR engine could not load the language data.
    LanguageUnavailable,
    /// OCR engine could not write its text output.
    OutputWriteFailed,
    /// OCR engine exceeded its deadline.
    Timeout,
    /// Unexpected filesystem or process-launch failure.
    Io,
    /// A job task panicked, or an internal invariant did not hold.
    Internal,
}

impl fmt::Display for OcrErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OcrErrorKind::Configuration => "configuration",
            OcrErrorKind::NotOcrable => "not_ocrable",
            OcrErrorKind::EncryptedDocument => "encrypted_document",
            OcrErrorKind::RasterFailed => "raster_failed",
            OcrErrorKind::RasterTimeout => "raster_timeout",
            OcrErrorKind::LanguageUnavailable => "language_unavailable",
            OcrErrorKind::OutputWriteFailed => "output_write_failed",
            OcrErrorKind::Timeout => "timeout",
            OcrErrorKind::Io => "io",
            OcrErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// A job failure as reported to callers.
///
/// Stored inside [`crate::output::OcrJobResult`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct JobError {
    pub kind: OcrErrorKind,
    pub message: String,
}

impl From<&OcrError> for JobError {
    fn from(e: &OcrError) -> Self {
        JobError {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

impl From<OcrError> for JobError {
    fn from(e: OcrError) -> Self {
        JobError::from(&e)
    }
}
