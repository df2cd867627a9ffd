//! OCR eligibility by file extension.
//!
//! Only the final suffix of a name counts and comparison is
//! ASCII-case-insensitive, so `report.v2.final.PDF` is a `.pdf`.

use serde::{Deserialize, Serialize};

/// Extensions the OCR engine accepts, lower-cased and dot-prefixed.
pub const ALLOWED_EXTENSIONS: [&str; 8] =
    [".pdf", ".jpg", ".jpeg", ".png", ".bmp", ".tif", ".tiff", ".gif"];

/// Extension of PDF documents, which go through the rasterizer first.
pub const PDF_EXTENSION: &str = ".pdf";

/// Whether a name is OCR-eligible and under which canonical extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityResult {
    pub eligible: bool,
    /// Lower-cased, dot-prefixed extension; empty when not eligible.
    pub extension: String,
}

/// The lower-cased final suffix of `name` including the dot, if any.
fn final_suffix(name: &str) -> Option<String> {
    let dot = name.rfind('.')?;
    let suffix = &name[dot..];
    // A separator after the last dot means the dot belongs to a directory.
    if suffix.contains(['/', '\\']) {
        return None;
    }
    Some(suffix.to_ascii_lowercase())
}

/// The allow-listed extension of `name`, or an empty string.
pub fn canonical_extension(name: &str) -> String {
    match final_suffix(name) {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => ext,
        _ => String::new(),
    }
}

/// True if `name` ends in an allow-listed extension.
pub fn is_eligible(name: &str) -> bool {
    !canonical_extension(name).is_empty()
}

/// True if `name` ends in `.pdf` (any case).
pub fn is_pdf(name: &str) -> bool {
    final_suffix(name).as_deref() == Some(PDF_EXTENSION)
}

/// Eligibility of `name` as a single value.
pub fn eligibility(name: &str) -> EligibilityResult {
    let extension = canonical_extension(name);
    EligibilityResult {
        eligible: !extension.is_empty(),
        extension,
    }
}
