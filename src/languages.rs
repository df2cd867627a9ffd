//! OCR language catalog and language-code validation.
//!
//! The document manager ships a `Languages.json` listing the Tesseract
//! languages offered in its UI:
//!
//! ```json
//! [ { "Text": "English", "Value": "eng" }, { "Text": "German", "Value": "deu" } ]
//! ```

use crate::error::OcrError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// One selectable OCR language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Language {
    /// Display name, e.g. "Chinese - Simplified".
    pub text: String,
    /// Tesseract code, e.g. "chi_sim".
    pub value: String,
}

/// Load the language catalog, sorted by display name.
///
/// A missing file yields an empty list; unreadable or malformed files are errors.
pub fn load_languages(path: impl AsRef<Path>) -> Result<Vec<Language>, OcrError> {
    let path = path.as_ref();
    if !path.exists() {
        debug!("No language catalog at {}", path.display());
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path).map_err(|e| OcrError::io(path, e))?;
    let mut languages: Vec<Language> = serde_json::from_str(&text).map_err(|e| {
        OcrError::InvalidConfig(format!("language catalog '{}': {}", path.display(), e))
    })?;
    languages.sort_by(|a, b| a.text.cmp(&b.text));
    Ok(languages)
}

// One or more tesseract language codes joined with '+', e.g. "eng", "chi_sim", "eng+fra".
static RE_LANGUAGE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_]+(\+[A-Za-z_]+)*$").unwrap());

/// True if `code` is a syntactically valid OCR language argument.
pub fn is_valid_language_code(code: &str) -> bool {
    RE_LANGUAGE_CODE.is_match(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_codes() {
        for ok in ["eng", "chi_sim", "eng+fra", "deu+eng+ita_old"] {
            assert!(is_valid_language_code(ok), "{ok}");
        }
        for bad in ["", "eng+", "+eng", "en g", "eng;ls", "../eng", "eng\n"] {
            assert!(!is_valid_language_code(bad), "{bad:?}");
        }
    }

    #[test]
    fn missing_catalog_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let langs = load_languages(dir.path().join("Languages.json")).unwrap();
        assert!(langs.is_empty());
    }

    #[test]
    fn catalog_is_sorted_by_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Languages.json");
        std::fs::write(
            &path,
            r#"[{"Text":"German","Value":"deu"},{"Text":"Arabic","Value":"ara"},{"Text":"English","Value":"eng"}]"#,
        )
        .unwrap();
        let langs = load_languages(&path).unwrap();
        let codes: Vec<&str> = langs.iter().map(|l| l.value.as_str()).collect();
        assert_eq!(codes, vec!["ara", "eng", "deu"]);
    }

    #[test]
    fn malformed_catalog_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Languages.json");
        std::fs::write(&path, r#"{"Text":"English"}"#).unwrap();
        assert!(load_languages(&path).is_err());
    }
}
