//! Job inputs: the document reference supplied by the caller and the
//! per-job identifier the orchestrator assigns.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};
use uuid::Uuid;

/// The document to OCR, as known to the caller.
///
/// `stored_name` is the file name inside the uploads root (usually a random
/// identifier plus the original extension). `original_name` is the name the
/// user uploaded; it is consulted for the extension when the stored name's
/// extension was altered upstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    pub stored_name: String,
    pub original_name: String,
}

impl DocumentRef {
    pub fn new(stored_name: impl Into<String>, original_name: impl Into<String>) -> Self {
        Self {
            stored_name: stored_name.into(),
            original_name: original_name.into(),
        }
    }

    /// A reference whose stored and original names are the same.
    pub fn stored(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            original_name: name.clone(),
            stored_name: name,
        }
    }

    /// True if `stored_name` is a single normal path component.
    ///
    /// Rejects empty names, `.`/`..`, absolute paths and anything with a
    /// directory separator, so joining it to the uploads root cannot escape it.
    pub fn has_plain_stored_name(&self) -> bool {
        let mut components = Path::new(&self.stored_name).components();
        matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        ) && !self.stored_name.contains(['/', '\\'])
    }

    /// The stored name without its final extension (`a.b.c.pdf` → `a.b.c`).
    pub fn base_name(&self) -> String {
        Path::new(&self.stored_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.stored_name.clone())
    }
}

/// Unique identifier of one OCR job.
///
/// Appended to the base name of every artifact the job writes, so two jobs
/// on documents with the same base name never share a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new() -> Self {
        JobId(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Artifact stem for a document in this job: `<base>.<job id>`.
    pub fn artifact_stem(&self, document: &DocumentRef) -> String {
        format!("{}.{}", document.base_name(), self.0)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_name_strips_only_final_extension() {
        assert_eq!(DocumentRef::stored("report.v2.final.PDF").base_name(), "report.v2.final");
        assert_eq!(DocumentRef::stored("scan.png").base_name(), "scan");
        assert_eq!(DocumentRef::stored("noext").base_name(), "noext");
    }

    #[test]
    fn plain_stored_names() {
        assert!(DocumentRef::stored("3f2a.pdf").has_plain_stored_name());
        assert!(DocumentRef::stored("a.b.c.png").has_plain_stored_name());
        assert!(!DocumentRef::stored("").has_plain_stored_name());
        assert!(!DocumentRef::stored("..").has_plain_stored_name());
        assert!(!DocumentRef::stored("../secret.pdf").has_plain_stored_name());
        assert!(!DocumentRef::stored("sub/doc.pdf").has_plain_stored_name());
        assert!(!DocumentRef::stored("sub\\doc.pdf").has_plain_stored_name());
        assert!(!DocumentRef::stored("/etc/passwd").has_plain_stored_name());
    }

    #[test]
    fn job_ids_are_unique() {
        assert_ne!(JobId::new(), JobId::new());
        assert_eq!(JobId::new().as_str().len(), 32);
    }

    #[test]
    fn artifact_stem_includes_job_id() {
        let job = JobId::new();
        let stem = job.artifact_stem(&DocumentRef::stored("invoice.pdf"));
        assert_eq!(stem, format!("invoice.{}", job));
    }
}
