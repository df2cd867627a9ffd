//! Job output types.

use crate::document::JobId;
use crate::error::{JobError, OcrError};
use serde::{Deserialize, Serialize};

/// Terminal result of one OCR job.
///
/// Exactly one of two shapes:
/// * success: `error` is `None`, `text` holds what the engine recognised
///   (an empty string is a valid result for a page without text);
/// * failure: `error` is set and `text` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrJobResult {
    /// Identifier used in the job's artifact names and log lines.
    pub job_id: JobId,
    pub text: String,
    pub error: Option<JobError>,
    /// True if the document went through the PDF rasterizer.
    pub rasterized: bool,
    /// Wall-clock time for the whole job, cleanup included.
    pub duration_ms: u64,
}

impl OcrJobResult {
    pub fn success(job_id: JobId, text: String, rasterized: bool, duration_ms: u64) -> Self {
        Self {
            job_id,
            text,
            error: None,
            rasterized,
            duration_ms,
        }
    }

    pub fn failure(job_id: JobId, error: &OcrError, rasterized: bool, duration_ms: u64) -> Self {
        Self {
            job_id,
            text: String::new(),
            error: Some(JobError::from(error)),
            rasterized,
            duration_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Convert into a plain `Result` for callers that treat failure as an error.
    pub fn into_result(self) -> Result<String, JobError> {
        match self.error {
            None => Ok(self.text),
            Some(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OcrErrorKind;

    #[test]
    fn empty_text_is_success() {
        let r = OcrJobResult::success(JobId::new(), String::new(), false, 3);
        assert!(r.is_success());
        assert_eq!(r.into_result(), Ok(String::new()));
    }

    #[test]
    fn failure_drops_text_and_keeps_kind() {
        let err = OcrError::NotOcrable {
            name: "memo.docx".into(),
        };
        let r = OcrJobResult::failure(JobId::new(), &err, false, 1);
        assert!(!r.is_success());
        assert!(r.text.is_empty());
        let je = r.into_result().unwrap_err();
        assert_eq!(je.kind, OcrErrorKind::NotOcrable);
        assert!(je.message.contains("memo.docx"));
    }

    #[test]
    fn serialises_to_json() {
        let r = OcrJobResult::success(JobId::new(), "hello".into(), true, 10);
        let v: serde_json::Value = serde_json::to_value(&r).unwrap();
        assert_eq!(v["text"], "hello");
        assert_eq!(v["rasterized"], true);
        assert!(v["error"].is_null());
        assert_eq!(v["job_id"].as_str().unwrap().len(), 32);
    }
}
