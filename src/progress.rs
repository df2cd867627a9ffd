//! Progress-callback trait for per-job stage events.
//!
//! Inject an [`Arc<dyn JobProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to observe
//! each job as it moves through the pipeline stages. The CLI uses it to
//! drive a spinner; a service layer could forward the events to a status
//! table or a WebSocket without the library knowing about either.
//!
//! # Example
//!
//! ```rust
//! use docmgr_ocr::{JobProgressCallback, JobStage, PipelineConfig};
//! use docmgr_ocr::document::JobId;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct StageCounter {
//!     stages: AtomicUsize,
//! }
//!
//! impl JobProgressCallback for StageCounter {
//!     fn on_stage_complete(&self, _job: &JobId, _stage: JobStage, _elapsed_ms: u64) {
//!         self.stages.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(StageCounter { stages: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::document::{DocumentRef, JobId};
use crate::output::OcrJobResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The stages of one OCR job, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    EligibilityCheck,
    /// PDF documents only.
    Rasterize,
    Recognize,
    RetrieveText,
    Cleanup,
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStage::EligibilityCheck => "eligibility check",
            JobStage::Rasterize => "rasterize",
            JobStage::Recognize => "recognize",
            JobStage::RetrieveText => "retrieve text",
            JobStage::Cleanup => "cleanup",
        };
        f.write_str(s)
    }
}

/// Called by the orchestrator as a job moves through its stages.
///
/// Implementations must be `Send + Sync`: batch runs drive several jobs at
/// once and events for different jobs may interleave. All methods default
/// to no-ops.
pub trait JobProgressCallback: Send + Sync {
    /// Called once when a job starts, before eligibility is checked.
    fn on_job_start(&self, job: &JobId, document: &DocumentRef) {
        let _ = (job, document);
    }

    /// Called when a stage begins.
    fn on_stage_start(&self, job: &JobId, stage: JobStage) {
        let _ = (job, stage);
    }

    /// Called when a stage finishes, successfully or not.
    fn on_stage_complete(&self, job: &JobId, stage: JobStage, elapsed_ms: u64) {
        let _ = (job, stage, elapsed_ms);
    }

    /// Called once with the job's terminal result.
    fn on_job_complete(&self, job: &JobId, result: &OcrJobResult) {
        let _ = (job, result);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl JobProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn JobProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingCallback {
        events: Mutex<Vec<String>>,
    }

    impl JobProgressCallback for RecordingCallback {
        fn on_stage_start(&self, _job: &JobId, stage: JobStage) {
            self.events.lock().unwrap().push(format!("start {stage}"));
        }

        fn on_stage_complete(&self, _job: &JobId, stage: JobStage, _elapsed_ms: u64) {
            self.events.lock().unwrap().push(format!("done {stage}"));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        let job = JobId::new();
        cb.on_job_start(&job, &DocumentRef::new("a.png", "a.png"));
        cb.on_stage_start(&job, JobStage::Recognize);
        cb.on_stage_complete(&job, JobStage::Recognize, 12);
        cb.on_job_complete(&job, &OcrJobResult::success(job.clone(), String::new(), false, 0));
    }

    #[test]
    fn recording_callback_receives_events_in_order() {
        let cb = RecordingCallback::default();
        let job = JobId::new();
        cb.on_stage_start(&job, JobStage::Rasterize);
        cb.on_stage_complete(&job, JobStage::Rasterize, 5);
        cb.on_stage_start(&job, JobStage::Recognize);
        let events = cb.events.lock().unwrap().clone();
        assert_eq!(events, vec!["start rasterize", "done rasterize", "start recognize"]);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_stage_start(&JobId::new(), JobStage::Cleanup);
    }

    #[test]
    fn stage_serialises_snake_case() {
        let json = serde_json::to_string(&JobStage::RetrieveText).unwrap();
        assert_eq!(json, "\"retrieve_text\"");
    }
}
