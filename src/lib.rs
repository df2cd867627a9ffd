//! # docmgr-ocr
//!
//! Extract text from stored documents by driving Ghostscript and Tesseract.
//!
//! ## Why this crate?
//!
//! A document manager keeps uploads as opaque files: scanned PDFs, phone
//! photos, faxed TIFFs. Making them searchable means running an OCR engine
//! on each, which in practice means two external tools, a PDF rasterizer
//! and a recogniser, with temporary files between them. This crate owns
//! that plumbing: where files go, which documents qualify, how the tools
//! are invoked and killed when they hang, and removing the leftovers.
//!
//! ## Pipeline Overview
//!
//! ```text
//! stored document
//!  │
//!  ├─ 1. Eligibility  extension allow-list, PDFs always eligible
//!  ├─ 2. Rasterize    PDFs only: encryption check, Ghostscript → 300 DPI TIFF
//!  ├─ 3. Recognize    Tesseract → <ocr root>/<base>.<job id>.txt
//!  ├─ 4. Retrieve     read the text (empty is a valid result)
//!  └─ 5. Cleanup      delete the job's .tif and .txt, success or not
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docmgr_ocr::{DocumentRef, OcrPipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .app_root("/srv/docmgr")
//!         .uploads_folder("uploads")
//!         .ocr_output_folder("ocr")
//!         .work_folder("work")
//!         .build()?;
//!     let pipeline = OcrPipeline::new(config);
//!     let result = pipeline.run(&DocumentRef::new("7d0e.png", "receipt.png")).await;
//!     match result.into_result() {
//!         Ok(text) => println!("{text}"),
//!         Err(e) => eprintln!("OCR failed: {e}"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docmgr-ocr` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docmgr-ocr = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod document;
pub mod error;
pub mod languages;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{ocr_all, ocr_stream, JobStream};
pub use config::{PipelineConfig, PipelineConfigBuilder, PipelineSettings};
pub use document::{DocumentRef, JobId};
pub use error::{JobError, OcrError, OcrErrorKind};
pub use languages::{is_valid_language_code, load_languages, Language};
pub use orchestrator::OcrPipeline;
pub use output::OcrJobResult;
pub use pipeline::artifacts::SweepReport;
pub use progress::{JobProgressCallback, JobStage, NoopProgressCallback, ProgressCallback};
