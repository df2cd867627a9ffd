//! Pipeline stages for document OCR.
//!
//! Each submodule implements exactly one step. Keeping stages separate makes
//! each independently testable; the two external tools are reached only
//! through [`process::ProcessRunner`], so tests can script them.
//!
//! ## Data Flow
//!
//! ```text
//! paths ──▶ extension ──▶ rasterize ──▶ recognize ──▶ artifacts ──▶ postprocess
//! (roots)   (eligible?)   (PDF → TIFF)  (Tesseract)   (read/delete)  (optional)
//! ```
//!
//! 1. [`paths`]: resolve and create the uploads, OCR-output and work roots
//! 2. [`extension`]: decide OCR eligibility from the file extension
//! 3. [`rasterize`]: PDFs only: encryption check, then Ghostscript to a 300 DPI TIFF
//! 4. [`recognize`]: run Tesseract on the image and classify its stderr
//! 5. [`artifacts`]: name, read and remove the per-job `.tif` and `.txt`
//! 6. [`postprocess`]: optional text cleanup
//!
//! [`process`] underlies 3 and 4: spawning with a deadline and killing the
//! whole process tree when it passes.

pub mod artifacts;
pub mod extension;
pub mod paths;
pub mod postprocess;
pub mod process;
pub mod rasterize;
pub mod recognize;
