//! Batch OCR: run many documents with bounded concurrency.
//!
//! ## Why stream?
//!
//! A document manager re-indexing an archive submits hundreds of files.
//! [`ocr_stream`] yields each `(DocumentRef, OcrJobResult)` as soon as its
//! job finishes, so callers can store text or update a progress bar
//! incrementally. Results arrive in completion order; [`ocr_all`] collects
//! them back into input order when that matters more than latency.
//!
//! At most [`crate::PipelineConfig::concurrency`] jobs run at once. Each
//! job starts at most one external process at a time, so this also bounds
//! the number of Ghostscript and Tesseract processes.

use crate::document::DocumentRef;
use crate::orchestrator::OcrPipeline;
use crate::output::OcrJobResult;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of finished jobs.
pub type JobStream = Pin<Box<dyn Stream<Item = (DocumentRef, OcrJobResult)> + Send>>;

/// OCR every document, yielding results as jobs complete.
///
/// # Example
/// ```rust,no_run
/// use docmgr_ocr::{ocr_stream, DocumentRef, OcrPipeline, PipelineConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PipelineConfig::from_settings_file("appsettings.json", "/srv/docmgr")?.build()?;
/// let docs = vec![DocumentRef::stored("a.pdf"), DocumentRef::stored("b.png")];
/// let mut jobs = ocr_stream(OcrPipeline::new(config), docs);
/// while let Some((doc, result)) = jobs.next().await {
///     match result.error {
///         None => println!("{}: {} chars", doc.stored_name, result.text.len()),
///         Some(e) => eprintln!("{}: {e}", doc.stored_name),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn ocr_stream(
    pipeline: OcrPipeline,
    documents: impl IntoIterator<Item = DocumentRef>,
) -> JobStream {
    let documents: Vec<DocumentRef> = documents.into_iter().collect();
    let concurrency = pipeline.config().concurrency.max(1);
    info!(
        "Starting batch of {} documents ({} at a time)",
        documents.len(),
        concurrency
    );

    let s = stream::iter(documents.into_iter().map(move |doc| {
        let pipeline = pipeline.clone();
        async move {
            let result = pipeline.run(&doc).await;
            (doc, result)
        }
    }))
    .buffer_unordered(concurrency);

    Box::pin(s)
}

/// OCR every document and return the results in input order.
pub async fn ocr_all(
    pipeline: &OcrPipeline,
    documents: impl IntoIterator<Item = DocumentRef>,
) -> Vec<(DocumentRef, OcrJobResult)> {
    let concurrency = pipeline.config().concurrency.max(1);
    let indexed = documents.into_iter().enumerate().map(|(idx, doc)| {
        let pipeline = pipeline.clone();
        async move {
            let result = pipeline.run(&doc).await;
            (idx, doc, result)
        }
    });

    let mut results: Vec<(usize, DocumentRef, OcrJobResult)> = stream::iter(indexed)
        .buffer_unordered(concurrency)
        .collect()
        .await;
    results.sort_by_key(|(idx, _, _)| *idx);

    let failed = results.iter().filter(|(_, _, r)| !r.is_success()).count();
    info!(
        "Batch complete: {}/{} documents succeeded",
        results.len() - failed,
        results.len()
    );
    results.into_iter().map(|(_, doc, r)| (doc, r)).collect()
}
