//! Batch processing
//!
//! One batch is a contiguous page range processed against fresh document
//! handles: open, render, recognize, compose, serialize, close. Every
//! handle opened here lives in a scope that ends before the batch result is
//! returned, so peak memory is one batch's worth of buffers no matter how
//! large the document is. Nothing a single page does can fail the batch;
//! nothing a batch does can fail the job.

use std::ops::Range;
use std::sync::Arc;

use lopdf::{Document, ObjectId};

use crate::config::{PageContent, PipelineConfig};
use crate::document::{DocumentError, DocumentResult, SourceDocument};
use crate::ocr::{RecognizedText, TextRecognizer};
use crate::overlay::page::{append_page, finalize_document, new_output_document, overlay_text_onto_page};
use crate::overlay::{OverlayComposer, OverlayPage};
use crate::render::{PageRenderer, RenderedPage};

/// Terminal state of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Ok,
    Failed,
}

/// Per-page outcome, aggregated by the batch and surfaced through the
/// progress channel.
#[derive(Debug, Clone)]
pub struct PageOutcome {
    pub page_index: usize,
    pub status: PageStatus,
}

#[derive(Debug, Clone)]
pub enum PageStatus {
    /// Text was recognized and an overlay was placed.
    Recognized { spans: usize },
    /// The engine ran but found no text; the page has no overlay.
    NoText,
    /// The page could not be rasterized; original content kept, no overlay.
    RenderFailed { reason: String },
    /// Recognition failed at page level; original content kept, no overlay.
    RecognitionFailed { reason: String },
}

impl PageStatus {
    /// Message for the warning channel, when the page was degraded.
    pub fn warning(&self) -> Option<String> {
        match self {
            Self::Recognized { .. } | Self::NoText => None,
            Self::RenderFailed { reason } => Some(format!("page not rasterized: {}", reason)),
            Self::RecognitionFailed { reason } => Some(format!("recognition failed: {}", reason)),
        }
    }
}

/// Result of one batch. Immutable once produced; consumed exactly once by
/// the assembler.
#[derive(Debug)]
pub struct BatchResult {
    /// Serialized sub-document, `None` when the batch was abandoned.
    pub bytes: Option<Vec<u8>>,
    pub batch_index: usize,
    /// The page range this batch covered (half-open, clamped).
    pub pages: Range<usize>,
    pub status: BatchStatus,
    pub outcomes: Vec<PageOutcome>,
}

/// Drives render → recognize → compose for one page range at a time.
pub struct BatchProcessor {
    config: PipelineConfig,
    renderer: PageRenderer,
    composer: OverlayComposer,
    recognizer: Arc<dyn TextRecognizer>,
}

impl BatchProcessor {
    pub fn new(config: PipelineConfig, recognizer: Arc<dyn TextRecognizer>) -> Self {
        let renderer = PageRenderer::new(config.render_dpi);
        let composer = OverlayComposer::new(&config);
        Self {
            config,
            renderer,
            composer,
            recognizer,
        }
    }

    /// Process pages `[start, min(end, page_count))` of the document in
    /// `source_bytes` as batch `batch_index`.
    ///
    /// Never returns an error and never panics outward: any unexpected
    /// failure (source unopenable, serialization broken) abandons the batch
    /// with `status: Failed` and closed handles.
    pub async fn process(
        &self,
        source_bytes: Arc<Vec<u8>>,
        start: usize,
        end: usize,
        batch_index: usize,
    ) -> BatchResult {
        match self.process_inner(source_bytes, start, end).await {
            Ok((bytes, pages, outcomes)) => BatchResult {
                bytes: Some(bytes),
                batch_index,
                pages,
                status: BatchStatus::Ok,
                outcomes,
            },
            Err(e) => {
                tracing::warn!(batch = batch_index, "batch abandoned: {}", e);
                BatchResult {
                    bytes: None,
                    batch_index,
                    pages: start..end,
                    status: BatchStatus::Failed,
                    outcomes: Vec::new(),
                }
            }
        }
    }

    async fn process_inner(
        &self,
        source_bytes: Arc<Vec<u8>>,
        start: usize,
        end: usize,
    ) -> DocumentResult<(Vec<u8>, Range<usize>, Vec<PageOutcome>)> {
        // Opening, rendering and closing the source all happen inside this
        // blocking scope; no MuPDF handle survives it.
        let rendered = {
            let bytes = Arc::clone(&source_bytes);
            let renderer = self.renderer.clone();
            tokio::task::spawn_blocking(move || -> DocumentResult<Vec<RenderedPage>> {
                let source = SourceDocument::from_shared(bytes)?;
                renderer.render_range(&source, start, end)
            })
            .await
            .map_err(|e| DocumentError::Join(e.to_string()))??
        };

        // render_range walked a contiguous clamped range starting at `start`.
        let pages = start..start + rendered.len();

        let (mut doc, pages_id) = new_output_document();
        let mut kids = Vec::with_capacity(rendered.len());
        let mut outcomes = Vec::with_capacity(rendered.len());
        // Parsed lazily, only for pages that need original content.
        let mut original: Option<Document> = None;

        for page in &rendered {
            let (recognized, status) = match &page.image {
                Ok(image) => {
                    match self
                        .recognizer
                        .recognize(image, Some(&self.config.language))
                        .await
                    {
                        Ok(text) if text.is_empty() => (text, PageStatus::NoText),
                        Ok(text) => {
                            let spans = text.spans.len();
                            (text, PageStatus::Recognized { spans })
                        }
                        Err(e) => {
                            tracing::warn!(
                                page = page.page_index,
                                transient = e.is_transient(),
                                "recognition failed, page keeps no text layer: {}",
                                e
                            );
                            (
                                RecognizedText::empty(),
                                PageStatus::RecognitionFailed {
                                    reason: e.to_string(),
                                },
                            )
                        }
                    }
                }
                Err(reason) => (
                    RecognizedText::empty(),
                    PageStatus::RenderFailed {
                        reason: reason.clone(),
                    },
                ),
            };

            let overlay = self.composer.compose(page.geometry, &recognized);
            let page_id = self.append_output_page(
                &mut doc,
                pages_id,
                &mut original,
                &source_bytes,
                page,
                &overlay,
            )?;

            kids.push(page_id);
            outcomes.push(PageOutcome {
                page_index: page.page_index,
                status,
            });
        }

        let bytes = finalize_document(doc, pages_id, kids)?;
        tracing::debug!(
            pages = outcomes.len(),
            bytes = bytes.len(),
            "batch serialized"
        );
        Ok((bytes, pages, outcomes))
    }

    /// Emit one output page with the configured visual content.
    fn append_output_page(
        &self,
        doc: &mut Document,
        pages_id: ObjectId,
        original: &mut Option<Document>,
        source_bytes: &Arc<Vec<u8>>,
        page: &RenderedPage,
        overlay: &OverlayPage,
    ) -> DocumentResult<ObjectId> {
        match (&page.image, self.config.page_content) {
            (Ok(image), PageContent::Rasterized) => {
                append_page(doc, pages_id, overlay, Some(image))
            }
            (Ok(_), PageContent::Original) => {
                match import_original(doc, pages_id, original, source_bytes, page.page_index) {
                    Some(page_id) => {
                        overlay_text_onto_page(doc, page_id, overlay)?;
                        Ok(page_id)
                    }
                    // Original content unavailable; keep the text layer on
                    // an otherwise blank page rather than losing the page.
                    None => append_page(doc, pages_id, overlay, None),
                }
            }
            (Err(_), _) => {
                // Rasterization failed, so there is nothing to recognize or
                // embed; preserve the original content without an overlay.
                match import_original(doc, pages_id, original, source_bytes, page.page_index) {
                    Some(page_id) => Ok(page_id),
                    None => append_page(doc, pages_id, &OverlayPage::empty(page.geometry), None),
                }
            }
        }
    }
}

/// Import one original page into the batch document, parsing the source
/// lazily on first use. Returns `None` when the source cannot be reparsed
/// or the page is missing; callers fall back to a blank page.
fn import_original(
    doc: &mut Document,
    pages_id: ObjectId,
    original: &mut Option<Document>,
    source_bytes: &Arc<Vec<u8>>,
    page_index: usize,
) -> Option<ObjectId> {
    if original.is_none() {
        match Document::load_mem(source_bytes) {
            Ok(parsed) => *original = Some(parsed),
            Err(e) => {
                tracing::warn!("cannot reparse source for original content: {}", e);
                return None;
            }
        }
    }
    let parsed = original.as_ref()?;

    let page_number = (page_index + 1) as u32;
    let src_page_id = parsed.get_pages().get(&page_number).copied()?;
    match crate::assemble::import_page(doc, parsed, src_page_id, pages_id) {
        Ok(page_id) => Some(page_id),
        Err(e) => {
            tracing::warn!(page = page_index, "failed to import original page: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::test_support::minimal_pdf;
    use crate::ocr::NoopRecognizer;

    fn processor() -> BatchProcessor {
        let config = PipelineConfig {
            render_dpi: 72.0,
            ..PipelineConfig::default()
        };
        BatchProcessor::new(config, Arc::new(NoopRecognizer))
    }

    #[tokio::test]
    async fn test_process_produces_sub_document() {
        let bytes = Arc::new(minimal_pdf(3));
        let result = processor().process(Arc::clone(&bytes), 0, 2, 0).await;

        assert_eq!(result.status, BatchStatus::Ok);
        assert_eq!(result.pages, 0..2);
        assert_eq!(result.outcomes.len(), 2);
        let doc = Document::load_mem(&result.bytes.unwrap()).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
    }

    #[tokio::test]
    async fn test_process_clamps_end_to_page_count() {
        let bytes = Arc::new(minimal_pdf(3));
        let result = processor().process(bytes, 2, 10, 1).await;

        assert_eq!(result.status, BatchStatus::Ok);
        assert_eq!(result.pages, 2..3);
        let doc = Document::load_mem(&result.bytes.unwrap()).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[tokio::test]
    async fn test_unopenable_source_abandons_batch() {
        let bytes = Arc::new(b"definitely not a pdf".to_vec());
        let result = processor().process(bytes, 0, 2, 7).await;

        assert_eq!(result.status, BatchStatus::Failed);
        assert_eq!(result.batch_index, 7);
        assert!(result.bytes.is_none());
    }

    #[tokio::test]
    async fn test_no_source_references_survive_the_batch() {
        let bytes = Arc::new(minimal_pdf(2));
        let result = processor().process(Arc::clone(&bytes), 0, 2, 0).await;
        assert_eq!(result.status, BatchStatus::Ok);
        // Everything the batch opened or cloned has been released.
        assert_eq!(Arc::strong_count(&bytes), 1);
    }

    #[tokio::test]
    async fn test_original_page_content_mode() {
        let bytes = Arc::new(minimal_pdf(2));
        let config = PipelineConfig {
            render_dpi: 72.0,
            page_content: PageContent::Original,
            ..PipelineConfig::default()
        };
        let processor = BatchProcessor::new(config, Arc::new(NoopRecognizer));

        let result = processor.process(bytes, 0, 2, 0).await;
        assert_eq!(result.status, BatchStatus::Ok);
        let doc = Document::load_mem(&result.bytes.unwrap()).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
    }

    #[tokio::test]
    async fn test_recognized_text_reaches_the_page_content() {
        use crate::ocr::{MockRecognizer, RecognizedText, TextSpan};

        let bytes = Arc::new(minimal_pdf(1));
        let config = PipelineConfig {
            render_dpi: 72.0,
            ..PipelineConfig::default()
        };
        let recognizer = MockRecognizer {
            response: RecognizedText {
                spans: vec![TextSpan::positioned("stamped", 72.0, 700.0, 11.0)],
            },
        };
        let processor = BatchProcessor::new(config, Arc::new(recognizer));

        let result = processor.process(bytes, 0, 1, 0).await;
        assert_eq!(result.status, BatchStatus::Ok);
        assert!(matches!(
            result.outcomes[0].status,
            PageStatus::Recognized { spans: 1 }
        ));

        let doc = Document::load_mem(&result.bytes.unwrap()).unwrap();
        let (_, page_id) = doc.get_pages().into_iter().next().unwrap();
        let page = doc.get_dictionary(page_id).unwrap();
        let content_id = page.get(b"Contents").unwrap().as_reference().unwrap();
        let stream = doc.get_object(content_id).unwrap().as_stream().unwrap();
        let content = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        let decoded = lopdf::content::Content::decode(&content).unwrap();

        let shown: Vec<String> = decoded
            .operations
            .iter()
            .filter(|op| op.operator == "Tj")
            .filter_map(|op| match op.operands.first() {
                Some(lopdf::Object::String(bytes, _)) => {
                    Some(String::from_utf8_lossy(bytes).into_owned())
                }
                _ => None,
            })
            .collect();
        assert_eq!(shown, vec!["stamped"]);
    }
}
