//! Pipeline orchestration
//!
//! The orchestrator owns the job: read the page count once, compute the
//! batch partition, run batches strictly sequentially, report progress,
//! merge. Page- and batch-level failures are reported through the event
//! callback and never abort the job; only an unparseable input or a merge
//! with nothing to merge propagates.

use std::ops::Range;
use std::sync::Arc;

use crate::assemble::DocumentAssembler;
use crate::batch::{BatchProcessor, BatchStatus};
use crate::config::PipelineConfig;
use crate::document::{DocumentResult, SourceDocument};
use crate::ocr::TextRecognizer;

/// Progress and warning events emitted while a job runs.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A batch finished (successfully or not). `completed` counts finished
    /// batches, `total` is the batch count for the job.
    BatchCompleted { completed: usize, total: usize },
    /// A page was degraded: it kept its content but got no text layer.
    PageWarning { page_index: usize, message: String },
    /// A whole batch was abandoned.
    BatchFailed { batch_index: usize },
}

/// Top-level entry point for converting one document.
pub struct OcrPipeline {
    config: PipelineConfig,
    recognizer: Arc<dyn TextRecognizer>,
}

impl OcrPipeline {
    pub fn new(config: PipelineConfig, recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self { config, recognizer }
    }

    /// Convert `source_bytes` into a PDF with text layers.
    ///
    /// `on_event` receives progress and warnings as the job advances. Fails
    /// only when the input is not a parseable PDF or the final merge has
    /// nothing usable.
    pub async fn run<F>(&self, source_bytes: Vec<u8>, mut on_event: F) -> DocumentResult<Vec<u8>>
    where
        F: FnMut(PipelineEvent),
    {
        let source_bytes = Arc::new(source_bytes);
        // Opened once for the page count, dropped before the batch loop;
        // kept only as validated metadata plus the shared buffer.
        let source = SourceDocument::from_shared(Arc::clone(&source_bytes))?;
        let page_count = source.page_count();

        let ranges = batch_ranges(page_count, self.config.batch_size);
        let batch_count = ranges.len();
        tracing::info!(
            pages = page_count,
            batches = batch_count,
            batch_size = self.config.batch_size,
            "starting OCR overlay job"
        );

        let processor = BatchProcessor::new(self.config.clone(), Arc::clone(&self.recognizer));
        let mut results = Vec::with_capacity(batch_count);

        for (batch_index, range) in ranges.into_iter().enumerate() {
            let result = processor
                .process(Arc::clone(&source_bytes), range.start, range.end, batch_index)
                .await;

            for outcome in &result.outcomes {
                if let Some(message) = outcome.status.warning() {
                    on_event(PipelineEvent::PageWarning {
                        page_index: outcome.page_index,
                        message,
                    });
                }
            }
            if result.status == BatchStatus::Failed {
                on_event(PipelineEvent::BatchFailed { batch_index });
            }
            on_event(PipelineEvent::BatchCompleted {
                completed: batch_index + 1,
                total: batch_count,
            });

            results.push(result);
        }

        let assembler = DocumentAssembler::new(self.config.failed_batch_policy);
        let merged = assembler.merge(&source, results)?;
        tracing::info!(bytes = merged.len(), "OCR overlay job finished");
        Ok(merged)
    }
}

/// Partition `[0, page_count)` into half-open ranges of at most
/// `batch_size` pages. Produces `ceil(page_count / batch_size)` ranges with
/// no gaps and no overlaps.
pub fn batch_ranges(page_count: usize, batch_size: usize) -> Vec<Range<usize>> {
    let batch_size = batch_size.max(1);
    (0..page_count)
        .step_by(batch_size)
        .map(|start| start..(start + batch_size).min(page_count))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_ranges_partition_exactly() {
        for page_count in 0..50 {
            for batch_size in 1..8 {
                let ranges = batch_ranges(page_count, batch_size);
                let expected = page_count.div_ceil(batch_size);
                assert_eq!(ranges.len(), expected, "P={} B={}", page_count, batch_size);

                let mut covered = 0;
                let mut next = 0;
                for range in &ranges {
                    assert_eq!(range.start, next, "gap or overlap at {:?}", range);
                    assert!(range.end > range.start);
                    assert!(range.end - range.start <= batch_size);
                    covered += range.end - range.start;
                    next = range.end;
                }
                assert_eq!(covered, page_count);
            }
        }
    }

    #[test]
    fn test_batch_ranges_example() {
        assert_eq!(batch_ranges(3, 2), vec![0..2, 2..3]);
        assert_eq!(batch_ranges(5, 2), vec![0..2, 2..4, 4..5]);
        assert!(batch_ranges(0, 2).is_empty());
    }

    #[test]
    fn test_zero_batch_size_treated_as_one() {
        assert_eq!(batch_ranges(2, 0), vec![0..1, 1..2]);
    }
}
