//! Scanlayer
//!
//! Converts scanned PDFs into searchable PDFs by overlaying each page with an
//! invisible, selectable OCR text layer. Documents are processed in
//! fixed-size page batches so peak memory stays bounded regardless of page
//! count; a failing page or batch degrades the output instead of aborting
//! the job.
//!
//! # Modules
//!
//! - `document`: validated handle over the source PDF bytes
//! - `render`: page rasterization at a fixed dpi
//! - `ocr`: pluggable text recognition (remote HTTP, local tesseract, no-op)
//! - `overlay`: text layout and invisible-layer page construction
//! - `batch`: per-batch render/recognize/compose loop
//! - `assemble`: merge of batch sub-documents into the final PDF
//! - `pipeline`: top-level orchestrator and progress events

pub mod assemble;
pub mod batch;
pub mod config;
pub mod document;
pub mod ocr;
pub mod overlay;
pub mod pipeline;
pub mod render;

pub use config::{FailedBatchPolicy, PageContent, PipelineConfig};
pub use document::{DocumentError, SourceDocument};
pub use ocr::{NoopRecognizer, OcrError, RecognizedText, RemoteRecognizer, TextRecognizer, TextSpan};
pub use pipeline::{OcrPipeline, PipelineEvent};
