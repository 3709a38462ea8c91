//! Document error types

use thiserror::Error;

/// Errors surfaced by document handling, rendering and assembly.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Input bytes are not a parseable PDF. Fatal for the whole job.
    #[error("not a parseable PDF: {0}")]
    InvalidDocument(String),

    /// Page index out of range
    #[error("page not found: index {0}")]
    PageNotFound(usize),

    /// A page could not be rasterized
    #[error("render error: {0}")]
    Render(String),

    /// Image buffer handling failed
    #[error("image error: {0}")]
    Image(String),

    /// PDF engine error
    #[error("PDF engine error: {0}")]
    Engine(String),

    /// Output document construction or serialization failed
    #[error("assembly error: {0}")]
    Assembly(String),

    /// Every batch failed and the drop policy left nothing to merge
    #[error("no usable batches survived processing")]
    NoUsableBatches,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Blocking task join error
    #[error("task join error: {0}")]
    Join(String),
}

/// Result type alias for document operations
pub type DocumentResult<T> = std::result::Result<T, DocumentError>;

impl From<mupdf::Error> for DocumentError {
    fn from(err: mupdf::Error) -> Self {
        DocumentError::Engine(err.to_string())
    }
}

impl From<lopdf::Error> for DocumentError {
    fn from(err: lopdf::Error) -> Self {
        DocumentError::Assembly(err.to_string())
    }
}
