//! Immutable source document handle
//!
//! MuPDF documents are not thread-safe and hold native memory, so no
//! document handle is stored here. The handle owns only the raw bytes;
//! every operation opens a fresh document, runs a closure against it, and
//! drops it on the way out. Access is serialized through a mutex.

use std::sync::Arc;

use mupdf::Document;
use parking_lot::Mutex;

use super::{DocumentError, DocumentResult};

const PDF_MIME: &str = "application/pdf";

/// Width and height of a page in PDF points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
}

impl PageGeometry {
    /// US Letter, used as a last-resort geometry for pages whose bounds
    /// cannot be read.
    pub fn letter() -> Self {
        Self {
            width: 612.0,
            height: 792.0,
        }
    }
}

/// Validated handle over immutable PDF bytes.
///
/// The page count is read once at construction; everything else opens a
/// fresh document per operation via [`SourceDocument::with_doc`].
pub struct SourceDocument {
    data: Arc<Vec<u8>>,
    page_count: usize,
    lock: Mutex<()>,
}

impl SourceDocument {
    /// Validate the bytes and read the page count.
    ///
    /// Fails with [`DocumentError::InvalidDocument`] when the bytes are not
    /// an openable PDF.
    pub fn from_bytes(data: Vec<u8>) -> DocumentResult<Self> {
        Self::from_shared(Arc::new(data))
    }

    /// Like [`SourceDocument::from_bytes`], but shares an existing buffer
    /// instead of taking ownership of a fresh one. Batches use this so the
    /// source bytes exist once per job, not once per batch.
    pub fn from_shared(data: Arc<Vec<u8>>) -> DocumentResult<Self> {
        if !data.starts_with(b"%PDF") {
            return Err(DocumentError::InvalidDocument(
                "missing %PDF header".to_string(),
            ));
        }

        let doc = Document::from_bytes(&data, PDF_MIME)
            .map_err(|e| DocumentError::InvalidDocument(e.to_string()))?;
        let page_count = doc
            .page_count()
            .map_err(|e| DocumentError::InvalidDocument(e.to_string()))?
            as usize;
        drop(doc);

        Ok(Self {
            data,
            page_count,
            lock: Mutex::new(()),
        })
    }

    /// Number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// The raw source bytes.
    pub fn bytes(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.data)
    }

    /// Execute a closure against a freshly opened document.
    ///
    /// The document is dropped when the closure returns; no handle escapes
    /// this scope.
    pub fn with_doc<F, R>(&self, f: F) -> DocumentResult<R>
    where
        F: FnOnce(&Document) -> DocumentResult<R>,
    {
        let _guard = self.lock.lock();
        let doc = Document::from_bytes(&self.data, PDF_MIME)?;
        f(&doc)
    }

    /// Width and height of one page in points.
    pub fn page_geometry(&self, page_index: usize) -> DocumentResult<PageGeometry> {
        if page_index >= self.page_count {
            return Err(DocumentError::PageNotFound(page_index));
        }

        self.with_doc(|doc| {
            let page = doc.load_page(page_index as i32)?;
            let bounds = page.bounds()?;
            Ok(PageGeometry {
                width: bounds.x1 - bounds.x0,
                height: bounds.y1 - bounds.y0,
            })
        })
    }
}
