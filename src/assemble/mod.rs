//! Final document assembly
//!
//! Merges the ordered batch sub-documents into one output PDF. Merging is
//! order-independent of caller scheduling: results are sorted by batch
//! index before anything is appended. What happens to the page range of a
//! failed batch is policy: the default restores the original, un-OCR'd
//! pages so the output always matches the source's page count and order.

use std::collections::HashMap;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::batch::{BatchResult, BatchStatus};
use crate::config::FailedBatchPolicy;
use crate::document::{DocumentError, DocumentResult, SourceDocument};
use crate::overlay::page::{finalize_document, new_output_document};

/// Merges batch results into the final document.
pub struct DocumentAssembler {
    policy: FailedBatchPolicy,
}

impl DocumentAssembler {
    pub fn new(policy: FailedBatchPolicy) -> Self {
        Self { policy }
    }

    /// Merge `results` into one PDF.
    ///
    /// Fails with [`DocumentError::NoUsableBatches`] only when batches
    /// existed, none produced bytes, and the drop policy leaves nothing to
    /// restore. A zero-page source merges into a valid empty document.
    pub fn merge(
        &self,
        source: &SourceDocument,
        mut results: Vec<BatchResult>,
    ) -> DocumentResult<Vec<u8>> {
        results.sort_by_key(|r| r.batch_index);

        let usable = results
            .iter()
            .filter(|r| r.status == BatchStatus::Ok && r.bytes.is_some())
            .count();
        if !results.is_empty() && usable == 0 && self.policy == FailedBatchPolicy::Drop {
            return Err(DocumentError::NoUsableBatches);
        }

        let (mut doc, pages_id) = new_output_document();
        let mut kids = Vec::new();
        // Parsed lazily, only when a failed range has to be restored.
        let mut original: Option<Document> = None;

        for result in &results {
            let batch_doc = match (&result.status, &result.bytes) {
                (BatchStatus::Ok, Some(bytes)) => match Document::load_mem(bytes) {
                    Ok(parsed) => Some(parsed),
                    Err(e) => {
                        tracing::warn!(
                            batch = result.batch_index,
                            "batch bytes unreadable, applying failed-batch policy: {}",
                            e
                        );
                        None
                    }
                },
                _ => None,
            };

            match batch_doc {
                Some(parsed) => {
                    for (_, page_id) in parsed.get_pages() {
                        kids.push(import_page(&mut doc, &parsed, page_id, pages_id)?);
                    }
                }
                None => match self.policy {
                    FailedBatchPolicy::Drop => {
                        tracing::warn!(
                            batch = result.batch_index,
                            pages = ?result.pages,
                            "dropping pages of failed batch"
                        );
                    }
                    FailedBatchPolicy::PreserveOriginal => {
                        self.restore_range(&mut doc, pages_id, &mut kids, &mut original, source, result);
                    }
                },
            }
        }

        finalize_document(doc, pages_id, kids)
    }

    /// Import the original pages of a failed batch's range.
    fn restore_range(
        &self,
        doc: &mut Document,
        pages_id: ObjectId,
        kids: &mut Vec<ObjectId>,
        original: &mut Option<Document>,
        source: &SourceDocument,
        result: &BatchResult,
    ) {
        if original.is_none() {
            match Document::load_mem(&source.bytes()) {
                Ok(parsed) => *original = Some(parsed),
                Err(e) => {
                    tracing::warn!(
                        batch = result.batch_index,
                        "cannot reparse source to restore failed batch: {}",
                        e
                    );
                    return;
                }
            }
        }
        let parsed = match original.as_ref() {
            Some(parsed) => parsed,
            None => return,
        };

        let page_map = parsed.get_pages();
        for page_index in result.pages.clone() {
            let page_number = (page_index + 1) as u32;
            let Some(&src_page_id) = page_map.get(&page_number) else {
                continue;
            };
            match import_page(doc, parsed, src_page_id, pages_id) {
                Ok(page_id) => kids.push(page_id),
                Err(e) => {
                    tracing::warn!(page = page_index, "failed to restore original page: {}", e);
                }
            }
        }
    }
}

/// Deep-copy a page's object graph from `source` into `target`.
///
/// Attributes the page inherits through its Pages ancestors (resources,
/// boxes, rotation) are materialized onto the copied page dictionary first,
/// since the ancestor chain does not come along. Reference cycles (page →
/// annotation → page) are handled by reserving the target id before
/// descending.
pub(crate) fn import_page(
    target: &mut Document,
    source: &Document,
    src_page_id: ObjectId,
    parent: ObjectId,
) -> DocumentResult<ObjectId> {
    let mut page_dict = source.get_dictionary(src_page_id)?.clone();

    for key in [&b"Resources"[..], b"MediaBox", b"CropBox", b"Rotate"] {
        if !page_dict.has(key) {
            if let Some(value) = inherited_attribute(source, src_page_id, key) {
                page_dict.set(key, value);
            }
        }
    }
    page_dict.remove(b"Parent");

    let page_id = target.new_object_id();
    let mut id_map = HashMap::new();
    id_map.insert(src_page_id, page_id);

    let mut cloned = clone_dictionary(target, source, &page_dict, &mut id_map)?;
    cloned.set("Parent", parent);
    target.objects.insert(page_id, Object::Dictionary(cloned));
    Ok(page_id)
}

/// Walk the Parent chain looking for an inheritable attribute.
fn inherited_attribute(source: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = page_id;
    loop {
        let dict = source.get_dictionary(current).ok()?;
        if current != page_id {
            if let Ok(value) = dict.get(key) {
                return Some(value.clone());
            }
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(parent_id)) => current = *parent_id,
            _ => return None,
        }
    }
}

fn clone_object(
    target: &mut Document,
    source: &Document,
    object: &Object,
    id_map: &mut HashMap<ObjectId, ObjectId>,
) -> DocumentResult<Object> {
    Ok(match object {
        Object::Reference(src_id) => {
            let new_id = match id_map.get(src_id) {
                Some(&mapped) => mapped,
                None => {
                    let new_id = target.new_object_id();
                    id_map.insert(*src_id, new_id);
                    // A dangling reference degrades to Null rather than
                    // failing the whole page.
                    let cloned = match source.get_object(*src_id) {
                        Ok(referenced) => {
                            let referenced = referenced.clone();
                            clone_object(target, source, &referenced, id_map)?
                        }
                        Err(_) => Object::Null,
                    };
                    target.objects.insert(new_id, cloned);
                    new_id
                }
            };
            Object::Reference(new_id)
        }
        Object::Dictionary(dict) => {
            Object::Dictionary(clone_dictionary(target, source, dict, id_map)?)
        }
        Object::Array(array) => {
            let mut cloned = Vec::with_capacity(array.len());
            for item in array {
                cloned.push(clone_object(target, source, item, id_map)?);
            }
            Object::Array(cloned)
        }
        Object::Stream(stream) => {
            let dict = clone_dictionary(target, source, &stream.dict, id_map)?;
            Object::Stream(Stream::new(dict, stream.content.clone()))
        }
        other => other.clone(),
    })
}

fn clone_dictionary(
    target: &mut Document,
    source: &Document,
    dict: &Dictionary,
    id_map: &mut HashMap<ObjectId, ObjectId>,
) -> DocumentResult<Dictionary> {
    let mut cloned = Dictionary::new();
    for (key, value) in dict.iter() {
        cloned.set(key.clone(), clone_object(target, source, value, id_map)?);
    }
    Ok(cloned)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::document::PageGeometry;
    use crate::overlay::page::{append_page, finalize_document, new_output_document};
    use crate::overlay::OverlayPage;

    /// A tiny valid PDF with `pages` blank US Letter pages.
    pub fn minimal_pdf(pages: usize) -> Vec<u8> {
        let (mut doc, pages_id) = new_output_document();
        let mut kids = Vec::new();
        for _ in 0..pages {
            let overlay = OverlayPage::empty(PageGeometry {
                width: 612.0,
                height: 792.0,
            });
            kids.push(append_page(&mut doc, pages_id, &overlay, None).unwrap());
        }
        finalize_document(doc, pages_id, kids).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::minimal_pdf;
    use super::*;

    fn ok_batch(index: usize, pages: std::ops::Range<usize>, page_count: usize) -> BatchResult {
        BatchResult {
            bytes: Some(minimal_pdf(page_count)),
            batch_index: index,
            pages,
            status: BatchStatus::Ok,
            outcomes: Vec::new(),
        }
    }

    fn failed_batch(index: usize, pages: std::ops::Range<usize>) -> BatchResult {
        BatchResult {
            bytes: None,
            batch_index: index,
            pages,
            status: BatchStatus::Failed,
            outcomes: Vec::new(),
        }
    }

    #[test]
    fn test_merge_preserves_batch_order_regardless_of_input_order() {
        let source = SourceDocument::from_bytes(minimal_pdf(4)).unwrap();
        let assembler = DocumentAssembler::new(FailedBatchPolicy::Drop);
        // Deliver out of order
        let results = vec![ok_batch(1, 2..4, 2), ok_batch(0, 0..2, 2)];
        let merged = assembler.merge(&source, results).unwrap();
        let doc = Document::load_mem(&merged).unwrap();
        assert_eq!(doc.get_pages().len(), 4);
    }

    #[test]
    fn test_failed_batch_dropped_under_drop_policy() {
        let source = SourceDocument::from_bytes(minimal_pdf(4)).unwrap();
        let assembler = DocumentAssembler::new(FailedBatchPolicy::Drop);
        let results = vec![ok_batch(0, 0..2, 2), failed_batch(1, 2..4)];
        let merged = assembler.merge(&source, results).unwrap();
        let doc = Document::load_mem(&merged).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
    }

    #[test]
    fn test_failed_batch_restored_under_preserve_policy() {
        let source = SourceDocument::from_bytes(minimal_pdf(4)).unwrap();
        let assembler = DocumentAssembler::new(FailedBatchPolicy::PreserveOriginal);
        let results = vec![ok_batch(0, 0..2, 2), failed_batch(1, 2..4)];
        let merged = assembler.merge(&source, results).unwrap();
        let doc = Document::load_mem(&merged).unwrap();
        assert_eq!(doc.get_pages().len(), 4);
    }

    #[test]
    fn test_all_failed_drop_policy_errors() {
        let source = SourceDocument::from_bytes(minimal_pdf(4)).unwrap();
        let assembler = DocumentAssembler::new(FailedBatchPolicy::Drop);
        let results = vec![failed_batch(0, 0..2), failed_batch(1, 2..4)];
        assert!(matches!(
            assembler.merge(&source, results),
            Err(DocumentError::NoUsableBatches)
        ));
    }

    #[test]
    fn test_all_failed_preserve_policy_restores_everything() {
        let source = SourceDocument::from_bytes(minimal_pdf(4)).unwrap();
        let assembler = DocumentAssembler::new(FailedBatchPolicy::PreserveOriginal);
        let results = vec![failed_batch(0, 0..2), failed_batch(1, 2..4)];
        let merged = assembler.merge(&source, results).unwrap();
        let doc = Document::load_mem(&merged).unwrap();
        assert_eq!(doc.get_pages().len(), 4);
    }

    #[test]
    fn test_no_batches_produces_empty_document() {
        let source = SourceDocument::from_bytes(minimal_pdf(1)).unwrap();
        let assembler = DocumentAssembler::new(FailedBatchPolicy::Drop);
        let merged = assembler.merge(&source, Vec::new()).unwrap();
        let doc = Document::load_mem(&merged).unwrap();
        assert_eq!(doc.get_pages().len(), 0);
    }

    #[test]
    fn test_import_page_materializes_inherited_mediabox() {
        // minimal_pdf pages carry their own MediaBox; build a source whose
        // page inherits it from the Pages node instead.
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(lopdf::dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(lopdf::dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1i64,
                "MediaBox" => vec![
                    0i64.into(),
                    0i64.into(),
                    300i64.into(),
                    400i64.into(),
                ],
            }),
        );
        let catalog_id = doc.add_object(lopdf::dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let (mut target, target_pages) = new_output_document();
        let imported = import_page(&mut target, &doc, page_id, target_pages).unwrap();
        let dict = target.get_dictionary(imported).unwrap();
        assert!(dict.has(b"MediaBox"));
    }
}
