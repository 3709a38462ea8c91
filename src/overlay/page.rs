//! PDF page writing
//!
//! Emits pages into a lopdf document: the visual content (an embedded JPEG
//! of the rendered page, or nothing when the original content is imported
//! separately) plus the invisible text layer. The layer uses text render
//! mode 3 (neither fill nor stroke), so it never paints but stays
//! selectable and searchable.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use super::OverlayPage;
use crate::document::{DocumentError, DocumentResult};
use crate::render::PageImage;

/// Resource name of the overlay font. Deliberately unusual so it cannot
/// collide with resources of imported original pages.
const FONT_NAME: &[u8] = b"Fsl0";
/// Resource name of the embedded page image.
const IMAGE_NAME: &[u8] = b"Imsl0";

/// Start a fresh output document. Returns the document and the reserved
/// object id of its page tree root.
pub fn new_output_document() -> (Document, ObjectId) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    (doc, pages_id)
}

/// Append one composed page. The visual content is the rendered page image
/// when given; the text layer comes from `overlay`. Returns the page's
/// object id for the caller's Kids array.
pub fn append_page(
    doc: &mut Document,
    pages_id: ObjectId,
    overlay: &OverlayPage,
    image: Option<&PageImage>,
) -> DocumentResult<ObjectId> {
    let mut resources = Dictionary::new();
    let mut operations: Vec<Operation> = Vec::new();

    if let Some(image) = image {
        let xobject_id = doc.add_object(jpeg_xobject(image));
        resources.set(
            "XObject",
            dictionary! { IMAGE_NAME => xobject_id },
        );

        // Stretch the unit image square over the full page box.
        operations.push(Operation::new("q", vec![]));
        operations.push(Operation::new(
            "cm",
            vec![
                overlay.geometry.width.into(),
                0i64.into(),
                0i64.into(),
                overlay.geometry.height.into(),
                0i64.into(),
                0i64.into(),
            ],
        ));
        operations.push(Operation::new(
            "Do",
            vec![Object::Name(IMAGE_NAME.to_vec())],
        ));
        operations.push(Operation::new("Q", vec![]));
    }

    if !overlay.spans.is_empty() {
        let font_id = doc.add_object(helvetica());
        resources.set("Font", dictionary! { FONT_NAME => font_id });
        operations.extend(text_operations(overlay));
    }

    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![
            0i64.into(),
            0i64.into(),
            overlay.geometry.width.into(),
            overlay.geometry.height.into(),
        ],
        "Resources" => resources,
        "Contents" => content_id,
    });

    Ok(page_id)
}

/// Stack a text layer onto a page that already exists in `doc` (an
/// imported original page). Appends an extra content stream and merges the
/// overlay font into the page's resources.
pub fn overlay_text_onto_page(
    doc: &mut Document,
    page_id: ObjectId,
    overlay: &OverlayPage,
) -> DocumentResult<()> {
    if overlay.spans.is_empty() {
        return Ok(());
    }

    let content = Content {
        operations: text_operations(overlay),
    };
    let stream_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
    let font_id = doc.add_object(helvetica());

    let mut page_dict = doc.get_dictionary(page_id)?.clone();

    let mut resources = match page_dict.get(b"Resources") {
        Ok(Object::Dictionary(dict)) => dict.clone(),
        Ok(Object::Reference(rid)) => doc.get_dictionary(*rid)?.clone(),
        _ => Dictionary::new(),
    };
    let mut fonts = match resources.get(b"Font") {
        Ok(Object::Dictionary(dict)) => dict.clone(),
        Ok(Object::Reference(rid)) => doc.get_dictionary(*rid)?.clone(),
        _ => Dictionary::new(),
    };
    fonts.set(FONT_NAME, font_id);
    resources.set("Font", fonts);
    page_dict.set("Resources", resources);

    let mut contents: Vec<Object> = match page_dict.get(b"Contents") {
        Ok(Object::Array(array)) => array.clone(),
        Ok(reference @ Object::Reference(_)) => vec![reference.clone()],
        _ => Vec::new(),
    };
    contents.push(Object::Reference(stream_id));
    page_dict.set("Contents", contents);

    doc.objects.insert(page_id, Object::Dictionary(page_dict));
    Ok(())
}

/// Close the page tree, attach the catalog, compress and serialize.
pub fn finalize_document(
    mut doc: Document,
    pages_id: ObjectId,
    kids: Vec<ObjectId>,
) -> DocumentResult<Vec<u8>> {
    let count = kids.len() as i64;
    let kids: Vec<Object> = kids.into_iter().map(Object::Reference).collect();

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| DocumentError::Assembly(e.to_string()))?;
    Ok(bytes)
}

/// The invisible text layer: one text object, render mode 3, absolute text
/// matrix per span.
fn text_operations(overlay: &OverlayPage) -> Vec<Operation> {
    let mut operations = Vec::with_capacity(overlay.spans.len() * 3 + 3);
    operations.push(Operation::new("BT", vec![]));
    operations.push(Operation::new("Tr", vec![3i64.into()]));
    for span in &overlay.spans {
        operations.push(Operation::new(
            "Tf",
            vec![Object::Name(FONT_NAME.to_vec()), span.font_size.into()],
        ));
        operations.push(Operation::new(
            "Tm",
            vec![
                1i64.into(),
                0i64.into(),
                0i64.into(),
                1i64.into(),
                span.x.into(),
                span.y.into(),
            ],
        ));
        operations.push(Operation::new(
            "Tj",
            vec![Object::string_literal(span.text.clone())],
        ));
    }
    operations.push(Operation::new("ET", vec![]));
    operations
}

fn helvetica() -> Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    }
}

fn jpeg_xobject(image: &PageImage) -> Stream {
    Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => image.width as i64,
            "Height" => image.height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8i64,
            "Filter" => "DCTDecode",
        },
        image.data.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::PageGeometry;
    use crate::overlay::PlacedSpan;

    fn overlay_with(spans: Vec<PlacedSpan>) -> OverlayPage {
        OverlayPage {
            geometry: PageGeometry {
                width: 612.0,
                height: 792.0,
            },
            spans,
        }
    }

    fn span(text: &str) -> PlacedSpan {
        PlacedSpan {
            text: text.to_string(),
            x: 36.0,
            y: 700.0,
            font_size: 10.0,
        }
    }

    #[test]
    fn test_text_operations_use_render_mode_3() {
        let ops = text_operations(&overlay_with(vec![span("hello")]));
        let tr = ops.iter().find(|op| op.operator == "Tr").unwrap();
        assert_eq!(tr.operands[0], Object::Integer(3));
        assert!(ops.iter().any(|op| op.operator == "Tj"));
    }

    #[test]
    fn test_roundtrip_single_page() {
        let (mut doc, pages_id) = new_output_document();
        let page_id =
            append_page(&mut doc, pages_id, &overlay_with(vec![span("hello")]), None).unwrap();
        let bytes = finalize_document(doc, pages_id, vec![page_id]).unwrap();

        let reloaded = Document::load_mem(&bytes).unwrap();
        assert_eq!(reloaded.get_pages().len(), 1);
    }

    #[test]
    fn test_empty_overlay_page_has_no_text_object() {
        let (mut doc, pages_id) = new_output_document();
        let page_id = append_page(&mut doc, pages_id, &overlay_with(vec![]), None).unwrap();
        let bytes = finalize_document(doc, pages_id, vec![page_id]).unwrap();

        let reloaded = Document::load_mem(&bytes).unwrap();
        let (_, page_id) = reloaded.get_pages().into_iter().next().unwrap();
        let content = reloaded.get_page_content(page_id).unwrap();
        let decoded = Content::decode(&content).unwrap();
        assert!(!decoded.operations.iter().any(|op| op.operator == "Tj"));
    }
}
