//! Page rasterization
//!
//! Renders single pages of a [`SourceDocument`] to encoded JPEG buffers via
//! MuPDF. The resolution is fixed at construction: it is a quality/memory
//! trade-off for the whole job, not a per-call parameter, so batch memory
//! stays predictable.

use std::io::Cursor;

use image::DynamicImage;
use mupdf::{Colorspace, Document, Matrix};

use crate::document::{DocumentError, DocumentResult, PageGeometry, SourceDocument};

/// Raster image of exactly one page.
///
/// `data` is an encoded JPEG buffer; the same bytes are uploaded to
/// recognizers and embedded into output pages, so nothing is recompressed.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub dpi: f32,
}

/// Outcome of rendering one page within a range.
///
/// Rasterization failure is per-page data, not an error: the batch keeps
/// the page (with its original content and no overlay) and records the
/// reason.
pub struct RenderedPage {
    pub page_index: usize,
    pub geometry: PageGeometry,
    pub image: Result<PageImage, String>,
}

/// Rasterizes pages at a fixed dpi.
#[derive(Clone)]
pub struct PageRenderer {
    dpi: f32,
}

impl PageRenderer {
    /// Create a renderer. The dpi is clamped to a sane range; values
    /// outside it would produce unusable or pathologically large pixmaps.
    pub fn new(dpi: f32) -> Self {
        Self {
            dpi: dpi.clamp(36.0, 600.0),
        }
    }

    pub fn dpi(&self) -> f32 {
        self.dpi
    }

    /// Render one page, opening and closing a fresh document handle.
    pub fn render(&self, source: &SourceDocument, page_index: usize) -> DocumentResult<PageImage> {
        if page_index >= source.page_count() {
            return Err(DocumentError::PageNotFound(page_index));
        }
        source.with_doc(|doc| self.render_with(doc, page_index))
    }

    /// Render a contiguous page range against a single document handle.
    ///
    /// The handle is opened once, used for every page in the range, and
    /// dropped before this returns. Pages that fail to rasterize come back
    /// with their geometry (falling back to US Letter when even the bounds
    /// are unreadable) and the failure reason.
    pub fn render_range(
        &self,
        source: &SourceDocument,
        start: usize,
        end: usize,
    ) -> DocumentResult<Vec<RenderedPage>> {
        let end = end.min(source.page_count());
        source.with_doc(|doc| {
            let mut pages = Vec::with_capacity(end.saturating_sub(start));
            for page_index in start..end {
                let geometry = page_geometry(doc, page_index).unwrap_or_else(PageGeometry::letter);
                let image = self
                    .render_with(doc, page_index)
                    .map_err(|e| e.to_string());
                if let Err(reason) = &image {
                    tracing::warn!(page = page_index, "page rasterization failed: {}", reason);
                }
                pages.push(RenderedPage {
                    page_index,
                    geometry,
                    image,
                });
            }
            Ok(pages)
        })
    }

    fn render_with(&self, doc: &Document, page_index: usize) -> DocumentResult<PageImage> {
        let page = doc
            .load_page(page_index as i32)
            .map_err(|e| DocumentError::Render(e.to_string()))?;

        let scale = self.dpi / 72.0;
        let matrix = Matrix::new_scale(scale, scale);
        let colorspace = Colorspace::device_rgb();
        let pixmap = page
            .to_pixmap(&matrix, &colorspace, true, true)
            .map_err(|e| DocumentError::Render(e.to_string()))?;

        let (data, width, height) = encode_pixmap(&pixmap)?;
        Ok(PageImage {
            data,
            width,
            height,
            dpi: self.dpi,
        })
    }
}

fn page_geometry(doc: &Document, page_index: usize) -> DocumentResult<PageGeometry> {
    let page = doc.load_page(page_index as i32)?;
    let bounds = page.bounds()?;
    Ok(PageGeometry {
        width: bounds.x1 - bounds.x0,
        height: bounds.y1 - bounds.y0,
    })
}

fn encode_pixmap(pixmap: &mupdf::Pixmap) -> DocumentResult<(Vec<u8>, u32, u32)> {
    let width = pixmap.width() as u32;
    let height = pixmap.height() as u32;
    let samples = pixmap.samples();
    let n = pixmap.n() as usize;

    // Pixmap samples may carry an alpha channel; drop it for JPEG.
    let mut rgb_buffer = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height as usize {
        for x in 0..width as usize {
            let offset = (y * width as usize + x) * n;
            let r = samples.get(offset).copied().unwrap_or(0);
            let g = samples.get(offset + 1).copied().unwrap_or(0);
            let b = samples.get(offset + 2).copied().unwrap_or(0);
            rgb_buffer.extend_from_slice(&[r, g, b]);
        }
    }

    let img = image::RgbImage::from_raw(width, height, rgb_buffer)
        .ok_or_else(|| DocumentError::Image("failed to create image buffer".to_string()))?;

    let mut output = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut output), image::ImageFormat::Jpeg)
        .map_err(|e| DocumentError::Image(e.to_string()))?;

    Ok((output, width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::test_support::minimal_pdf;

    #[test]
    fn test_dpi_clamped() {
        assert_eq!(PageRenderer::new(10_000.0).dpi(), 600.0);
        assert_eq!(PageRenderer::new(1.0).dpi(), 36.0);
    }

    #[test]
    fn test_render_out_of_range() {
        let source = SourceDocument::from_bytes(minimal_pdf(1)).unwrap();
        let renderer = PageRenderer::new(72.0);
        assert!(matches!(
            renderer.render(&source, 9),
            Err(DocumentError::PageNotFound(9))
        ));
    }

    #[test]
    fn test_render_produces_jpeg_at_dpi() {
        let source = SourceDocument::from_bytes(minimal_pdf(1)).unwrap();
        let renderer = PageRenderer::new(72.0);
        let image = renderer.render(&source, 0).unwrap();
        // JPEG SOI marker
        assert_eq!(&image.data[..2], &[0xFF, 0xD8]);
        // 612x792 pts at 72 dpi is one pixel per point
        assert_eq!(image.width, 612);
        assert_eq!(image.height, 792);
        assert_eq!(image.dpi, 72.0);
    }

    #[test]
    fn test_render_range_clamps_end() {
        let source = SourceDocument::from_bytes(minimal_pdf(3)).unwrap();
        let renderer = PageRenderer::new(72.0);
        let pages = renderer.render_range(&source, 2, 10).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].page_index, 2);
        assert!(pages[0].image.is_ok());
    }
}
