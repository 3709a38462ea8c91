//! Overlay composition
//!
//! Turns a page's recognition result into a resolved set of placed text
//! spans. Composition is pure geometry: it never fails, and an empty
//! recognition result produces an empty overlay. The PDF writing side
//! (invisible text layer, page construction) lives in [`page`].

pub mod page;

use crate::config::PipelineConfig;
use crate::document::PageGeometry;
use crate::ocr::RecognizedText;

/// A span resolved to an absolute baseline position and font size.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedSpan {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub font_size: f32,
}

/// Resolved overlay for one page.
#[derive(Debug, Clone)]
pub struct OverlayPage {
    pub geometry: PageGeometry,
    pub spans: Vec<PlacedSpan>,
}

impl OverlayPage {
    pub fn empty(geometry: PageGeometry) -> Self {
        Self {
            geometry,
            spans: Vec::new(),
        }
    }
}

/// Lays out recognized text over a page.
///
/// Spans with engine-reported geometry are placed at their origin, clamped
/// into the page box. Spans without geometry flow on a synthetic grid from
/// the top margin down at a fixed line pitch. Both the per-line character
/// count and the total number of placed lines are capped to bound the
/// layer's size; the caps and grid metrics are configuration, not
/// constants.
pub struct OverlayComposer {
    max_lines: usize,
    max_chars: usize,
    min_font_size: f32,
    default_font_size: f32,
    margin: f32,
    line_pitch: f32,
}

impl OverlayComposer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            max_lines: config.max_lines_per_overlay,
            max_chars: config.max_chars_per_line,
            min_font_size: config.min_font_size,
            default_font_size: config.default_font_size,
            margin: config.overlay_margin,
            line_pitch: config.line_pitch,
        }
    }

    /// Resolve span placement. Always succeeds; reading order is preserved.
    pub fn compose(&self, geometry: PageGeometry, recognized: &RecognizedText) -> OverlayPage {
        let mut spans = Vec::new();
        let mut grid_line = 0usize;

        for span in &recognized.spans {
            if spans.len() >= self.max_lines {
                break;
            }

            let text = truncate_chars(span.content.trim_end(), self.max_chars);
            if text.is_empty() {
                continue;
            }

            let font_size = match span.font_size {
                Some(size) if size >= self.min_font_size => size,
                _ => self.default_font_size,
            };

            let (x, y) = match span.origin {
                Some((x, y)) => (
                    x.clamp(0.0, geometry.width),
                    y.clamp(0.0, geometry.height),
                ),
                None => {
                    let y = geometry.height - self.margin - (grid_line as f32 + 1.0) * self.line_pitch;
                    if y < self.margin {
                        // Grid is full; this line would land in or below
                        // the bottom margin.
                        continue;
                    }
                    grid_line += 1;
                    (self.margin, y)
                }
            };

            spans.push(PlacedSpan {
                text,
                x,
                y,
                font_size,
            });
        }

        OverlayPage { geometry, spans }
    }
}

/// Truncate to at most `max` characters on a UTF-8 boundary.
fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
