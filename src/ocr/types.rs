//! Recognition result types

use thiserror::Error;

/// One recognized run of text.
///
/// `origin` is the baseline start in PDF user space: points, origin at the
/// page's bottom-left corner, y growing upward. Recognizers that only see
/// pixels own the pixel-to-point conversion, since only they know the
/// image's dpi. `None` means the engine supplied no geometry and the span
/// will be laid out on the synthetic grid.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub content: String,
    pub origin: Option<(f32, f32)>,
    pub font_size: Option<f32>,
}

impl TextSpan {
    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            origin: None,
            font_size: None,
        }
    }

    pub fn positioned(content: impl Into<String>, x: f32, y: f32, font_size: f32) -> Self {
        Self {
            content: content.into(),
            origin: Some((x, y)),
            font_size: Some(font_size),
        }
    }
}

/// Recognition result for one page.
///
/// Span order is reading order as returned by the engine; nothing here
/// reorders it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecognizedText {
    pub spans: Vec<TextSpan>,
}

impl RecognizedText {
    pub fn empty() -> Self {
        Self { spans: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Degrade plain engine output to line-ordered spans with no geometry.
    /// Blank lines carry no text worth placing and are skipped.
    pub fn from_plain_text(text: &str) -> Self {
        let spans = text
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.trim().is_empty())
            .map(TextSpan::plain)
            .collect();
        Self { spans }
    }
}

/// Recognition error taxonomy.
///
/// Every variant is page-level: none of these may abort a batch or the job.
#[derive(Debug, Error)]
pub enum OcrError {
    /// Network-ish condition against a remote engine; retrying later might
    /// succeed.
    #[error("recognition service unreachable: {0}")]
    Transient(String),

    /// The bounded per-request timeout elapsed.
    #[error("recognition request timed out")]
    Timeout,

    /// The page image itself is unusable.
    #[error("malformed page image: {0}")]
    Permanent(String),

    /// The engine is not installed or not reachable at all.
    #[error("recognition engine not available: {0}")]
    Unavailable(String),
}

impl OcrError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout)
    }
}
