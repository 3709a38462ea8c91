//! Recognizer capability trait and local backends

use async_trait::async_trait;

use super::types::{OcrError, RecognizedText};
use crate::render::PageImage;

/// Text recognition capability.
///
/// Implementations must be cheap to call sequentially once per page; any
/// rate limiting or timeout handling lives inside the implementation.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Short engine name, used in logs.
    fn engine_name(&self) -> &'static str;

    /// Whether the engine can be used at all.
    async fn is_available(&self) -> bool {
        true
    }

    /// Recognize the text on one page image.
    async fn recognize(
        &self,
        image: &PageImage,
        language: Option<&str>,
    ) -> Result<RecognizedText, OcrError>;
}

/// Recognizer that returns empty text unconditionally.
///
/// Used for visual-only conversion: every page keeps its content and gets
/// no text layer.
pub struct NoopRecognizer;

#[async_trait]
impl TextRecognizer for NoopRecognizer {
    fn engine_name(&self) -> &'static str {
        "none"
    }

    async fn recognize(
        &self,
        _image: &PageImage,
        _language: Option<&str>,
    ) -> Result<RecognizedText, OcrError> {
        Ok(RecognizedText::empty())
    }
}

/// Local tesseract backend. Shells out to the `tesseract` binary and parses
/// its TSV output into positioned word spans.
#[cfg(feature = "ocr-tesseract")]
pub struct TesseractRecognizer {
    default_language: String,
}

#[cfg(feature = "ocr-tesseract")]
impl TesseractRecognizer {
    pub fn new(default_language: &str) -> Self {
        Self {
            default_language: default_language.to_string(),
        }
    }
}

#[cfg(feature = "ocr-tesseract")]
#[async_trait]
impl TextRecognizer for TesseractRecognizer {
    fn engine_name(&self) -> &'static str {
        "tesseract"
    }

    async fn is_available(&self) -> bool {
        tokio::process::Command::new("tesseract")
            .arg("--version")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    async fn recognize(
        &self,
        image: &PageImage,
        language: Option<&str>,
    ) -> Result<RecognizedText, OcrError> {
        if image.data.is_empty() {
            return Err(OcrError::Permanent("zero-byte image".to_string()));
        }

        let lang = language.unwrap_or(&self.default_language);

        let temp_dir = std::env::temp_dir();
        let unique_id = uuid::Uuid::new_v4();
        let input_path = temp_dir.join(format!("scanlayer_ocr_{}.jpg", unique_id));
        let output_base = temp_dir.join(format!("scanlayer_ocr_{}", unique_id));

        tokio::fs::write(&input_path, &image.data)
            .await
            .map_err(|e| OcrError::Unavailable(format!("failed to write temp image: {}", e)))?;

        let output = tokio::process::Command::new("tesseract")
            .arg(&input_path)
            .arg(&output_base)
            .arg("-l")
            .arg(lang)
            .arg("tsv")
            .output()
            .await;

        let _ = tokio::fs::remove_file(&input_path).await;

        let output = output
            .map_err(|e| OcrError::Unavailable(format!("failed to run tesseract: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Permanent(format!("tesseract failed: {}", stderr)));
        }

        let tsv_path = format!("{}.tsv", output_base.display());
        let tsv = tokio::fs::read_to_string(&tsv_path).await;
        let _ = tokio::fs::remove_file(&tsv_path).await;

        let tsv = tsv
            .map_err(|e| OcrError::Permanent(format!("failed to read tesseract output: {}", e)))?;

        Ok(parse_tesseract_tsv(&tsv, image))
    }
}

/// Parse tesseract TSV output into line-grouped, positioned spans.
///
/// TSV columns: level, page_num, block_num, par_num, line_num, word_num,
/// left, top, width, height, conf, text. Word rows (level 5) within the
/// same (block, par, line) are joined into one span whose baseline sits at
/// the bottom of the line box.
#[cfg(any(feature = "ocr-tesseract", test))]
pub(crate) fn parse_tesseract_tsv(tsv: &str, image: &PageImage) -> RecognizedText {
    use super::types::TextSpan;

    struct LineAcc {
        key: (u32, u32, u32),
        words: Vec<String>,
        left: f32,
        bottom: f32,
        height: f32,
    }

    let scale = 72.0 / image.dpi;
    let image_height = image.height as f32;
    let mut spans = Vec::new();
    let mut current: Option<LineAcc> = None;

    let flush = |acc: Option<LineAcc>, spans: &mut Vec<TextSpan>| {
        if let Some(acc) = acc {
            if !acc.words.is_empty() {
                spans.push(TextSpan::positioned(
                    acc.words.join(" "),
                    acc.left * scale,
                    (image_height - acc.bottom) * scale,
                    acc.height * scale,
                ));
            }
        }
    };

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }
        if cols[0] != "5" {
            continue;
        }
        let text = cols[11].trim();
        if text.is_empty() {
            continue;
        }
        let parse = |i: usize| cols[i].parse::<f32>().unwrap_or(0.0);
        let key = (
            cols[2].parse().unwrap_or(0),
            cols[3].parse().unwrap_or(0),
            cols[4].parse().unwrap_or(0),
        );
        let left = parse(6);
        let top = parse(7);
        let height = parse(9);
        let bottom = top + height;

        match current.as_mut() {
            Some(acc) if acc.key == key => {
                acc.words.push(text.to_string());
                acc.bottom = acc.bottom.max(bottom);
                acc.height = acc.height.max(height);
            }
            _ => {
                flush(current.take(), &mut spans);
                current = Some(LineAcc {
                    key,
                    words: vec![text.to_string()],
                    left,
                    bottom,
                    height,
                });
            }
        }
    }
    flush(current.take(), &mut spans);

    RecognizedText { spans }
}

/// Scripted recognizer for unit tests.
#[cfg(test)]
pub(crate) struct MockRecognizer {
    pub response: RecognizedText,
}

#[cfg(test)]
#[async_trait]
impl TextRecognizer for MockRecognizer {
    fn engine_name(&self) -> &'static str {
        "mock"
    }

    async fn recognize(
        &self,
        _image: &PageImage,
        _language: Option<&str>,
    ) -> Result<RecognizedText, OcrError> {
        Ok(self.response.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_image() -> PageImage {
        PageImage {
            data: vec![0xFF, 0xD8],
            width: 850,
            height: 1100,
            dpi: 100.0,
        }
    }

    #[tokio::test]
    async fn test_noop_returns_empty() {
        let recognizer = NoopRecognizer;
        let result = recognizer.recognize(&test_image(), None).await.unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_tsv_parsing_groups_lines() {
        let tsv = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
                   1\t1\t0\t0\t0\t0\t0\t0\t850\t1100\t-1\t\n\
                   5\t1\t1\t1\t1\t1\t100\t100\t80\t20\t96\tHello\n\
                   5\t1\t1\t1\t1\t2\t190\t100\t90\t20\t95\tWorld\n\
                   5\t1\t1\t1\t2\t1\t100\t140\t60\t20\t91\tNext\n";
        let text = parse_tesseract_tsv(tsv, &test_image());

        assert_eq!(text.spans.len(), 2);
        assert_eq!(text.spans[0].content, "Hello World");
        assert_eq!(text.spans[1].content, "Next");

        // 100 px at 100 dpi is 72 pt; baseline at image bottom minus line
        // bottom (120 px -> 1100-120=980 px -> 705.6 pt)
        let (x, y) = text.spans[0].origin.unwrap();
        assert!((x - 72.0).abs() < 0.01);
        assert!((y - 705.6).abs() < 0.01);
        assert!((text.spans[0].font_size.unwrap() - 14.4).abs() < 0.01);
    }

    #[test]
    fn test_tsv_parsing_ignores_non_word_rows() {
        let tsv = "header\n4\t1\t1\t1\t1\t0\t0\t0\t1\t1\t-1\t\nnot-enough-columns\n";
        let text = parse_tesseract_tsv(tsv, &test_image());
        assert!(text.is_empty());
    }
}
