//! Pipeline configuration
//!
//! All tuning knobs live here as named fields with documented defaults.
//! `batch_size` and `render_dpi` are the two memory-ceiling levers: a batch
//! holds at most `batch_size` encoded page images plus one open document
//! handle at a time.

use std::time::Duration;

/// What a composed page uses as its visual content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageContent {
    /// Embed the rendered raster image of the page. Output pages look like
    /// the scan that was fed to OCR.
    Rasterized,
    /// Import the original page's object graph verbatim and stack the text
    /// layer on top. Preserves vector content where the source has any.
    Original,
}

/// What the assembler does with the page range of a failed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedBatchPolicy {
    /// Fill the range with the original, un-OCR'd pages so the final
    /// document always has the source's page count and order.
    PreserveOriginal,
    /// Omit the range entirely.
    Drop,
}

/// Configuration for an [`OcrPipeline`](crate::pipeline::OcrPipeline).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Pages per batch. Smaller batches lower peak memory but add
    /// batch-merge overhead. Default: 20.
    pub batch_size: usize,
    /// Rasterization resolution in dots per inch. Higher values improve
    /// recognition at the cost of per-page memory. Default: 150.
    pub render_dpi: f32,
    /// Timeout for one remote recognition request. Default: 60 s.
    pub request_timeout: Duration,
    /// Delay inserted between consecutive remote requests to respect
    /// provider rate limits. Default: 500 ms.
    pub request_delay: Duration,
    /// Cap on grid-laid-out lines placed per page. Default: 120.
    pub max_lines_per_overlay: usize,
    /// Cap on characters per grid-laid-out line. Default: 200.
    pub max_chars_per_line: usize,
    /// Spans reporting a size below this floor use `default_font_size`
    /// instead, in points. Default: 4.0.
    pub min_font_size: f32,
    /// Font size for spans with no usable size metadata, in points.
    /// Default: 10.0.
    pub default_font_size: f32,
    /// Left and top margin of the synthetic grid layout, in points.
    /// Default: 36.0.
    pub overlay_margin: f32,
    /// Baseline-to-baseline distance of the grid layout, in points.
    /// Default: 12.0.
    pub line_pitch: f32,
    /// Language hint passed to recognizers. Default: "eng".
    pub language: String,
    /// Visual content of composed pages. Default: `Rasterized`.
    pub page_content: PageContent,
    /// Policy for pages belonging to a failed batch.
    /// Default: `PreserveOriginal`.
    pub failed_batch_policy: FailedBatchPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            render_dpi: 150.0,
            request_timeout: Duration::from_secs(60),
            request_delay: Duration::from_millis(500),
            max_lines_per_overlay: 120,
            max_chars_per_line: 200,
            min_font_size: 4.0,
            default_font_size: 10.0,
            overlay_margin: 36.0,
            line_pitch: 12.0,
            language: "eng".to_string(),
            page_content: PageContent::Rasterized,
            failed_batch_policy: FailedBatchPolicy::PreserveOriginal,
        }
    }
}

impl PipelineConfig {
    /// Build a configuration from `SCANLAYER_*` environment variables,
    /// falling back to defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_parse::<usize>("SCANLAYER_BATCH_SIZE") {
            config.batch_size = v.max(1);
        }
        if let Some(v) = env_parse::<f32>("SCANLAYER_RENDER_DPI") {
            config.render_dpi = v;
        }
        if let Some(v) = env_parse::<u64>("SCANLAYER_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<u64>("SCANLAYER_REQUEST_DELAY_MS") {
            config.request_delay = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<usize>("SCANLAYER_MAX_LINES_PER_OVERLAY") {
            config.max_lines_per_overlay = v;
        }
        if let Some(v) = env_parse::<usize>("SCANLAYER_MAX_CHARS_PER_LINE") {
            config.max_chars_per_line = v;
        }
        if let Ok(v) = std::env::var("SCANLAYER_LANGUAGE") {
            if !v.trim().is_empty() {
                config.language = v;
            }
        }
        if let Ok(v) = std::env::var("SCANLAYER_PAGE_CONTENT") {
            match v.to_lowercase().as_str() {
                "raster" | "rasterized" => config.page_content = PageContent::Rasterized,
                "original" => config.page_content = PageContent::Original,
                other => tracing::warn!("unknown SCANLAYER_PAGE_CONTENT value: {}", other),
            }
        }
        if let Ok(v) = std::env::var("SCANLAYER_FAILED_BATCH_POLICY") {
            match v.to_lowercase().as_str() {
                "preserve" => config.failed_batch_policy = FailedBatchPolicy::PreserveOriginal,
                "drop" => config.failed_batch_policy = FailedBatchPolicy::Drop,
                other => tracing::warn!("unknown SCANLAYER_FAILED_BATCH_POLICY value: {}", other),
            }
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("ignoring unparseable {}={}", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.page_content, PageContent::Rasterized);
        assert_eq!(
            config.failed_batch_policy,
            FailedBatchPolicy::PreserveOriginal
        );
    }

    #[test]
    fn test_from_env_overrides() {
        std::env::set_var("SCANLAYER_BATCH_SIZE", "5");
        std::env::set_var("SCANLAYER_FAILED_BATCH_POLICY", "drop");
        let config = PipelineConfig::from_env();
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.failed_batch_policy, FailedBatchPolicy::Drop);
        std::env::remove_var("SCANLAYER_BATCH_SIZE");
        std::env::remove_var("SCANLAYER_FAILED_BATCH_POLICY");
    }

    #[test]
    fn test_from_env_rejects_garbage() {
        std::env::set_var("SCANLAYER_RENDER_DPI", "not-a-number");
        let config = PipelineConfig::from_env();
        assert_eq!(config.render_dpi, 150.0);
        std::env::remove_var("SCANLAYER_RENDER_DPI");
    }
}
