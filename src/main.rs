//! Scanlayer CLI
//!
//! Thin driver around the library: reads a PDF, runs the OCR overlay
//! pipeline, writes the searchable result. Configuration comes from the
//! environment (see `PipelineConfig::from_env`); the recognizer backend is
//! selected with `SCANLAYER_OCR` (`remote`, `tesseract`, or `none`).

use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scanlayer::{
    NoopRecognizer, OcrPipeline, PipelineConfig, PipelineEvent, RemoteRecognizer, TextRecognizer,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scanlayer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let mut args = std::env::args().skip(1);
    let (input, output) = match (args.next(), args.next()) {
        (Some(input), Some(output)) => (input, output),
        _ => bail!("usage: scanlayer <input.pdf> <output.pdf>"),
    };

    let config = PipelineConfig::from_env();
    let recognizer = build_recognizer(&config)?;
    tracing::info!(
        engine = recognizer.engine_name(),
        batch_size = config.batch_size,
        dpi = config.render_dpi,
        "scanlayer v{}",
        env!("CARGO_PKG_VERSION")
    );

    let source_bytes =
        std::fs::read(&input).with_context(|| format!("failed to read {}", input))?;
    tracing::info!(
        input = %input,
        size_mb = format!("{:.1}", source_bytes.len() as f64 / (1024.0 * 1024.0)),
        "processing"
    );

    let started = Instant::now();
    let pipeline = OcrPipeline::new(config, recognizer);
    let result = pipeline
        .run(source_bytes, |event| match event {
            PipelineEvent::BatchCompleted { completed, total } => {
                tracing::info!("batch {}/{} done", completed, total);
            }
            PipelineEvent::PageWarning {
                page_index,
                message,
            } => {
                tracing::warn!("page {}: {}", page_index + 1, message);
            }
            PipelineEvent::BatchFailed { batch_index } => {
                tracing::warn!("batch {} failed", batch_index);
            }
        })
        .await
        .context("conversion failed")?;

    std::fs::write(&output, &result).with_context(|| format!("failed to write {}", output))?;
    tracing::info!(
        output = %output,
        size_mb = format!("{:.1}", result.len() as f64 / (1024.0 * 1024.0)),
        elapsed_secs = format!("{:.1}", started.elapsed().as_secs_f64()),
        "done"
    );

    Ok(())
}

fn build_recognizer(config: &PipelineConfig) -> anyhow::Result<Arc<dyn TextRecognizer>> {
    let engine = std::env::var("SCANLAYER_OCR").unwrap_or_else(|_| "none".to_string());
    match engine.to_lowercase().as_str() {
        "none" => Ok(Arc::new(NoopRecognizer)),
        "remote" => {
            let endpoint = std::env::var("SCANLAYER_OCR_ENDPOINT")
                .context("SCANLAYER_OCR=remote requires SCANLAYER_OCR_ENDPOINT")?;
            let api_key = std::env::var("SCANLAYER_OCR_API_KEY")
                .context("SCANLAYER_OCR=remote requires SCANLAYER_OCR_API_KEY")?;
            let recognizer = RemoteRecognizer::new(
                &endpoint,
                &api_key,
                config.request_timeout,
                config.request_delay,
            )?;
            Ok(Arc::new(recognizer))
        }
        #[cfg(feature = "ocr-tesseract")]
        "tesseract" => Ok(Arc::new(scanlayer::ocr::TesseractRecognizer::new(
            &config.language,
        ))),
        other => bail!("unknown SCANLAYER_OCR backend: {}", other),
    }
}
