//! Remote HTTP recognition backend
//!
//! One multipart request per page against a provider endpoint, with a
//! bounded timeout and an explicit inter-request delay. Provider-reported
//! processing errors degrade to an empty result (the page keeps its visual
//! content with no text layer); only network-level conditions surface as
//! transient errors.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;

use super::provider::TextRecognizer;
use super::types::{OcrError, RecognizedText};
use crate::render::PageImage;

/// Response shape reported by the remote provider.
///
/// A different provider can be used by fronting it with an adapter that
/// produces these three fields.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RemoteResponse {
    #[serde(default)]
    is_errored_on_processing: bool,
    #[serde(default)]
    parsed_text: String,
    #[serde(default)]
    error_message: String,
}

/// Recognizer backed by a remote HTTP OCR endpoint.
pub struct RemoteRecognizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    request_delay: Duration,
    last_request: tokio::sync::Mutex<Option<Instant>>,
}

impl RemoteRecognizer {
    /// Build a recognizer for `endpoint`, authenticated with `api_key`.
    ///
    /// `request_timeout` bounds each request; `request_delay` is the
    /// minimum spacing between consecutive requests.
    pub fn new(
        endpoint: &str,
        api_key: &str,
        request_timeout: Duration,
        request_delay: Duration,
    ) -> Result<Self, OcrError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| OcrError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            request_delay,
            last_request: tokio::sync::Mutex::new(None),
        })
    }

    /// Sleep off whatever remains of the inter-request delay.
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(at) = *last {
            let elapsed = at.elapsed();
            if elapsed < self.request_delay {
                tokio::time::sleep(self.request_delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[async_trait]
impl TextRecognizer for RemoteRecognizer {
    fn engine_name(&self) -> &'static str {
        "remote"
    }

    async fn recognize(
        &self,
        image: &PageImage,
        language: Option<&str>,
    ) -> Result<RecognizedText, OcrError> {
        if image.data.is_empty() {
            return Err(OcrError::Permanent("zero-byte image".to_string()));
        }

        self.throttle().await;

        let part = reqwest::multipart::Part::bytes(image.data.clone())
            .file_name("page.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| OcrError::Permanent(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("filename", part)
            .text("apikey", self.api_key.clone())
            .text("language", language.unwrap_or("eng").to_string());

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OcrError::Timeout
                } else {
                    OcrError::Transient(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            tracing::warn!(
                status = %response.status(),
                "remote OCR returned non-success status, keeping page without text layer"
            );
            return Ok(RecognizedText::empty());
        }

        let body: RemoteResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("remote OCR returned unparseable body: {}", e);
                return Ok(RecognizedText::empty());
            }
        };

        if body.is_errored_on_processing {
            tracing::warn!(
                "remote OCR reported a processing error: {}",
                body.error_message
            );
            return Ok(RecognizedText::empty());
        }

        Ok(RecognizedText::from_plain_text(&body.parsed_text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_shape_deserializes() {
        let body: RemoteResponse = serde_json::from_str(
            r#"{"IsErroredOnProcessing": false, "ParsedText": "Hello\nWorld", "ErrorMessage": ""}"#,
        )
        .unwrap();
        assert!(!body.is_errored_on_processing);
        assert_eq!(body.parsed_text, "Hello\nWorld");
    }

    #[test]
    fn test_response_shape_defaults_missing_fields() {
        let body: RemoteResponse = serde_json::from_str("{}").unwrap();
        assert!(!body.is_errored_on_processing);
        assert!(body.parsed_text.is_empty());
        assert!(body.error_message.is_empty());
    }

    #[test]
    fn test_errored_response_parses() {
        let body: RemoteResponse = serde_json::from_str(
            r#"{"IsErroredOnProcessing": true, "ErrorMessage": "unsupported file"}"#,
        )
        .unwrap();
        assert!(body.is_errored_on_processing);
        assert_eq!(body.error_message, "unsupported file");
    }
}
