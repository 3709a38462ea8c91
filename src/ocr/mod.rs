//! Text recognition
//!
//! Pluggable OCR capability: an image of one page goes in, recognized text
//! with optional per-span geometry comes out. Backends:
//!
//! - Remote HTTP engine (one multipart request per page, rate-limited)
//! - Tesseract (local, shells out; requires installation; feature
//!   `ocr-tesseract`)
//! - No-op (empty text; visual-only conversion)
//!
//! All recognition failures are page-level: the caller proceeds with an
//! empty overlay and records a warning.

mod provider;
mod remote;
mod types;

pub use provider::{NoopRecognizer, TextRecognizer};
pub use remote::RemoteRecognizer;
pub use types::{OcrError, RecognizedText, TextSpan};

#[cfg(feature = "ocr-tesseract")]
pub use provider::TesseractRecognizer;

#[cfg(test)]
pub(crate) use provider::MockRecognizer;
