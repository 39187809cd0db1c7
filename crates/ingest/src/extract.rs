//! Attachment text extraction.
//!
//! OCR and image captioning run outside this workspace. Extractors here only
//! surface text that some other process already produced.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::ExtractError;
use crate::types::AttachmentRef;

/// Turns an attachment into text. Empty text is a valid answer.
#[async_trait]
pub trait AttachmentExtractor: Send + Sync {
    async fn extract_text(&self, attachment: &AttachmentRef) -> Result<String, ExtractError>;
}

/// Extractor that never produces text.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExtractor;

#[async_trait]
impl AttachmentExtractor for NoopExtractor {
    async fn extract_text(&self, _attachment: &AttachmentRef) -> Result<String, ExtractError> {
        Ok(String::new())
    }
}

/// Reads pre-extracted text from a sidecar file next to the attachment
/// (`<location>.txt`). Plain-text attachments are read directly.
#[derive(Debug, Clone, Default)]
pub struct SidecarTextExtractor {
    suffix: Option<String>,
}

impl SidecarTextExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different sidecar suffix than `.txt`.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    fn sidecar_path(&self, location: &str) -> PathBuf {
        let suffix = self.suffix.as_deref().unwrap_or(".txt");
        PathBuf::from(format!("{location}{suffix}"))
    }
}

fn is_plain_text(attachment: &AttachmentRef) -> bool {
    if let Some(mime) = attachment.mime_type.as_deref() {
        return mime.starts_with("text/");
    }
    let lower = attachment.filename.to_ascii_lowercase();
    lower.ends_with(".txt") || lower.ends_with(".log")
}

#[async_trait]
impl AttachmentExtractor for SidecarTextExtractor {
    async fn extract_text(&self, attachment: &AttachmentRef) -> Result<String, ExtractError> {
        let Some(location) = attachment.location.as_deref() else {
            return Ok(String::new());
        };

        let path = if is_plain_text(attachment) {
            PathBuf::from(location)
        } else {
            self.sidecar_path(location)
        };

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(err) => Err(ExtractError::Unavailable(format!(
                "{}: {err}",
                attachment.filename
            ))),
        }
    }
}
