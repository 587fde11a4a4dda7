//! The image asset behind the multimodal capability check.
//!
//! ModelKit never ships or generates the picture; the host supplies the bytes
//! and the one-word subject a vision model is expected to answer with.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::config::schema::ProbeConfig;
use crate::error::{ModelKitError, Result};
use crate::utils::expand_home;

/// Probe picture plus the token a capable model will mention.
#[derive(Clone, PartialEq, Eq)]
pub struct ProbeImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub expected_token: String,
}

impl std::fmt::Debug for ProbeImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeImage")
            .field("bytes", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .field("expected_token", &self.expected_token)
            .finish()
    }
}

impl ProbeImage {
    pub fn new(
        bytes: Vec<u8>,
        mime_type: impl Into<String>,
        expected_token: impl Into<String>,
    ) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
            expected_token: expected_token.into(),
        }
    }

    /// Read the picture from disk; the MIME type follows the extension.
    pub fn from_file(path: &Path, expected_token: impl Into<String>) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            ModelKitError::invalid_config(format!(
                "cannot read probe image {}: {}",
                path.display(),
                e
            ))
        })?;
        if bytes.is_empty() {
            return Err(ModelKitError::invalid_config(format!(
                "probe image {} is empty",
                path.display()
            )));
        }
        Ok(Self::new(bytes, mime_for_path(path), expected_token))
    }

    /// Build from the `probe` config section. `Ok(None)` when no image is configured.
    pub fn from_config(config: &ProbeConfig) -> Result<Option<Self>> {
        match config.image_path.as_deref() {
            None | Some("") => Ok(None),
            Some(path) => {
                let mut image = Self::from_file(&expand_home(path), &config.expected_token)?;
                if let Some(ref mime) = config.mime_type {
                    image.mime_type = mime.clone();
                }
                Ok(Some(image))
            }
        }
    }

    pub fn base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// `data:<mime>;base64,<payload>` for OpenAI-style `image_url` parts.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64())
    }

    /// Case-insensitive check for the expected subject in a model answer.
    pub fn matches(&self, answer: &str) -> bool {
        answer
            .to_lowercase()
            .contains(&self.expected_token.to_lowercase())
    }
}

fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "image/png",
    }
}
