//! Chat capability probe.
//!
//! One invocation walks an explicit two-step sequence:
//!
//! 1. **Attempt**: a non-streaming generation with the probe prompt (or a
//!    single native multimodal call for providers that have one).
//! 2. **Fallback**: if the attempt failed in transport or decoding, or came
//!    back empty, the same probe is sent over the streaming transport and the
//!    deltas are accumulated to end-of-stream.
//!
//! The outcome records which path produced the content. When both steps
//! fail, the error of the first attempt is returned.

use std::sync::Arc;

use futures::TryStreamExt;
use serde::Serialize;
use tracing::{debug, info, warn};

use modelkit_core::message::{ContentPart, ImageDetail, Message};
use modelkit_core::utils::truncate_string;
use modelkit_core::{CallContext, ModelInvocationRequest, ModelKitError, ProbeImage, Result};
use modelkit_providers::{CallPayload, ChatTransport, ProviderDefaults, RequestNormalizer, VendorCallSpec};

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant.";
pub const TEXT_PROBE: &str = "hi";
pub const IMAGE_PROBE: &str = "What's in the picture? Only answer me a word.";
/// Appended for native multimodal endpoints, which otherwise hallucinate.
const NATIVE_IMAGE_HINT: &str = "If you don't support image input, reply no.";

/// Which step produced the content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbePath {
    NonStreaming,
    StreamingFallback,
    NativeMultimodal,
}

/// Terminal success of one chat probe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatOutcome {
    pub content: String,
    pub path: ProbePath,
}

// ─────────────────────────────────────────────
// ChatVerifier
// ─────────────────────────────────────────────

/// Runs the chat probe against any [`ChatTransport`].
#[derive(Clone)]
pub struct ChatVerifier {
    transport: Arc<dyn ChatTransport>,
    probe_image: Option<ProbeImage>,
}

impl std::fmt::Debug for ChatVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatVerifier")
            .field("probe_image", &self.probe_image)
            .finish()
    }
}

impl ChatVerifier {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            transport,
            probe_image: None,
        }
    }

    pub fn with_probe_image(mut self, image: ProbeImage) -> Self {
        self.probe_image = Some(image);
        self
    }

    pub fn probe_image(&self) -> Option<&ProbeImage> {
        self.probe_image.as_ref()
    }

    /// Probe `request.model` and return the generated text.
    ///
    /// Errors:
    /// - `InvalidConfiguration`: bad base URL/headers, or an image probe
    ///   without a configured probe image
    /// - `CapabilityUnsupported`: image probe answered without the expected token
    /// - `Upstream` / `MalformedResponse`: the first attempt's error when the
    ///   fallback also failed
    /// - `Cancelled`
    pub async fn verify(
        &self,
        ctx: &CallContext,
        request: &ModelInvocationRequest,
        defaults: &ProviderDefaults,
    ) -> Result<ChatOutcome> {
        let image = if request.wants_image_probe() {
            Some(self.probe_image.as_ref().ok_or_else(|| {
                ModelKitError::invalid_config(
                    "image input verification requested but no probe image is configured",
                )
            })?)
        } else {
            None
        };
        let native = image.is_some() && defaults.capabilities.native_multimodal;
        let messages = probe_messages(image, native);

        debug!(
            provider = defaults.display_name,
            model = %request.model,
            image = image.is_some(),
            native,
            "Starting chat probe"
        );

        // ── Attempt ──
        let call = build(request, defaults, &messages, false)?;
        let attempt = self
            .transport
            .generate(ctx, &call)
            .await
            .and_then(require_content);

        let original = match attempt {
            Ok(content) => {
                let path = if native {
                    ProbePath::NativeMultimodal
                } else {
                    ProbePath::NonStreaming
                };
                return finish(image, content, path);
            }
            Err(e) => e,
        };

        if native || !original.allows_stream_fallback() || !defaults.capabilities.streaming_fallback {
            warn!(
                provider = defaults.display_name,
                model = %request.model,
                error = %original,
                "Chat probe failed"
            );
            return Err(original);
        }

        // ── Fallback ──
        info!(
            provider = defaults.display_name,
            model = %request.model,
            error = %original,
            "Non-streaming probe failed, retrying over streaming"
        );
        let call = build(request, defaults, &messages, true)?;
        match self
            .stream_to_end(ctx, &call)
            .await
            .and_then(require_content)
        {
            Ok(content) => finish(image, content, ProbePath::StreamingFallback),
            Err(ModelKitError::Cancelled(reason)) => Err(ModelKitError::Cancelled(reason)),
            Err(stream_err) => {
                warn!(
                    provider = defaults.display_name,
                    model = %request.model,
                    error = %original,
                    stream_error = %stream_err,
                    "Streaming fallback failed too"
                );
                Err(original)
            }
        }
    }

    async fn stream_to_end(&self, ctx: &CallContext, call: &VendorCallSpec) -> Result<String> {
        let stream = self.transport.stream(ctx, call).await?;
        let parts: Vec<String> = ctx.run(stream.try_collect()).await?;
        Ok(parts.concat())
    }
}

fn build(
    request: &ModelInvocationRequest,
    defaults: &ProviderDefaults,
    messages: &[Message],
    stream: bool,
) -> Result<VendorCallSpec> {
    RequestNormalizer::build(request, defaults, CallPayload::Chat { messages, stream })
}

/// The fixed probe conversation.
pub fn probe_messages(image: Option<&ProbeImage>, native: bool) -> Vec<Message> {
    match image {
        None => vec![Message::system(SYSTEM_PROMPT), Message::user(TEXT_PROBE)],
        Some(image) if native => vec![Message::user_parts(vec![
            ContentPart::text(format!("{} {}", IMAGE_PROBE, NATIVE_IMAGE_HINT)),
            ContentPart::image(image.data_uri(), None),
        ])],
        Some(image) => vec![Message::user_parts(vec![
            ContentPart::text(IMAGE_PROBE),
            ContentPart::image(image.data_uri(), Some(ImageDetail::Auto)),
        ])],
    }
}

fn require_content(content: String) -> Result<String> {
    if content.trim().is_empty() {
        Err(ModelKitError::upstream(None, "generation returned empty content"))
    } else {
        Ok(content)
    }
}

fn finish(image: Option<&ProbeImage>, content: String, path: ProbePath) -> Result<ChatOutcome> {
    if let Some(image) = image {
        if !image.matches(&content) {
            return Err(ModelKitError::CapabilityUnsupported(format!(
                "model does not support image input: answered '{}', expected '{}'",
                truncate_string(content.trim(), 64),
                image.expected_token
            )));
        }
    }
    debug!(path = ?path, chars = content.len(), "Chat probe succeeded");
    Ok(ChatOutcome { content, path })
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
