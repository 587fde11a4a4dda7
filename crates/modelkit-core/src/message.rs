//! Chat messages in the OpenAI chat completions format.
//!
//! Every dialect encoder (Azure, Ollama, Gemini) starts from these types and
//! reshapes them; OpenAI-compatible vendors receive them as-is.

use serde::{Deserialize, Serialize};

use crate::types::Usage;

// ─────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────

/// A chat message. Each variant maps to a `role` value.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role")]
pub enum Message {
    #[serde(rename = "system")]
    System { content: String },

    #[serde(rename = "user")]
    User { content: MessageContent },

    #[serde(rename = "assistant")]
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: MessageContent::Text(content.into()),
        }
    }

    /// A user message with text and image parts.
    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Message::User {
            content: MessageContent::Parts(parts),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: Some(content.into()),
        }
    }

    /// Role string as sent on the wire.
    pub fn role(&self) -> &'static str {
        match self {
            Message::System { .. } => "system",
            Message::User { .. } => "user",
            Message::Assistant { .. } => "assistant",
        }
    }

    /// Concatenated text of the message, ignoring image parts.
    pub fn text(&self) -> String {
        match self {
            Message::System { content } => content.clone(),
            Message::User { content } => content.text(),
            Message::Assistant { content } => content.clone().unwrap_or_default(),
        }
    }

    /// Image parts of a user message.
    pub fn images(&self) -> Vec<&ImageUrl> {
        match self {
            Message::User {
                content: MessageContent::Parts(parts),
            } => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::ImageUrl { image_url } => Some(image_url),
                    ContentPart::Text { .. } => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// User message content: plain text or multipart.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A single part of a multipart message.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    /// Remote URL or `data:` URI.
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image(url: impl Into<String>, detail: Option<ImageDetail>) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: url.into(),
                detail,
            },
        }
    }
}

/// Image URL payload.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ImageUrl {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<ImageDetail>,
}

impl ImageUrl {
    /// Split a `data:<mime>;base64,<payload>` URI into `(mime, payload)`.
    pub fn as_inline_data(&self) -> Option<(&str, &str)> {
        let rest = self.url.strip_prefix("data:")?;
        let (meta, payload) = rest.split_once(',')?;
        let mime = meta.strip_suffix(";base64")?;
        Some((mime, payload))
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    Auto,
    Low,
    High,
}

// ─────────────────────────────────────────────
// OpenAI-compatible responses
// ─────────────────────────────────────────────

/// Non-streaming chat completion response.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: AssistantMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
}

impl ChatCompletionResponse {
    /// Text of the first choice, or empty.
    pub fn into_content(self) -> String {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default()
    }
}

/// One `data:` frame of a streaming chat completion.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletionChunk {
    pub fn delta_text(&self) -> String {
        self.choices
            .iter()
            .filter_map(|c| c.delta.content.as_deref())
            .collect()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_system_message_serialization() {
        let v = serde_json::to_value(Message::system("You are a helpful assistant.")).unwrap();
        assert_eq!(
            v,
            json!({"role": "system", "content": "You are a helpful assistant."})
        );
    }

    #[test]
    fn test_multipart_message_serialization() {
        let msg = Message::user_parts(vec![
            ContentPart::text("What's in the picture?"),
            ContentPart::image("data:image/png;base64,AAAA", Some(ImageDetail::Auto)),
        ]);
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["role"], "user");
        assert_eq!(v["content"][0]["type"], "text");
        assert_eq!(v["content"][1]["type"], "image_url");
        assert_eq!(v["content"][1]["image_url"]["detail"], "auto");
    }

    #[test]
    fn test_text_skips_images() {
        let msg = Message::user_parts(vec![
            ContentPart::text("a"),
            ContentPart::image("https://x/y.png", None),
            ContentPart::text("b"),
        ]);
        assert_eq!(msg.text(), "a\nb");
        assert_eq!(msg.images().len(), 1);
    }

    #[test]
    fn test_inline_data_split() {
        let img = ImageUrl {
            url: "data:image/png;base64,iVBOR".into(),
            detail: None,
        };
        assert_eq!(img.as_inline_data(), Some(("image/png", "iVBOR")));

        let remote = ImageUrl {
            url: "https://example.com/a.png".into(),
            detail: None,
        };
        assert_eq!(remote.as_inline_data(), None);
    }

    #[test]
    fn test_completion_content() {
        let resp: ChatCompletionResponse = serde_json::from_value(json!({
            "id": "x",
            "choices": [{"message": {"content": "hello"}, "finish_reason": "stop"}]
        }))
        .unwrap();
        assert_eq!(resp.into_content(), "hello");
    }

    #[test]
    fn test_completion_without_choices_is_empty() {
        let resp: ChatCompletionResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert_eq!(resp.into_content(), "");
    }

    #[test]
    fn test_chunk_delta_text() {
        let chunk: ChatCompletionChunk = serde_json::from_value(json!({
            "choices": [{"delta": {"content": "Hel"}}]
        }))
        .unwrap();
        assert_eq!(chunk.delta_text(), "Hel");

        let role_only: ChatCompletionChunk = serde_json::from_value(json!({
            "choices": [{"delta": {"role": "assistant"}}]
        }))
        .unwrap();
        assert_eq!(role_only.delta_text(), "");
    }
}
