//! Chat transports: one generate/stream pair per [`ChatDialect`].
//!
//! The request side is already resolved by the normalizer; here we only
//! decode. Each dialect has exactly one decoder for whole bodies and one for
//! incremental frames:
//!
//! | dialect            | whole body                      | stream          |
//! |--------------------|---------------------------------|-----------------|
//! | OpenAI / Azure     | `choices[0].message.content`    | SSE until `[DONE]` |
//! | Ollama             | `message.content`               | NDJSON lines    |
//! | Gemini             | `candidates[0].content.parts[]` | SSE             |

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::future::ready;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::io::StreamReader;
use tracing::debug;

use modelkit_core::message::{ChatCompletionChunk, ChatCompletionResponse};
use modelkit_core::{CallContext, ModelKitError, Result};

use crate::normalizer::{VendorCallSpec, WireFormat};
use crate::registry::ChatDialect;
use crate::transport::{vendor_error, ReqwestTransport};

/// Incremental chat text. Ends at end-of-stream or on the first error.
pub type ContentStream = BoxStream<'static, Result<String>>;

// ─────────────────────────────────────────────
// ChatTransport trait
// ─────────────────────────────────────────────

/// Sends a resolved chat call. The verifier drives the fallback sequence;
/// implementations make exactly one request per method call.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Non-streaming generation; returns the full reply text.
    async fn generate(&self, ctx: &CallContext, call: &VendorCallSpec) -> Result<String>;

    /// Streaming generation; yields text deltas.
    async fn stream(&self, ctx: &CallContext, call: &VendorCallSpec) -> Result<ContentStream>;
}

fn dialect_of(call: &VendorCallSpec) -> Result<ChatDialect> {
    match call.wire {
        WireFormat::Chat(dialect) => Ok(dialect),
        other => Err(ModelKitError::invalid_config(format!(
            "not a chat call: {:?}",
            other
        ))),
    }
}

// ─────────────────────────────────────────────
// Whole-body decoders
// ─────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: GeminiContent,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<Value>,
}

impl GeminiResponse {
    fn text(&self) -> Option<String> {
        let candidate = self.candidates.first()?;
        Some(
            candidate
                .content
                .parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect(),
        )
    }
}

fn parse_json(body: &[u8]) -> Result<Value> {
    serde_json::from_slice(body)
        .map_err(|e| ModelKitError::malformed(format!("chat response is not JSON: {}", e)))
}

fn from_value<T: for<'de> Deserialize<'de>>(v: Value) -> Result<T> {
    serde_json::from_value(v).map_err(|e| ModelKitError::malformed(e.to_string()))
}

/// Decode a complete (non-streamed) chat body.
///
/// A 200 body carrying an `error` object is reported as `Upstream`; a body
/// with no choice/candidate at all is `MalformedResponse`. Empty text is
/// returned as-is; the verifier decides what empty means.
pub fn decode_chat_body(dialect: ChatDialect, body: &[u8]) -> Result<String> {
    let value = parse_json(body)?;
    if let Some(message) = vendor_error(&value) {
        return Err(ModelKitError::upstream(None, message));
    }

    match dialect {
        ChatDialect::OpenAiCompatible | ChatDialect::Azure => {
            let resp: ChatCompletionResponse = from_value(value)?;
            if resp.choices.is_empty() {
                return Err(ModelKitError::malformed("response has no choices"));
            }
            Ok(resp.into_content())
        }
        ChatDialect::Ollama => {
            let resp: OllamaChatResponse = from_value(value)?;
            match resp.message {
                Some(m) => Ok(m.content),
                None => Err(ModelKitError::malformed("response has no message")),
            }
        }
        ChatDialect::Gemini => {
            let resp: GeminiResponse = from_value(value)?;
            match resp.text() {
                Some(text) => Ok(text),
                None => match resp.prompt_feedback.as_ref().and_then(|f| f.get("blockReason")) {
                    Some(reason) => Err(ModelKitError::upstream(
                        None,
                        format!("prompt blocked: {}", reason),
                    )),
                    None => Err(ModelKitError::malformed("response has no candidates")),
                },
            }
        }
    }
}

// ─────────────────────────────────────────────
// Frame decoders
// ─────────────────────────────────────────────

/// Decode one SSE `data:` payload. `Ok(None)` marks the `[DONE]` sentinel.
pub fn decode_sse_frame(dialect: ChatDialect, data: &str) -> Result<Option<String>> {
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(None);
    }
    if data.is_empty() {
        return Ok(Some(String::new()));
    }
    let value: Value = serde_json::from_str(data)
        .map_err(|e| ModelKitError::malformed(format!("bad stream frame: {}", e)))?;
    if let Some(message) = vendor_error(&value) {
        return Err(ModelKitError::upstream(None, message));
    }
    match dialect {
        ChatDialect::Gemini => {
            let resp: GeminiResponse = from_value(value)?;
            Ok(Some(resp.text().unwrap_or_default()))
        }
        _ => {
            let chunk: ChatCompletionChunk = from_value(value)?;
            Ok(Some(chunk.delta_text()))
        }
    }
}

/// Decode one Ollama NDJSON line.
pub fn decode_ndjson_line(line: &str) -> Result<String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(String::new());
    }
    let resp: OllamaChatResponse = serde_json::from_str(line)
        .map_err(|e| ModelKitError::malformed(format!("bad stream line: {}", e)))?;
    if let Some(error) = resp.error {
        return Err(ModelKitError::upstream(None, error));
    }
    Ok(resp.message.map(|m| m.content).unwrap_or_default())
}

// ─────────────────────────────────────────────
// HttpChatTransport
// ─────────────────────────────────────────────

/// [`ChatTransport`] over HTTP for every built-in dialect.
#[derive(Clone, Debug)]
pub struct HttpChatTransport {
    http: ReqwestTransport,
}

impl HttpChatTransport {
    pub fn new(http: ReqwestTransport) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn generate(&self, ctx: &CallContext, call: &VendorCallSpec) -> Result<String> {
        let dialect = dialect_of(call)?;
        let response = self.http.open(ctx, call).await?;
        let body = ctx
            .run(async {
                response
                    .bytes()
                    .await
                    .map_err(|e| ModelKitError::upstream(None, e.to_string()))
            })
            .await?;
        let text = decode_chat_body(dialect, &body)?;
        debug!(dialect = ?dialect, chars = text.len(), "Chat generation decoded");
        Ok(text)
    }

    async fn stream(&self, ctx: &CallContext, call: &VendorCallSpec) -> Result<ContentStream> {
        let dialect = dialect_of(call)?;
        let response = self.http.open(ctx, call).await?;
        let bytes = response.bytes_stream();

        let stream = match dialect {
            ChatDialect::Ollama => {
                let reader = StreamReader::new(
                    bytes.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
                );
                FramedRead::new(reader, LinesCodec::new())
                    .map(|line| match line {
                        Ok(line) => decode_ndjson_line(&line),
                        Err(e) => Err(ModelKitError::malformed(format!("bad stream line: {}", e))),
                    })
                    .boxed()
            }
            _ => bytes
                .eventsource()
                .map(move |event| match event {
                    Ok(event) => decode_sse_frame(dialect, &event.data),
                    Err(e) => Err(ModelKitError::malformed(format!("bad stream frame: {}", e))),
                })
                .try_take_while(|frame| ready(Ok(frame.is_some())))
                .map_ok(Option::unwrap_or_default)
                .boxed(),
        };

        Ok(stream.try_filter(|text| ready(!text.is_empty())).boxed())
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ProviderRegistry;
    use crate::normalizer::{CallPayload, RequestNormalizer};
    use modelkit_core::config::HttpConfig;
    use modelkit_core::message::Message;
    use modelkit_core::{ModelInvocationRequest, ProviderId, TaskKind};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport() -> HttpChatTransport {
        HttpChatTransport::new(ReqwestTransport::new(&HttpConfig::default()).unwrap())
    }

    fn call(provider: ProviderId, base: &str, stream: bool) -> VendorCallSpec {
        let req = ModelInvocationRequest::new(provider, "m", TaskKind::Chat)
            .with_base_url(base)
            .with_api_key("k");
        let reg = ProviderRegistry::builtin();
        let messages = vec![Message::user("hi")];
        RequestNormalizer::build(
            &req,
            reg.lookup(provider).unwrap(),
            CallPayload::Chat {
                messages: &messages,
                stream,
            },
        )
        .unwrap()
    }

    async fn collect(stream: ContentStream) -> Result<String> {
        stream.try_collect::<Vec<_>>().await.map(|parts| parts.concat())
    }

    // ── decoders ──

    #[test]
    fn test_decode_openai_body() {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": "Hello"}}]});
        let text = decode_chat_body(ChatDialect::OpenAiCompatible, body.to_string().as_bytes()).unwrap();
        assert_eq!(text, "Hello");
    }

    #[test]
    fn test_decode_openai_no_choices() {
        let err = decode_chat_body(ChatDialect::OpenAiCompatible, br#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, ModelKitError::MalformedResponse(_)));
    }

    #[test]
    fn test_decode_error_in_200_body() {
        let err = decode_chat_body(
            ChatDialect::OpenAiCompatible,
            br#"{"error":{"message":"insufficient quota"}}"#,
        )
        .unwrap_err();
        assert_eq!(err, ModelKitError::upstream(None, "insufficient quota"));
    }

    #[test]
    fn test_decode_ollama_body() {
        let text = decode_chat_body(
            ChatDialect::Ollama,
            br#"{"model":"llama3","message":{"role":"assistant","content":"hey"},"done":true}"#,
        )
        .unwrap();
        assert_eq!(text, "hey");
    }

    #[test]
    fn test_decode_gemini_body() {
        let body = json!({
            "candidates": [{"content": {"parts": [{"text": "a "}, {"text": "dog"}], "role": "model"}}]
        });
        let text = decode_chat_body(ChatDialect::Gemini, body.to_string().as_bytes()).unwrap();
        assert_eq!(text, "a dog");

        let blocked = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let err = decode_chat_body(ChatDialect::Gemini, blocked.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, ModelKitError::Upstream { .. }));
    }

    #[test]
    fn test_decode_not_json() {
        let err = decode_chat_body(ChatDialect::Azure, b"<html>502</html>").unwrap_err();
        assert!(matches!(err, ModelKitError::MalformedResponse(_)));
    }

    #[test]
    fn test_sse_frame_done() {
        assert_eq!(decode_sse_frame(ChatDialect::OpenAiCompatible, "[DONE]").unwrap(), None);
        assert_eq!(
            decode_sse_frame(
                ChatDialect::OpenAiCompatible,
                r#"{"choices":[{"delta":{"content":"Hi"}}]}"#
            )
            .unwrap(),
            Some("Hi".to_string())
        );
    }

    #[test]
    fn test_ndjson_line_error() {
        let err = decode_ndjson_line(r#"{"error":"model not found"}"#).unwrap_err();
        assert_eq!(err, ModelKitError::upstream(None, "model not found"));
        assert_eq!(decode_ndjson_line("").unwrap(), "");
    }

    // ── HTTP ──

    #[tokio::test]
    async fn test_generate_openai() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Hello!"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let c = call(ProviderId::Other, &format!("{}/v1", server.uri()), false);
        let text = transport().generate(&CallContext::new(), &c).await.unwrap();
        assert_eq!(text, "Hello!");
    }

    #[tokio::test]
    async fn test_generate_upstream_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Incorrect API key provided"}
            })))
            .mount(&server)
            .await;

        let c = call(ProviderId::Other, &format!("{}/v1", server.uri()), false);
        let err = transport().generate(&CallContext::new(), &c).await.unwrap_err();
        assert_eq!(err.status(), Some(401));
    }

    #[tokio::test]
    async fn test_stream_openai_sse() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .mount(&server)
            .await;

        let c = call(ProviderId::Other, &format!("{}/v1", server.uri()), true);
        let stream = transport().stream(&CallContext::new(), &c).await.unwrap();
        assert_eq!(collect(stream).await.unwrap(), "Hello");
    }

    #[tokio::test]
    async fn test_stream_ollama_ndjson() {
        let server = MockServer::start().await;
        let ndjson = concat!(
            "{\"message\":{\"role\":\"assistant\",\"content\":\"Hi\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\" there\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n",
        );
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ndjson))
            .mount(&server)
            .await;

        let c = call(ProviderId::Ollama, &server.uri(), true);
        let stream = transport().stream(&CallContext::new(), &c).await.unwrap();
        assert_eq!(collect(stream).await.unwrap(), "Hi there");
    }

    #[tokio::test]
    async fn test_stream_gemini_sse() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"A \"}]}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"dog\"}]}}]}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1beta/models/m:streamGenerateContent"))
            .and(query_param("alt", "sse"))
            .and(query_param("key", "k"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse))
            .mount(&server)
            .await;

        let c = call(ProviderId::Gemini, &format!("{}/v1beta", server.uri()), true);
        let stream = transport().stream(&CallContext::new(), &c).await.unwrap();
        assert_eq!(collect(stream).await.unwrap(), "A dog");
    }

    #[tokio::test]
    async fn test_stream_error_frame() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("data: {\"error\":{\"message\":\"overloaded\"}}\n\n"),
            )
            .mount(&server)
            .await;

        let c = call(ProviderId::Other, &format!("{}/v1", server.uri()), true);
        let stream = transport().stream(&CallContext::new(), &c).await.unwrap();
        let err = collect(stream).await.unwrap_err();
        assert_eq!(err, ModelKitError::upstream(None, "overloaded"));
    }

    #[tokio::test]
    async fn test_rejects_non_chat_call() {
        let mut c = call(ProviderId::Other, "http://127.0.0.1:9/v1", false);
        c.wire = WireFormat::Raw;
        let err = transport().generate(&CallContext::new(), &c).await.unwrap_err();
        assert!(matches!(err, ModelKitError::InvalidConfiguration(_)));
    }
}
