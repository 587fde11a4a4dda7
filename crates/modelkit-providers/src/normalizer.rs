//! Request normalizer: turns a generic [`ModelInvocationRequest`] into the
//! concrete HTTP call one vendor expects.
//!
//! The normalizer owns every per-vendor request quirk: endpoint paths, auth
//! placement, body envelopes, and which tuning fields are dropped. Response
//! decoding lives with the transports and verifiers, keyed by the
//! [`WireFormat`] recorded on the call.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use url::Url;

use modelkit_core::message::Message;
use modelkit_core::{
    ChatParam, ModelInvocationRequest, ModelKitError, ModelParameters, Result, TaskKind,
};

use crate::headers::{HeaderInjector, RequestMiddleware};
use crate::registry::{ChatDialect, EmbeddingShape, ListingStyle, ProviderDefaults, RerankShape};

/// `api-version` used for Azure when the request leaves it empty.
pub const AZURE_DEFAULT_API_VERSION: &str = "2024-10-21";

const AZURE_KEY_HEADER: &str = "api-key";

// ─────────────────────────────────────────────
// VendorCallSpec
// ─────────────────────────────────────────────

/// Which decoder understands the vendor's reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireFormat {
    Chat(ChatDialect),
    Embedding(EmbeddingShape),
    Rerank(RerankShape),
    Listing(ListingStyle),
    /// Opaque; the caller decodes.
    Raw,
}

/// A fully resolved vendor call. Lives for one invocation.
#[derive(Clone, Debug)]
pub struct VendorCallSpec {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    /// Ask for an incremental (SSE / NDJSON) response.
    pub stream: bool,
    pub wire: WireFormat,
}

impl VendorCallSpec {
    pub fn new(method: Method, url: Url, headers: HeaderMap, body: Option<Value>) -> Self {
        Self {
            method,
            url,
            headers,
            body,
            stream: false,
            wire: WireFormat::Raw,
        }
    }

    /// URL with any `key` query parameter masked, for logs.
    pub fn redacted_url(&self) -> String {
        if !self.url.query_pairs().any(|(k, _)| k == "key") {
            return self.url.to_string();
        }
        let mut url = self.url.clone();
        let pairs: Vec<(String, String)> = self
            .url
            .query_pairs()
            .map(|(k, v)| {
                let v = if k == "key" { "***".to_string() } else { v.into_owned() };
                (k.into_owned(), v)
            })
            .collect();
        url.query_pairs_mut().clear().extend_pairs(pairs);
        url.to_string()
    }
}

// ─────────────────────────────────────────────
// Payloads
// ─────────────────────────────────────────────

/// What the call carries, independent of vendor.
#[derive(Clone, Copy, Debug)]
pub enum CallPayload<'a> {
    Chat {
        messages: &'a [Message],
        stream: bool,
    },
    Embedding {
        texts: &'a [String],
    },
    Rerank {
        query: &'a str,
        documents: &'a [String],
        /// Already clamped to `1..=documents.len()`.
        top_n: usize,
        return_documents: bool,
    },
    ListModels {
        task: Option<TaskKind>,
    },
}

// ─────────────────────────────────────────────
// Base URL resolution
// ─────────────────────────────────────────────

/// The base URL a call is built on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BaseUrl {
    /// Caller value (or provider default) with any trailing `#` removed.
    pub raw: String,
    /// `true` when the caller ended the URL with `#`: use it as the full
    /// endpoint and append nothing.
    pub exact: bool,
    /// `true` when the value came from the registry.
    pub from_default: bool,
}

impl BaseUrl {
    fn trimmed(&self) -> &str {
        self.raw.trim_end_matches('/')
    }

    fn ends_with_v1(&self) -> bool {
        self.trimmed().ends_with("/v1")
    }

    fn parse(&self) -> Result<Url> {
        Url::parse(&self.raw).map_err(|e| {
            ModelKitError::invalid_config(format!("malformed base URL '{}': {}", self.raw, e))
        })
    }

    /// `{base}/{path}`, or the base itself when it is exact.
    fn endpoint(&self, path: &str) -> Result<Url> {
        if self.exact {
            return self.parse();
        }
        let joined = format!("{}/{}", self.trimmed(), path.trim_start_matches('/'));
        Url::parse(&joined).map_err(|e| {
            ModelKitError::invalid_config(format!("malformed endpoint URL '{}': {}", joined, e))
        })
    }

    /// Scheme + host + port with `path` replacing whatever path the base had.
    fn origin_with_path(&self, path: &str) -> Result<Url> {
        let mut url = self.parse()?;
        url.set_path(path);
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }
}

/// Pick the caller's base URL verbatim, or the provider default when empty.
///
/// Fails with `InvalidConfiguration` when neither exists or the result is
/// not an absolute `http(s)` URL with a host.
pub fn resolve_base_url(
    request: &ModelInvocationRequest,
    defaults: &ProviderDefaults,
) -> Result<BaseUrl> {
    let supplied = request.base_url.trim();
    let (value, from_default) = if supplied.is_empty() {
        match defaults.base_url.as_deref() {
            Some(d) if !d.is_empty() => (d.to_string(), true),
            _ => {
                return Err(ModelKitError::invalid_config(format!(
                    "a base URL is required for provider {}",
                    defaults.display_name
                )))
            }
        }
    } else {
        (supplied.to_string(), false)
    };

    let (raw, exact) = match value.strip_suffix('#') {
        Some(stripped) => (stripped.to_string(), true),
        None => (value, false),
    };

    let base = BaseUrl {
        raw,
        exact,
        from_default,
    };
    let parsed = base.parse()?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ModelKitError::invalid_config(format!(
            "base URL '{}' must use http or https",
            base.raw
        )));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ModelKitError::invalid_config(format!(
            "base URL '{}' has no host",
            base.raw
        )));
    }
    Ok(base)
}

// ─────────────────────────────────────────────
// RequestNormalizer
// ─────────────────────────────────────────────

/// Builds [`VendorCallSpec`]s. Stateless.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestNormalizer;

impl RequestNormalizer {
    /// Resolve the concrete vendor call for `payload`.
    pub fn build(
        request: &ModelInvocationRequest,
        defaults: &ProviderDefaults,
        payload: CallPayload<'_>,
    ) -> Result<VendorCallSpec> {
        let base = resolve_base_url(request, defaults)?;

        let mut call = match payload {
            CallPayload::Chat { messages, stream } => {
                chat_call(request, defaults, &base, messages, stream)?
            }
            CallPayload::Embedding { texts } => embedding_call(request, defaults, &base, texts)?,
            CallPayload::Rerank {
                query,
                documents,
                top_n,
                return_documents,
            } => rerank_call(request, defaults, &base, query, documents, top_n, return_documents)?,
            CallPayload::ListModels { task } => listing_call(request, defaults, &base, task)?,
        };

        match request.api_header.as_deref() {
            Some(raw) if !defaults.capabilities.custom_headers && !raw.trim().is_empty() => {
                warn!(
                    provider = defaults.display_name,
                    "Provider does not accept custom headers, ignoring"
                );
            }
            raw => HeaderInjector::from_header_string(raw)?.on_before_send(&mut call)?,
        }

        debug!(
            provider = defaults.display_name,
            model = %request.model,
            url = %call.redacted_url(),
            wire = ?call.wire,
            stream = call.stream,
            "Built vendor call"
        );
        Ok(call)
    }

    /// The chat dialect actually used for `request` (Ollama behind `/v1`
    /// speaks the OpenAI protocol).
    pub fn chat_dialect(request: &ModelInvocationRequest, defaults: &ProviderDefaults) -> Result<ChatDialect> {
        let base = resolve_base_url(request, defaults)?;
        Ok(effective_chat_dialect(defaults, &base))
    }
}

fn effective_chat_dialect(defaults: &ProviderDefaults, base: &BaseUrl) -> ChatDialect {
    match defaults.chat_dialect {
        ChatDialect::Ollama if base.ends_with_v1() => ChatDialect::OpenAiCompatible,
        dialect => dialect,
    }
}

// ─────────────────────────────────────────────
// Auth
// ─────────────────────────────────────────────

fn bearer_headers(api_key: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    if !api_key.is_empty() {
        let value = HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|_| {
            ModelKitError::invalid_config("API key contains characters not allowed in a header")
        })?;
        headers.insert(AUTHORIZATION, value);
    }
    Ok(headers)
}

fn azure_headers(api_key: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let value = HeaderValue::from_str(api_key).map_err(|_| {
        ModelKitError::invalid_config("API key contains characters not allowed in a header")
    })?;
    headers.insert(HeaderName::from_static(AZURE_KEY_HEADER), value);
    Ok(headers)
}

/// `api-key` for Azure-versioned providers, bearer for everyone else.
fn auth_headers(request: &ModelInvocationRequest, defaults: &ProviderDefaults) -> Result<HeaderMap> {
    if defaults.capabilities.azure_versioning {
        azure_headers(&request.api_key)
    } else {
        bearer_headers(&request.api_key)
    }
}

fn azure_api_version(request: &ModelInvocationRequest) -> &str {
    match request.api_version.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => AZURE_DEFAULT_API_VERSION,
    }
}

// ─────────────────────────────────────────────
// Chat
// ─────────────────────────────────────────────

fn chat_call(
    request: &ModelInvocationRequest,
    defaults: &ProviderDefaults,
    base: &BaseUrl,
    messages: &[Message],
    stream: bool,
) -> Result<VendorCallSpec> {
    let params = request.params();
    let dialect = effective_chat_dialect(defaults, base);

    let (url, headers, body) = match dialect {
        ChatDialect::OpenAiCompatible => {
            let mut body = json!({
                "model": request.model,
                "messages": messages,
                "stream": stream,
            });
            apply_openai_params(&mut body, defaults, &params);
            (
                base.endpoint("chat/completions")?,
                bearer_headers(&request.api_key)?,
                body,
            )
        }
        ChatDialect::Azure => {
            let mut url = base.endpoint(&format!(
                "openai/deployments/{}/chat/completions",
                request.model
            ))?;
            url.query_pairs_mut()
                .append_pair("api-version", azure_api_version(request));
            let mut body = json!({
                "messages": messages,
                "stream": stream,
            });
            apply_openai_params(&mut body, defaults, &params);
            (url, azure_headers(&request.api_key)?, body)
        }
        ChatDialect::Ollama => (
            base.origin_with_path("/api/chat")?,
            bearer_headers(&request.api_key)?,
            ollama_chat_body(&request.model, messages, stream, defaults, &params),
        ),
        ChatDialect::Gemini => {
            let model = request.model.trim_start_matches("models/");
            let mut url = if stream {
                base.endpoint(&format!("models/{}:streamGenerateContent", model))?
            } else {
                base.endpoint(&format!("models/{}:generateContent", model))?
            };
            {
                let mut query = url.query_pairs_mut();
                if stream {
                    query.append_pair("alt", "sse");
                }
                query.append_pair("key", &request.api_key);
            }
            (
                url,
                HeaderMap::new(),
                gemini_chat_body(messages, defaults, &params),
            )
        }
    };

    let mut call = VendorCallSpec::new(Method::POST, url, headers, Some(body));
    call.stream = stream;
    call.wire = WireFormat::Chat(dialect);
    Ok(call)
}

/// Supported chat params as OpenAI top-level fields.
fn apply_openai_params(body: &mut Value, defaults: &ProviderDefaults, params: &ModelParameters) {
    let Some(obj) = body.as_object_mut() else {
        return;
    };
    for (param, value) in supported_fields(defaults, params) {
        obj.insert(param.wire_name().to_string(), value);
    }
}

fn supported_fields(defaults: &ProviderDefaults, params: &ModelParameters) -> Vec<(ChatParam, Value)> {
    params
        .chat_fields()
        .into_iter()
        .filter(|(param, _)| {
            let keep = defaults.supports(*param);
            if !keep {
                debug!(
                    provider = defaults.display_name,
                    param = param.wire_name(),
                    "Dropping unsupported parameter"
                );
            }
            keep
        })
        .collect()
}

fn ollama_chat_body(
    model: &str,
    messages: &[Message],
    stream: bool,
    defaults: &ProviderDefaults,
    params: &ModelParameters,
) -> Value {
    let messages: Vec<Value> = messages
        .iter()
        .map(|m| {
            let mut msg = json!({ "role": m.role(), "content": m.text() });
            let images: Vec<&str> = m
                .images()
                .into_iter()
                .filter_map(|img| img.as_inline_data().map(|(_, data)| data))
                .collect();
            if !images.is_empty() {
                msg["images"] = json!(images);
            }
            msg
        })
        .collect();

    let mut options = Map::new();
    for (param, value) in supported_fields(defaults, params) {
        let key = match param {
            ChatParam::MaxTokens => "num_predict",
            ChatParam::Temperature => "temperature",
            ChatParam::TopP => "top_p",
            ChatParam::Stop => "stop",
            ChatParam::Seed => "seed",
            ChatParam::PresencePenalty => "presence_penalty",
            ChatParam::FrequencyPenalty => "frequency_penalty",
            ChatParam::LogitBias | ChatParam::ResponseFormat => continue,
        };
        options.insert(key.to_string(), value);
    }

    let mut body = json!({
        "model": model,
        "messages": messages,
        "stream": stream,
    });
    if !options.is_empty() {
        body["options"] = Value::Object(options);
    }
    body
}

fn gemini_chat_body(messages: &[Message], defaults: &ProviderDefaults, params: &ModelParameters) -> Value {
    let mut system_parts = Vec::new();
    let mut contents = Vec::new();

    for message in messages {
        match message {
            Message::System { content } => system_parts.push(json!({ "text": content })),
            other => {
                let mut parts = Vec::new();
                let text = other.text();
                if !text.is_empty() {
                    parts.push(json!({ "text": text }));
                }
                for image in other.images() {
                    match image.as_inline_data() {
                        Some((mime, data)) => parts.push(json!({
                            "inline_data": { "mime_type": mime, "data": data }
                        })),
                        None => warn!(url = %image.url, "Gemini needs inline image data, skipping remote image"),
                    }
                }
                let role = if matches!(other, Message::Assistant { .. }) {
                    "model"
                } else {
                    "user"
                };
                contents.push(json!({ "role": role, "parts": parts }));
            }
        }
    }

    let mut generation = Map::new();
    for (param, value) in supported_fields(defaults, params) {
        let key = match param {
            ChatParam::MaxTokens => "maxOutputTokens",
            ChatParam::Temperature => "temperature",
            ChatParam::TopP => "topP",
            ChatParam::Stop => "stopSequences",
            _ => continue,
        };
        generation.insert(key.to_string(), value);
    }

    let mut body = json!({ "contents": contents });
    if !system_parts.is_empty() {
        body["systemInstruction"] = json!({ "parts": system_parts });
    }
    if !generation.is_empty() {
        body["generationConfig"] = Value::Object(generation);
    }
    body
}

// ─────────────────────────────────────────────
// Embedding
// ─────────────────────────────────────────────

/// Swap the DashScope host for the international one when the caller's base
/// points there.
fn dashscope_endpoint(base: &BaseUrl, native: Option<&'static str>) -> Result<Url> {
    if base.exact || !base.raw.contains("/compatible-mode") {
        return base.parse();
    }
    let Some(native) = native else {
        return base.parse();
    };
    let endpoint = if base.raw.contains("dashscope-intl.aliyuncs.com") {
        native.replace("dashscope.aliyuncs.com", "dashscope-intl.aliyuncs.com")
    } else {
        native.to_string()
    };
    Url::parse(&endpoint).map_err(|e| {
        ModelKitError::invalid_config(format!("malformed endpoint URL '{}': {}", endpoint, e))
    })
}

fn effective_embedding_shape(defaults: &ProviderDefaults, base: &BaseUrl) -> EmbeddingShape {
    match defaults.embedding_shape {
        EmbeddingShape::Ollama if base.ends_with_v1() => EmbeddingShape::OpenAiCompatible,
        shape => shape,
    }
}

fn embedding_call(
    request: &ModelInvocationRequest,
    defaults: &ProviderDefaults,
    base: &BaseUrl,
    texts: &[String],
) -> Result<VendorCallSpec> {
    let params = request.params().embedding;
    let shape = effective_embedding_shape(defaults, base);
    let encoding = params.encoding_format.unwrap_or_default();

    let (url, headers, body) = match shape {
        EmbeddingShape::OpenAiCompatible => {
            let mut body = json!({
                "model": request.model,
                "input": texts,
                "encoding_format": encoding.as_str(),
            });
            if let Some(dim) = params.dimension {
                body["dimensions"] = json!(dim);
            }
            let url = if defaults.capabilities.azure_versioning {
                let mut url = base.endpoint(&format!("openai/deployments/{}/embeddings", request.model))?;
                url.query_pairs_mut()
                    .append_pair("api-version", azure_api_version(request));
                url
            } else {
                base.endpoint("embeddings")?
            };
            (url, auth_headers(request, defaults)?, body)
        }
        EmbeddingShape::DashScope => {
            let mut parameters = json!({
                "text_type": params.text_type.as_deref().filter(|t| !t.is_empty()).unwrap_or("document"),
                "encoding_format": encoding.as_str(),
            });
            if let Some(dim) = params.dimension {
                parameters["dimension"] = json!(dim);
            }
            if let Some(output) = params.output_type {
                parameters["output_type"] = json!(output);
            }
            if let Some(ref instruct) = params.instruct {
                if !instruct.is_empty() {
                    parameters["instruct"] = json!(instruct);
                }
            }
            let body = json!({
                "model": request.model,
                "input": { "texts": texts },
                "parameters": parameters,
            });
            (
                dashscope_endpoint(base, defaults.embedding_endpoint)?,
                auth_headers(request, defaults)?,
                body,
            )
        }
        EmbeddingShape::Ollama => {
            let mut body = json!({ "model": request.model, "input": texts });
            if let Some(dim) = params.dimension {
                body["dimensions"] = json!(dim);
            }
            (
                base.origin_with_path("/api/embed")?,
                auth_headers(request, defaults)?,
                body,
            )
        }
        EmbeddingShape::Gemini => {
            let model = request.model.trim_start_matches("models/");
            let mut url = base.endpoint(&format!("models/{}:batchEmbedContents", model))?;
            url.query_pairs_mut().append_pair("key", &request.api_key);
            let requests: Vec<Value> = texts
                .iter()
                .map(|text| {
                    let mut entry = json!({
                        "model": format!("models/{}", model),
                        "content": { "parts": [{ "text": text }] },
                    });
                    if let Some(dim) = params.dimension {
                        entry["outputDimensionality"] = json!(dim);
                    }
                    entry
                })
                .collect();
            (url, HeaderMap::new(), json!({ "requests": requests }))
        }
    };

    let mut call = VendorCallSpec::new(Method::POST, url, headers, Some(body));
    call.wire = WireFormat::Embedding(shape);
    Ok(call)
}

// ─────────────────────────────────────────────
// Rerank
// ─────────────────────────────────────────────

fn rerank_call(
    request: &ModelInvocationRequest,
    defaults: &ProviderDefaults,
    base: &BaseUrl,
    query: &str,
    documents: &[String],
    top_n: usize,
    return_documents: bool,
) -> Result<VendorCallSpec> {
    let (url, body) = match defaults.rerank_shape {
        RerankShape::Flat => {
            let url = if base.exact || base.trimmed().ends_with("/rerank") {
                Url::parse(base.trimmed()).map_err(|e| {
                    ModelKitError::invalid_config(format!("malformed base URL '{}': {}", base.raw, e))
                })?
            } else {
                base.endpoint("rerank")?
            };
            let body = json!({
                "model": request.model,
                "query": query,
                "documents": documents,
                "top_n": top_n,
                "return_documents": return_documents,
            });
            (url, body)
        }
        RerankShape::Nested => {
            let body = json!({
                "model": request.model,
                "input": { "query": query, "documents": documents },
                "parameters": {
                    "return_documents": return_documents,
                    "top_n": top_n,
                },
            });
            (dashscope_endpoint(base, defaults.rerank_endpoint)?, body)
        }
    };

    let mut call = VendorCallSpec::new(Method::POST, url, auth_headers(request, defaults)?, Some(body));
    call.wire = WireFormat::Rerank(defaults.rerank_shape);
    Ok(call)
}

// ─────────────────────────────────────────────
// Model listing
// ─────────────────────────────────────────────

fn listing_call(
    request: &ModelInvocationRequest,
    defaults: &ProviderDefaults,
    base: &BaseUrl,
    task: Option<TaskKind>,
) -> Result<VendorCallSpec> {
    let style = match defaults.listing {
        ListingStyle::Ollama if base.ends_with_v1() => ListingStyle::OpenAiCompatible,
        style => style,
    };

    let (url, headers) = match style {
        ListingStyle::OpenAiCompatible => (base.endpoint("models")?, bearer_headers(&request.api_key)?),
        ListingStyle::OpenAiTyped => {
            let mut url = base.endpoint("models")?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("type", "text");
                match task {
                    Some(TaskKind::Embedding) => {
                        query.append_pair("sub_type", "embedding");
                    }
                    Some(TaskKind::Rerank) => {
                        query.append_pair("sub_type", "reranker");
                    }
                    Some(TaskKind::Chat) | None => {}
                }
            }
            (url, bearer_headers(&request.api_key)?)
        }
        ListingStyle::Ollama => (base.origin_with_path("/api/tags")?, bearer_headers(&request.api_key)?),
        ListingStyle::Gemini => {
            let mut url = base.endpoint("models")?;
            url.query_pairs_mut()
                .append_pair("pageSize", "1000")
                .append_pair("key", &request.api_key);
            (url, HeaderMap::new())
        }
        ListingStyle::Unavailable => {
            return Err(ModelKitError::invalid_config(format!(
                "{} does not expose a model listing endpoint",
                defaults.display_name
            )))
        }
    };

    let mut call = VendorCallSpec::new(Method::GET, url, headers, None);
    call.wire = WireFormat::Listing(style);
    Ok(call)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
