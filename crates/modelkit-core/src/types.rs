//! Domain types for ModelKit: provider identity, invocation requests, and
//! the normalized embedding/rerank results every vendor is mapped onto.
//!
//! Requests are read-only once built; the registry, normalizer, and verifiers
//! only ever borrow them.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

// ─────────────────────────────────────────────
// Provider identity
// ─────────────────────────────────────────────

/// A vendor (or vendor family) ModelKit knows how to talk to.
///
/// Parsing never fails: unknown names fall into [`ProviderId::Other`], the
/// generic OpenAI-compatible category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProviderId {
    OpenAi,
    AzureOpenAi,
    Ollama,
    Gemini,
    DeepSeek,
    BaiLian,
    BaiZhiCloud,
    SiliconFlow,
    Moonshot,
    Hunyuan,
    Volcengine,
    ZhiPu,
    AiHubMix,
    OcoolAi,
    Ppio,
    OpenRouter,
    Other,
}

impl ProviderId {
    /// Every known provider, in registry order.
    pub const ALL: &'static [ProviderId] = &[
        ProviderId::OpenAi,
        ProviderId::AzureOpenAi,
        ProviderId::Ollama,
        ProviderId::Gemini,
        ProviderId::DeepSeek,
        ProviderId::BaiLian,
        ProviderId::BaiZhiCloud,
        ProviderId::SiliconFlow,
        ProviderId::Moonshot,
        ProviderId::Hunyuan,
        ProviderId::Volcengine,
        ProviderId::ZhiPu,
        ProviderId::AiHubMix,
        ProviderId::OcoolAi,
        ProviderId::Ppio,
        ProviderId::OpenRouter,
        ProviderId::Other,
    ];

    /// Canonical lowercase name (also the config key).
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "openai",
            ProviderId::AzureOpenAi => "azureopenai",
            ProviderId::Ollama => "ollama",
            ProviderId::Gemini => "gemini",
            ProviderId::DeepSeek => "deepseek",
            ProviderId::BaiLian => "bailian",
            ProviderId::BaiZhiCloud => "baizhicloud",
            ProviderId::SiliconFlow => "siliconflow",
            ProviderId::Moonshot => "moonshot",
            ProviderId::Hunyuan => "hunyuan",
            ProviderId::Volcengine => "volcengine",
            ProviderId::ZhiPu => "zhipu",
            ProviderId::AiHubMix => "aihubmix",
            ProviderId::OcoolAi => "ocoolai",
            ProviderId::Ppio => "ppio",
            ProviderId::OpenRouter => "openrouter",
            ProviderId::Other => "other",
        }
    }

    /// Case-insensitive parse with aliases. Unknown names map to `Other`.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "openai" => ProviderId::OpenAi,
            "azureopenai" | "azure-openai" | "azure_openai" | "azure" => ProviderId::AzureOpenAi,
            "ollama" => ProviderId::Ollama,
            "gemini" => ProviderId::Gemini,
            "deepseek" => ProviderId::DeepSeek,
            "bailian" | "dashscope" => ProviderId::BaiLian,
            "baizhicloud" | "baizhiyun" => ProviderId::BaiZhiCloud,
            "siliconflow" | "silicon" => ProviderId::SiliconFlow,
            "moonshot" => ProviderId::Moonshot,
            "hunyuan" => ProviderId::Hunyuan,
            "volcengine" | "doubao" => ProviderId::Volcengine,
            "zhipu" => ProviderId::ZhiPu,
            "aihubmix" => ProviderId::AiHubMix,
            "ocoolai" => ProviderId::OcoolAi,
            "ppio" => ProviderId::Ppio,
            "openrouter" => ProviderId::OpenRouter,
            _ => ProviderId::Other,
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ProviderId::parse(s))
    }
}

impl From<String> for ProviderId {
    fn from(value: String) -> Self {
        ProviderId::parse(&value)
    }
}

impl From<ProviderId> for String {
    fn from(value: ProviderId) -> Self {
        value.as_str().to_string()
    }
}

// ─────────────────────────────────────────────
// Task kind
// ─────────────────────────────────────────────

/// Which verifier handles a request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskKind {
    #[default]
    Chat,
    Embedding,
    Rerank,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Chat => "chat",
            TaskKind::Embedding => "embedding",
            TaskKind::Rerank => "rerank",
        }
    }

    /// Parse a model-type name. Chat-flavoured types (`llm`, `coder`,
    /// `analysis`, ...) and anything unknown map to `Chat`.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "embedding" | "embed" => TaskKind::Embedding,
            "rerank" | "reranker" => TaskKind::Rerank,
            _ => TaskKind::Chat,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for TaskKind {
    fn from(value: String) -> Self {
        TaskKind::parse(&value)
    }
}

impl From<TaskKind> for String {
    fn from(value: TaskKind) -> Self {
        value.as_str().to_string()
    }
}

// ─────────────────────────────────────────────
// Parameters
// ─────────────────────────────────────────────

/// Chat tuning fields a provider may reject. The registry lists the ones to
/// drop per provider; the normalizer never sends those.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChatParam {
    MaxTokens,
    Temperature,
    TopP,
    Stop,
    PresencePenalty,
    FrequencyPenalty,
    Seed,
    LogitBias,
    ResponseFormat,
}

impl ChatParam {
    /// OpenAI wire name of the field.
    pub fn wire_name(&self) -> &'static str {
        match self {
            ChatParam::MaxTokens => "max_tokens",
            ChatParam::Temperature => "temperature",
            ChatParam::TopP => "top_p",
            ChatParam::Stop => "stop",
            ChatParam::PresencePenalty => "presence_penalty",
            ChatParam::FrequencyPenalty => "frequency_penalty",
            ChatParam::Seed => "seed",
            ChatParam::LogitBias => "logit_bias",
            ChatParam::ResponseFormat => "response_format",
        }
    }
}

/// Structured-output hint for chat models.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    JsonObject,
    JsonSchema { json_schema: Value },
}

/// Dense, sparse, or both: only honoured by vendors with dual output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputType {
    #[serde(rename = "dense")]
    Dense,
    #[serde(rename = "sparse")]
    Sparse,
    #[serde(rename = "dense&sparse")]
    DenseAndSparse,
}

/// Wire encoding of dense vectors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingFormat {
    #[default]
    Float,
    Base64,
}

impl EncodingFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncodingFormat::Float => "float",
            EncodingFormat::Base64 => "base64",
        }
    }
}

/// Embedding-specific knobs.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<u32>,
    /// `query` or `document`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_type: Option<OutputType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding_format: Option<EncodingFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruct: Option<String>,
}

/// Optional tuning bag attached to a request.
///
/// `context_window` is informational only and never sent upstream.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logit_bias: Option<HashMap<String, i32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    /// Run the multimodal probe instead of the plain text probe.
    pub verify_image_input: bool,
    pub embedding: EmbeddingParameters,
}

impl ModelParameters {
    /// The chat fields that are set, paired with their JSON value.
    pub fn chat_fields(&self) -> Vec<(ChatParam, Value)> {
        let mut fields = Vec::new();
        if let Some(v) = self.max_tokens {
            fields.push((ChatParam::MaxTokens, json!(v)));
        }
        if let Some(v) = self.temperature {
            fields.push((ChatParam::Temperature, json!(v)));
        }
        if let Some(v) = self.top_p {
            fields.push((ChatParam::TopP, json!(v)));
        }
        if let Some(ref v) = self.stop {
            if !v.is_empty() {
                fields.push((ChatParam::Stop, json!(v)));
            }
        }
        if let Some(v) = self.presence_penalty {
            fields.push((ChatParam::PresencePenalty, json!(v)));
        }
        if let Some(v) = self.frequency_penalty {
            fields.push((ChatParam::FrequencyPenalty, json!(v)));
        }
        if let Some(v) = self.seed {
            fields.push((ChatParam::Seed, json!(v)));
        }
        if let Some(ref v) = self.logit_bias {
            if !v.is_empty() {
                fields.push((ChatParam::LogitBias, json!(v)));
            }
        }
        if let Some(ref v) = self.response_format {
            fields.push((ChatParam::ResponseFormat, json!(v)));
        }
        fields
    }
}

// ─────────────────────────────────────────────
// Invocation request
// ─────────────────────────────────────────────

/// One normalized call: who to talk to, which model, and how.
#[derive(Clone, Serialize, Deserialize)]
pub struct ModelInvocationRequest {
    pub provider: ProviderId,
    pub model: String,
    #[serde(default)]
    pub task: TaskKind,
    /// Empty means "use the provider default".
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// Newline-separated `key=value` header lines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_header: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<ModelParameters>,
}

impl fmt::Debug for ModelInvocationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelInvocationRequest")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("task", &self.task)
            .field("base_url", &self.base_url)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .field("api_version", &self.api_version)
            .field("has_api_header", &self.api_header.is_some())
            .field("parameters", &self.parameters)
            .finish()
    }
}

impl ModelInvocationRequest {
    pub fn new(provider: ProviderId, model: impl Into<String>, task: TaskKind) -> Self {
        Self {
            provider,
            model: model.into(),
            task,
            base_url: String::new(),
            api_key: String::new(),
            api_version: None,
            api_header: None,
            parameters: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    pub fn with_api_header(mut self, header: impl Into<String>) -> Self {
        self.api_header = Some(header.into());
        self
    }

    pub fn with_parameters(mut self, parameters: ModelParameters) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// Parameters, or the empty bag when none were supplied.
    pub fn params(&self) -> ModelParameters {
        self.parameters.clone().unwrap_or_default()
    }

    pub fn wants_image_probe(&self) -> bool {
        self.parameters
            .as_ref()
            .map_or(false, |p| p.verify_image_input)
    }
}

// ─────────────────────────────────────────────
// Normalized results
// ─────────────────────────────────────────────

/// Token usage as reported by the vendor. Fields vary per vendor.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Usage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u32>,
}

/// One `(index, value, token)` triple of a sparse embedding.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SparseEntry {
    pub index: i64,
    pub value: f32,
    pub token: String,
}

/// Embedding of a single input text.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingVector {
    /// Position of the originating text in the request.
    pub text_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dense: Option<Vec<f32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sparse: Option<Vec<SparseEntry>>,
}

/// Embeddings for a batch, in input order: `vectors[i].text_index == i`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingResult {
    pub vectors: Vec<EmbeddingVector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl EmbeddingResult {
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

/// One rerank hit. `document` is empty unless documents were requested.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RerankHit {
    pub index: usize,
    pub relevance_score: f64,
    pub document: String,
}

/// Rerank hits in the vendor's order, truncated to the requested top-N.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RerankResult {
    pub hits: Vec<RerankHit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
