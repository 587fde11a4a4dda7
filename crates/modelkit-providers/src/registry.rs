//! Provider registry: static defaults and capability metadata per provider.
//!
//! [`PROVIDERS`] is the built-in table. A [`ProviderRegistry`] is built once
//! from that table plus the `providers` config section and is read-only
//! afterwards; share it behind an `Arc`.

use std::collections::HashMap;

use modelkit_core::config::ProvidersConfig;
use modelkit_core::{ChatParam, ModelKitError, ProviderId, Result};
use tracing::debug;

/// Batch ceiling for OpenAI-compatible embedding endpoints without a
/// documented limit.
pub const DEFAULT_EMBEDDING_BATCH_LIMIT: usize = 256;

// ─────────────────────────────────────────────
// Wire shapes
// ─────────────────────────────────────────────

/// How chat requests are encoded and responses decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatDialect {
    /// `POST {base}/chat/completions`, bearer auth, SSE streaming.
    OpenAiCompatible,
    /// Deployment-scoped path, `api-key` header, `api-version` query.
    Azure,
    /// Native `/api/chat`, NDJSON streaming.
    Ollama,
    /// `models/{model}:generateContent`, key in the query string.
    Gemini,
}

/// Embedding request/response envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingShape {
    /// `{model, input}` → `data[{index, embedding}]`.
    OpenAiCompatible,
    /// `{model, input:{texts}, parameters}` → `output.embeddings[]`, dense and sparse.
    DashScope,
    /// Native `/api/embed` → `embeddings[[...]]`.
    Ollama,
    /// `models/{model}:batchEmbedContents`, key in the query string →
    /// `embeddings[{values}]` in request order.
    Gemini,
}

/// Rerank request/response envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RerankShape {
    /// `{model, query, documents}` → `results[]`.
    Flat,
    /// `{model, input:{query, documents}, parameters}` → `output.results[]`.
    Nested,
}

/// How the model catalog is fetched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListingStyle {
    /// `GET {base}/models`.
    OpenAiCompatible,
    /// `GET {base}/models?type=text&sub_type=...`.
    OpenAiTyped,
    /// `GET /api/tags` on the server root.
    Ollama,
    /// `GET {base}/models?key=...`, filtered to gemini generateContent models.
    Gemini,
    /// No listing endpoint.
    Unavailable,
}

// ─────────────────────────────────────────────
// Capabilities & limits
// ─────────────────────────────────────────────

/// Feature flags for one provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// Azure-style `api-version` query and `api-key` header.
    pub azure_versioning: bool,
    /// Honours the user's `key=value` header string.
    pub custom_headers: bool,
    /// A failed non-streaming chat probe is retried over streaming.
    pub streaming_fallback: bool,
    /// Has a dedicated image+text endpoint used for the multimodal probe.
    pub native_multimodal: bool,
}

const OPENAI_LIKE: Capabilities = Capabilities {
    azure_versioning: false,
    custom_headers: true,
    streaming_fallback: true,
    native_multimodal: false,
};

/// Maximum number of texts per embedding call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchLimit {
    Fixed(usize),
    /// First family whose name appears in the model id wins.
    PerModel {
        families: &'static [(&'static str, usize)],
        default: usize,
    },
}

impl BatchLimit {
    pub fn for_model(&self, model: &str) -> usize {
        match self {
            BatchLimit::Fixed(n) => *n,
            BatchLimit::PerModel { families, default } => families
                .iter()
                .find(|(family, _)| model.contains(family))
                .map_or(*default, |(_, n)| *n),
        }
    }
}

// ─────────────────────────────────────────────
// ProviderSpec: static metadata for one provider
// ─────────────────────────────────────────────

/// Built-in description of one provider.
#[derive(Clone, Debug)]
pub struct ProviderSpec {
    pub id: ProviderId,
    /// Human-readable name for logs.
    pub display_name: &'static str,
    /// Base URL used when the request leaves it empty.
    pub default_base_url: Option<&'static str>,
    pub capabilities: Capabilities,
    pub chat_dialect: ChatDialect,
    pub embedding_shape: EmbeddingShape,
    pub rerank_shape: RerankShape,
    pub listing: ListingStyle,
    /// Chat fields the vendor rejects; silently dropped.
    pub unsupported_params: &'static [ChatParam],
    pub embedding_batch_limit: BatchLimit,
    /// Native embedding endpoint, when it differs from `{base}/embeddings`.
    pub embedding_endpoint: Option<&'static str>,
    /// Native rerank endpoint, when it differs from `{base}/rerank`.
    pub rerank_endpoint: Option<&'static str>,
}

const fn openai_compatible(
    id: ProviderId,
    display_name: &'static str,
    default_base_url: &'static str,
) -> ProviderSpec {
    ProviderSpec {
        id,
        display_name,
        default_base_url: Some(default_base_url),
        capabilities: OPENAI_LIKE,
        chat_dialect: ChatDialect::OpenAiCompatible,
        embedding_shape: EmbeddingShape::OpenAiCompatible,
        rerank_shape: RerankShape::Flat,
        listing: ListingStyle::OpenAiCompatible,
        unsupported_params: &[],
        embedding_batch_limit: BatchLimit::Fixed(DEFAULT_EMBEDDING_BATCH_LIMIT),
        embedding_endpoint: None,
        rerank_endpoint: None,
    }
}

/// Every built-in provider.
pub static PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        embedding_batch_limit: BatchLimit::Fixed(2048),
        ..openai_compatible(ProviderId::OpenAi, "OpenAI", "https://api.openai.com/v1")
    },
    // Azure: no default base URL, deployments are per-tenant.
    ProviderSpec {
        id: ProviderId::AzureOpenAi,
        display_name: "Azure OpenAI",
        default_base_url: None,
        capabilities: Capabilities {
            azure_versioning: true,
            ..OPENAI_LIKE
        },
        chat_dialect: ChatDialect::Azure,
        embedding_shape: EmbeddingShape::OpenAiCompatible,
        rerank_shape: RerankShape::Flat,
        listing: ListingStyle::Unavailable,
        unsupported_params: &[],
        embedding_batch_limit: BatchLimit::Fixed(2048),
        embedding_endpoint: None,
        rerank_endpoint: None,
    },
    // Ollama: native API unless the base URL ends in /v1.
    ProviderSpec {
        id: ProviderId::Ollama,
        display_name: "Ollama",
        default_base_url: Some("http://localhost:11434"),
        capabilities: OPENAI_LIKE,
        chat_dialect: ChatDialect::Ollama,
        embedding_shape: EmbeddingShape::Ollama,
        rerank_shape: RerankShape::Flat,
        listing: ListingStyle::Ollama,
        unsupported_params: &[
            ChatParam::MaxTokens,
            ChatParam::ResponseFormat,
            ChatParam::LogitBias,
        ],
        embedding_batch_limit: BatchLimit::Fixed(DEFAULT_EMBEDDING_BATCH_LIMIT),
        embedding_endpoint: None,
        rerank_endpoint: None,
    },
    ProviderSpec {
        id: ProviderId::Gemini,
        display_name: "Gemini",
        default_base_url: Some("https://generativelanguage.googleapis.com/v1beta"),
        capabilities: Capabilities {
            native_multimodal: true,
            ..OPENAI_LIKE
        },
        chat_dialect: ChatDialect::Gemini,
        embedding_shape: EmbeddingShape::Gemini,
        rerank_shape: RerankShape::Flat,
        listing: ListingStyle::Gemini,
        unsupported_params: &[
            ChatParam::PresencePenalty,
            ChatParam::FrequencyPenalty,
            ChatParam::ResponseFormat,
            ChatParam::Seed,
            ChatParam::LogitBias,
        ],
        embedding_batch_limit: BatchLimit::Fixed(100),
        embedding_endpoint: None,
        rerank_endpoint: None,
    },
    ProviderSpec {
        unsupported_params: &[
            ChatParam::ResponseFormat,
            ChatParam::Seed,
            ChatParam::LogitBias,
        ],
        ..openai_compatible(ProviderId::DeepSeek, "DeepSeek", "https://api.deepseek.com/v1")
    },
    // BaiLian (DashScope): chat is OpenAI-compatible, embedding/rerank are native.
    ProviderSpec {
        embedding_shape: EmbeddingShape::DashScope,
        rerank_shape: RerankShape::Nested,
        embedding_batch_limit: BatchLimit::PerModel {
            families: &[("text-embedding-v3", 10), ("text-embedding-v4", 10)],
            default: 25,
        },
        embedding_endpoint: Some(
            "https://dashscope.aliyuncs.com/api/v1/services/embeddings/text-embedding/text-embedding",
        ),
        rerank_endpoint: Some(
            "https://dashscope.aliyuncs.com/api/v1/services/rerank/text-rerank/text-rerank",
        ),
        ..openai_compatible(
            ProviderId::BaiLian,
            "BaiLian",
            "https://dashscope.aliyuncs.com/compatible-mode/v1",
        )
    },
    ProviderSpec {
        listing: ListingStyle::OpenAiTyped,
        ..openai_compatible(
            ProviderId::BaiZhiCloud,
            "BaiZhiCloud",
            "https://model-square.app.baizhi.cloud/v1",
        )
    },
    ProviderSpec {
        listing: ListingStyle::OpenAiTyped,
        embedding_batch_limit: BatchLimit::Fixed(32),
        ..openai_compatible(
            ProviderId::SiliconFlow,
            "SiliconFlow",
            "https://api.siliconflow.cn/v1",
        )
    },
    openai_compatible(ProviderId::Moonshot, "Moonshot", "https://api.moonshot.cn/v1"),
    openai_compatible(
        ProviderId::Hunyuan,
        "Hunyuan",
        "https://api.hunyuan.cloud.tencent.com/v1",
    ),
    ProviderSpec {
        listing: ListingStyle::Unavailable,
        ..openai_compatible(
            ProviderId::Volcengine,
            "Volcengine",
            "https://ark.cn-beijing.volces.com/api/v3",
        )
    },
    ProviderSpec {
        listing: ListingStyle::Unavailable,
        ..openai_compatible(ProviderId::ZhiPu, "ZhiPu", "https://open.bigmodel.cn/api/paas/v4")
    },
    openai_compatible(ProviderId::AiHubMix, "AiHubMix", "https://aihubmix.com/v1"),
    openai_compatible(ProviderId::OcoolAi, "OcoolAI", "https://api.ocoolai.com/v1"),
    openai_compatible(ProviderId::Ppio, "PPIO", "https://api.ppinfra.com/v3/openai"),
    openai_compatible(ProviderId::OpenRouter, "OpenRouter", "https://openrouter.ai/api/v1"),
    // Generic OpenAI-compatible endpoint; the user always supplies the URL.
    ProviderSpec {
        default_base_url: None,
        ..openai_compatible(ProviderId::Other, "Other", "")
    },
];

/// Find a built-in spec by provider id.
pub fn find_by_id(id: ProviderId) -> Option<&'static ProviderSpec> {
    PROVIDERS.iter().find(|spec| spec.id == id)
}

// ─────────────────────────────────────────────
// ProviderDefaults: spec + config overrides
// ─────────────────────────────────────────────

/// Effective defaults for one provider after config overrides.
#[derive(Clone, Debug)]
pub struct ProviderDefaults {
    pub id: ProviderId,
    pub display_name: &'static str,
    pub base_url: Option<String>,
    pub capabilities: Capabilities,
    pub chat_dialect: ChatDialect,
    pub embedding_shape: EmbeddingShape,
    pub rerank_shape: RerankShape,
    pub listing: ListingStyle,
    pub unsupported_params: &'static [ChatParam],
    pub embedding_batch_limit: BatchLimit,
    pub embedding_endpoint: Option<&'static str>,
    pub rerank_endpoint: Option<&'static str>,
}

impl From<&ProviderSpec> for ProviderDefaults {
    fn from(spec: &ProviderSpec) -> Self {
        Self {
            id: spec.id,
            display_name: spec.display_name,
            base_url: spec.default_base_url.map(String::from),
            capabilities: spec.capabilities,
            chat_dialect: spec.chat_dialect,
            embedding_shape: spec.embedding_shape,
            rerank_shape: spec.rerank_shape,
            listing: spec.listing,
            unsupported_params: spec.unsupported_params,
            embedding_batch_limit: spec.embedding_batch_limit.clone(),
            embedding_endpoint: spec.embedding_endpoint,
            rerank_endpoint: spec.rerank_endpoint,
        }
    }
}

impl ProviderDefaults {
    /// Whether `param` may be sent to this provider.
    pub fn supports(&self, param: ChatParam) -> bool {
        !self.unsupported_params.contains(&param)
    }

    pub fn batch_limit(&self, model: &str) -> usize {
        self.embedding_batch_limit.for_model(model)
    }
}

// ─────────────────────────────────────────────
// ProviderRegistry
// ─────────────────────────────────────────────

/// Immutable lookup table `ProviderId → ProviderDefaults`.
#[derive(Clone, Debug)]
pub struct ProviderRegistry {
    entries: HashMap<ProviderId, ProviderDefaults>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ProviderRegistry {
    /// The built-in table with no overrides.
    pub fn builtin() -> Self {
        Self::from_config(&ProvidersConfig::default())
    }

    /// Built-in table with `providers` config overrides applied.
    pub fn from_config(config: &ProvidersConfig) -> Self {
        let mut entries = HashMap::new();
        for spec in PROVIDERS {
            let mut defaults = ProviderDefaults::from(spec);
            if let Some(over) = config.get(spec.id) {
                if over.disabled {
                    debug!(provider = spec.display_name, "Provider disabled by config");
                    continue;
                }
                if let Some(ref base) = over.base_url {
                    defaults.base_url = Some(base.clone());
                }
                if let Some(limit) = over.embedding_batch_limit {
                    defaults.embedding_batch_limit = BatchLimit::Fixed(limit);
                }
            }
            entries.insert(spec.id, defaults);
        }
        Self { entries }
    }

    /// Defaults for `id`, or `None` when the provider is not registered.
    pub fn lookup(&self, id: ProviderId) -> Option<&ProviderDefaults> {
        self.entries.get(&id)
    }

    /// Like [`lookup`](Self::lookup) but maps a miss to `UnsupportedProvider`.
    pub fn require(&self, id: ProviderId) -> Result<&ProviderDefaults> {
        self.lookup(id)
            .ok_or_else(|| ModelKitError::UnsupportedProvider(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
