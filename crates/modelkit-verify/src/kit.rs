//! The `ModelKit` facade.
//!
//! Wires the registry, transports, verifiers, and diagnostic advisor into the
//! four operations a host actually calls: check a model, embed, rerank, and
//! list a provider's models.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use modelkit_core::config::ModelKitConfig;
use modelkit_core::{
    CallContext, EmbeddingResult, ModelInvocationRequest, ModelKitError, ProbeImage, ProviderId,
    RerankResult, Result, TaskKind,
};
use modelkit_providers::listing::{decode_listing, filter_models};
use modelkit_providers::{
    CallPayload, ChatTransport, HttpChatTransport, HttpTransport, ListedModel, ModelFilter,
    ProviderRegistry, RequestNormalizer, ReqwestTransport, WireFormat,
};

use crate::chat::{ChatVerifier, ProbePath};
use crate::diagnostic::{DiagnosticAdvisor, DiagnosticSuggestion};
use crate::embedding::{EmbeddingVerifier, PROBE_TEXTS};
use crate::rerank::{RerankVerifier, PROBE_DOCUMENTS, PROBE_QUERY};

/// Lower-cased fragments that mean the key is out of credit.
pub const BALANCE_KEYWORDS: &[&str] = &["quota", "billing", "balance", "payment required"];

/// Providers whose base URL is typed in by the user.
const EDITABLE_URL_PROVIDERS: &[ProviderId] =
    &[ProviderId::Other, ProviderId::Ollama, ProviderId::AzureOpenAi];

// ─────────────────────────────────────────────
// Reports
// ─────────────────────────────────────────────

/// Outcome of [`ModelKit::check_model`]. Exactly one of `content` / `error`
/// is set.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CheckReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_error")]
    pub error: Option<ModelKitError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<DiagnosticSuggestion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<ProbePath>,
    pub balance_exhausted: bool,
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

fn serialize_error<S: serde::Serializer>(
    err: &Option<ModelKitError>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match err {
        Some(e) => serializer.serialize_str(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

/// What to list.
#[derive(Clone, Debug)]
pub struct ListModelsRequest {
    pub provider: ProviderId,
    pub base_url: String,
    pub api_key: String,
    pub api_header: Option<String>,
    /// Sent upstream where the provider can filter by type (`sub_type`).
    pub task: Option<TaskKind>,
    /// Applied locally by model name after decoding.
    pub filter: Option<ModelFilter>,
}

impl ListModelsRequest {
    pub fn new(provider: ProviderId) -> Self {
        Self {
            provider,
            base_url: String::new(),
            api_key: String::new(),
            api_header: None,
            task: None,
            filter: None,
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

    /// Extra headers as `key=value` lines, same format as
    /// [`ModelInvocationRequest::with_api_header`].
    pub fn with_api_header(mut self, api_header: impl Into<String>) -> Self {
        self.api_header = Some(api_header.into());
        self
    }

    pub fn with_task(mut self, task: TaskKind) -> Self {
        self.task = Some(task);
        self
    }

    pub fn with_filter(mut self, filter: ModelFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    fn to_invocation(&self) -> ModelInvocationRequest {
        let mut req = ModelInvocationRequest::new(self.provider, "", self.task.unwrap_or_default())
            .with_base_url(self.base_url.clone())
            .with_api_key(self.api_key.clone());
        req.api_header = self.api_header.clone();
        req
    }
}

/// Outcome of [`ModelKit::list_models_report`].
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ModelListReport {
    pub models: Vec<ListedModel>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_error")]
    pub error: Option<ModelKitError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<DiagnosticSuggestion>,
}

// ─────────────────────────────────────────────
// ModelKit
// ─────────────────────────────────────────────

pub struct ModelKit {
    registry: Arc<ProviderRegistry>,
    http: Arc<dyn HttpTransport>,
    chat: ChatVerifier,
    embedding: EmbeddingVerifier,
    rerank: RerankVerifier,
    advisor: DiagnosticAdvisor,
}

impl std::fmt::Debug for ModelKit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelKit")
            .field("providers", &self.registry.len())
            .field("advisor", &self.advisor)
            .finish()
    }
}

impl ModelKit {
    /// Build the production stack: one pooled `reqwest` client shared by
    /// every verifier.
    pub fn from_config(config: &ModelKitConfig) -> Result<Self> {
        let registry = Arc::new(ProviderRegistry::from_config(&config.providers));
        let transport = ReqwestTransport::new(&config.http)?;
        let chat: Arc<dyn ChatTransport> = Arc::new(HttpChatTransport::new(transport.clone()));
        let http: Arc<dyn HttpTransport> = Arc::new(transport);

        let mut kit = Self::with_transports(
            registry,
            chat,
            http,
            DiagnosticAdvisor::new(&config.diagnostics),
        );
        if let Some(image) = ProbeImage::from_config(&config.probe)? {
            kit = kit.with_probe_image(image);
        }

        info!(providers = kit.registry.len(), "ModelKit initialized");
        Ok(kit)
    }

    pub fn with_transports(
        registry: Arc<ProviderRegistry>,
        chat: Arc<dyn ChatTransport>,
        http: Arc<dyn HttpTransport>,
        advisor: DiagnosticAdvisor,
    ) -> Self {
        Self {
            registry,
            chat: ChatVerifier::new(chat),
            embedding: EmbeddingVerifier::new(http.clone()),
            rerank: RerankVerifier::new(http.clone()),
            http,
            advisor,
        }
    }

    pub fn with_probe_image(mut self, image: ProbeImage) -> Self {
        self.chat = self.chat.with_probe_image(image);
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    // ── check ──

    /// Verify that `request` works end to end.
    ///
    /// Never fails: every error lands in the report, together with a base-URL
    /// fix when one applies.
    pub async fn check_model(&self, ctx: &CallContext, request: &ModelInvocationRequest) -> CheckReport {
        match self.run_check(ctx, request).await {
            Ok((content, path)) => CheckReport {
                content: Some(content),
                path,
                ..Default::default()
            },
            Err(err) => {
                let suggestion = self.advise(request.provider, &request.base_url, &err);
                let balance_exhausted = request.provider != ProviderId::Other && is_balance_error(&err);
                warn!(
                    provider = %request.provider,
                    model = %request.model,
                    task = %request.task,
                    error = %err,
                    suggestion = suggestion.as_ref().map(|s| s.fixed_url.as_str()),
                    "Model check failed"
                );
                CheckReport {
                    error: Some(err),
                    suggestion,
                    balance_exhausted,
                    ..Default::default()
                }
            }
        }
    }

    async fn run_check(
        &self,
        ctx: &CallContext,
        request: &ModelInvocationRequest,
    ) -> Result<(String, Option<ProbePath>)> {
        let defaults = self.registry.require(request.provider)?;
        match request.task {
            TaskKind::Chat => {
                let outcome = self.chat.verify(ctx, request, defaults).await?;
                Ok((outcome.content, Some(outcome.path)))
            }
            TaskKind::Embedding => {
                let texts: Vec<String> = PROBE_TEXTS.iter().map(|t| t.to_string()).collect();
                let result = self.embedding.embed(ctx, request, defaults, &texts).await?;
                let dims = result
                    .vectors
                    .first()
                    .and_then(|v| v.dense.as_ref())
                    .map_or(0, Vec::len);
                Ok((format!("{} embedding(s), {} dimensions", result.len(), dims), None))
            }
            TaskKind::Rerank => {
                let documents: Vec<String> = PROBE_DOCUMENTS.iter().map(|d| d.to_string()).collect();
                let result = self
                    .rerank
                    .rerank(ctx, request, defaults, PROBE_QUERY, &documents, None, false)
                    .await?;
                Ok((format!("{} rerank result(s)", result.hits.len()), None))
            }
        }
    }

    /// Base-URL fix for a failed call, if the error warrants a look.
    pub fn advise(&self, provider: ProviderId, base_url: &str, err: &ModelKitError) -> Option<DiagnosticSuggestion> {
        if !EDITABLE_URL_PROVIDERS.contains(&provider) && !err.is_diagnosable() {
            return None;
        }
        self.advisor.suggest(&err.to_string(), base_url, provider)
    }

    // ── embed / rerank ──

    pub async fn embed(
        &self,
        ctx: &CallContext,
        request: &ModelInvocationRequest,
        texts: &[String],
    ) -> Result<EmbeddingResult> {
        let defaults = self.registry.require(request.provider)?;
        self.embedding.embed(ctx, request, defaults, texts).await
    }

    pub async fn rerank(
        &self,
        ctx: &CallContext,
        request: &ModelInvocationRequest,
        query: &str,
        documents: &[String],
        top_n: Option<i64>,
        return_documents: bool,
    ) -> Result<RerankResult> {
        let defaults = self.registry.require(request.provider)?;
        self.rerank
            .rerank(ctx, request, defaults, query, documents, top_n, return_documents)
            .await
    }

    // ── listing ──

    pub async fn list_models(&self, ctx: &CallContext, request: &ListModelsRequest) -> Result<Vec<ListedModel>> {
        let defaults = self.registry.require(request.provider)?;
        let invocation = request.to_invocation();
        let call = RequestNormalizer::build(
            &invocation,
            defaults,
            CallPayload::ListModels { task: request.task },
        )?;
        let WireFormat::Listing(style) = call.wire else {
            return Err(ModelKitError::invalid_config("normalizer produced a non-listing call"));
        };

        let response = self.http.send(ctx, &call).await?.error_for_status()?;
        let models = decode_listing(request.provider, style, &response)?;
        let total = models.len();
        let models = filter_models(models, request.filter);
        info!(
            provider = defaults.display_name,
            total,
            kept = models.len(),
            "Listed models"
        );
        Ok(models)
    }

    /// [`list_models`](Self::list_models) folded into a report. Ollama
    /// failures carry a base-URL suggestion.
    pub async fn list_models_report(&self, ctx: &CallContext, request: &ListModelsRequest) -> ModelListReport {
        match self.list_models(ctx, request).await {
            Ok(models) => ModelListReport {
                models,
                ..Default::default()
            },
            Err(err) => {
                let suggestion = if request.provider == ProviderId::Ollama {
                    self.advisor.suggest(&err.to_string(), &request.base_url, request.provider)
                } else {
                    None
                };
                warn!(provider = %request.provider, error = %err, "Model listing failed");
                ModelListReport {
                    models: Vec::new(),
                    error: Some(err),
                    suggestion,
                }
            }
        }
    }
}

fn is_balance_error(err: &ModelKitError) -> bool {
    let text = err.to_string().to_lowercase();
    BALANCE_KEYWORDS.iter().any(|k| text.contains(k))
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CannedHttp, ScriptedChat};
    use serde_json::json;

    fn kit(chat: Arc<ScriptedChat>, http: Arc<CannedHttp>) -> ModelKit {
        ModelKit::with_transports(
            Arc::new(ProviderRegistry::builtin()),
            chat,
            http,
            DiagnosticAdvisor::default(),
        )
    }

    fn chat_request(provider: ProviderId, base_url: &str) -> ModelInvocationRequest {
        ModelInvocationRequest::new(provider, "m", TaskKind::Chat)
            .with_base_url(base_url)
            .with_api_key("k")
    }

    #[tokio::test]
    async fn test_check_model_ok() {
        let chat = ScriptedChat::new().generate_ok("hello");
        let kit = kit(chat, CannedHttp::json(200, json!({})));
        let report = kit
            .check_model(&CallContext::new(), &chat_request(ProviderId::DeepSeek, ""))
            .await;
        assert!(report.is_ok());
        assert_eq!(report.content.as_deref(), Some("hello"));
        assert_eq!(report.path, Some(ProbePath::NonStreaming));
    }

    #[tokio::test]
    async fn test_check_model_suggests_for_editable_provider() {
        let chat = ScriptedChat::new()
            .generate_err(ModelKitError::upstream(Some(404), "404 page not found"))
            .stream_err(ModelKitError::upstream(Some(404), "404 page not found"));
        let kit = kit(chat, CannedHttp::json(200, json!({})));
        let report = kit
            .check_model(
                &CallContext::new(),
                &chat_request(ProviderId::Other, "https://llm.example.com/v1/"),
            )
            .await;
        assert!(matches!(report.error, Some(ModelKitError::Upstream { .. })));
        let suggestion = report.suggestion.unwrap();
        assert_eq!(suggestion.fixed_url, "https://llm.example.com/v1");
        assert!(!report.balance_exhausted);
    }

    #[tokio::test]
    async fn test_check_model_balance() {
        let err = ModelKitError::upstream(Some(402), "Insufficient Balance");
        let chat = ScriptedChat::new().generate_err(err.clone()).stream_err(err);
        let kit = kit(chat, CannedHttp::json(200, json!({})));
        let report = kit
            .check_model(&CallContext::new(), &chat_request(ProviderId::DeepSeek, ""))
            .await;
        assert!(report.balance_exhausted);
        assert!(report.suggestion.is_none());
    }

    #[tokio::test]
    async fn test_check_model_embedding_dispatch() {
        let http = CannedHttp::json(
            200,
            json!({"data": [{"index": 0, "embedding": [0.1, 0.2, 0.3]}]}),
        );
        let kit = kit(ScriptedChat::new(), http.clone());
        let request = ModelInvocationRequest::new(ProviderId::SiliconFlow, "bge-m3", TaskKind::Embedding)
            .with_api_key("k");
        let report = kit.check_model(&CallContext::new(), &request).await;
        assert!(report.is_ok(), "{:?}", report.error);
        assert_eq!(http.call_count(), 1);
        assert!(report.content.unwrap().contains("3 dimensions"));
    }

    #[tokio::test]
    async fn test_list_models_filters_locally() {
        let http = CannedHttp::json(
            200,
            json!({"data": [{"id": "gpt-4o"}, {"id": "text-embedding-3-small"}]}),
        );
        let kit = kit(ScriptedChat::new(), http);
        let request = ListModelsRequest::new(ProviderId::OpenAi)
            .with_api_key("k")
            .with_filter(ModelFilter::Embedding);
        let models = kit.list_models(&CallContext::new(), &request).await.unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].model, "text-embedding-3-small");
    }

    #[tokio::test]
    async fn test_list_models_sends_custom_headers() {
        let http = CannedHttp::json(200, json!({"data": [{"id": "local-model"}]}));
        let kit = kit(ScriptedChat::new(), http.clone());
        let request = ListModelsRequest::new(ProviderId::Other)
            .with_base_url("https://llm.example.com/v1")
            .with_api_key("k")
            .with_api_header("X-Team=search");
        let models = kit.list_models(&CallContext::new(), &request).await.unwrap();
        assert_eq!(models.len(), 1);
        let call = http.last_call().unwrap();
        assert_eq!(call.headers.get("x-team").unwrap(), "search");
    }

    #[tokio::test]
    async fn test_list_models_report_ollama_suggestion() {
        let http = CannedHttp::json(404, json!({"error": "404 page not found"}));
        let kit = kit(ScriptedChat::new(), http);
        let request = ListModelsRequest::new(ProviderId::Ollama).with_base_url("http://localhost:11434/");
        let report = kit.list_models_report(&CallContext::new(), &request).await;
        assert!(report.models.is_empty());
        assert!(report.error.is_some());
        assert_eq!(report.suggestion.unwrap().fixed_url, "http://localhost:11434");
    }

    #[test]
    fn test_report_serializes_error_as_text() {
        let report = CheckReport {
            error: Some(ModelKitError::invalid_config("bad url")),
            ..Default::default()
        };
        let v = serde_json::to_value(&report).unwrap();
        assert_eq!(v["error"], json!("invalid configuration: bad url"));
        assert!(v.get("content").is_none());
    }
}
