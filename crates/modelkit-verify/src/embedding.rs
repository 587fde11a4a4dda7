//! Embedding verifier: one vendor call, normalized to [`EmbeddingResult`].
//!
//! Every shape is decoded into `(index?, dense?, sparse?)` entries first;
//! [`restore_order`] then maps them back onto input positions.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use tracing::{debug, warn};

use modelkit_core::{
    CallContext, EmbeddingResult, EmbeddingVector, ModelInvocationRequest, ModelKitError, Result,
    SparseEntry, Usage,
};
use modelkit_providers::{
    CallPayload, EmbeddingShape, HttpResponse, HttpTransport, ProviderDefaults,
    RequestNormalizer, WireFormat,
};

/// Texts used by the embedding capability check.
pub const PROBE_TEXTS: &[&str] = &["ModelKit embedding check"];

// ─────────────────────────────────────────────
// Wire shapes
// ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DenseWire {
    Floats(Vec<f32>),
    Base64(String),
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedding {
    #[serde(default)]
    index: Option<usize>,
    embedding: DenseWire,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    #[serde(default)]
    data: Vec<OpenAiEmbedding>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct DashScopeEmbedding {
    #[serde(default)]
    text_index: Option<usize>,
    #[serde(default)]
    embedding: Option<DenseWire>,
    #[serde(default)]
    sparse_embedding: Option<Vec<SparseEntry>>,
}

#[derive(Debug, Default, Deserialize)]
struct DashScopeOutput {
    #[serde(default)]
    embeddings: Vec<DashScopeEmbedding>,
}

#[derive(Debug, Deserialize)]
struct DashScopeEmbeddingResponse {
    #[serde(default)]
    output: DashScopeOutput,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbeddingResponse {
    #[serde(default)]
    embeddings: Vec<GeminiEmbedding>,
}

/// A decoded entry before order restoration.
#[derive(Debug, Default)]
pub struct RawEmbedding {
    pub index: Option<usize>,
    pub dense: Option<Vec<f32>>,
    pub sparse: Option<Vec<SparseEntry>>,
}

// ─────────────────────────────────────────────
// Decoding
// ─────────────────────────────────────────────

/// Little-endian f32 array packed as base64.
pub fn decode_base64_vector(encoded: &str) -> Result<Vec<f32>> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| ModelKitError::malformed(format!("invalid base64 embedding: {}", e)))?;
    if bytes.len() % 4 != 0 {
        return Err(ModelKitError::malformed(format!(
            "base64 embedding has {} bytes, not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn dense(wire: DenseWire) -> Result<Vec<f32>> {
    match wire {
        DenseWire::Floats(v) => Ok(v),
        DenseWire::Base64(s) => decode_base64_vector(&s),
    }
}

/// Decode a successful body for `shape`.
pub fn decode_embeddings(
    shape: EmbeddingShape,
    response: &HttpResponse,
) -> Result<(Vec<RawEmbedding>, Option<Usage>)> {
    match shape {
        EmbeddingShape::OpenAiCompatible => {
            let resp: OpenAiEmbeddingResponse = response.decode()?;
            let entries = resp
                .data
                .into_iter()
                .map(|e| {
                    Ok(RawEmbedding {
                        index: e.index,
                        dense: Some(dense(e.embedding)?),
                        sparse: None,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok((entries, resp.usage))
        }
        EmbeddingShape::DashScope => {
            let resp: DashScopeEmbeddingResponse = response.decode()?;
            let entries = resp
                .output
                .embeddings
                .into_iter()
                .map(|e| {
                    Ok(RawEmbedding {
                        index: e.text_index,
                        dense: e.embedding.map(dense).transpose()?,
                        sparse: e.sparse_embedding,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok((entries, resp.usage))
        }
        EmbeddingShape::Ollama => {
            let resp: OllamaEmbeddingResponse = response.decode()?;
            let usage = resp.prompt_eval_count.map(|n| Usage {
                prompt_tokens: Some(n),
                ..Default::default()
            });
            let entries = resp
                .embeddings
                .into_iter()
                .map(|v| RawEmbedding {
                    index: None,
                    dense: Some(v),
                    sparse: None,
                })
                .collect();
            Ok((entries, usage))
        }
        EmbeddingShape::Gemini => {
            let resp: GeminiEmbeddingResponse = response.decode()?;
            let entries = resp
                .embeddings
                .into_iter()
                .map(|e| RawEmbedding {
                    index: None,
                    dense: Some(e.values),
                    sparse: None,
                })
                .collect();
            Ok((entries, None))
        }
    }
}

/// Put entries back in input order.
///
/// An explicit index wins; otherwise the response position is used. The
/// count must equal `expected` and every index must be unique and in range.
pub fn restore_order(entries: Vec<RawEmbedding>, expected: usize) -> Result<Vec<EmbeddingVector>> {
    if entries.len() != expected {
        return Err(ModelKitError::malformed(format!(
            "expected {} embeddings, got {}",
            expected,
            entries.len()
        )));
    }

    let mut slots: Vec<Option<EmbeddingVector>> = vec![None; expected];
    for (position, entry) in entries.into_iter().enumerate() {
        let index = entry.index.unwrap_or(position);
        let slot = slots.get_mut(index).ok_or_else(|| {
            ModelKitError::malformed(format!(
                "embedding index {} out of range for {} inputs",
                index, expected
            ))
        })?;
        if slot.is_some() {
            return Err(ModelKitError::malformed(format!(
                "duplicate embedding index {}",
                index
            )));
        }
        *slot = Some(EmbeddingVector {
            text_index: index,
            dense: entry.dense,
            sparse: entry.sparse,
        });
    }

    Ok(slots.into_iter().flatten().collect())
}

// ─────────────────────────────────────────────
// EmbeddingVerifier
// ─────────────────────────────────────────────

#[derive(Clone)]
pub struct EmbeddingVerifier {
    http: Arc<dyn HttpTransport>,
}

impl EmbeddingVerifier {
    pub fn new(http: Arc<dyn HttpTransport>) -> Self {
        Self { http }
    }

    /// Embed `texts`; result `i` belongs to `texts[i]`.
    pub async fn embed(
        &self,
        ctx: &CallContext,
        request: &ModelInvocationRequest,
        defaults: &ProviderDefaults,
        texts: &[String],
    ) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Err(ModelKitError::invalid_config("no texts to embed"));
        }
        let limit = defaults.batch_limit(&request.model);
        if texts.len() > limit {
            return Err(ModelKitError::BatchTooLarge {
                size: texts.len(),
                limit,
            });
        }

        let call = RequestNormalizer::build(request, defaults, CallPayload::Embedding { texts })?;
        let WireFormat::Embedding(shape) = call.wire else {
            return Err(ModelKitError::invalid_config("normalizer produced a non-embedding call"));
        };

        let response = self.http.send(ctx, &call).await?.error_for_status()?;
        let (entries, usage) = decode_embeddings(shape, &response)?;
        if entries.is_empty() {
            warn!(provider = defaults.display_name, model = %request.model, "Vendor returned no embeddings");
            return Err(ModelKitError::upstream(Some(response.status), "empty embeddings"));
        }

        let vectors = restore_order(entries, texts.len())?;
        debug!(
            provider = defaults.display_name,
            model = %request.model,
            count = vectors.len(),
            dims = vectors.first().and_then(|v| v.dense.as_ref()).map_or(0, Vec::len),
            "Embeddings decoded"
        );
        Ok(EmbeddingResult { vectors, usage })
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CannedHttp;
    use modelkit_core::{ProviderId, TaskKind};
    use modelkit_providers::ProviderRegistry;
    use serde_json::json;

    fn defaults(id: ProviderId) -> ProviderDefaults {
        ProviderRegistry::builtin().lookup(id).unwrap().clone()
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("text {i}")).collect()
    }

    fn request(provider: ProviderId, model: &str) -> ModelInvocationRequest {
        ModelInvocationRequest::new(provider, model, TaskKind::Embedding).with_api_key("k")
    }

    #[tokio::test]
    async fn test_batch_too_large_makes_no_call() {
        let http = CannedHttp::json(200, json!({}));
        let verifier = EmbeddingVerifier::new(http.clone());
        let err = verifier
            .embed(
                &CallContext::new(),
                &request(ProviderId::BaiLian, "text-embedding-v3"),
                &defaults(ProviderId::BaiLian),
                &texts(11),
            )
            .await
            .unwrap_err();

        assert_eq!(err, ModelKitError::BatchTooLarge { size: 11, limit: 10 });
        assert_eq!(http.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let http = CannedHttp::json(200, json!({}));
        let verifier = EmbeddingVerifier::new(http.clone());
        let err = verifier
            .embed(
                &CallContext::new(),
                &request(ProviderId::OpenAi, "text-embedding-3-small"),
                &defaults(ProviderId::OpenAi),
                &[],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ModelKitError::InvalidConfiguration(_)));
        assert_eq!(http.call_count(), 0);
    }

    #[tokio::test]
    async fn test_openai_reordered_response() {
        let http = CannedHttp::json(
            200,
            json!({
                "object": "list",
                "data": [
                    {"index": 2, "embedding": [0.2]},
                    {"index": 0, "embedding": [0.0]},
                    {"index": 1, "embedding": [0.1]}
                ],
                "usage": {"prompt_tokens": 6, "total_tokens": 6}
            }),
        );
        let verifier = EmbeddingVerifier::new(http);
        let result = verifier
            .embed(
                &CallContext::new(),
                &request(ProviderId::OpenAi, "text-embedding-3-small"),
                &defaults(ProviderId::OpenAi),
                &texts(3),
            )
            .await
            .unwrap();

        assert_eq!(result.len(), 3);
        for (i, v) in result.vectors.iter().enumerate() {
            assert_eq!(v.text_index, i);
            assert_eq!(v.dense.as_deref(), Some(&[i as f32 / 10.0][..]));
        }
        assert_eq!(result.usage.unwrap().total_tokens, Some(6));
    }

    #[tokio::test]
    async fn test_openai_base64_vector() {
        let floats = [1.0f32, -2.5, 0.25];
        let bytes: Vec<u8> = floats.iter().flat_map(|f| f.to_le_bytes()).collect();
        let encoded = STANDARD.encode(bytes);
        let http = CannedHttp::json(200, json!({"data": [{"index": 0, "embedding": encoded}]}));

        let result = EmbeddingVerifier::new(http)
            .embed(
                &CallContext::new(),
                &request(ProviderId::OpenAi, "text-embedding-3-small"),
                &defaults(ProviderId::OpenAi),
                &texts(1),
            )
            .await
            .unwrap();
        assert_eq!(result.vectors[0].dense.as_deref(), Some(&floats[..]));
    }

    #[tokio::test]
    async fn test_dashscope_dense_and_sparse() {
        let http = CannedHttp::json(
            200,
            json!({
                "output": {"embeddings": [
                    {"text_index": 1, "embedding": [0.5, 0.5],
                     "sparse_embedding": [{"index": 7, "value": 0.9, "token": "dog"}]},
                    {"text_index": 0, "embedding": [0.1, 0.2], "sparse_embedding": []}
                ]},
                "usage": {"total_tokens": 4},
                "request_id": "abc"
            }),
        );
        let result = EmbeddingVerifier::new(http.clone())
            .embed(
                &CallContext::new(),
                &request(ProviderId::BaiLian, "text-embedding-v4"),
                &defaults(ProviderId::BaiLian),
                &texts(2),
            )
            .await
            .unwrap();

        assert_eq!(result.vectors[0].dense.as_deref(), Some(&[0.1f32, 0.2][..]));
        assert_eq!(result.vectors[0].sparse.as_deref(), Some(&[][..]));
        let sparse = result.vectors[1].sparse.as_ref().unwrap();
        assert_eq!(sparse[0].token, "dog");
        assert_eq!(sparse[0].index, 7);

        let call = http.last_call().unwrap();
        assert!(call.url.as_str().contains("/services/embeddings/"));
    }

    #[tokio::test]
    async fn test_ollama_native_positions() {
        let http = CannedHttp::json(
            200,
            json!({"model": "nomic-embed-text", "embeddings": [[1.0], [2.0]], "prompt_eval_count": 8}),
        );
        let result = EmbeddingVerifier::new(http)
            .embed(
                &CallContext::new(),
                &request(ProviderId::Ollama, "nomic-embed-text"),
                &defaults(ProviderId::Ollama),
                &texts(2),
            )
            .await
            .unwrap();
        assert_eq!(result.vectors[1].text_index, 1);
        assert_eq!(result.vectors[1].dense.as_deref(), Some(&[2.0f32][..]));
        assert_eq!(result.usage.unwrap().prompt_tokens, Some(8));
    }

    #[tokio::test]
    async fn test_gemini_batch_embed() {
        let http = CannedHttp::json(
            200,
            json!({"embeddings": [{"values": [0.5, 0.25]}, {"values": [0.75, 1.0]}]}),
        );
        let result = EmbeddingVerifier::new(http.clone())
            .embed(
                &CallContext::new(),
                &request(ProviderId::Gemini, "text-embedding-004"),
                &defaults(ProviderId::Gemini),
                &texts(2),
            )
            .await
            .unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.vectors[1].dense.as_deref(), Some(&[0.75, 1.0][..]));

        let call = http.last_call().unwrap();
        assert!(call.url.path().ends_with("models/text-embedding-004:batchEmbedContents"));
        assert_eq!(call.url.query(), Some("key=k"));
    }

    #[tokio::test]
    async fn test_empty_list_is_upstream() {
        let http = CannedHttp::json(200, json!({"data": []}));
        let err = EmbeddingVerifier::new(http)
            .embed(
                &CallContext::new(),
                &request(ProviderId::OpenAi, "m"),
                &defaults(ProviderId::OpenAi),
                &texts(1),
            )
            .await
            .unwrap_err();
        assert_eq!(err, ModelKitError::upstream(Some(200), "empty embeddings"));
    }

    #[tokio::test]
    async fn test_non_2xx_is_upstream() {
        let http = CannedHttp::json(400, json!({"code": "InvalidParameter", "message": "batch size is invalid"}));
        let err = EmbeddingVerifier::new(http)
            .embed(
                &CallContext::new(),
                &request(ProviderId::BaiLian, "text-embedding-v2"),
                &defaults(ProviderId::BaiLian),
                &texts(1),
            )
            .await
            .unwrap_err();
        assert_eq!(err, ModelKitError::upstream(Some(400), "batch size is invalid"));
    }

    #[test]
    fn test_restore_order_rejects_bad_indices() {
        let entry = |index| RawEmbedding {
            index: Some(index),
            dense: Some(vec![0.0]),
            sparse: None,
        };
        let err = restore_order(vec![entry(0), entry(0)], 2).unwrap_err();
        assert!(matches!(err, ModelKitError::MalformedResponse(_)));

        let err = restore_order(vec![entry(0), entry(5)], 2).unwrap_err();
        assert!(matches!(err, ModelKitError::MalformedResponse(_)));

        let err = restore_order(vec![entry(0)], 2).unwrap_err();
        assert!(matches!(err, ModelKitError::MalformedResponse(_)));
    }

    #[test]
    fn test_base64_bad_length() {
        let err = decode_base64_vector(&STANDARD.encode([1u8, 2, 3])).unwrap_err();
        assert!(matches!(err, ModelKitError::MalformedResponse(_)));
    }
}
