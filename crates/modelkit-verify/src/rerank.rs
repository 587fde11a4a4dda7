//! Rerank verifier.
//!
//! Flat (`results[]`) and nested (`output.results[]`) envelopes decode into
//! the same hit list. Vendor order is kept; the list is truncated to the
//! clamped top-N afterwards.

use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use modelkit_core::{
    CallContext, ModelInvocationRequest, ModelKitError, RerankHit, RerankResult, Result, Usage,
};
use modelkit_providers::{
    CallPayload, HttpResponse, HttpTransport, ProviderDefaults, RequestNormalizer, RerankShape,
    WireFormat,
};

/// Fixed inputs for the rerank capability check.
pub const PROBE_QUERY: &str = "What is ModelKit?";
pub const PROBE_DOCUMENTS: &[&str] = &[
    "ModelKit verifies LLM provider connections.",
    "The weather is sunny today.",
];

/// `None` → `len`; `≤ 0` → 1; `> len` → `len`.
pub fn clamp_top_n(top_n: Option<i64>, len: usize) -> usize {
    match top_n {
        None => len,
        Some(n) if n <= 0 => 1,
        Some(n) => usize::try_from(n).map_or(len, |n| n.min(len)),
    }
}

// ── wire shapes ──

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DocumentWire {
    Text(String),
    Object {
        #[serde(default)]
        text: String,
    },
}

impl DocumentWire {
    fn into_text(self) -> String {
        match self {
            DocumentWire::Text(t) | DocumentWire::Object { text: t } => t,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HitWire {
    index: usize,
    #[serde(alias = "relavance_score", alias = "score")]
    relevance_score: f64,
    #[serde(default)]
    document: Option<DocumentWire>,
}

#[derive(Debug, Deserialize)]
struct FlatResponse {
    #[serde(default)]
    results: Vec<HitWire>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Default, Deserialize)]
struct NestedOutput {
    #[serde(default)]
    results: Vec<HitWire>,
}

#[derive(Debug, Deserialize)]
struct NestedResponse {
    #[serde(default)]
    output: NestedOutput,
    #[serde(default)]
    usage: Option<Usage>,
}

/// Decode a rerank body for `shape` into hits (documents as sent by the vendor).
pub fn decode_rerank(shape: RerankShape, response: &HttpResponse) -> Result<(Vec<RerankHit>, Option<Usage>)> {
    let (results, usage) = match shape {
        RerankShape::Flat => {
            let resp: FlatResponse = response.decode()?;
            (resp.results, resp.usage)
        }
        RerankShape::Nested => {
            let resp: NestedResponse = response.decode()?;
            (resp.output.results, resp.usage)
        }
    };
    let hits = results
        .into_iter()
        .map(|h| RerankHit {
            index: h.index,
            relevance_score: h.relevance_score,
            document: h.document.map(DocumentWire::into_text).unwrap_or_default(),
        })
        .collect();
    Ok((hits, usage))
}

// ─────────────────────────────────────────────
// RerankVerifier
// ─────────────────────────────────────────────

#[derive(Clone)]
pub struct RerankVerifier {
    http: Arc<dyn HttpTransport>,
}

impl RerankVerifier {
    pub fn new(http: Arc<dyn HttpTransport>) -> Self {
        Self { http }
    }

    /// Rank `documents` against `query`.
    ///
    /// With `return_documents` every hit carries its document text (taken
    /// from `documents[index]` when the vendor omits it); without, all
    /// document texts are empty.
    #[allow(clippy::too_many_arguments)]
    pub async fn rerank(
        &self,
        ctx: &CallContext,
        request: &ModelInvocationRequest,
        defaults: &ProviderDefaults,
        query: &str,
        documents: &[String],
        top_n: Option<i64>,
        return_documents: bool,
    ) -> Result<RerankResult> {
        if documents.is_empty() {
            return Err(ModelKitError::invalid_config("no documents to rerank"));
        }
        let top_n = clamp_top_n(top_n, documents.len());

        let call = RequestNormalizer::build(
            request,
            defaults,
            CallPayload::Rerank {
                query,
                documents,
                top_n,
                return_documents,
            },
        )?;
        let WireFormat::Rerank(shape) = call.wire else {
            return Err(ModelKitError::invalid_config("normalizer produced a non-rerank call"));
        };

        let response = self.http.send(ctx, &call).await?.error_for_status()?;
        let (mut hits, usage) = decode_rerank(shape, &response)?;
        if hits.is_empty() {
            return Err(ModelKitError::upstream(Some(response.status), "empty rerank results"));
        }

        hits.truncate(top_n);
        for hit in &mut hits {
            if !return_documents {
                hit.document.clear();
                continue;
            }
            if hit.document.is_empty() {
                hit.document = documents.get(hit.index).cloned().ok_or_else(|| {
                    ModelKitError::malformed(format!(
                        "rerank index {} out of range for {} documents",
                        hit.index,
                        documents.len()
                    ))
                })?;
            }
        }

        debug!(
            provider = defaults.display_name,
            model = %request.model,
            hits = hits.len(),
            top_n,
            "Rerank decoded"
        );
        Ok(RerankResult { hits, usage })
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
