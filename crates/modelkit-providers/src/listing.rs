//! Model catalog decoding.
//!
//! The normalizer builds the listing call; this module turns each
//! [`ListingStyle`]'s response into [`ListedModel`]s.

use serde::{Deserialize, Serialize};

use modelkit_core::{ModelKitError, ProviderId, Result};

use crate::classify::ModelFilter;
use crate::registry::ListingStyle;
use crate::transport::HttpResponse;

/// One entry of a provider's model catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedModel {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owned_by: Option<String>,
    pub provider: ProviderId,
}

// ── wire shapes ──

#[derive(Debug, Deserialize)]
struct OpenAiModel {
    id: String,
    #[serde(default)]
    owned_by: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiModelList {
    #[serde(default)]
    data: Vec<OpenAiModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaTag {
    #[serde(default)]
    name: String,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaTags {
    #[serde(default)]
    models: Vec<OllamaTag>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiModel {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiModelList {
    #[serde(default)]
    models: Vec<GeminiModel>,
}

/// Decode a successful listing response.
///
/// Gemini entries are kept only when they are `gemini` models that support
/// `generateContent`; the `models/` prefix is stripped. An empty Gemini
/// catalog is an `Upstream` error.
pub fn decode_listing(
    provider: ProviderId,
    style: ListingStyle,
    response: &HttpResponse,
) -> Result<Vec<ListedModel>> {
    let entry = |model: String, owned_by: Option<String>| ListedModel {
        model,
        owned_by,
        provider,
    };

    match style {
        ListingStyle::OpenAiCompatible | ListingStyle::OpenAiTyped => {
            let list: OpenAiModelList = response.decode()?;
            Ok(list
                .data
                .into_iter()
                .map(|m| entry(m.id, m.owned_by))
                .collect())
        }
        ListingStyle::Ollama => {
            let tags: OllamaTags = response.decode()?;
            Ok(tags
                .models
                .into_iter()
                .filter_map(|t| {
                    let name = if t.name.is_empty() { t.model? } else { t.name };
                    Some(entry(name, None))
                })
                .collect())
        }
        ListingStyle::Gemini => {
            let list: GeminiModelList = response.decode()?;
            let models: Vec<ListedModel> = list
                .models
                .into_iter()
                .filter(|m| {
                    m.name.contains("gemini")
                        && m.supported_generation_methods
                            .iter()
                            .any(|g| g == "generateContent")
                })
                .map(|m| {
                    let name = m.name.strip_prefix("models/").unwrap_or(&m.name).to_string();
                    entry(name, Some("google".to_string()))
                })
                .collect();
            if models.is_empty() {
                return Err(ModelKitError::upstream(
                    Some(response.status),
                    "no usable Gemini models found",
                ));
            }
            Ok(models)
        }
        ListingStyle::Unavailable => Err(ModelKitError::invalid_config(format!(
            "{} does not expose a model listing endpoint",
            provider
        ))),
    }
}

/// Keep only the models `filter` accepts; `None` keeps everything.
pub fn filter_models(models: Vec<ListedModel>, filter: Option<ModelFilter>) -> Vec<ListedModel> {
    match filter {
        Some(f) => models.into_iter().filter(|m| f.keeps(&m.model)).collect(),
        None => models,
    }
}
