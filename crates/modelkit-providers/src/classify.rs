//! Model-name classification used to filter listed models by type.
//!
//! Only the part after the last `/` is inspected, lowercased. Rerank wins
//! over embedding, and both exclude the code and vision classes.

use std::sync::OnceLock;

use regex::Regex;

use modelkit_core::TaskKind;

const RERANK: &str = r"(?i)(?:rerank|re-rank|re-ranker|re-ranking|retrieval|retriever)";

const EMBEDDING: &str =
    r"(?i)(?:^text-|embed|bge-|e5-|LLM2Vec|retrieval|uae-|gte-|jina-clip|jina-embeddings|voyage-)";

const CODE: &str = r"(?i)(?:^o3$|.*(code|claude\s+sonnet|claude\s+opus|gpt-4\.1|gpt-4o|gpt-5|gemini[\s-]+2\.5|o4-mini|kimi-k2).*)";

const VISION_MODELS: &[&str] = &[
    r"chatgpt-4o(?:-[\w-]+)?",
    r"claude-3",
    r"claude-opus-4",
    r"claude-sonnet-4",
    r"deepseek-vl(?:[\w-]+)?",
    r"doubao-seed-1[.-]6(?:-[\w-]+)?",
    r"gemini-1\.5",
    r"gemini-2\.0",
    r"gemini-2\.5",
    r"gemini-exp",
    r"gemma-3(?:-[\w-]+)",
    r"gemma3(?:[-:\w]+)?",
    r"glm-4(?:\.\d+)?v(?:-[\w-]+)?",
    r"gpt-4(?:-[\w-]+)",
    r"gpt-4.1(?:-[\w-]+)?",
    r"gpt-4.5(?:-[\w-]+)",
    r"gpt-4o(?:-[\w-]+)?",
    r"gpt-5(?:-[\w-]+)?",
    r"grok-4(?:-[\w-]+)?",
    r"grok-vision-beta",
    r"internvl2",
    r"kimi-latest",
    r"kimi-thinking-preview",
    r"kimi-vl-a3b-thinking(?:-[\w-]+)?",
    r"llama-4(?:-[\w-]+)?",
    r"llama-guard-4(?:-[\w-]+)?",
    r"llava",
    r"minicpm",
    r"moondream",
    r"o1(?:-[\w-]+)?",
    r"o3(?:-[\w-]+)?",
    r"o4(?:-[\w-]+)?",
    r"pixtral",
    r"qvq",
    r"qwen-vl",
    r"qwen2-vl",
    r"qwen2.5-omni",
    r"qwen2.5-vl",
    r"step-1o(?:.*vision)?",
    r"step-1v(?:-[\w-]+)?",
    r"vision",
];

const NOT_VISION_MODELS: &[&str] = &[
    r"AIDC-AI/Marco-o1",
    r"gpt-4-\d+-preview",
    r"gpt-4-turbo-preview",
    r"gpt-4-32k",
    r"gpt-4-\d+",
    r"o1-mini",
    r"o3-mini",
    r"o1-preview",
];

static RERANK_RE: OnceLock<Option<Regex>> = OnceLock::new();
static EMBEDDING_RE: OnceLock<Option<Regex>> = OnceLock::new();
static CODE_RE: OnceLock<Option<Regex>> = OnceLock::new();
static VISION_RE: OnceLock<Option<Regex>> = OnceLock::new();
static NOT_VISION_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn matches(cell: &'static OnceLock<Option<Regex>>, build: impl FnOnce() -> String, name: &str) -> bool {
    cell.get_or_init(|| Regex::new(&build()).ok())
        .as_ref()
        .map_or(false, |re| re.is_match(name))
}

fn word_alternation(patterns: &[&str]) -> String {
    format!(r"(?i)\b(?:{})\b", patterns.join("|"))
}

/// Lowercased model name after the last `/`.
pub fn base_model_name(model: &str) -> String {
    model.rsplit('/').next().unwrap_or(model).to_lowercase()
}

pub fn is_rerank_model(model: &str) -> bool {
    !model.is_empty() && matches(&RERANK_RE, || RERANK.to_string(), &base_model_name(model))
}

pub fn is_embedding_model(model: &str) -> bool {
    if model.is_empty() || is_rerank_model(model) {
        return false;
    }
    matches(&EMBEDDING_RE, || EMBEDDING.to_string(), &base_model_name(model))
}

pub fn is_code_model(model: &str) -> bool {
    if model.is_empty() || is_embedding_model(model) || is_rerank_model(model) {
        return false;
    }
    matches(&CODE_RE, || CODE.to_string(), &base_model_name(model))
}

pub fn is_vision_model(model: &str) -> bool {
    if model.is_empty() || is_embedding_model(model) || is_rerank_model(model) {
        return false;
    }
    let name = base_model_name(model);
    matches(&VISION_RE, || word_alternation(VISION_MODELS), &name)
        && !matches(&NOT_VISION_RE, || word_alternation(NOT_VISION_MODELS), &name)
}

// ─────────────────────────────────────────────
// ModelFilter
// ─────────────────────────────────────────────

/// Which listed models to keep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelFilter {
    /// Everything except embedding and rerank models.
    Chat,
    Embedding,
    Rerank,
    Code,
    Vision,
}

impl ModelFilter {
    /// Parse a model-type name; `None` means "no filtering".
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "chat" | "llm" => Some(ModelFilter::Chat),
            "embedding" | "embed" => Some(ModelFilter::Embedding),
            "rerank" | "reranker" => Some(ModelFilter::Rerank),
            "code" | "coder" => Some(ModelFilter::Code),
            "vision" | "analysis-vl" => Some(ModelFilter::Vision),
            _ => None,
        }
    }

    pub fn keeps(&self, model: &str) -> bool {
        match self {
            ModelFilter::Chat => !is_embedding_model(model) && !is_rerank_model(model),
            ModelFilter::Embedding => is_embedding_model(model),
            ModelFilter::Rerank => is_rerank_model(model),
            ModelFilter::Code => is_code_model(model),
            ModelFilter::Vision => is_vision_model(model),
        }
    }
}

impl From<TaskKind> for ModelFilter {
    fn from(task: TaskKind) -> Self {
        match task {
            TaskKind::Chat => ModelFilter::Chat,
            TaskKind::Embedding => ModelFilter::Embedding,
            TaskKind::Rerank => ModelFilter::Rerank,
        }
    }
}
