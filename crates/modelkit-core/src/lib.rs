//! Core building blocks for ModelKit.
//!
//! - [`types`]: provider identity, invocation requests, normalized results
//! - [`message`]: OpenAI-format chat messages shared by every dialect
//! - [`error`]: the [`ModelKitError`] taxonomy
//! - [`config`]: `~/.modelkit/config.json` schema and loader
//! - [`cancel`]: per-call cancellation and deadlines
//! - [`probe`]: the image asset used by multimodal capability checks

pub mod cancel;
pub mod config;
pub mod error;
pub mod logging;
pub mod message;
pub mod probe;
pub mod types;
pub mod utils;

pub use cancel::CallContext;
pub use error::{ModelKitError, Result};
pub use probe::ProbeImage;
pub use types::{
    ChatParam, EmbeddingParameters, EmbeddingResult, EmbeddingVector, EncodingFormat,
    ModelInvocationRequest, ModelParameters, OutputType, ProviderId, RerankHit, RerankResult,
    ResponseFormat, SparseEntry, TaskKind, Usage,
};
