//! Capability verification for ModelKit.
//!
//! - [`chat`]: the chat probe with its streaming fallback
//! - [`embedding`]: embedding calls, batch limits, index restoration
//! - [`rerank`]: rerank calls, top-N clamping, document backfill
//! - [`diagnostic`]: base-URL fix suggestions for failed calls
//! - [`kit`]: the [`ModelKit`] facade tying it all together

pub mod chat;
pub mod diagnostic;
pub mod embedding;
pub mod kit;
pub mod rerank;

#[cfg(test)]
mod testing;

pub use chat::{ChatOutcome, ChatVerifier, ProbePath};
pub use diagnostic::{DiagnosticAdvisor, DiagnosticSuggestion, FixKind, HostPlatform};
pub use embedding::EmbeddingVerifier;
pub use kit::{CheckReport, ListModelsRequest, ModelKit, ModelListReport};
pub use rerank::RerankVerifier;
