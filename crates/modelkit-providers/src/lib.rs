//! Provider layer for ModelKit.
//!
//! Everything vendor-specific lives here; the verifiers only ever see
//! resolved calls and decoded text.
//!
//! # Architecture
//!
//! - [`registry`]: static defaults + capability flags per provider, config overrides
//! - [`normalizer`]: generic request → concrete [`VendorCallSpec`]
//! - [`headers`]: custom header strings and the request middleware seam
//! - [`transport`]: raw HTTP ([`HttpTransport`], [`ReqwestTransport`])
//! - [`chat`]: per-dialect generate/stream ([`ChatTransport`], [`HttpChatTransport`])
//! - [`listing`] / [`classify`]: model catalogs and model-type filtering

pub mod chat;
pub mod classify;
pub mod headers;
pub mod listing;
pub mod normalizer;
pub mod registry;
pub mod transport;

// Re-export main types for convenience
pub use chat::{ChatTransport, ContentStream, HttpChatTransport};
pub use classify::ModelFilter;
pub use headers::{HeaderInjector, RequestMiddleware};
pub use listing::ListedModel;
pub use normalizer::{CallPayload, RequestNormalizer, VendorCallSpec, WireFormat};
pub use registry::{
    ChatDialect, EmbeddingShape, ListingStyle, ProviderDefaults, ProviderRegistry, RerankShape,
    PROVIDERS,
};
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};
