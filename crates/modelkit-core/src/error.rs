//! Error taxonomy shared by every ModelKit component.

use thiserror::Error;

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ModelKitError>;

/// Everything that can go wrong while resolving, calling, or decoding a
/// vendor request.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelKitError {
    /// Bad base URL, bad header string, or a request the provider cannot express.
    /// Never retried.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The provider has no entry in the registry.
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// Non-2xx status, transport failure, or a vendor-reported error.
    #[error("{}", render_upstream(.status, .message))]
    Upstream {
        status: Option<u16>,
        message: String,
    },

    /// The vendor answered, but not in a shape we can decode.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The call worked but the model lacks the probed capability.
    #[error("capability unsupported: {0}")]
    CapabilityUnsupported(String),

    /// Input batch exceeds the provider's ceiling. Raised before any I/O.
    #[error("batch too large: {size} texts exceeds the limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    /// The caller cancelled the call or its deadline passed.
    #[error("cancelled: {0}")]
    Cancelled(String),
}

fn render_upstream(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("upstream error (status {code}): {message}"),
        None => format!("upstream error: {message}"),
    }
}

impl ModelKitError {
    /// Shorthand for an [`ModelKitError::Upstream`] error.
    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        ModelKitError::Upstream {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        ModelKitError::InvalidConfiguration(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        ModelKitError::MalformedResponse(message.into())
    }

    /// Whether a failed non-streaming chat attempt may be retried over the
    /// streaming transport.
    pub fn allows_stream_fallback(&self) -> bool {
        matches!(
            self,
            ModelKitError::Upstream { .. } | ModelKitError::MalformedResponse(_)
        )
    }

    /// Whether the diagnostic advisor should look at this error.
    pub fn is_diagnosable(&self) -> bool {
        matches!(
            self,
            ModelKitError::Upstream { .. } | ModelKitError::InvalidConfiguration(_)
        )
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ModelKitError::Upstream { status, .. } => *status,
            _ => None,
        }
    }
}

/// Render an error together with its whole `source()` chain.
///
/// `reqwest` keeps the interesting part ("Connection refused") a few
/// levels down, and the diagnostic advisor matches on that text.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if !rendered.contains(&text) {
            rendered.push_str(": ");
            rendered.push_str(&text);
        }
        source = inner.source();
    }
    rendered
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
