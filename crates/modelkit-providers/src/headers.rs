//! Custom header handling.
//!
//! Users can attach extra headers as a newline-separated `key=value` string.
//! The string is parsed once per request into a [`HeaderInjector`], which runs
//! as a [`RequestMiddleware`] on the outbound call and overrides a default
//! header only when it carries the same name.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};

use modelkit_core::{ModelKitError, Result};

use crate::normalizer::VendorCallSpec;

// ─────────────────────────────────────────────
// Middleware seam
// ─────────────────────────────────────────────

/// A step on the outbound request pipeline.
///
/// Runs after the normalizer has produced the vendor call and before the
/// transport sends it.
pub trait RequestMiddleware: Send + Sync {
    fn on_before_send(&self, call: &mut VendorCallSpec) -> Result<()>;
}

// ─────────────────────────────────────────────
// Header string parsing
// ─────────────────────────────────────────────

/// Parse `key=value` lines into a header map.
///
/// Blank lines and lines without `=` are skipped. Names and values are
/// trimmed; a name or value that is not a legal HTTP header fails with
/// `InvalidConfiguration`.
pub fn parse_header_string(raw: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for line in raw.split('\n') {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            warn!(line = %line, "Skipping header line without '='");
            continue;
        };
        let name = HeaderName::from_bytes(key.trim().as_bytes()).map_err(|e| {
            ModelKitError::invalid_config(format!("invalid header name '{}': {}", key.trim(), e))
        })?;
        let value = HeaderValue::from_str(value.trim()).map_err(|e| {
            ModelKitError::invalid_config(format!("invalid value for header '{}': {}", name, e))
        })?;
        headers.insert(name, value);
    }
    Ok(headers)
}

// ─────────────────────────────────────────────
// HeaderInjector
// ─────────────────────────────────────────────

/// Merges user headers into the outbound call, replacing same-name defaults.
#[derive(Clone, Debug, Default)]
pub struct HeaderInjector {
    headers: HeaderMap,
}

impl HeaderInjector {
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    /// Build from an optional `key=value` header string.
    pub fn from_header_string(raw: Option<&str>) -> Result<Self> {
        match raw {
            Some(raw) if !raw.trim().is_empty() => Ok(Self::new(parse_header_string(raw)?)),
            _ => Ok(Self::default()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

impl RequestMiddleware for HeaderInjector {
    fn on_before_send(&self, call: &mut VendorCallSpec) -> Result<()> {
        for (name, value) in self.headers.iter() {
            if call.headers.contains_key(name) {
                debug!(header = %name, "Custom header overrides default");
            }
            call.headers.insert(name.clone(), value.clone());
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
