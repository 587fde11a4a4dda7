//! HTTP transport: sends a [`VendorCallSpec`] and hands back status + body.
//!
//! [`ReqwestTransport`] owns the shared, connection-pooled `reqwest::Client`.
//! Embedding, rerank, and listing calls go through [`HttpTransport::send`];
//! chat streaming uses [`ReqwestTransport::open`] to keep the body as a
//! byte stream.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, warn};

use modelkit_core::config::HttpConfig;
use modelkit_core::error::error_chain;
use modelkit_core::utils::truncate_string;
use modelkit_core::{CallContext, ModelKitError, Result};

use crate::headers::RequestMiddleware;
use crate::normalizer::VendorCallSpec;

/// Longest upstream body echoed into an error message.
const MAX_ERROR_BODY: usize = 512;

// ─────────────────────────────────────────────
// HttpResponse
// ─────────────────────────────────────────────

/// A fully read vendor response.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Convenience for tests and mocks.
    pub fn json(status: u16, value: &Value) -> Self {
        Self::new(status, value.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Non-2xx → `Upstream` carrying the status and the vendor's message.
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ModelKitError::upstream(
                Some(self.status),
                upstream_message(&self.body),
            ))
        }
    }

    /// Decode the body, mapping failure to `MalformedResponse`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            ModelKitError::malformed(format!(
                "{}: {}",
                e,
                truncate_string(&self.text(), MAX_ERROR_BODY)
            ))
        })
    }
}

/// Best-effort human message from an error body.
///
/// Looks at `error.message`, a string `error`, `message`, and `msg` in that
/// order, falling back to the (truncated) raw text.
pub fn upstream_message(body: &[u8]) -> String {
    if let Ok(v) = serde_json::from_slice::<Value>(body) {
        if let Some(msg) = vendor_error(&v) {
            return msg;
        }
        for key in ["message", "msg"] {
            if let Some(msg) = v.get(key).and_then(Value::as_str) {
                return msg.to_string();
            }
        }
    }
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        "empty response body".to_string()
    } else {
        truncate_string(text, MAX_ERROR_BODY)
    }
}

/// An error object embedded in an otherwise successful body.
pub fn vendor_error(v: &Value) -> Option<String> {
    match v.get("error")? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => Some(
            obj.get("message")
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or_else(|| Value::Object(obj.clone()).to_string()),
        ),
        other => Some(other.to_string()),
    }
}

// ─────────────────────────────────────────────
// HttpTransport
// ─────────────────────────────────────────────

/// Raw request/response seam. Mocked in tests to count calls.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send `call` and read the whole body. Non-2xx is NOT an error here;
    /// callers decide with [`HttpResponse::error_for_status`].
    async fn send(&self, ctx: &CallContext, call: &VendorCallSpec) -> Result<HttpResponse>;
}

// ─────────────────────────────────────────────
// ReqwestTransport
// ─────────────────────────────────────────────

/// `reqwest`-backed transport with an optional middleware pipeline.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    middleware: Vec<Arc<dyn RequestMiddleware>>,
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

impl ReqwestTransport {
    /// Build the pooled client from `http` settings.
    pub fn new(http: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(http.timeout_secs))
            .connect_timeout(Duration::from_secs(http.connect_timeout_secs))
            .pool_max_idle_per_host(http.pool_max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(http.pool_idle_timeout_secs))
            .user_agent(http.user_agent.clone())
            .build()
            .map_err(|e| {
                ModelKitError::invalid_config(format!("failed to build HTTP client: {}", e))
            })?;
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self {
            client,
            middleware: Vec::new(),
        }
    }

    /// Append a middleware; runs after the ones already registered.
    pub fn with_middleware(mut self, middleware: Arc<dyn RequestMiddleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    fn prepare(&self, call: &VendorCallSpec) -> Result<reqwest::RequestBuilder> {
        let mut call = call.clone();
        for m in &self.middleware {
            m.on_before_send(&mut call)?;
        }
        let mut builder = self
            .client
            .request(call.method.clone(), call.url.clone())
            .headers(call.headers);
        if let Some(ref body) = call.body {
            builder = builder.json(body);
        }
        Ok(builder)
    }

    /// Send `call` and return the live response once the status is 2xx.
    ///
    /// A non-2xx status reads the body and fails with `Upstream`.
    pub async fn open(&self, ctx: &CallContext, call: &VendorCallSpec) -> Result<reqwest::Response> {
        let builder = self.prepare(call)?;
        let url = call.redacted_url();

        let response = ctx
            .run(async {
                builder.send().await.map_err(|e| {
                    let message = error_chain(&e);
                    error!(url = %url, error = %message, "HTTP request failed");
                    ModelKitError::upstream(e.status().map(|s| s.as_u16()), message)
                })
            })
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(url = %url, status = status.as_u16(), "Vendor responded");
            return Ok(response);
        }

        let body = ctx
            .run(async {
                response
                    .bytes()
                    .await
                    .map_err(|e| ModelKitError::upstream(Some(status.as_u16()), error_chain(&e)))
            })
            .await?;
        let message = upstream_message(&body);
        warn!(url = %url, status = status.as_u16(), error = %message, "Vendor error");
        Err(ModelKitError::upstream(Some(status.as_u16()), message))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, ctx: &CallContext, call: &VendorCallSpec) -> Result<HttpResponse> {
        let builder = self.prepare(call)?;
        let url = call.redacted_url();

        ctx.run(async {
            let response = builder.send().await.map_err(|e| {
                let message = error_chain(&e);
                error!(url = %url, error = %message, "HTTP request failed");
                ModelKitError::upstream(e.status().map(|s| s.as_u16()), message)
            })?;
            let status = response.status().as_u16();
            let body = response
                .bytes()
                .await
                .map_err(|e| ModelKitError::upstream(Some(status), error_chain(&e)))?;
            debug!(url = %url, status, bytes = body.len(), "Vendor responded");
            Ok(HttpResponse::new(status, body.to_vec()))
        })
        .await
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::HeaderInjector;
    use reqwest::header::HeaderMap;
    use reqwest::Method;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn post(url: &str, body: Value) -> VendorCallSpec {
        VendorCallSpec::new(
            Method::POST,
            url::Url::parse(url).unwrap(),
            HeaderMap::new(),
            Some(body),
        )
    }

    #[test]
    fn test_upstream_message_prefers_error_message() {
        let body = br#"{"error":{"message":"Invalid API key","type":"auth"}}"#;
        assert_eq!(upstream_message(body), "Invalid API key");
        assert_eq!(upstream_message(br#"{"error":"quota exceeded"}"#), "quota exceeded");
        assert_eq!(upstream_message(br#"{"message":"not found"}"#), "not found");
        assert_eq!(upstream_message(b"plain text"), "plain text");
        assert_eq!(upstream_message(b""), "empty response body");
    }

    #[test]
    fn test_error_for_status() {
        let ok = HttpResponse::new(200, "{}");
        assert!(ok.error_for_status().is_ok());

        let err = HttpResponse::new(401, r#"{"error":{"message":"bad key"}}"#)
            .error_for_status()
            .unwrap_err();
        assert_eq!(err, ModelKitError::upstream(Some(401), "bad key"));
    }

    #[test]
    fn test_decode_failure_is_malformed() {
        let resp = HttpResponse::new(200, "<html>");
        let err = resp.decode::<Value>().unwrap_err();
        assert!(matches!(err, ModelKitError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_send_posts_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(body_json(json!({"model": "m"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(&HttpConfig::default()).unwrap();
        let call = post(&format!("{}/v1/embeddings", server.uri()), json!({"model": "m"}));
        let resp = transport.send(&CallContext::new(), &call).await.unwrap();

        assert_eq!(resp.status, 200);
        assert_eq!(resp.decode::<Value>().unwrap(), json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_send_returns_non_2xx_without_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(&HttpConfig::default()).unwrap();
        let call = post(&server.uri(), json!({}));
        let resp = transport.send(&CallContext::new(), &call).await.unwrap();
        assert_eq!(resp.status, 429);
        assert_eq!(resp.text(), "slow down");
    }

    #[tokio::test]
    async fn test_open_maps_non_2xx_to_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"error": {"message": "no such model"}})),
            )
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(&HttpConfig::default()).unwrap();
        let call = post(&server.uri(), json!({}));
        let err = transport.open(&CallContext::new(), &call).await.unwrap_err();
        assert_eq!(err, ModelKitError::upstream(Some(404), "no such model"));
    }

    #[tokio::test]
    async fn test_middleware_applied() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-tenant", "acme"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let injector = HeaderInjector::from_header_string(Some("X-Tenant=acme")).unwrap();
        let transport = ReqwestTransport::new(&HttpConfig::default())
            .unwrap()
            .with_middleware(Arc::new(injector));
        let resp = transport
            .send(&CallContext::new(), &post(&server.uri(), json!({})))
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
    }

    #[tokio::test]
    async fn test_connection_refused_is_upstream() {
        // Nothing listens on port 9 locally.
        let transport = ReqwestTransport::new(&HttpConfig::default()).unwrap();
        let err = transport
            .send(&CallContext::new(), &post("http://127.0.0.1:9/v1", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelKitError::Upstream { status: None, .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_send() {
        let ctx = CallContext::new();
        ctx.cancel();
        let transport = ReqwestTransport::new(&HttpConfig::default()).unwrap();
        let err = transport
            .send(&ctx, &post("http://127.0.0.1:9/v1", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelKitError::Cancelled(_)));
    }
}
