//! Scripted transports for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use modelkit_core::{CallContext, ModelKitError, Result};
use modelkit_providers::{ChatTransport, ContentStream, HttpResponse, HttpTransport, VendorCallSpec};

/// Replays queued chat results and records every call it sees.
#[derive(Default)]
pub struct ScriptedChat {
    generate: Mutex<VecDeque<Result<String>>>,
    stream: Mutex<VecDeque<Result<Vec<String>>>>,
    calls: Mutex<Vec<VendorCallSpec>>,
    generate_calls: AtomicUsize,
    stream_calls: AtomicUsize,
}

impl ScriptedChat {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn generate_ok(self: Arc<Self>, text: &str) -> Arc<Self> {
        self.generate.lock().unwrap().push_back(Ok(text.to_string()));
        self
    }

    pub fn generate_err(self: Arc<Self>, err: ModelKitError) -> Arc<Self> {
        self.generate.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn stream_ok(self: Arc<Self>, parts: &[&str]) -> Arc<Self> {
        let parts = parts.iter().map(|p| p.to_string()).collect();
        self.stream.lock().unwrap().push_back(Ok(parts));
        self
    }

    pub fn stream_err(self: Arc<Self>, err: ModelKitError) -> Arc<Self> {
        self.stream.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    pub fn last_call(&self) -> Option<VendorCallSpec> {
        self.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ChatTransport for ScriptedChat {
    async fn generate(&self, ctx: &CallContext, call: &VendorCallSpec) -> Result<String> {
        ctx.check()?;
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(call.clone());
        self.generate
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ModelKitError::upstream(None, "no scripted generate result")))
    }

    async fn stream(&self, ctx: &CallContext, call: &VendorCallSpec) -> Result<ContentStream> {
        ctx.check()?;
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(call.clone());
        let parts = self
            .stream
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ModelKitError::upstream(None, "no scripted stream result")))?;
        Ok(stream::iter(parts.into_iter().map(Ok)).boxed())
    }
}

/// Answers every request with the same response and counts calls.
pub struct CannedHttp {
    response: HttpResponse,
    calls: Mutex<Vec<VendorCallSpec>>,
}

impl CannedHttp {
    pub fn new(response: HttpResponse) -> Arc<Self> {
        Arc::new(Self {
            response,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn json(status: u16, value: serde_json::Value) -> Arc<Self> {
        Self::new(HttpResponse::json(status, &value))
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_call(&self) -> Option<VendorCallSpec> {
        self.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl HttpTransport for CannedHttp {
    async fn send(&self, ctx: &CallContext, call: &VendorCallSpec) -> Result<HttpResponse> {
        ctx.check()?;
        self.calls.lock().unwrap().push(call.clone());
        Ok(self.response.clone())
    }
}
