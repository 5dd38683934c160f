//! Fakes shared by the engine's unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use promptpix_contracts::{GenerationError, Operation, UniversalParams};
use serde_json::{json, Value};
use tokio::sync::Notify;

use crate::adapters::{AdapterRegistry, BuiltRequest, ProviderAdapter, ResponseShape};
use crate::cache::MemoryLayer;
use crate::config::EngineConfig;
use crate::credentials::KeyStore;
use crate::executor::ExecutionCore;
use crate::http::{Blob, HttpRequest, HttpResponse, HttpTransport};
use crate::polling::Clock;

type Responder = dyn Fn(&HttpRequest) -> Result<HttpResponse, GenerationError> + Send + Sync;
type Matcher = dyn Fn(&HttpRequest) -> bool + Send + Sync;

/// Scripted transport that records every request it receives.
pub(crate) struct FakeTransport {
    responder: Option<Box<Responder>>,
    held: Option<(Box<Matcher>, Arc<Notify>)>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeTransport {
    pub fn new(
        responder: impl Fn(&HttpRequest) -> Result<HttpResponse, GenerationError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            responder: Some(Box::new(responder)),
            held: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request stays pending forever.
    pub fn hanging() -> Self {
        Self {
            responder: None,
            held: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn unreachable() -> Self {
        Self::new(|_| {
            Err(GenerationError::Network {
                message: "connection refused".to_string(),
            })
        })
    }

    /// Requests matching `matcher` wait until `release` is notified.
    pub fn holding(
        mut self,
        matcher: impl Fn(&HttpRequest) -> bool + Send + Sync + 'static,
        release: Arc<Notify>,
    ) -> Self {
        self.held = Some((Box::new(matcher), release));
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count_to(&self, url_fragment: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.url.contains(url_fragment))
            .count()
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, GenerationError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Some((matcher, release)) = &self.held {
            if matcher(&request) {
                release.notified().await;
            }
        }
        match &self.responder {
            Some(responder) => responder(&request),
            None => std::future::pending().await,
        }
    }
}

/// Clock that records requested sleeps and returns at once.
#[derive(Default)]
pub(crate) struct ImmediateClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl ImmediateClock {
    pub fn sleeps(&self) -> Vec<Duration> {
        match self.sleeps.lock() {
            Ok(sleeps) => sleeps.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Clock for ImmediateClock {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
        tokio::task::yield_now().await;
    }
}

pub(crate) const TEST_PROVIDER_URL: &str = "https://p.example/generate";

/// Minimal synchronous adapter "p" answering `{"url": ...}`.
pub(crate) struct TestAdapter;

impl ProviderAdapter for TestAdapter {
    fn id(&self) -> &str {
        "p"
    }

    fn display_name(&self) -> &str {
        "Test provider"
    }

    fn supported_operations(&self) -> &[Operation] {
        &Operation::ALL
    }

    fn build_request(
        &self,
        params: &UniversalParams,
        operation: Operation,
        reference: Option<&Blob>,
    ) -> Result<BuiltRequest, GenerationError> {
        let mut request = BuiltRequest::json(TEST_PROVIDER_URL);
        request.set("operation", operation.as_str());
        request.set_opt("prompt", params.prompt.clone());
        if let Some(reference) = reference {
            request.set("image", reference.data_url());
        }
        request.merge_raw(&params.raw);
        Ok(request)
    }

    fn response_shape(&self) -> ResponseShape {
        ResponseShape {
            url_paths: &["/url"],
            b64_paths: &[],
            b64_mime: "image/png",
        }
    }
}

/// Answers provider calls with an image URL derived from the prompt.
pub(crate) fn echo_provider(request: &HttpRequest) -> Result<HttpResponse, GenerationError> {
    let prompt = request
        .json_body()
        .and_then(|body| body.get("prompt"))
        .and_then(Value::as_str)
        .unwrap_or("none")
        .replace(' ', "-");
    Ok(HttpResponse::json(
        200,
        &json!({ "url": format!("https://img.example/{prompt}.png") }),
    ))
}

pub(crate) struct TestEngine {
    pub core: ExecutionCore,
    pub transport: Arc<FakeTransport>,
    pub keys: KeyStore,
    pub local: Arc<MemoryLayer>,
}

/// Core with the test adapter, an in-memory cache and a key saved for "p".
pub(crate) fn test_engine(transport: FakeTransport) -> TestEngine {
    let keys = KeyStore::new();
    keys.save_key("p", "test-key");
    test_engine_with_keys(transport, keys)
}

pub(crate) fn test_engine_with_keys(transport: FakeTransport, keys: KeyStore) -> TestEngine {
    let transport = Arc::new(transport);
    let local = Arc::new(MemoryLayer::new());
    let mut registry = AdapterRegistry::new();
    registry.register(TestAdapter);
    let core = ExecutionCore::builder(registry)
        .config(EngineConfig::default())
        .keys(Arc::new(keys.clone()))
        .transport(transport.clone())
        .local_layer(local.clone())
        .clock(Arc::new(ImmediateClock::default()))
        .build();
    TestEngine {
        core,
        transport,
        keys,
        local,
    }
}
