use std::sync::Arc;

use promptpix_contracts::errors::truncate_text;
use promptpix_contracts::{GenerationError, Operation, UniversalParams};
use tokio_util::sync::CancellationToken;

use crate::adapters::{response_json, AdapterRegistry, AuthHeader, CorsMode, ProviderAdapter};
use crate::cache::{CacheResult, LayeredCache, LocalLayer, MemoryLayer};
use crate::config::{EngineConfig, SharedConfig};
use crate::credentials::{EnvKeyResolver, KeyResolver};
use crate::http::{send_bounded, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
use crate::polling::{poll_until, Clock, PollPolicy, PollStep, TokioClock};
use crate::reference::fetch_reference;

pub const RELAY_TARGET_HEADER: &str = "x-relay-target";

/// Per-step logs go to `info` when the config asks for verbose output.
macro_rules! log_step {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub cache_key: String,
    /// Operation name as authored; validated against the closed set.
    pub operation: String,
    pub reference_url: Option<String>,
    pub cancel: CancellationToken,
    pub skip_cache: bool,
}

impl ExecuteOptions {
    pub fn new(cache_key: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            cache_key: cache_key.into(),
            operation: operation.into(),
            reference_url: None,
            cancel: CancellationToken::new(),
            skip_cache: false,
        }
    }

    pub fn with_reference(mut self, url: impl Into<String>) -> Self {
        self.reference_url = Some(url.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn skip_cache(mut self, skip: bool) -> Self {
        self.skip_cache = skip;
        self
    }

    fn has_reference(&self) -> bool {
        self.reference_url
            .as_deref()
            .map(|url| !url.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Orchestrates one image execution from cache lookup to cache write.
///
/// Cheap to clone; every clone shares the registry, cache and config.
#[derive(Clone)]
pub struct ExecutionCore {
    inner: Arc<CoreInner>,
}

struct CoreInner {
    registry: AdapterRegistry,
    keys: Arc<dyn KeyResolver>,
    config: SharedConfig,
    transport: Arc<dyn HttpTransport>,
    cache: LayeredCache,
    clock: Arc<dyn Clock>,
}

pub struct ExecutionCoreBuilder {
    registry: AdapterRegistry,
    keys: Option<Arc<dyn KeyResolver>>,
    config: SharedConfig,
    transport: Option<Arc<dyn HttpTransport>>,
    local: Option<Arc<dyn LocalLayer>>,
    clock: Option<Arc<dyn Clock>>,
}

impl ExecutionCoreBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = SharedConfig::new(config);
        self
    }

    pub fn shared_config(mut self, config: SharedConfig) -> Self {
        self.config = config;
        self
    }

    pub fn keys(mut self, keys: Arc<dyn KeyResolver>) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn local_layer(mut self, local: Arc<dyn LocalLayer>) -> Self {
        self.local = Some(local);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> ExecutionCore {
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(ReqwestTransport::new()));
        let local = self.local.unwrap_or_else(|| Arc::new(MemoryLayer::new()));
        ExecutionCore {
            inner: Arc::new(CoreInner {
                registry: self.registry,
                keys: self.keys.unwrap_or_else(|| Arc::new(EnvKeyResolver)),
                config: self.config,
                cache: LayeredCache::new(local, transport.clone()),
                transport,
                clock: self.clock.unwrap_or_else(|| Arc::new(TokioClock)),
            }),
        }
    }
}

impl ExecutionCore {
    pub fn builder(registry: AdapterRegistry) -> ExecutionCoreBuilder {
        ExecutionCoreBuilder {
            registry,
            keys: None,
            config: SharedConfig::new(EngineConfig::from_env()),
            transport: None,
            local: None,
            clock: None,
        }
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.inner.registry
    }

    pub fn config(&self) -> &SharedConfig {
        &self.inner.config
    }

    pub fn keys(&self) -> Arc<dyn KeyResolver> {
        self.inner.keys.clone()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.inner.clock.clone()
    }

    /// Checks provider, operation and the operation's required inputs.
    pub fn validate(
        &self,
        provider: &str,
        operation: &str,
        params: &UniversalParams,
        has_reference: bool,
    ) -> Result<(&dyn ProviderAdapter, Operation), GenerationError> {
        let adapter =
            self.inner
                .registry
                .get(provider)
                .ok_or_else(|| GenerationError::UnknownProvider {
                    provider: provider.to_string(),
                    available: self.inner.registry.names(),
                })?;
        let op = Operation::parse(operation).ok_or_else(|| GenerationError::UnknownOperation {
            operation: operation.to_string(),
            available: Operation::names(),
        })?;
        if !adapter.supports(op) {
            return Err(GenerationError::UnsupportedOperation {
                provider: provider.to_string(),
                operation: op.as_str().to_string(),
                supported: adapter
                    .supported_operations()
                    .iter()
                    .map(|op| op.as_str().to_string())
                    .collect(),
            });
        }
        let requirements = op.requirements();
        if requirements.requires_prompt && !params.has_prompt() {
            return Err(GenerationError::MissingPrompt {
                operation: op.as_str().to_string(),
            });
        }
        if requirements.requires_reference && !has_reference {
            return Err(GenerationError::MissingReference {
                operation: op.as_str().to_string(),
            });
        }
        Ok((adapter, op))
    }

    pub async fn execute(
        &self,
        provider: &str,
        params: &UniversalParams,
        options: ExecuteOptions,
    ) -> Result<String, GenerationError> {
        let config = self.inner.config.snapshot();
        let verbose = config.verbose;
        let key = options.cache_key.as_str();
        let cancel = &options.cancel;

        let (adapter, operation) =
            self.validate(provider, &options.operation, params, options.has_reference())?;

        if !options.skip_cache {
            if let Some(hit) = self.inner.cache.get_image(key, &config, cancel).await {
                log_step!(verbose, provider, cache_key = %key, age_ms = ?hit.age_ms, "cache hit");
                return Ok(hit.url);
            }
        }
        ensure_live(cancel)?;

        let api_key = self
            .inner
            .keys
            .get_key(provider)
            .await
            .ok_or_else(|| GenerationError::MissingCredential {
                provider: provider.to_string(),
            })?;
        ensure_live(cancel)?;

        let reference = match options.reference_url.as_deref() {
            Some(url) if operation.requirements().requires_reference => {
                log_step!(verbose, provider, cache_key = %key, "loading reference image");
                Some(
                    fetch_reference(
                        self.inner.transport.as_ref(),
                        url.trim(),
                        config.request_timeout(),
                        cancel,
                    )
                    .await?,
                )
            }
            _ => None,
        };

        let built = adapter.build_request(params, operation, reference.as_ref())?;
        let auth = adapter.auth_header(&api_key);
        log_step!(
            verbose,
            provider,
            operation = operation.as_str(),
            cache_key = %key,
            url = %built.url,
            "sending generation request"
        );
        let request = route(built.into_http(Some(&auth)), adapter.cors_mode(), &config);
        let response = self.send(adapter, request, &config, cancel).await?;

        let url = if adapter.is_async() {
            self.await_async_result(adapter, &response, &auth, &config, cancel)
                .await?
        } else {
            adapter.parse_response(&response, operation)?
        };

        let stored = self
            .inner
            .cache
            .set_image(key, &url, Some(provider), &config, cancel)
            .await;
        log_step!(verbose, provider, cache_key = %key, "generation complete");
        Ok(stored)
    }

    /// Read-only cache probe.
    pub async fn lookup(&self, cache_key: &str) -> Option<CacheResult> {
        self.lookup_with_cancel(cache_key, &CancellationToken::new())
            .await
    }

    /// Like [`lookup`](Self::lookup), but a remote probe in flight is
    /// abandoned as a miss once `cancel` fires.
    pub async fn lookup_with_cancel(
        &self,
        cache_key: &str,
        cancel: &CancellationToken,
    ) -> Option<CacheResult> {
        let config = self.inner.config.snapshot();
        self.inner.cache.get_image(cache_key, &config, cancel).await
    }

    pub async fn invalidate(&self, cache_key: &str) {
        self.invalidate_with_cancel(cache_key, &CancellationToken::new())
            .await;
    }

    pub async fn invalidate_with_cancel(&self, cache_key: &str, cancel: &CancellationToken) {
        let config = self.inner.config.snapshot();
        log_step!(config.verbose, cache_key = %cache_key, "invalidating cache entry");
        self.inner.cache.delete_image(cache_key, &config, cancel).await;
    }

    async fn send(
        &self,
        adapter: &dyn ProviderAdapter,
        request: HttpRequest,
        config: &EngineConfig,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, GenerationError> {
        let response = send_bounded(
            self.inner.transport.as_ref(),
            request,
            config.request_timeout(),
            cancel,
        )
        .await?;
        if !response.is_success() {
            return Err(GenerationError::Api {
                provider: adapter.id().to_string(),
                status: response.status,
                body: truncate_text(&response.text(), 512),
            });
        }
        Ok(response)
    }

    async fn await_async_result(
        &self,
        adapter: &dyn ProviderAdapter,
        initial: &HttpResponse,
        auth: &AuthHeader,
        config: &EngineConfig,
        cancel: &CancellationToken,
    ) -> Result<String, GenerationError> {
        let payload = response_json(adapter.id(), initial)?;
        match adapter.interpret_poll(&payload) {
            PollStep::Succeeded(url) => return Ok(url),
            PollStep::Failed(err) => return Err(err),
            PollStep::Pending => {}
        }
        let poll_url =
            adapter
                .poll_url(&payload)
                .ok_or_else(|| GenerationError::MalformedResponse {
                    provider: adapter.id().to_string(),
                    reason: "missing polling URL".to_string(),
                })?;

        let policy = PollPolicy {
            interval: config.poll_interval(),
            max_attempts: config.poll_max_attempts,
        };
        let poll_url = poll_url.as_str();
        poll_until(policy, self.inner.clock.as_ref(), cancel, move |attempt| {
            self.poll_once(adapter, poll_url, auth, config, cancel, attempt)
        })
        .await
        .map_err(|err| {
            err.into_generation_error(|attempts| GenerationError::PollingTimeout {
                provider: adapter.id().to_string(),
                attempts,
            })
        })
    }

    async fn poll_once(
        &self,
        adapter: &dyn ProviderAdapter,
        poll_url: &str,
        auth: &AuthHeader,
        config: &EngineConfig,
        cancel: &CancellationToken,
        attempt: u32,
    ) -> PollStep<String> {
        log_step!(config.verbose, provider = adapter.id(), attempt, "polling");
        let request = HttpRequest::get(poll_url).with_header(auth.name.as_str(), auth.value.as_str());
        let request = route(request, adapter.cors_mode(), config);
        let response = match self.send(adapter, request, config, cancel).await {
            Ok(response) => response,
            Err(err) => return PollStep::Failed(err),
        };
        match response_json(adapter.id(), &response) {
            Ok(payload) => adapter.interpret_poll(&payload),
            Err(err) => PollStep::Failed(err),
        }
    }
}

fn ensure_live(cancel: &CancellationToken) -> Result<(), GenerationError> {
    if cancel.is_cancelled() {
        return Err(GenerationError::Cancelled);
    }
    Ok(())
}

/// Sends relay-mode providers through the configured relay, which forwards to
/// the URL named in [`RELAY_TARGET_HEADER`]. Without a relay the call goes direct.
fn route(mut request: HttpRequest, mode: CorsMode, config: &EngineConfig) -> HttpRequest {
    let Some(relay) = config.relay_url.as_deref().filter(|_| mode == CorsMode::Relay) else {
        return request;
    };
    let target = std::mem::replace(&mut request.url, relay.to_string());
    request.with_header(RELAY_TARGET_HEADER, target)
}
