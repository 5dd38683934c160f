//! Per-tag state machine: cache probe, reference resolution, execution and
//! self-healing on image-load failure.
//!
//! Every run captures the component's generation counter. A continuation only
//! mutates visible state while its generation is still current, so a run that
//! was superseded by an attribute or theme change discards its own result.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use promptpix_contracts::{
    derive_cache_key, ErrorDisplay, GenerationError, Operation, ReferenceAttr, TagAttributes,
};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::executor::{ExecuteOptions, ExecutionCore};
use crate::polling::{poll_until, PollPolicy, PollStep};

mod directory;
mod theme;

pub use directory::{AnchorSnapshot, ComponentDirectory};
pub use theme::ThemeScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentStatus {
    Idle,
    /// Probing the caches. Presentation keeps showing what it had.
    Checking,
    /// Genuine cache miss; a placeholder is appropriate.
    Loading,
    Done,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComponentState {
    pub status: ComponentStatus,
    pub image: Option<String>,
    pub error: Option<GenerationError>,
    pub cache_key: Option<String>,
}

impl ComponentState {
    fn idle() -> Self {
        Self {
            status: ComponentStatus::Idle,
            image: None,
            error: None,
            cache_key: None,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self.status, ComponentStatus::Done | ComponentStatus::Error)
    }

    pub fn error_display(&self) -> Option<ErrorDisplay> {
        self.error.as_ref().map(GenerationError::display)
    }
}

/// A mounted image tag.
///
/// Dropping the component cancels its in-flight work and removes it from the
/// directory.
pub struct Component {
    shared: Arc<Shared>,
    listener: JoinHandle<()>,
}

struct Shared {
    id: String,
    core: ExecutionCore,
    directory: ComponentDirectory,
    theme: ThemeScope,
    attributes: Mutex<TagAttributes>,
    last_theme: Mutex<Option<String>>,
    generation: AtomicU64,
    cancel: Mutex<CancellationToken>,
    load_failures: AtomicU32,
    state: watch::Sender<ComponentState>,
}

impl Component {
    /// Registers the component and starts its first run. Must be called from
    /// within a tokio runtime.
    pub fn mount(
        core: ExecutionCore,
        directory: ComponentDirectory,
        theme: ThemeScope,
        attributes: TagAttributes,
    ) -> Self {
        let id = attributes
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("promptpix-{}", uuid::Uuid::new_v4()));
        let (state, _) = watch::channel(ComponentState::idle());
        let theme_changes = theme.subscribe();
        let key_saves = core.keys().subscribe();
        let shared = Arc::new(Shared {
            id,
            core,
            directory,
            theme,
            attributes: Mutex::new(attributes),
            last_theme: Mutex::new(None),
            generation: AtomicU64::new(0),
            cancel: Mutex::new(CancellationToken::new()),
            load_failures: AtomicU32::new(0),
            state,
        });
        let listener = tokio::spawn(listen(shared.clone(), theme_changes, key_saves));
        shared.restart(false);
        Self { shared, listener }
    }

    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn attributes(&self) -> TagAttributes {
        self.shared.attributes()
    }

    /// Replaces the attributes; re-runs only when they actually differ.
    pub fn set_attributes(&self, attributes: TagAttributes) -> bool {
        {
            let mut current = lock(&self.shared.attributes);
            if *current == attributes {
                return false;
            }
            *current = attributes;
        }
        self.shared.load_failures.store(0, Ordering::SeqCst);
        self.shared.restart(false);
        true
    }

    pub fn refresh(&self) {
        self.shared.restart(false);
    }

    pub fn state(&self) -> ComponentState {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ComponentState> {
        self.shared.state.subscribe()
    }

    /// Resolves once the current run reaches `Done` or `Error`.
    pub async fn wait_settled(&self) -> ComponentState {
        let mut states = self.subscribe();
        let settled = states
            .wait_for(ComponentState::is_settled)
            .await
            .map(|state| state.clone());
        settled.unwrap_or_else(|_| self.state())
    }

    pub fn report_image_loaded(&self) {
        self.shared.load_failures.store(0, Ordering::SeqCst);
    }

    /// The presented image failed to load: drop its cache entry and regenerate,
    /// up to the configured ceiling.
    pub fn report_image_load_failure(&self) {
        let state = self.state();
        if state.status != ComponentStatus::Done {
            return;
        }
        let ceiling = self.shared.core.config().snapshot().image_load_retries;
        let failures = self.shared.load_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures <= ceiling {
            debug!(component = %self.shared.id, failures, "image failed to load, regenerating");
            self.shared.restart(true);
            return;
        }
        let generation = self.shared.generation.load(Ordering::SeqCst);
        let err = GenerationError::ImageUnrecoverable {
            url: state.image.unwrap_or_default(),
            attempts: ceiling,
        };
        warn!(component = %self.shared.id, error = %err, "giving up on image");
        self.shared.fail(generation, err);
    }

    pub fn unmount(self) {}
}

impl Drop for Component {
    fn drop(&mut self) {
        self.listener.abort();
        self.shared.supersede();
        self.shared.directory.remove(&self.shared.id);
    }
}

impl Shared {
    fn attributes(&self) -> TagAttributes {
        lock(&self.attributes).clone()
    }

    /// Invalidates the running generation and returns the fresh token.
    fn supersede(&self) -> (u64, CancellationToken) {
        let token = CancellationToken::new();
        let previous = std::mem::replace(&mut *lock(&self.cancel), token.clone());
        previous.cancel();
        // Bumped under the state lock so no update can interleave.
        let mut generation = 0;
        self.state.send_if_modified(|_| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            false
        });
        (generation, token)
    }

    fn restart(self: &Arc<Self>, invalidate: bool) {
        let (generation, cancel) = self.supersede();
        *lock(&self.last_theme) = self.theme.resolve();
        self.publish(None);
        self.update(generation, |state| {
            state.status = ComponentStatus::Checking;
            state.error = None;
        });
        let shared = self.clone();
        tokio::spawn(async move { shared.run(generation, cancel, invalidate).await });
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Applies `apply` only while `generation` is still the live one.
    fn update(&self, generation: u64, apply: impl FnOnce(&mut ComponentState)) -> bool {
        self.state.send_if_modified(|state| {
            if !self.is_current(generation) {
                return false;
            }
            apply(state);
            true
        })
    }

    fn fail(&self, generation: u64, err: GenerationError) {
        self.update(generation, |state| {
            state.status = ComponentStatus::Error;
            state.image = None;
            state.error = Some(err);
        });
    }

    fn publish(&self, resolved: Option<String>) {
        let attributes = self.attributes();
        self.directory.publish(AnchorSnapshot {
            id: self.id.clone(),
            provider: attributes.provider,
            prompt: attributes.prompt,
            resolved,
        });
    }

    async fn run(self: Arc<Self>, generation: u64, cancel: CancellationToken, invalidate: bool) {
        match self.execute(generation, &cancel, invalidate).await {
            Ok(url) => {
                let applied = self.update(generation, |state| {
                    state.status = ComponentStatus::Done;
                    state.image = Some(url.clone());
                    state.error = None;
                });
                if applied {
                    self.publish(Some(url));
                    debug!(component = %self.id, generation, "image ready");
                } else {
                    debug!(component = %self.id, generation, "discarding superseded result");
                }
            }
            Err(GenerationError::Cancelled) => {
                debug!(component = %self.id, generation, "run cancelled");
            }
            Err(err) => {
                if self.is_current(generation) {
                    warn!(component = %self.id, error = %err, "image generation failed");
                }
                self.fail(generation, err);
            }
        }
    }

    async fn execute(
        &self,
        generation: u64,
        cancel: &CancellationToken,
        invalidate: bool,
    ) -> Result<String, GenerationError> {
        let attributes = self.attributes();
        let theme = lock(&self.last_theme).clone();
        let provider = attributes.provider_id()?.to_string();
        let reference = attributes.reference();

        let params = attributes.to_params(theme.as_deref())?;
        let operation_name = attributes.operation_name();
        let (_, operation) =
            self.core
                .validate(&provider, &operation_name, &params, reference.is_some())?;

        // The anchor's literal attributes are part of the key, so it has to be
        // mounted before the key exists, whichever tag mounted first.
        let anchor = match &reference {
            Some(ReferenceAttr::Element(id)) => Some(
                self.await_directory(id, cancel, ComponentDirectory::anchor_identity)
                    .await?,
            ),
            _ => None,
        };
        let cache_key = derive_cache_key(&attributes, theme.as_deref(), anchor.as_ref());
        self.update(generation, |state| state.cache_key = Some(cache_key.clone()));

        if invalidate {
            self.core.invalidate_with_cancel(&cache_key, cancel).await;
        } else if let Some(hit) = self.core.lookup_with_cancel(&cache_key, cancel).await {
            return Ok(hit.url);
        }
        if !self.is_current(generation) {
            return Err(GenerationError::Cancelled);
        }
        self.update(generation, |state| state.status = ComponentStatus::Loading);

        let mut options = ExecuteOptions::new(cache_key, operation_name)
            .with_cancel(cancel.clone())
            .skip_cache(true);
        if requires_reference(operation) {
            let url = match reference {
                Some(ReferenceAttr::Url(url)) => url,
                Some(ReferenceAttr::Element(id)) => {
                    self.await_directory(&id, cancel, ComponentDirectory::resolved_output)
                        .await?
                }
                None => String::new(),
            };
            options = options.with_reference(url);
        }
        self.core.execute(&provider, &params, options).await
    }

    /// Reads `id` from the directory, polling until `read` yields a value.
    /// Used both for the anchor's identity and for its published output.
    async fn await_directory<T>(
        &self,
        id: &str,
        cancel: &CancellationToken,
        read: fn(&ComponentDirectory, &str) -> Option<T>,
    ) -> Result<T, GenerationError> {
        if let Some(value) = read(&self.directory, id) {
            return Ok(value);
        }
        let config = self.core.config().snapshot();
        let policy = PollPolicy {
            interval: config.reference_poll_interval(),
            max_attempts: config.reference_poll_max_attempts,
        };
        let clock = self.core.clock();
        poll_until(policy, clock.as_ref(), cancel, |_| {
            let step = match read(&self.directory, id) {
                Some(value) => PollStep::Succeeded(value),
                None => PollStep::Pending,
            };
            std::future::ready(step)
        })
        .await
        .map_err(|err| {
            err.into_generation_error(|attempts| GenerationError::ReferenceUnresolved {
                reference: format!("#{id}"),
                attempts,
            })
        })
    }

    fn on_theme_changed(self: &Arc<Self>) {
        let theme = self.theme.resolve();
        if *lock(&self.last_theme) == theme {
            return;
        }
        debug!(component = %self.id, "enclosing theme changed");
        self.restart(false);
    }

    fn on_key_saved(self: &Arc<Self>, provider: &str) {
        let waiting = {
            let state = self.state.borrow();
            state.status == ComponentStatus::Error
                && state.error.as_ref().is_some_and(GenerationError::needs_credentials)
        };
        let ours = self.attributes().provider_id().ok() == Some(provider);
        if waiting && ours {
            debug!(component = %self.id, provider, "credential saved, retrying");
            self.restart(false);
        }
    }
}

fn requires_reference(operation: Operation) -> bool {
    operation.requirements().requires_reference
}

async fn listen(
    shared: Arc<Shared>,
    mut theme_changes: watch::Receiver<u64>,
    mut key_saves: Option<broadcast::Receiver<String>>,
) {
    loop {
        tokio::select! {
            changed = theme_changes.changed() => {
                if changed.is_err() {
                    return;
                }
                shared.on_theme_changed();
            }
            saved = next_saved(&mut key_saves) => match saved {
                Ok(provider) => shared.on_key_saved(&provider),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => key_saves = None,
            },
        }
    }
}

async fn next_saved(
    receiver: &mut Option<broadcast::Receiver<String>>,
) -> Result<String, broadcast::error::RecvError> {
    match receiver {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use promptpix_contracts::{
        derive_cache_key, ErrorKind, GenerationError, TagAttributes,
    };
    use serde_json::Value;
    use tokio::sync::Notify;

    use super::{Component, ComponentDirectory, ComponentState, ComponentStatus, ThemeScope};
    use crate::credentials::KeyStore;
    use crate::http::{HttpMethod, HttpRequest, HttpResponse};
    use crate::test_support::{
        echo_provider, test_engine, test_engine_with_keys, FakeTransport, TestEngine,
        TEST_PROVIDER_URL,
    };

    fn tag(prompt: &str) -> TagAttributes {
        TagAttributes {
            provider: Some("p".to_string()),
            prompt: Some(prompt.to_string()),
            ..TagAttributes::default()
        }
    }

    fn mount(engine: &TestEngine, directory: &ComponentDirectory, attributes: TagAttributes) -> Component {
        Component::mount(
            engine.core.clone(),
            directory.clone(),
            ThemeScope::root(),
            attributes,
        )
    }

    async fn wait_until(
        component: &Component,
        predicate: impl FnMut(&ComponentState) -> bool,
    ) -> ComponentState {
        let mut states = component.subscribe();
        let waited = tokio::time::timeout(Duration::from_secs(5), states.wait_for(predicate)).await;
        let reached = match waited {
            Ok(Ok(state)) => Some(state.clone()),
            _ => None,
        };
        reached.unwrap_or_else(|| {
            panic!("component never reached the expected state: {:?}", component.state())
        })
    }

    fn prompt_of(request: &HttpRequest) -> Option<String> {
        request
            .json_body()
            .and_then(|body| body.get("prompt"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Echo provider that also serves every GET as a tiny PNG.
    fn echo_with_images(request: &HttpRequest) -> Result<HttpResponse, GenerationError> {
        if request.method == HttpMethod::Get {
            let mut response = HttpResponse::json(200, &Value::Null);
            response.headers.insert("content-type".to_string(), "image/png".to_string());
            response.body = b"PNG".to_vec();
            return Ok(response);
        }
        echo_provider(request)
    }

    fn anchor_and_derived() -> (TagAttributes, TagAttributes) {
        let mut anchor = tag("a cat");
        anchor.id = Some("src".to_string());
        let mut derived = tag("make it blue");
        derived.operation = Some("img2img".to_string());
        derived.img_ref = Some("#src".to_string());
        (anchor, derived)
    }

    #[tokio::test]
    async fn second_identical_tag_is_served_from_cache() {
        let engine = test_engine(FakeTransport::new(echo_provider));
        let directory = ComponentDirectory::new();
        let first = mount(&engine, &directory, tag("a red bicycle"));
        let state = first.wait_settled().await;
        assert_eq!(state.status, ComponentStatus::Done);
        assert_eq!(state.image.as_deref(), Some("https://img.example/a-red-bicycle.png"));

        let second = mount(&engine, &directory, tag("a red bicycle"));
        let state = second.wait_settled().await;
        assert_eq!(state.image.as_deref(), Some("https://img.example/a-red-bicycle.png"));
        assert_eq!(engine.transport.count_to(TEST_PROVIDER_URL), 1);
    }

    #[tokio::test]
    async fn cache_hit_never_shows_loading() {
        let engine = test_engine(FakeTransport::new(echo_provider));
        let directory = ComponentDirectory::new();
        let first = mount(&engine, &directory, tag("cached"));
        first.wait_settled().await;

        let second = mount(&engine, &directory, tag("cached"));
        let mut states = second.subscribe();
        let mut seen = vec![states.borrow_and_update().status];
        while !states.borrow().is_settled() {
            if states.changed().await.is_err() {
                break;
            }
            seen.push(states.borrow_and_update().status);
        }
        assert!(!seen.contains(&ComponentStatus::Loading), "{seen:?}");
        assert_eq!(second.state().status, ComponentStatus::Done);
    }

    #[tokio::test]
    async fn configuration_errors_never_reach_the_network() {
        let engine = test_engine(FakeTransport::unreachable());
        let directory = ComponentDirectory::new();
        let mut attributes = tag("a cat");
        attributes.provider = None;
        let component = mount(&engine, &directory, attributes);
        let state = component.wait_settled().await;
        assert_eq!(state.status, ComponentStatus::Error);
        assert!(matches!(state.error, Some(GenerationError::MissingAttribute { .. })));
        let display = state.error_display().map(|display| display.kind);
        assert_eq!(display, Some(ErrorKind::Configuration));
        assert!(engine.transport.requests().is_empty());
    }

    #[tokio::test]
    async fn saving_a_key_retries_automatically() {
        let keys = KeyStore::new();
        let engine = test_engine_with_keys(FakeTransport::new(echo_provider), keys.clone());
        let directory = ComponentDirectory::new();
        let component = mount(&engine, &directory, tag("a red bicycle"));
        let state = component.wait_settled().await;
        assert!(state.error.as_ref().is_some_and(GenerationError::needs_credentials));

        keys.save_key("other", "unrelated");
        tokio::task::yield_now().await;
        assert_eq!(component.state().status, ComponentStatus::Error);

        keys.save_key("p", "k-123");
        let state = wait_until(&component, |state| state.status == ComponentStatus::Done).await;
        assert_eq!(state.image.as_deref(), Some("https://img.example/a-red-bicycle.png"));
        let requests = engine.transport.requests();
        assert_eq!(requests[0].header("authorization"), Some("Bearer k-123"));
    }

    #[tokio::test]
    async fn superseded_runs_never_overwrite_newer_state() {
        let release = Arc::new(Notify::new());
        let transport = FakeTransport::new(echo_provider).holding(
            |request| prompt_of(request).as_deref() == Some("old"),
            release.clone(),
        );
        let engine = test_engine(transport);
        let directory = ComponentDirectory::new();
        let component = mount(&engine, &directory, tag("old"));
        wait_until(&component, |state| state.status == ComponentStatus::Loading).await;

        assert!(component.set_attributes(tag("new")));
        assert!(!component.set_attributes(tag("new")));
        let state = wait_until(&component, |state| state.status == ComponentStatus::Done).await;
        assert_eq!(state.image.as_deref(), Some("https://img.example/new.png"));

        release.notify_one();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(
            component.state().image.as_deref(),
            Some("https://img.example/new.png")
        );
    }

    #[tokio::test]
    async fn chained_reference_keys_immediately_and_waits_for_anchor() {
        let release = Arc::new(Notify::new());
        let transport = FakeTransport::new(echo_with_images).holding(
            |request| prompt_of(request).as_deref() == Some("a cat"),
            release.clone(),
        );
        let engine = test_engine(transport);
        engine
            .core
            .config()
            .update(|config| config.reference_poll_max_attempts = 1_000_000);
        let directory = ComponentDirectory::new();

        let (anchor_tag, derived_tag) = anchor_and_derived();
        let anchor = mount(&engine, &directory, anchor_tag);
        let derived = mount(&engine, &directory, derived_tag.clone());

        let state = wait_until(&derived, |state| state.status == ComponentStatus::Loading).await;
        let identity = directory.anchor_identity("src");
        let expected = derive_cache_key(&derived_tag, None, identity.as_ref());
        assert_eq!(state.cache_key.as_deref(), Some(expected.as_str()));
        assert_eq!(anchor.state().image, None);

        release.notify_one();
        let anchor_state = anchor.wait_settled().await;
        assert_eq!(anchor_state.image.as_deref(), Some("https://img.example/a-cat.png"));
        let state = wait_until(&derived, |state| state.status == ComponentStatus::Done).await;
        assert_eq!(state.image.as_deref(), Some("https://img.example/make-it-blue.png"));

        let requests = engine.transport.requests();
        let fetched = requests
            .iter()
            .any(|request| request.method == HttpMethod::Get && request.url == "https://img.example/a-cat.png");
        assert!(fetched);
        let generation = requests
            .iter()
            .filter_map(|request| request.json_body())
            .find(|body| body["prompt"] == "make it blue")
            .map(|body| body["image"].clone());
        assert_eq!(generation, Some(Value::from("data:image/png;base64,UE5H")));
    }

    #[tokio::test]
    async fn cache_key_does_not_depend_on_mount_order() {
        let (anchor_tag, derived_tag) = anchor_and_derived();

        let anchor_first = {
            let engine = test_engine(FakeTransport::new(echo_with_images));
            let directory = ComponentDirectory::new();
            let _anchor = mount(&engine, &directory, anchor_tag.clone());
            let derived = mount(&engine, &directory, derived_tag.clone());
            derived.wait_settled().await
        };

        let engine = test_engine(FakeTransport::new(echo_with_images));
        engine
            .core
            .config()
            .update(|config| config.reference_poll_max_attempts = 10_000);
        let directory = ComponentDirectory::new();
        let derived = mount(&engine, &directory, derived_tag.clone());
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        let waiting = derived.state();
        assert_eq!(waiting.status, ComponentStatus::Checking);
        assert_eq!(waiting.cache_key, None);
        let _anchor = mount(&engine, &directory, anchor_tag);
        let derived_first =
            wait_until(&derived, |state| state.status == ComponentStatus::Done).await;

        let identity = directory.anchor_identity("src");
        let expected = derive_cache_key(&derived_tag, None, identity.as_ref());
        assert_eq!(anchor_first.status, ComponentStatus::Done);
        assert_eq!(anchor_first.cache_key.as_deref(), Some(expected.as_str()));
        assert_eq!(derived_first.cache_key, anchor_first.cache_key);
        assert_ne!(
            derived_first.cache_key.as_deref(),
            Some(derive_cache_key(&derived_tag, None, None).as_str())
        );
    }

    #[tokio::test]
    async fn unresolved_reference_names_the_anchor() {
        let engine = test_engine(FakeTransport::new(echo_provider));
        engine
            .core
            .config()
            .update(|config| config.reference_poll_max_attempts = 3);
        let directory = ComponentDirectory::new();
        let mut attributes = tag("make it blue");
        attributes.operation = Some("img2img".to_string());
        attributes.img_ref = Some("#missing".to_string());
        let component = mount(&engine, &directory, attributes);
        let state = component.wait_settled().await;
        assert_eq!(
            state.error,
            Some(GenerationError::ReferenceUnresolved {
                reference: "#missing".to_string(),
                attempts: 3
            })
        );
        assert_eq!(state.cache_key, None);
        assert!(engine.transport.requests().is_empty());
    }

    #[tokio::test]
    async fn theme_change_regenerates_descendants() {
        let engine = test_engine(FakeTransport::new(echo_provider));
        let directory = ComponentDirectory::new();
        let root = ThemeScope::root().with_prompt("noir");
        let component = Component::mount(
            engine.core.clone(),
            directory.clone(),
            root.child(),
            tag("a cat"),
        );
        let state = component.wait_settled().await;
        assert_eq!(state.image.as_deref(), Some("https://img.example/a-cat,-noir.png"));

        root.set_prompt(Some("pastel".to_string()));
        let state = wait_until(&component, |state| {
            state.image.as_deref() == Some("https://img.example/a-cat,-pastel.png")
        })
        .await;
        assert_eq!(state.status, ComponentStatus::Done);
    }

    #[tokio::test]
    async fn image_load_failures_heal_until_the_ceiling() {
        let engine = test_engine(FakeTransport::new(echo_provider));
        let directory = ComponentDirectory::new();
        let component = mount(&engine, &directory, tag("flaky"));
        component.wait_settled().await;

        for expected_calls in 2..=3 {
            component.report_image_load_failure();
            let state = component.wait_settled().await;
            assert_eq!(state.status, ComponentStatus::Done);
            assert_eq!(engine.transport.count_to(TEST_PROVIDER_URL), expected_calls);
        }

        component.report_image_load_failure();
        let state = component.state();
        assert_eq!(
            state.error,
            Some(GenerationError::ImageUnrecoverable {
                url: "https://img.example/flaky.png".to_string(),
                attempts: 2
            })
        );
        assert_eq!(engine.transport.count_to(TEST_PROVIDER_URL), 3);
    }

    #[tokio::test]
    async fn unmount_leaves_the_directory() {
        let engine = test_engine(FakeTransport::hanging());
        let directory = ComponentDirectory::new();
        let mut attributes = tag("a cat");
        attributes.id = Some("hero".to_string());
        let component = mount(&engine, &directory, attributes);
        assert!(directory.get("hero").is_some());
        assert_eq!(component.id(), "hero");
        component.unmount();
        assert_eq!(directory.get("hero"), None);
    }
}
