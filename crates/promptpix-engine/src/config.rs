use std::env;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Runtime configuration for the engine.
///
/// Every operation takes a snapshot when it starts, so updates through
/// [`SharedConfig::update`] apply from the next operation on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Forwarding endpoint for providers that cannot be called directly.
    pub relay_url: Option<String>,
    /// Upload/delete endpoint of the remote cache.
    pub storage_endpoint: Option<String>,
    /// Public, content-addressed base URL probed for remote hits.
    pub storage_public_base: Option<String>,
    pub remote_cache: bool,
    pub request_timeout_ms: u64,
    pub verbose: bool,
    pub poll_interval_ms: u64,
    pub poll_max_attempts: u32,
    pub reference_poll_interval_ms: u64,
    pub reference_poll_max_attempts: u32,
    pub image_load_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            relay_url: None,
            storage_endpoint: None,
            storage_public_base: None,
            remote_cache: true,
            request_timeout_ms: 120_000,
            verbose: false,
            poll_interval_ms: 2_000,
            poll_max_attempts: 60,
            reference_poll_interval_ms: 200,
            reference_poll_max_attempts: 300,
            image_load_retries: 2,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    pub fn apply_env(&mut self) {
        if let Some(value) = env_url("PROMPTPIX_RELAY_URL") {
            self.relay_url = Some(value);
        }
        if let Some(value) = env_url("PROMPTPIX_STORAGE_ENDPOINT") {
            self.storage_endpoint = Some(value);
        }
        if let Some(value) = env_url("PROMPTPIX_STORAGE_PUBLIC_BASE") {
            self.storage_public_base = Some(value);
        }
        if let Some(value) = env_flag("PROMPTPIX_REMOTE_CACHE") {
            self.remote_cache = value;
        }
        if let Some(value) = env_flag("PROMPTPIX_VERBOSE") {
            self.verbose = value;
        }
        if let Some(value) = env_number("PROMPTPIX_REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = value;
        }
    }

    /// Remote caching needs the flag plus both endpoints.
    pub fn remote_enabled(&self) -> bool {
        self.remote_cache && self.storage_endpoint.is_some() && self.storage_public_base.is_some()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reference_poll_interval(&self) -> Duration {
        Duration::from_millis(self.reference_poll_interval_ms)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<EngineConfig>>,
}

impl SharedConfig {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    pub fn snapshot(&self) -> EngineConfig {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update(&self, apply: impl FnOnce(&mut EngineConfig)) {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        apply(&mut guard);
    }
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_url(key: &str) -> Option<String> {
    non_empty_env(key).map(|value| value.trim_end_matches('/').to_string())
}

fn env_flag(key: &str) -> Option<bool> {
    let value = non_empty_env(key)?;
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_number(key: &str) -> Option<u64> {
    non_empty_env(key)?.parse().ok()
}
