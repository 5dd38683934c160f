use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::non_empty_env;

/// Resolves the stored credential for a provider.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    async fn get_key(&self, provider: &str) -> Option<String>;

    /// Notifications carrying the provider id whenever a key is saved.
    fn subscribe(&self) -> Option<broadcast::Receiver<String>> {
        None
    }
}

/// Reads keys from the conventional environment variables of each provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvKeyResolver;

impl EnvKeyResolver {
    fn env_names(provider: &str) -> &'static [&'static str] {
        match provider {
            "openai" => &["OPENAI_API_KEY", "OPENAI_API_KEY_BACKUP"],
            "stability" => &["STABILITY_API_KEY"],
            "replicate" => &["REPLICATE_API_TOKEN", "REPLICATE_API_KEY"],
            "fal" => &["FAL_KEY", "FAL_API_KEY"],
            "recraft" => &["RECRAFT_API_TOKEN", "RECRAFT_API_KEY"],
            "gemini" => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
            "bfl" => &["BFL_API_KEY"],
            _ => &[],
        }
    }

    pub fn lookup(provider: &str) -> Option<String> {
        let generic = format!(
            "PROMPTPIX_{}_KEY",
            provider.to_ascii_uppercase().replace('-', "_")
        );
        non_empty_env(&generic).or_else(|| {
            Self::env_names(provider)
                .iter()
                .find_map(|name| non_empty_env(name))
        })
    }
}

#[async_trait]
impl KeyResolver for EnvKeyResolver {
    async fn get_key(&self, provider: &str) -> Option<String> {
        Self::lookup(provider)
    }
}

/// In-memory credential store with save notifications.
///
/// Lookups fall through to `fallback` when no key was saved for a provider.
#[derive(Clone)]
pub struct KeyStore {
    keys: Arc<RwLock<BTreeMap<String, String>>>,
    saved: broadcast::Sender<String>,
    fallback: Option<Arc<dyn KeyResolver>>,
}

impl Default for KeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStore {
    pub fn new() -> Self {
        let (saved, _) = broadcast::channel(32);
        Self {
            keys: Arc::new(RwLock::new(BTreeMap::new())),
            saved,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn KeyResolver>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn save_key(&self, provider: &str, key: &str) {
        let provider = provider.trim().to_string();
        let key = key.trim().to_string();
        if provider.is_empty() || key.is_empty() {
            return;
        }
        match self.keys.write() {
            Ok(mut keys) => keys.insert(provider.clone(), key),
            Err(poisoned) => poisoned.into_inner().insert(provider.clone(), key),
        };
        debug!(provider = %provider, "api key saved");
        // No receivers is fine: nothing is waiting on this provider.
        let _ = self.saved.send(provider);
    }

    pub fn remove_key(&self, provider: &str) -> bool {
        let removed = match self.keys.write() {
            Ok(mut keys) => keys.remove(provider),
            Err(poisoned) => poisoned.into_inner().remove(provider),
        };
        removed.is_some()
    }

    pub fn has_saved_key(&self, provider: &str) -> bool {
        self.saved_key(provider).is_some()
    }

    fn saved_key(&self, provider: &str) -> Option<String> {
        match self.keys.read() {
            Ok(keys) => keys.get(provider).cloned(),
            Err(poisoned) => poisoned.into_inner().get(provider).cloned(),
        }
    }
}

#[async_trait]
impl KeyResolver for KeyStore {
    async fn get_key(&self, provider: &str) -> Option<String> {
        if let Some(key) = self.saved_key(provider) {
            return Some(key);
        }
        match &self.fallback {
            Some(fallback) => fallback.get_key(provider).await,
            None => None,
        }
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<String>> {
        Some(self.saved.subscribe())
    }
}
