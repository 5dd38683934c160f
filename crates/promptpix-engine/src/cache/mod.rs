use std::sync::Arc;

use chrono::Utc;
use promptpix_contracts::GenerationError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::http::HttpTransport;

mod local;
mod remote;

pub use local::{FileLayer, LocalEntry, LocalLayer, MemoryLayer};
use remote::RemoteTarget;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheResult {
    pub url: String,
    pub age_ms: Option<u64>,
}

/// Local layer in front of an optional remote, content-addressed layer.
///
/// Remote failures never surface: reads degrade to a miss and writes or
/// deletes are logged and otherwise ignored. Remote calls abort when `cancel`
/// fires.
#[derive(Clone)]
pub struct LayeredCache {
    local: Arc<dyn LocalLayer>,
    transport: Arc<dyn HttpTransport>,
}

impl LayeredCache {
    pub fn new(local: Arc<dyn LocalLayer>, transport: Arc<dyn HttpTransport>) -> Self {
        Self { local, transport }
    }

    pub async fn get_image(
        &self,
        key: &str,
        config: &EngineConfig,
        cancel: &CancellationToken,
    ) -> Option<CacheResult> {
        if let Some(entry) = self.local.get(key) {
            let age_ms = (Utc::now().timestamp_millis() - entry.stored_at).max(0) as u64;
            return Some(CacheResult {
                url: entry.url,
                age_ms: Some(age_ms),
            });
        }

        let target = RemoteTarget::from_config(config)?;
        match remote::probe(self.transport.as_ref(), &target, key, config, cancel).await {
            Ok(Some(hit)) => {
                debug!(cache_key = %key, "remote cache hit, backfilling local layer");
                self.store_local(key, &hit.url);
                Some(hit)
            }
            Ok(None) => None,
            Err(GenerationError::Cancelled) => {
                debug!(cache_key = %key, "remote cache probe cancelled");
                None
            }
            Err(err) => {
                warn!(cache_key = %key, error = %err, "remote cache probe failed");
                None
            }
        }
    }

    /// Stores `url` and returns the reference later lookups will resolve to.
    pub async fn set_image(
        &self,
        key: &str,
        url: &str,
        model: Option<&str>,
        config: &EngineConfig,
        cancel: &CancellationToken,
    ) -> String {
        self.store_local(key, url);

        let Some(target) = RemoteTarget::from_config(config) else {
            return url.to_string();
        };
        match remote::upload(self.transport.as_ref(), &target, key, url, model, config, cancel).await {
            Ok(Some(permanent)) if permanent != url => {
                debug!(cache_key = %key, "remote cache returned a permanent url");
                self.store_local(key, &permanent);
                permanent
            }
            Ok(_) => url.to_string(),
            Err(err) => {
                warn!(cache_key = %key, error = %err, "remote cache write failed");
                url.to_string()
            }
        }
    }

    pub async fn delete_image(&self, key: &str, config: &EngineConfig, cancel: &CancellationToken) {
        if let Err(err) = self.local.remove(key) {
            warn!(cache_key = %key, error = %format!("{err:#}"), "local cache delete failed");
        }
        let Some(target) = RemoteTarget::from_config(config) else {
            return;
        };
        if let Err(err) = remote::remove(self.transport.as_ref(), &target, key, config, cancel).await {
            warn!(cache_key = %key, error = %err, "remote cache delete failed");
        }
    }

    fn store_local(&self, key: &str, url: &str) {
        let entry = LocalEntry {
            url: url.to_string(),
            stored_at: Utc::now().timestamp_millis(),
        };
        if let Err(err) = self.local.set(key, entry) {
            warn!(cache_key = %key, error = %format!("{err:#}"), "local cache write failed");
        }
    }
}
