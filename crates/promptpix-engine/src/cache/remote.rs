use chrono::{DateTime, Utc};
use promptpix_contracts::GenerationError;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::http::{send_bounded, HttpMethod, HttpRequest, HttpTransport};

use super::CacheResult;

/// Endpoints of the remote layer, taken from a config snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RemoteTarget {
    pub endpoint: String,
    pub public_base: String,
}

impl RemoteTarget {
    pub fn from_config(config: &EngineConfig) -> Option<Self> {
        if !config.remote_enabled() {
            return None;
        }
        Some(Self {
            endpoint: config.storage_endpoint.as_deref()?.trim_end_matches('/').to_string(),
            public_base: config
                .storage_public_base
                .as_deref()?
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{key}", self.public_base)
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/images/{key}", self.endpoint)
    }
}

/// Existence probe; any failure or non-200 is a miss.
pub(crate) async fn probe(
    transport: &dyn HttpTransport,
    target: &RemoteTarget,
    key: &str,
    config: &EngineConfig,
    cancel: &CancellationToken,
) -> Result<Option<CacheResult>, GenerationError> {
    let url = target.public_url(key);
    let request = HttpRequest::new(HttpMethod::Head, url.clone());
    let response = send_bounded(transport, request, config.request_timeout(), cancel).await?;
    if response.status != 200 {
        return Ok(None);
    }
    let age_ms = response
        .header("last-modified")
        .and_then(|value| DateTime::parse_from_rfc2822(value.trim()).ok())
        .map(|modified| (Utc::now() - modified.with_timezone(&Utc)).num_milliseconds().max(0) as u64);
    Ok(Some(CacheResult { url, age_ms }))
}

/// Uploads `url` under `key`; returns the permanent URL when the backend reports one.
pub(crate) async fn upload(
    transport: &dyn HttpTransport,
    target: &RemoteTarget,
    key: &str,
    url: &str,
    model: Option<&str>,
    config: &EngineConfig,
    cancel: &CancellationToken,
) -> Result<Option<String>, GenerationError> {
    let mut body = match url.strip_prefix("data:").and_then(|rest| rest.split_once(',')) {
        Some((meta, data)) => {
            let content_type = meta.split(';').next().unwrap_or("image/png");
            json!({ "b64": data, "contentType": content_type })
        }
        None => json!({ "url": url }),
    };
    if let (Some(model), Some(object)) = (model, body.as_object_mut()) {
        object.insert("model".to_string(), Value::String(model.to_string()));
    }
    let request = HttpRequest::new(HttpMethod::Put, target.object_url(key)).with_json(body);
    let response = send_bounded(transport, request, config.request_timeout(), cancel).await?;
    if !response.is_success() {
        return Err(GenerationError::Api {
            provider: "remote cache".to_string(),
            status: response.status,
            body: response.text(),
        });
    }
    let permanent = serde_json::from_slice::<Value>(&response.body)
        .ok()
        .and_then(|payload| {
            payload
                .get("permanentUrl")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        });
    Ok(permanent)
}

pub(crate) async fn remove(
    transport: &dyn HttpTransport,
    target: &RemoteTarget,
    key: &str,
    config: &EngineConfig,
    cancel: &CancellationToken,
) -> Result<(), GenerationError> {
    let request = HttpRequest::new(HttpMethod::Delete, target.object_url(key));
    let response = send_bounded(transport, request, config.request_timeout(), cancel).await?;
    if response.is_success() || response.status == 404 {
        return Ok(());
    }
    Err(GenerationError::Api {
        provider: "remote cache".to_string(),
        status: response.status,
        body: response.text(),
    })
}
