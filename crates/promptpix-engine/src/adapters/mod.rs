use std::collections::BTreeMap;

use indexmap::IndexMap;
use promptpix_contracts::errors::truncate_text;
use promptpix_contracts::{GenerationError, Operation, UniversalParams};
use serde_json::{Map, Value};

use crate::http::{Blob, FormPart, HttpBody, HttpMethod, HttpRequest, HttpResponse};
use crate::polling::PollStep;

mod bfl;
mod fal;
mod gemini;
pub(crate) mod mapping;
mod openai;
mod recraft;
mod replicate;
mod stability;

pub use bfl::BflAdapter;
pub use fal::FalAdapter;
pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;
pub use recraft::RecraftAdapter;
pub use replicate::ReplicateAdapter;
pub use stability::StabilityAdapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorsMode {
    /// The provider accepts calls from any origin.
    Direct,
    /// Calls must go through the configured relay.
    Relay,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeader {
    pub name: String,
    pub value: String,
}

impl AuthHeader {
    pub fn bearer(api_key: &str) -> Self {
        Self {
            name: "Authorization".to_string(),
            value: format!("Bearer {api_key}"),
        }
    }

    pub fn named(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Json,
    Multipart,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BodyField {
    Json(Value),
    Blob(Blob),
}

/// One provider request, before credentials and routing are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltRequest {
    pub url: String,
    pub body: IndexMap<String, BodyField>,
    pub content_type: ContentType,
    pub headers: Vec<(String, String)>,
}

impl BuiltRequest {
    pub fn json(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: IndexMap::new(),
            content_type: ContentType::Json,
            headers: Vec::new(),
        }
    }

    pub fn multipart(url: impl Into<String>) -> Self {
        Self {
            content_type: ContentType::Multipart,
            ..Self::json(url)
        }
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.body
            .insert(key.to_string(), BodyField::Json(value.into()));
    }

    pub fn set_opt(&mut self, key: &str, value: Option<impl Into<Value>>) {
        if let Some(value) = value {
            self.set(key, value);
        }
    }

    pub fn set_blob(&mut self, key: &str, blob: Blob) {
        self.body.insert(key.to_string(), BodyField::Blob(blob));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self.body.get(key) {
            Some(BodyField::Json(value)) => Some(value),
            _ => None,
        }
    }

    pub fn has_blob(&self, key: &str) -> bool {
        matches!(self.body.get(key), Some(BodyField::Blob(_)))
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Applies the raw-parameter bag; every key overrides what was computed.
    pub fn merge_raw(&mut self, raw: &Map<String, Value>) {
        for (key, value) in raw {
            self.set(key, value.clone());
        }
    }

    pub fn into_http(self, auth: Option<&AuthHeader>) -> HttpRequest {
        let mut request = HttpRequest::new(HttpMethod::Post, self.url);
        if let Some(auth) = auth {
            request = request.with_header(auth.name.as_str(), auth.value.as_str());
        }
        for (name, value) in self.headers {
            request = request.with_header(name, value);
        }
        request.body = Some(match self.content_type {
            ContentType::Json => HttpBody::Json(Value::Object(
                self.body
                    .into_iter()
                    .map(|(key, field)| {
                        let value = match field {
                            BodyField::Json(value) => value,
                            BodyField::Blob(blob) => Value::String(blob.data_url()),
                        };
                        (key, value)
                    })
                    .collect(),
            )),
            ContentType::Multipart => HttpBody::Multipart(
                self.body
                    .into_iter()
                    .map(|(name, field)| match field {
                        BodyField::Json(value) => FormPart::Text {
                            name,
                            value: json_value_to_form_text(&value),
                        },
                        BodyField::Blob(blob) => FormPart::File { name, blob },
                    })
                    .collect(),
            ),
        });
        request
    }
}

fn json_value_to_form_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Where the image lives in a JSON response, as JSON pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseShape {
    pub url_paths: &'static [&'static str],
    pub b64_paths: &'static [&'static str],
    /// Mime type assumed for inline base64 data.
    pub b64_mime: &'static str,
}

pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> &str;

    fn display_name(&self) -> &str;

    fn supported_operations(&self) -> &[Operation];

    fn supports(&self, operation: Operation) -> bool {
        self.supported_operations().contains(&operation)
    }

    fn cors_mode(&self) -> CorsMode {
        CorsMode::Direct
    }

    fn auth_header(&self, api_key: &str) -> AuthHeader {
        AuthHeader::bearer(api_key)
    }

    fn build_request(
        &self,
        params: &UniversalParams,
        operation: Operation,
        reference: Option<&Blob>,
    ) -> Result<BuiltRequest, GenerationError>;

    fn response_shape(&self) -> ResponseShape;

    fn parse_response(
        &self,
        response: &HttpResponse,
        _operation: Operation,
    ) -> Result<String, GenerationError> {
        parse_with_shape(self.id(), response, &self.response_shape())
    }

    fn is_async(&self) -> bool {
        false
    }

    /// Status URL to poll, read from the initial response of an async job.
    fn poll_url(&self, _initial: &Value) -> Option<String> {
        None
    }

    fn interpret_poll(&self, payload: &Value) -> PollStep<String> {
        match extract_with_shape(self.id(), payload, &self.response_shape()) {
            Ok(url) => PollStep::Succeeded(url),
            Err(_) => PollStep::Pending,
        }
    }
}

/// Reads an image reference from a provider response using `shape`.
///
/// Raw `image/*` bodies become data URLs.
pub fn parse_with_shape(
    provider: &str,
    response: &HttpResponse,
    shape: &ResponseShape,
) -> Result<String, GenerationError> {
    if response.body.is_empty() {
        return Err(GenerationError::EmptyResponse {
            provider: provider.to_string(),
        });
    }
    let content_type = response.content_type();
    if content_type.starts_with("image/") {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or(shape.b64_mime)
            .trim()
            .to_string();
        return Ok(Blob::new(response.body.clone(), mime).data_url());
    }
    let payload = response_json(provider, response)?;
    extract_with_shape(provider, &payload, shape)
}

pub fn response_json(provider: &str, response: &HttpResponse) -> Result<Value, GenerationError> {
    if response.body.iter().all(u8::is_ascii_whitespace) {
        return Err(GenerationError::EmptyResponse {
            provider: provider.to_string(),
        });
    }
    serde_json::from_slice(&response.body).map_err(|err| GenerationError::MalformedResponse {
        provider: provider.to_string(),
        reason: format!("{err}: {}", truncate_text(&response.text(), 200)),
    })
}

pub fn extract_with_shape(
    provider: &str,
    payload: &Value,
    shape: &ResponseShape,
) -> Result<String, GenerationError> {
    for path in shape.url_paths {
        if let Some(url) = non_empty_str(payload.pointer(path)) {
            return Ok(url.to_string());
        }
    }
    for path in shape.b64_paths {
        if let Some(data) = non_empty_str(payload.pointer(path)) {
            if data.starts_with("data:") {
                return Ok(data.to_string());
            }
            return Ok(format!("data:{};base64,{data}", shape.b64_mime));
        }
    }
    Err(GenerationError::MissingImage {
        provider: provider.to_string(),
    })
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Adapters keyed by provider id, built once and handed to the execution core.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<String, Box<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(OpenAiAdapter::new());
        registry.register(StabilityAdapter::new());
        registry.register(ReplicateAdapter::new());
        registry.register(FalAdapter::new());
        registry.register(RecraftAdapter::new());
        registry.register(GeminiAdapter::new());
        registry.register(BflAdapter::new());
        registry
    }

    pub fn register<A: ProviderAdapter + 'static>(&mut self, adapter: A) {
        self.adapters
            .insert(adapter.id().to_string(), Box::new(adapter));
    }

    pub fn get(&self, id: &str) -> Option<&dyn ProviderAdapter> {
        self.adapters.get(id).map(|adapter| adapter.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn ProviderAdapter> {
        self.adapters.values().map(|adapter| adapter.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use promptpix_contracts::{GenerationError, Operation};
    use serde_json::json;

    use super::{
        parse_with_shape, AdapterRegistry, BuiltRequest, ContentType, ResponseShape,
    };
    use crate::http::{Blob, FormPart, HttpBody, HttpResponse};

    const SHAPE: ResponseShape = ResponseShape {
        url_paths: &["/data/0/url"],
        b64_paths: &["/data/0/b64_json"],
        b64_mime: "image/png",
    };

    #[test]
    fn registry_lists_every_default_provider() {
        let registry = AdapterRegistry::with_defaults();
        assert_eq!(
            registry.names(),
            vec!["bfl", "fal", "gemini", "openai", "recraft", "replicate", "stability"]
        );
        let openai = registry.get("openai").map(|adapter| adapter.supports(Operation::Generate));
        assert_eq!(openai, Some(true));
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn shape_prefers_url_then_inline_data() -> anyhow::Result<()> {
        let url = parse_with_shape(
            "p",
            &HttpResponse::json(200, &json!({"data": [{"url": "https://img/1.png"}]})),
            &SHAPE,
        )?;
        assert_eq!(url, "https://img/1.png");
        let inline = parse_with_shape(
            "p",
            &HttpResponse::json(200, &json!({"data": [{"b64_json": "QUJD"}]})),
            &SHAPE,
        )?;
        assert_eq!(inline, "data:image/png;base64,QUJD");
        Ok(())
    }

    #[test]
    fn shape_errors_are_specific() {
        let empty = HttpResponse {
            status: 200,
            headers: BTreeMap::new(),
            body: Vec::new(),
        };
        assert!(matches!(
            parse_with_shape("p", &empty, &SHAPE),
            Err(GenerationError::EmptyResponse { .. })
        ));
        let garbage = HttpResponse {
            body: b"<html>".to_vec(),
            ..empty.clone()
        };
        assert!(matches!(
            parse_with_shape("p", &garbage, &SHAPE),
            Err(GenerationError::MalformedResponse { .. })
        ));
        assert!(matches!(
            parse_with_shape("p", &HttpResponse::json(200, &json!({"data": []})), &SHAPE),
            Err(GenerationError::MissingImage { .. })
        ));
    }

    #[test]
    fn binary_image_bodies_become_data_urls() -> anyhow::Result<()> {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "image/webp".to_string());
        let response = HttpResponse {
            status: 200,
            headers,
            body: b"ABC".to_vec(),
        };
        assert_eq!(
            parse_with_shape("p", &response, &SHAPE)?,
            "data:image/webp;base64,QUJD"
        );
        Ok(())
    }

    #[test]
    fn raw_parameters_override_computed_fields() {
        let mut request = BuiltRequest::json("https://api.example/gen");
        request.set("model", "computed");
        request.set("size", "1024x1024");
        let mut raw = serde_json::Map::new();
        raw.insert("model".to_string(), json!("variant-x"));
        request.merge_raw(&raw);
        assert_eq!(request.get("model"), Some(&json!("variant-x")));
        assert_eq!(request.get("size"), Some(&json!("1024x1024")));
    }

    #[test]
    fn multipart_bodies_carry_blobs_as_files() {
        let mut request = BuiltRequest::multipart("https://api.example/edit");
        request.set("prompt", "cat");
        request.set("strength", 0.5);
        request.set_blob("image", Blob::new(vec![1], "image/png"));
        assert_eq!(request.content_type, ContentType::Multipart);
        let http = request.into_http(None);
        match http.body {
            Some(HttpBody::Multipart(parts)) => {
                assert_eq!(
                    parts[1],
                    FormPart::Text {
                        name: "strength".to_string(),
                        value: "0.5".to_string()
                    }
                );
                assert!(matches!(&parts[2], FormPart::File { name, .. } if name == "image"));
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }
}
