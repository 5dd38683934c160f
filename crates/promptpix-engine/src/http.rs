use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use promptpix_contracts::GenerationError;
use reqwest::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::Method;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    fn as_reqwest(self) -> Method {
        match self {
            HttpMethod::Get => Method::GET,
            HttpMethod::Head => Method::HEAD,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

/// Binary image payload, e.g. a decoded reference image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl Blob {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64())
    }

    pub fn file_name(&self) -> String {
        let ext = match self.mime_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            "image/svg+xml" => "svg",
            _ => "png",
        };
        format!("image.{ext}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormPart {
    Text { name: String, value: String },
    File { name: String, blob: Blob },
}

#[derive(Debug, Clone, PartialEq)]
pub enum HttpBody {
    Json(Value),
    Multipart(Vec<FormPart>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<HttpBody>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(HttpBody::Json(body));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json_body(&self) -> Option<&Value> {
        match &self.body {
            Some(HttpBody::Json(value)) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lowercased.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn json(status: u16, body: &Value) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        Self {
            status,
            headers,
            body: body.to_string().into_bytes(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn content_type(&self) -> String {
        self.header("content-type")
            .map(|value| value.to_ascii_lowercase())
            .unwrap_or_default()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// The single seam through which the engine talks to the network.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, GenerationError>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, GenerationError> {
        let mut builder = self
            .http
            .request(request.method.as_reqwest(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match request.body {
            Some(HttpBody::Json(value)) => builder.json(&value),
            Some(HttpBody::Multipart(parts)) => builder.multipart(multipart_form(parts)?),
            None => builder,
        };

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_ascii_lowercase(), value.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(transport_error)?.to_vec();
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn multipart_form(parts: Vec<FormPart>) -> Result<MultipartForm, GenerationError> {
    let mut form = MultipartForm::new();
    for part in parts {
        form = match part {
            FormPart::Text { name, value } => form.text(name, value),
            FormPart::File { name, blob } => {
                let file_name = blob.file_name();
                let file = MultipartPart::bytes(blob.bytes)
                    .file_name(file_name)
                    .mime_str(&blob.mime_type)
                    .map_err(transport_error)?;
                form.part(name, file)
            }
        };
    }
    Ok(form)
}

fn transport_error(err: reqwest::Error) -> GenerationError {
    GenerationError::Network {
        message: err.to_string(),
    }
}

/// Sends `request`, aborting on `cancel` or after `timeout`, whichever fires first.
///
/// Dropping the in-flight future closes the underlying connection.
pub async fn send_bounded(
    transport: &dyn HttpTransport,
    request: HttpRequest,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<HttpResponse, GenerationError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GenerationError::Cancelled),
        result = tokio::time::timeout(timeout, transport.send(request)) => match result {
            Ok(response) => response,
            Err(_) => Err(GenerationError::RequestTimeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use promptpix_contracts::GenerationError;
    use tokio_util::sync::CancellationToken;

    use super::{send_bounded, Blob, HttpRequest, HttpResponse};
    use crate::test_support::FakeTransport;

    #[test]
    fn blob_renders_data_url() {
        let blob = Blob::new(b"ABC".to_vec(), "image/png");
        assert_eq!(blob.data_url(), "data:image/png;base64,QUJD");
        assert_eq!(Blob::new(Vec::new(), "image/jpeg").file_name(), "image.jpg");
    }

    #[test]
    fn request_header_lookup_is_case_insensitive() {
        let request = HttpRequest::get("https://x").with_header("Authorization", "Bearer k");
        assert_eq!(request.header("authorization"), Some("Bearer k"));
    }

    #[tokio::test]
    async fn cancelled_token_wins_over_pending_request() {
        let transport = FakeTransport::hanging();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = send_bounded(
            &transport,
            HttpRequest::get("https://slow.example"),
            Duration::from_secs(60),
            &cancel,
        )
        .await;
        assert_eq!(result, Err(GenerationError::Cancelled));
    }

    #[tokio::test]
    async fn timeout_is_reported_distinctly() {
        let transport = FakeTransport::hanging();
        let result = send_bounded(
            &transport,
            HttpRequest::get("https://slow.example"),
            Duration::from_millis(5),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(result, Err(GenerationError::RequestTimeout { timeout_ms: 5 }));
    }

    #[tokio::test]
    async fn completed_request_passes_through() -> anyhow::Result<()> {
        let transport = FakeTransport::new(|_| Ok(HttpResponse::json(200, &serde_json::json!({}))));
        let response = send_bounded(
            &transport,
            HttpRequest::get("https://fast.example"),
            Duration::from_secs(1),
            &CancellationToken::new(),
        )
        .await?;
        assert!(response.is_success());
        assert_eq!(transport.requests().len(), 1);
        Ok(())
    }
}
