use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use promptpix_contracts::GenerationError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::http::{send_bounded, Blob, HttpRequest, HttpTransport};

const DEFAULT_MIME: &str = "image/png";

/// Decodes a `data:` URL into a blob; `None` when `url` is not one.
pub fn decode_data_url(url: &str) -> Option<Result<Blob, String>> {
    let rest = url.trim().strip_prefix("data:")?;
    let Some((meta, payload)) = rest.split_once(',') else {
        return Some(Err("data URL has no payload".to_string()));
    };
    let mut parts = meta.split(';');
    let mime_type = parts
        .next()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_MIME)
        .to_string();
    let is_base64 = parts.any(|part| part.trim().eq_ignore_ascii_case("base64"));
    let bytes = if is_base64 {
        match BASE64.decode(payload.trim()) {
            Ok(bytes) => bytes,
            Err(err) => return Some(Err(format!("invalid base64 payload: {err}"))),
        }
    } else {
        payload.as_bytes().to_vec()
    };
    Some(Ok(Blob::new(bytes, mime_type)))
}

/// Loads a reference image as binary data.
///
/// Failures name the offending URL; cancellation and request timeouts keep
/// their own variants.
pub async fn fetch_reference(
    transport: &dyn HttpTransport,
    url: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Blob, GenerationError> {
    let fetch_error = |message: String| GenerationError::ReferenceFetch {
        url: display_url(url),
        message,
    };

    if let Some(decoded) = decode_data_url(url) {
        return decoded.map_err(fetch_error);
    }

    debug!(url = %display_url(url), "fetching reference image");
    let response = match send_bounded(transport, HttpRequest::get(url), timeout, cancel).await {
        Ok(response) => response,
        Err(err @ (GenerationError::Cancelled | GenerationError::RequestTimeout { .. })) => {
            return Err(err)
        }
        Err(err) => return Err(fetch_error(err.to_string())),
    };
    if !response.is_success() {
        return Err(fetch_error(format!("HTTP {}", response.status)));
    }
    if response.body.is_empty() {
        return Err(fetch_error("empty body".to_string()));
    }
    let mime_type = response
        .header("content-type")
        .and_then(|value| value.split(';').next())
        .map(str::trim)
        .filter(|value| value.starts_with("image/"))
        .unwrap_or(DEFAULT_MIME)
        .to_string();
    Ok(Blob::new(response.body, mime_type))
}

fn display_url(url: &str) -> String {
    if url.starts_with("data:") {
        "data URL".to_string()
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use promptpix_contracts::{ErrorKind, GenerationError};
    use tokio_util::sync::CancellationToken;

    use super::{decode_data_url, fetch_reference};
    use crate::http::HttpResponse;
    use crate::test_support::FakeTransport;

    #[test]
    fn decodes_base64_data_urls() -> anyhow::Result<()> {
        let blob = decode_data_url("data:image/jpeg;base64,QUJD")
            .ok_or_else(|| anyhow::anyhow!("not a data url"))?
            .map_err(anyhow::Error::msg)?;
        assert_eq!(blob.bytes, b"ABC");
        assert_eq!(blob.mime_type, "image/jpeg");
        assert!(decode_data_url("https://x/y.png").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn data_urls_never_touch_the_network() -> anyhow::Result<()> {
        let transport = FakeTransport::unreachable();
        let blob = fetch_reference(
            &transport,
            "data:image/png;base64,QUJD",
            Duration::from_secs(1),
            &CancellationToken::new(),
        )
        .await?;
        assert_eq!(blob.bytes, b"ABC");
        assert!(transport.requests().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn remote_failures_name_the_url() {
        let transport = FakeTransport::new(|_| {
            Ok(HttpResponse {
                status: 404,
                headers: BTreeMap::new(),
                body: Vec::new(),
            })
        });
        let err = fetch_reference(
            &transport,
            "https://cdn.example/missing.png",
            Duration::from_secs(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        match &err {
            GenerationError::ReferenceFetch { url, message } => {
                assert_eq!(url, "https://cdn.example/missing.png");
                assert_eq!(message, "HTTP 404");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.kind(), ErrorKind::Network);
    }

    #[tokio::test]
    async fn remote_bytes_keep_their_mime_type() -> anyhow::Result<()> {
        let transport = FakeTransport::new(|_| {
            let mut headers = BTreeMap::new();
            headers.insert("content-type".to_string(), "image/webp".to_string());
            Ok(HttpResponse {
                status: 200,
                headers,
                body: vec![1, 2, 3],
            })
        });
        let blob = fetch_reference(
            &transport,
            "https://cdn.example/cat.webp",
            Duration::from_secs(1),
            &CancellationToken::new(),
        )
        .await?;
        assert_eq!(blob.mime_type, "image/webp");
        assert_eq!(blob.bytes, vec![1, 2, 3]);
        Ok(())
    }
}
