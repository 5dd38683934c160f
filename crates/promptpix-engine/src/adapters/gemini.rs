use promptpix_contracts::{GenerationError, Operation, UniversalParams};
use serde_json::{json, Value};

use super::mapping::{api_base, prompt_only_style, ratio_label, styled_prompt};
use super::{parse_with_shape, response_json, AuthHeader, BuiltRequest, ProviderAdapter, ResponseShape};
use crate::http::{Blob, HttpResponse};

const DEFAULT_MODEL: &str = "gemini-2.5-flash-image";

pub struct GeminiAdapter {
    api_base: String,
}

impl GeminiAdapter {
    pub fn new() -> Self {
        Self {
            api_base: api_base("gemini", "https://generativelanguage.googleapis.com/v1beta"),
        }
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    /// First inline image part across all candidates, as a data URL.
    fn extract_inline_image(payload: &Value) -> Option<String> {
        let candidates = payload.get("candidates").and_then(Value::as_array)?;
        candidates
            .iter()
            .filter_map(|candidate| candidate.pointer("/content/parts").and_then(Value::as_array))
            .flatten()
            .find_map(|part| {
                let inline = part.get("inlineData").or_else(|| part.get("inline_data"))?;
                let data = inline
                    .get("data")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|value| !value.is_empty())?;
                let mime = inline
                    .get("mimeType")
                    .or_else(|| inline.get("mime_type"))
                    .and_then(Value::as_str)
                    .unwrap_or("image/png");
                Some(format!("data:{mime};base64,{data}"))
            })
    }
}

impl Default for GeminiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderAdapter for GeminiAdapter {
    fn id(&self) -> &str {
        "gemini"
    }

    fn display_name(&self) -> &str {
        "Google Gemini"
    }

    fn supported_operations(&self) -> &[Operation] {
        &[Operation::Generate, Operation::Img2Img]
    }

    fn auth_header(&self, api_key: &str) -> AuthHeader {
        AuthHeader::named("x-goog-api-key", api_key)
    }

    fn build_request(
        &self,
        params: &UniversalParams,
        _operation: Operation,
        reference: Option<&Blob>,
    ) -> Result<BuiltRequest, GenerationError> {
        let model = params.raw_str("model").unwrap_or(DEFAULT_MODEL);
        let style = prompt_only_style(params.style.as_deref());
        let mut prompt = styled_prompt(params, &style).unwrap_or_default();
        if let Some(negative) = params.negative_prompt.as_deref() {
            prompt = format!("{prompt}. Avoid: {negative}");
        }

        let mut parts = Vec::new();
        if let Some(reference) = reference {
            parts.push(json!({
                "inlineData": {
                    "mimeType": reference.mime_type,
                    "data": reference.base64(),
                }
            }));
        }
        parts.push(json!({ "text": prompt }));

        let mut request = BuiltRequest::json(self.endpoint_for_model(model));
        request.set("contents", json!([{ "role": "user", "parts": parts }]));
        request.set(
            "generationConfig",
            json!({
                "responseModalities": ["IMAGE"],
                "imageConfig": { "aspectRatio": ratio_label(params.aspect) },
            }),
        );
        // The model is addressed by URL; the request schema has no such field.
        for (key, value) in &params.raw {
            if key != "model" {
                request.set(key, value.clone());
            }
        }
        Ok(request)
    }

    fn response_shape(&self) -> ResponseShape {
        ResponseShape {
            url_paths: &[],
            b64_paths: &["/candidates/0/content/parts/0/inlineData/data"],
            b64_mime: "image/png",
        }
    }

    fn parse_response(
        &self,
        response: &HttpResponse,
        _operation: Operation,
    ) -> Result<String, GenerationError> {
        if response.content_type().starts_with("image/") {
            return parse_with_shape(self.id(), response, &self.response_shape());
        }
        let payload = response_json(self.id(), response)?;
        if let Some(url) = Self::extract_inline_image(&payload) {
            return Ok(url);
        }
        if let Some(reason) = payload
            .pointer("/promptFeedback/blockReason")
            .and_then(Value::as_str)
        {
            return Err(GenerationError::GenerationFailed {
                provider: self.id().to_string(),
                message: format!("prompt blocked ({reason})"),
            });
        }
        Err(GenerationError::MissingImage {
            provider: self.id().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use promptpix_contracts::{GenerationError, Operation, UniversalParams};
    use serde_json::json;

    use super::GeminiAdapter;
    use crate::adapters::ProviderAdapter;
    use crate::http::{Blob, HttpResponse};

    #[test]
    fn inline_parts_are_found_after_text_parts() -> anyhow::Result<()> {
        let response = HttpResponse::json(
            200,
            &json!({"candidates": [{"content": {"parts": [
                {"text": "here you go"},
                {"inlineData": {"mimeType": "image/jpeg", "data": "QUJD"}}
            ]}}]}),
        );
        let url = GeminiAdapter::new().parse_response(&response, Operation::Generate)?;
        assert_eq!(url, "data:image/jpeg;base64,QUJD");
        Ok(())
    }

    #[test]
    fn blocked_prompts_are_reported() {
        let response = HttpResponse::json(200, &json!({"promptFeedback": {"blockReason": "SAFETY"}}));
        assert!(matches!(
            GeminiAdapter::new().parse_response(&response, Operation::Generate),
            Err(GenerationError::GenerationFailed { .. })
        ));
    }

    #[test]
    fn reference_is_sent_inline_before_prompt() -> anyhow::Result<()> {
        let params = UniversalParams {
            prompt: Some("make it blue".to_string()),
            ..UniversalParams::default()
        };
        let blob = Blob::new(b"ABC".to_vec(), "image/png");
        let request = GeminiAdapter::new().build_request(&params, Operation::Img2Img, Some(&blob))?;
        assert!(request.url.ends_with("/models/gemini-2.5-flash-image:generateContent"));
        let contents = request.get("contents").cloned().unwrap_or_default();
        assert_eq!(contents[0]["parts"][0]["inlineData"]["data"], json!("QUJD"));
        assert_eq!(contents[0]["parts"][1]["text"], json!("make it blue"));
        Ok(())
    }
}
