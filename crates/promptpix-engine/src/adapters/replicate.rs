use promptpix_contracts::{GenerationError, Operation, UniversalParams};
use serde_json::{Map, Value};

use super::mapping::{api_base, prompt_only_style, ratio_label, styled_prompt};
use super::{BuiltRequest, CorsMode, ProviderAdapter, ResponseShape};
use crate::http::Blob;
use crate::polling::PollStep;

pub struct ReplicateAdapter {
    api_base: String,
}

impl ReplicateAdapter {
    pub fn new() -> Self {
        Self {
            api_base: api_base("replicate", "https://api.replicate.com/v1"),
        }
    }

    fn default_model(operation: Operation) -> &'static str {
        match operation {
            Operation::Img2Img => "black-forest-labs/flux-dev",
            Operation::Upscale => "nightmareai/real-esrgan",
            Operation::RemoveBg => "851-labs/background-remover",
            _ => "black-forest-labs/flux-schnell",
        }
    }

    fn extract_output_urls(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::String(url) => {
                let trimmed = url.trim();
                if !trimmed.is_empty() && !out.iter().any(|existing| existing == trimmed) {
                    out.push(trimmed.to_string());
                }
            }
            Value::Array(rows) => {
                for row in rows {
                    Self::extract_output_urls(row, out);
                }
            }
            Value::Object(obj) => {
                if let Some(url) = obj.get("url") {
                    Self::extract_output_urls(url, out);
                }
            }
            _ => {}
        }
    }
}

impl Default for ReplicateAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderAdapter for ReplicateAdapter {
    fn id(&self) -> &str {
        "replicate"
    }

    fn display_name(&self) -> &str {
        "Replicate"
    }

    fn supported_operations(&self) -> &[Operation] {
        &[
            Operation::Generate,
            Operation::Img2Img,
            Operation::Upscale,
            Operation::RemoveBg,
        ]
    }

    fn cors_mode(&self) -> CorsMode {
        CorsMode::Relay
    }

    fn build_request(
        &self,
        params: &UniversalParams,
        operation: Operation,
        reference: Option<&Blob>,
    ) -> Result<BuiltRequest, GenerationError> {
        let mut input = Map::new();
        let style = prompt_only_style(params.style.as_deref());
        if let Some(prompt) = styled_prompt(params, &style) {
            input.insert("prompt".to_string(), Value::String(prompt));
        }
        if matches!(operation, Operation::Generate | Operation::Img2Img) {
            input.insert(
                "aspect_ratio".to_string(),
                Value::String(ratio_label(params.aspect)),
            );
        }
        if let Some(seed) = params.seed {
            input.insert("seed".to_string(), Value::Number(seed.into()));
        }
        if let Some(format) = params.format {
            input.insert(
                "output_format".to_string(),
                Value::String(format.as_str().to_string()),
            );
        }
        if let Some(negative) = params.negative_prompt.as_deref() {
            input.insert(
                "negative_prompt".to_string(),
                Value::String(negative.to_string()),
            );
        }
        if let Some(reference) = reference {
            input.insert("image".to_string(), Value::String(reference.data_url()));
        }

        // `model` addresses the prediction; every other raw key is a model input.
        let mut model = Value::String(Self::default_model(operation).to_string());
        for (key, value) in &params.raw {
            if key == "model" {
                model = value.clone();
            } else {
                input.insert(key.clone(), value.clone());
            }
        }

        let mut request = BuiltRequest::json(format!("{}/predictions", self.api_base))
            .with_header("Prefer", "wait");
        request.set("model", model);
        request.set("input", Value::Object(input));
        Ok(request)
    }

    fn response_shape(&self) -> ResponseShape {
        ResponseShape {
            url_paths: &["/output/0", "/output"],
            b64_paths: &[],
            b64_mime: "image/png",
        }
    }

    fn is_async(&self) -> bool {
        true
    }

    fn poll_url(&self, initial: &Value) -> Option<String> {
        initial
            .pointer("/urls/get")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    fn interpret_poll(&self, payload: &Value) -> PollStep<String> {
        let status = payload
            .get("status")
            .and_then(Value::as_str)
            .map(|value| value.to_ascii_lowercase())
            .unwrap_or_default();
        match status.as_str() {
            "succeeded" => {
                let mut urls = Vec::new();
                if let Some(output) = payload.get("output") {
                    Self::extract_output_urls(output, &mut urls);
                }
                match urls.into_iter().next() {
                    Some(url) => PollStep::Succeeded(url),
                    None => PollStep::Failed(GenerationError::MissingImage {
                        provider: self.id().to_string(),
                    }),
                }
            }
            "failed" | "canceled" => PollStep::Failed(GenerationError::GenerationFailed {
                provider: self.id().to_string(),
                message: payload
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or(status.as_str())
                    .to_string(),
            }),
            _ => PollStep::Pending,
        }
    }
}
