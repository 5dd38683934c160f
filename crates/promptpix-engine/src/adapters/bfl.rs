use promptpix_contracts::{GenerationError, Operation, OutputFormat, UniversalParams};
use serde_json::Value;

use super::mapping::{api_base, pixel_dimensions, prompt_only_style, ratio_label, styled_prompt};
use super::{AuthHeader, BuiltRequest, CorsMode, ProviderAdapter, ResponseShape};
use crate::http::Blob;
use crate::polling::PollStep;

pub struct BflAdapter {
    api_base: String,
}

impl BflAdapter {
    pub fn new() -> Self {
        Self {
            api_base: api_base("bfl", "https://api.bfl.ai/v1"),
        }
    }

    fn endpoint(&self, params: &UniversalParams, operation: Operation) -> String {
        let model = params.raw_str("model").unwrap_or(match operation {
            Operation::Img2Img => "flux-kontext-pro",
            _ => "flux-pro-1.1",
        });
        if model.starts_with("http://") || model.starts_with("https://") {
            return model.to_string();
        }
        format!("{}/{}", self.api_base, model.trim_start_matches('/'))
    }
}

impl Default for BflAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderAdapter for BflAdapter {
    fn id(&self) -> &str {
        "bfl"
    }

    fn display_name(&self) -> &str {
        "Black Forest Labs"
    }

    fn supported_operations(&self) -> &[Operation] {
        &[Operation::Generate, Operation::Img2Img]
    }

    fn cors_mode(&self) -> CorsMode {
        CorsMode::Relay
    }

    fn auth_header(&self, api_key: &str) -> AuthHeader {
        AuthHeader::named("x-key", api_key)
    }

    fn build_request(
        &self,
        params: &UniversalParams,
        operation: Operation,
        reference: Option<&Blob>,
    ) -> Result<BuiltRequest, GenerationError> {
        let mut request = BuiltRequest::json(self.endpoint(params, operation))
            .with_header("accept", "application/json");
        let style = prompt_only_style(params.style.as_deref());
        request.set_opt("prompt", styled_prompt(params, &style));
        match reference {
            Some(reference) => {
                request.set("input_image", reference.base64());
                request.set("aspect_ratio", ratio_label(params.aspect));
            }
            None => {
                let (width, height) = pixel_dimensions(params.aspect);
                request.set("width", width);
                request.set("height", height);
            }
        }
        request.set_opt("seed", params.seed);
        // Flux renders jpeg or png only.
        if let Some(format) = params.format {
            let format = if format == OutputFormat::Png { "png" } else { "jpeg" };
            request.set("output_format", format);
        }
        request.merge_raw(&params.raw);
        Ok(request)
    }

    fn response_shape(&self) -> ResponseShape {
        ResponseShape {
            url_paths: &["/result/sample", "/sample"],
            b64_paths: &[],
            b64_mime: "image/jpeg",
        }
    }

    fn is_async(&self) -> bool {
        true
    }

    fn poll_url(&self, initial: &Value) -> Option<String> {
        initial
            .get("polling_url")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    fn interpret_poll(&self, payload: &Value) -> PollStep<String> {
        let status = payload
            .get("status")
            .and_then(Value::as_str)
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match status.as_str() {
            "ready" => match ["/result/sample", "/sample"]
                .iter()
                .find_map(|path| payload.pointer(path).and_then(Value::as_str))
                .map(str::trim)
                .filter(|value| !value.is_empty())
            {
                Some(url) => PollStep::Succeeded(url.to_string()),
                None => PollStep::Failed(GenerationError::MissingImage {
                    provider: self.id().to_string(),
                }),
            },
            "error" | "failed" | "request moderated" | "content moderated" | "task not found" => {
                PollStep::Failed(GenerationError::GenerationFailed {
                    provider: self.id().to_string(),
                    message: status,
                })
            }
            _ => PollStep::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use promptpix_contracts::{AspectRatio, GenerationError, Operation, OutputFormat, UniversalParams};
    use serde_json::json;

    use super::BflAdapter;
    use crate::adapters::ProviderAdapter;
    use crate::polling::PollStep;

    #[test]
    fn generate_sends_pixel_dimensions() -> anyhow::Result<()> {
        let params = UniversalParams {
            prompt: Some("a harbor".to_string()),
            aspect: Some(AspectRatio::Wide),
            format: Some(OutputFormat::Webp),
            ..UniversalParams::default()
        };
        let request = BflAdapter::new().build_request(&params, Operation::Generate, None)?;
        assert!(request.url.ends_with("/flux-pro-1.1"));
        assert_eq!(request.get("width"), Some(&json!(1344)));
        assert_eq!(request.get("height"), Some(&json!(768)));
        assert_eq!(request.get("output_format"), Some(&json!("jpeg")));
        Ok(())
    }

    #[test]
    fn ready_status_yields_sample_url() {
        let adapter = BflAdapter::new();
        assert_eq!(
            adapter.poll_url(&json!({"id": "1", "polling_url": "https://api.bfl.ai/v1/get_result?id=1"})),
            Some("https://api.bfl.ai/v1/get_result?id=1".to_string())
        );
        assert_eq!(adapter.interpret_poll(&json!({"status": "Pending"})), PollStep::Pending);
        assert_eq!(
            adapter.interpret_poll(&json!({"status": "Ready", "result": {"sample": "https://d/1.jpg"}})),
            PollStep::Succeeded("https://d/1.jpg".to_string())
        );
        assert!(matches!(
            adapter.interpret_poll(&json!({"status": "Content Moderated"})),
            PollStep::Failed(GenerationError::GenerationFailed { .. })
        ));
    }
}
