use promptpix_contracts::{AspectRatio, GenerationError, Operation, UniversalParams};

use super::mapping::{api_base, prompt_only_style, styled_prompt};
use super::{AuthHeader, BuiltRequest, ProviderAdapter, ResponseShape};
use crate::http::Blob;

pub struct FalAdapter {
    api_base: String,
}

impl FalAdapter {
    pub fn new() -> Self {
        Self {
            api_base: api_base("fal", "https://fal.run"),
        }
    }

    fn default_endpoint(operation: Operation) -> &'static str {
        match operation {
            Operation::Img2Img => "fal-ai/flux/dev/image-to-image",
            Operation::Upscale => "fal-ai/esrgan",
            Operation::RemoveBg => "fal-ai/birefnet",
            Operation::ReplaceBg => "fal-ai/bria/background/replace",
            _ => "fal-ai/flux/dev",
        }
    }

    fn image_size(aspect: Option<AspectRatio>) -> &'static str {
        match aspect.unwrap_or(AspectRatio::Square) {
            AspectRatio::Square => "square_hd",
            AspectRatio::Landscape => "landscape_4_3",
            AspectRatio::Portrait => "portrait_4_3",
            AspectRatio::Wide => "landscape_16_9",
            AspectRatio::Tall => "portrait_16_9",
        }
    }

    fn endpoint(&self, params: &UniversalParams, operation: Operation) -> String {
        let model = params
            .raw_str("model")
            .unwrap_or_else(|| Self::default_endpoint(operation));
        if model.starts_with("http://") || model.starts_with("https://") {
            return model.to_string();
        }
        format!("{}/{}", self.api_base, model.trim_start_matches('/'))
    }
}

impl Default for FalAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderAdapter for FalAdapter {
    fn id(&self) -> &str {
        "fal"
    }

    fn display_name(&self) -> &str {
        "fal.ai"
    }

    fn supported_operations(&self) -> &[Operation] {
        &[
            Operation::Generate,
            Operation::Img2Img,
            Operation::Upscale,
            Operation::RemoveBg,
            Operation::ReplaceBg,
        ]
    }

    fn auth_header(&self, api_key: &str) -> AuthHeader {
        AuthHeader::named("Authorization", format!("Key {api_key}"))
    }

    fn build_request(
        &self,
        params: &UniversalParams,
        operation: Operation,
        reference: Option<&Blob>,
    ) -> Result<BuiltRequest, GenerationError> {
        let mut request = BuiltRequest::json(self.endpoint(params, operation));
        let style = prompt_only_style(params.style.as_deref());
        request.set_opt("prompt", styled_prompt(params, &style));
        if matches!(operation, Operation::Generate | Operation::Img2Img) {
            request.set("image_size", Self::image_size(params.aspect));
            request.set("num_images", 1);
            request.set_opt("negative_prompt", params.negative_prompt.clone());
        }
        if operation == Operation::Img2Img {
            request.set("strength", 0.85);
        }
        request.set_opt("seed", params.seed);
        if let Some(format) = params.format {
            request.set("output_format", format.as_str());
        }
        if let Some(reference) = reference {
            request.set("image_url", reference.data_url());
        }
        request.merge_raw(&params.raw);
        Ok(request)
    }

    fn response_shape(&self) -> ResponseShape {
        ResponseShape {
            url_paths: &["/images/0/url", "/image/url"],
            b64_paths: &[],
            b64_mime: "image/png",
        }
    }
}
