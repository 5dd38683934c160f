use promptpix_contracts::{AspectRatio, GenerationError, Operation, Quality, UniversalParams};

use super::mapping::{api_base, resolve_style, styled_prompt};
use super::{BuiltRequest, ProviderAdapter, ResponseShape};
use crate::http::Blob;

const DEFAULT_MODEL: &str = "gpt-image-1";

pub struct OpenAiAdapter {
    api_base: String,
}

impl OpenAiAdapter {
    pub fn new() -> Self {
        Self {
            api_base: api_base("openai", "https://api.openai.com/v1"),
        }
    }

    fn is_dalle3(model: &str) -> bool {
        model.eq_ignore_ascii_case("dall-e-3")
    }

    /// Only dall-e-3 has a style field, and it knows just two values.
    fn native_style(model: &str, style: &str) -> Option<&'static str> {
        if !Self::is_dalle3(model) {
            return None;
        }
        match style {
            "photographic" | "analog-film" => Some("natural"),
            "cinematic" | "digital-art" | "fantasy-art" | "neon-punk" => Some("vivid"),
            _ => None,
        }
    }

    fn size(model: &str, aspect: Option<AspectRatio>) -> &'static str {
        let dalle3 = Self::is_dalle3(model);
        match aspect.unwrap_or(AspectRatio::Square) {
            AspectRatio::Square => "1024x1024",
            AspectRatio::Landscape | AspectRatio::Wide if dalle3 => "1792x1024",
            AspectRatio::Portrait | AspectRatio::Tall if dalle3 => "1024x1792",
            AspectRatio::Landscape | AspectRatio::Wide => "1536x1024",
            AspectRatio::Portrait | AspectRatio::Tall => "1024x1536",
        }
    }

    fn quality(model: &str, quality: Quality) -> &'static str {
        match (Self::is_dalle3(model), quality) {
            (true, Quality::Hd) => "hd",
            (true, _) => "standard",
            (false, Quality::Draft) => "low",
            (false, Quality::Standard) => "medium",
            (false, Quality::Hd) => "high",
        }
    }
}

impl Default for OpenAiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderAdapter for OpenAiAdapter {
    fn id(&self) -> &str {
        "openai"
    }

    fn display_name(&self) -> &str {
        "OpenAI"
    }

    fn supported_operations(&self) -> &[Operation] {
        &[Operation::Generate, Operation::Img2Img]
    }

    fn build_request(
        &self,
        params: &UniversalParams,
        operation: Operation,
        reference: Option<&Blob>,
    ) -> Result<BuiltRequest, GenerationError> {
        let model = params.raw_str("model").unwrap_or(DEFAULT_MODEL).to_string();
        let style = resolve_style(params.style.as_deref(), |name| {
            Self::native_style(&model, name)
        });
        let mut prompt = styled_prompt(params, &style).unwrap_or_default();
        if let Some(negative) = params.negative_prompt.as_deref() {
            prompt = format!("{prompt}. Avoid: {negative}");
        }

        let mut request = match (operation, reference) {
            (Operation::Img2Img, Some(reference)) => {
                let mut request =
                    BuiltRequest::multipart(format!("{}/images/edits", self.api_base));
                request.set_blob("image", reference.clone());
                request
            }
            _ => BuiltRequest::json(format!("{}/images/generations", self.api_base)),
        };
        request.set("model", model.as_str());
        request.set("prompt", prompt);
        request.set("n", 1);
        request.set("size", Self::size(&model, params.aspect));
        request.set_opt("style", style.native());
        if let Some(quality) = params.quality {
            request.set("quality", Self::quality(&model, quality));
        }
        if Self::is_dalle3(&model) {
            request.set("response_format", "b64_json");
        } else if let Some(format) = params.format {
            request.set("output_format", format.as_str());
        }
        request.merge_raw(&params.raw);
        Ok(request)
    }

    fn response_shape(&self) -> ResponseShape {
        ResponseShape {
            url_paths: &["/data/0/url"],
            b64_paths: &["/data/0/b64_json"],
            b64_mime: "image/png",
        }
    }
}
