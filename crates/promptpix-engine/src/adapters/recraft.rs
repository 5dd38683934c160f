use promptpix_contracts::{AspectRatio, GenerationError, Operation, StyleVocabulary, UniversalParams};

use super::mapping::{api_base, prompt_only_style, resolve_style, styled_prompt, StyleResolution};
use super::{BuiltRequest, ProviderAdapter, ResponseShape};
use crate::http::Blob;

const DEFAULT_MODEL: &str = "recraftv4";
const VECTOR_MODEL: &str = "recraftv4_vector";

pub struct RecraftAdapter {
    api_base: String,
}

impl RecraftAdapter {
    pub fn new() -> Self {
        Self {
            api_base: api_base("recraft", "https://external.api.recraft.ai/v1"),
        }
    }

    /// v2 and v3 accept a `style` field; v4 models reject it.
    fn model_has_styles(model: &str) -> bool {
        let model = model.to_ascii_lowercase();
        model.starts_with("recraftv3") || model.starts_with("recraftv2")
    }

    fn native_style(style: &str) -> Option<&'static str> {
        Some(match style {
            "photographic" | "cinematic" | "analog-film" => "realistic_image",
            "illustration" | "anime" | "digital-art" | "comic-book" | "fantasy-art"
            | "pixel-art" | "watercolor" | "sketch" => "digital_illustration",
            "vector" | "flat-design" | "line-art" | "logo" => "vector_illustration",
            "icon" => "icon",
            _ => return None,
        })
    }

    /// Picks the model; a vector-family style switches the default to the vector model.
    fn model(params: &UniversalParams) -> String {
        if let Some(model) = params.raw_str("model") {
            return model.to_string();
        }
        let vector = params
            .style
            .as_deref()
            .map(|style| StyleVocabulary::universal().is_vector(style))
            .unwrap_or(false);
        if vector {
            VECTOR_MODEL.to_string()
        } else {
            DEFAULT_MODEL.to_string()
        }
    }

    fn size(aspect: Option<AspectRatio>) -> &'static str {
        match aspect.unwrap_or(AspectRatio::Square) {
            AspectRatio::Square => "1024x1024",
            AspectRatio::Landscape => "1536x1024",
            AspectRatio::Portrait => "1024x1536",
            AspectRatio::Wide => "1820x1024",
            AspectRatio::Tall => "1024x1820",
        }
    }

    fn file_request(&self, path: &str, reference: Option<&Blob>) -> BuiltRequest {
        let mut request = BuiltRequest::multipart(format!("{}/images/{path}", self.api_base));
        if let Some(reference) = reference {
            request.set_blob("file", reference.clone());
        }
        request
    }
}

impl Default for RecraftAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderAdapter for RecraftAdapter {
    fn id(&self) -> &str {
        "recraft"
    }

    fn display_name(&self) -> &str {
        "Recraft"
    }

    fn supported_operations(&self) -> &[Operation] {
        &[
            Operation::Generate,
            Operation::Vectorize,
            Operation::RemoveBg,
            Operation::Upscale,
        ]
    }

    fn build_request(
        &self,
        params: &UniversalParams,
        operation: Operation,
        reference: Option<&Blob>,
    ) -> Result<BuiltRequest, GenerationError> {
        let mut request = match operation {
            Operation::Vectorize => self.file_request("vectorize", reference),
            Operation::RemoveBg => self.file_request("removeBackground", reference),
            Operation::Upscale => self.file_request("crispUpscale", reference),
            _ => {
                let model = Self::model(params);
                let style: StyleResolution = if Self::model_has_styles(&model) {
                    resolve_style(params.style.as_deref(), Self::native_style)
                } else {
                    prompt_only_style(params.style.as_deref())
                };
                let mut request =
                    BuiltRequest::json(format!("{}/images/generations", self.api_base));
                request.set_opt("prompt", styled_prompt(params, &style));
                request.set("model", model);
                request.set("size", Self::size(params.aspect));
                request.set_opt("style", style.native());
                request.set_opt("negative_prompt", params.negative_prompt.clone());
                request.set_opt("random_seed", params.seed);
                request
            }
        };
        request.merge_raw(&params.raw);
        Ok(request)
    }

    fn response_shape(&self) -> ResponseShape {
        ResponseShape {
            url_paths: &["/data/0/url", "/image/url"],
            b64_paths: &["/data/0/b64_json", "/image/b64_json"],
            b64_mime: "image/png",
        }
    }
}
