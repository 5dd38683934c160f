use promptpix_contracts::{GenerationError, Operation, Quality, UniversalParams};

use super::mapping::{api_base, ratio_label, resolve_style, styled_prompt};
use super::{BuiltRequest, CorsMode, ProviderAdapter, ResponseShape};
use crate::http::Blob;

pub struct StabilityAdapter {
    api_base: String,
}

impl StabilityAdapter {
    pub fn new() -> Self {
        Self {
            api_base: api_base("stability", "https://api.stability.ai"),
        }
    }

    fn style_preset(style: &str) -> Option<&'static str> {
        Some(match style {
            "photographic" => "photographic",
            "cinematic" => "cinematic",
            "analog-film" => "analog-film",
            "anime" => "anime",
            "digital-art" => "digital-art",
            "comic-book" => "comic-book",
            "fantasy-art" => "fantasy-art",
            "pixel-art" => "pixel-art",
            "neon-punk" => "neon-punk",
            "3d-render" => "3d-model",
            "isometric" => "isometric",
            "low-poly" => "low-poly",
            "origami" => "origami",
            "line-art" => "line-art",
            _ => return None,
        })
    }

    fn endpoint(&self, params: &UniversalParams, operation: Operation) -> String {
        let path = match operation {
            Operation::Img2Img => "generate/sd3",
            Operation::Upscale => "upscale/fast",
            Operation::RemoveBg => "edit/remove-background",
            _ if params.quality == Some(Quality::Hd) => "generate/ultra",
            _ => "generate/core",
        };
        format!("{}/v2beta/stable-image/{path}", self.api_base)
    }
}

impl Default for StabilityAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderAdapter for StabilityAdapter {
    fn id(&self) -> &str {
        "stability"
    }

    fn display_name(&self) -> &str {
        "Stability AI"
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
        let mut request = BuiltRequest::multipart(self.endpoint(params, operation))
            .with_header("Accept", "application/json");
        if let Some(reference) = reference {
            request.set_blob("image", reference.clone());
        }
        if let Some(format) = params.format {
            request.set("output_format", format.as_str());
        }

        if matches!(operation, Operation::Generate | Operation::Img2Img) {
            let style = resolve_style(params.style.as_deref(), Self::style_preset);
            request.set_opt("prompt", styled_prompt(params, &style));
            request.set_opt("style_preset", style.native());
            request.set_opt("negative_prompt", params.negative_prompt.clone());
            request.set_opt("seed", params.seed);
            if operation == Operation::Img2Img {
                request.set("mode", "image-to-image");
                request.set("strength", 0.6);
            } else {
                request.set("aspect_ratio", ratio_label(params.aspect));
            }
        }
        request.merge_raw(&params.raw);
        Ok(request)
    }

    fn response_shape(&self) -> ResponseShape {
        ResponseShape {
            url_paths: &[],
            b64_paths: &["/image", "/artifacts/0/base64"],
            b64_mime: "image/png",
        }
    }
}
