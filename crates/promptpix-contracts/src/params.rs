use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AspectRatio {
    Square,
    Landscape,
    Portrait,
    Wide,
    Tall,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Square,
        AspectRatio::Landscape,
        AspectRatio::Portrait,
        AspectRatio::Wide,
        AspectRatio::Tall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "square",
            AspectRatio::Landscape => "landscape",
            AspectRatio::Portrait => "portrait",
            AspectRatio::Wide => "wide",
            AspectRatio::Tall => "tall",
        }
    }

    /// Accepts the universal names plus the ratio strings they stand for.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "square" | "1:1" => Some(AspectRatio::Square),
            "landscape" | "3:2" => Some(AspectRatio::Landscape),
            "portrait" | "2:3" => Some(AspectRatio::Portrait),
            "wide" | "16:9" => Some(AspectRatio::Wide),
            "tall" | "9:16" => Some(AspectRatio::Tall),
            _ => None,
        }
    }

    pub fn ratio(&self) -> (u32, u32) {
        match self {
            AspectRatio::Square => (1, 1),
            AspectRatio::Landscape => (3, 2),
            AspectRatio::Portrait => (2, 3),
            AspectRatio::Wide => (16, 9),
            AspectRatio::Tall => (9, 16),
        }
    }

    pub fn ratio_label(&self) -> String {
        let (width, height) = self.ratio();
        format!("{width}:{height}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quality {
    Draft,
    Standard,
    Hd,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Draft => "draft",
            Quality::Standard => "standard",
            Quality::Hd => "hd",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Quality::Draft),
            "standard" => Some(Quality::Standard),
            "hd" => Some(Quality::Hd),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Png,
    Jpeg,
    Webp,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Webp => "webp",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        let normalized = normalized.strip_prefix("image/").unwrap_or(&normalized);
        match normalized {
            "png" => Some(OutputFormat::Png),
            "jpg" | "jpeg" => Some(OutputFormat::Jpeg),
            "webp" => Some(OutputFormat::Webp),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Webp => "image/webp",
        }
    }
}

/// Provider-agnostic generation parameters, built once per execution.
///
/// `raw` is the escape hatch: adapters merge it into their request body after
/// every derived field, so a caller-specified key always wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniversalParams {
    pub prompt: Option<String>,
    pub aspect: Option<AspectRatio>,
    pub style: Option<String>,
    pub quality: Option<Quality>,
    pub seed: Option<i64>,
    pub format: Option<OutputFormat>,
    pub negative_prompt: Option<String>,
    pub raw: Map<String, Value>,
}

impl UniversalParams {
    pub fn prompt_text(&self) -> &str {
        self.prompt.as_deref().unwrap_or_default()
    }

    pub fn has_prompt(&self) -> bool {
        !self.prompt_text().trim().is_empty()
    }

    pub fn raw_str(&self, key: &str) -> Option<&str> {
        self.raw
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}
