use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::GenerationError;
use crate::operations::Operation;
use crate::params::{AspectRatio, OutputFormat, Quality, UniversalParams};

/// Literal attribute strings of one rendered tag, exactly as authored.
///
/// Nothing here is normalized: cache keys are derived from these strings, so
/// trimming or defaulting a value would re-key previously generated images.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TagAttributes {
    pub id: Option<String>,
    pub provider: Option<String>,
    pub operation: Option<String>,
    pub prompt: Option<String>,
    #[serde(alias = "reference")]
    pub img_ref: Option<String>,
    pub aspect: Option<String>,
    pub style: Option<String>,
    pub quality: Option<String>,
    pub format: Option<String>,
    pub negative_prompt: Option<String>,
    pub seed: Option<String>,
    pub params: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceAttr {
    Url(String),
    Element(String),
}

impl ReferenceAttr {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        match trimmed.strip_prefix('#') {
            Some(id) if !id.is_empty() => Some(ReferenceAttr::Element(id.to_string())),
            Some(_) => None,
            None => Some(ReferenceAttr::Url(trimmed.to_string())),
        }
    }
}

impl TagAttributes {
    pub fn provider_id(&self) -> Result<&str, GenerationError> {
        self.provider
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| GenerationError::MissingAttribute {
                attribute: "provider".to_string(),
            })
    }

    /// The operation string handed to the execution core; absent means generate.
    pub fn operation_name(&self) -> String {
        self.operation
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Operation::Generate.as_str().to_string())
    }

    pub fn reference(&self) -> Option<ReferenceAttr> {
        self.img_ref.as_deref().and_then(ReferenceAttr::parse)
    }

    /// Builds generation parameters; `theme` is appended to an existing prompt.
    pub fn to_params(&self, theme: Option<&str>) -> Result<UniversalParams, GenerationError> {
        let theme = theme.map(str::trim).filter(|value| !value.is_empty());
        let prompt = non_empty(self.prompt.as_deref()).map(|prompt| match theme {
            Some(theme) => format!("{prompt}, {theme}"),
            None => prompt.to_string(),
        });

        let aspect = parse_enum(self.aspect.as_deref(), "aspect", AspectRatio::parse)?;
        let quality = parse_enum(self.quality.as_deref(), "quality", Quality::parse)?;
        let format = parse_enum(self.format.as_deref(), "format", OutputFormat::parse)?;
        let seed = match non_empty(self.seed.as_deref()) {
            Some(raw) => Some(raw.parse::<i64>().map_err(|_| {
                GenerationError::InvalidAttribute {
                    attribute: "seed".to_string(),
                    value: raw.to_string(),
                    reason: "expected an integer".to_string(),
                }
            })?),
            None => None,
        };
        let raw = match non_empty(self.params.as_deref()) {
            Some(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    return Err(GenerationError::MalformedRawParams {
                        reason: "expected a JSON object".to_string(),
                    })
                }
                Err(err) => {
                    return Err(GenerationError::MalformedRawParams {
                        reason: err.to_string(),
                    })
                }
            },
            None => Default::default(),
        };

        Ok(UniversalParams {
            prompt,
            aspect,
            style: non_empty(self.style.as_deref()).map(str::to_string),
            quality,
            seed,
            format,
            negative_prompt: non_empty(self.negative_prompt.as_deref()).map(str::to_string),
            raw,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn parse_enum<T>(
    raw: Option<&str>,
    attribute: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>, GenerationError> {
    let Some(raw) = non_empty(raw) else {
        return Ok(None);
    };
    parse(raw)
        .map(Some)
        .ok_or_else(|| GenerationError::InvalidAttribute {
            attribute: attribute.to_string(),
            value: raw.to_string(),
            reason: "unrecognized value".to_string(),
        })
}
