//! Shared tables and helpers for mapping universal parameters onto providers.

use promptpix_contracts::styles::normalize_style_name;
use promptpix_contracts::{AspectRatio, StyleVocabulary, UniversalParams};

use crate::config::non_empty_env;

/// Base URL for `provider`, overridable through `PROMPTPIX_<PROVIDER>_API_BASE`.
pub(crate) fn api_base(provider: &str, default: &str) -> String {
    let key = format!(
        "PROMPTPIX_{}_API_BASE",
        provider.to_ascii_uppercase().replace('-', "_")
    );
    non_empty_env(&key)
        .map(|value| value.trim_end_matches('/').to_string())
        .unwrap_or_else(|| default.to_string())
}

/// How a universal style ends up in a request: as a native field or as prompt text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StyleResolution {
    None,
    Native(&'static str),
    Prompt(String),
}

impl StyleResolution {
    pub(crate) fn native(&self) -> Option<&'static str> {
        match self {
            StyleResolution::Native(value) => Some(value),
            _ => None,
        }
    }
}

pub(crate) fn resolve_style(
    style: Option<&str>,
    native: impl Fn(&str) -> Option<&'static str>,
) -> StyleResolution {
    let Some(style) = style.map(str::trim).filter(|value| !value.is_empty()) else {
        return StyleResolution::None;
    };
    match native(&normalize_style_name(style)) {
        Some(value) => StyleResolution::Native(value),
        None => StyleResolution::Prompt(StyleVocabulary::universal().phrase_for(style)),
    }
}

/// Styles for providers with no style field at all.
pub(crate) fn prompt_only_style(style: Option<&str>) -> StyleResolution {
    resolve_style(style, |_| None)
}

/// The prompt with any prompt-injected style phrase appended.
pub(crate) fn styled_prompt(params: &UniversalParams, style: &StyleResolution) -> Option<String> {
    let prompt = params.prompt.as_deref().map(str::trim).filter(|p| !p.is_empty());
    match (prompt, style) {
        (Some(prompt), StyleResolution::Prompt(phrase)) => Some(format!("{prompt}, {phrase}")),
        (None, StyleResolution::Prompt(phrase)) => Some(phrase.clone()),
        (Some(prompt), _) => Some(prompt.to_string()),
        (None, _) => None,
    }
}

/// Width and height near one megapixel, multiples of 64.
pub(crate) fn pixel_dimensions(aspect: Option<AspectRatio>) -> (u32, u32) {
    match aspect.unwrap_or(AspectRatio::Square) {
        AspectRatio::Square => (1024, 1024),
        AspectRatio::Landscape => (1216, 832),
        AspectRatio::Portrait => (832, 1216),
        AspectRatio::Wide => (1344, 768),
        AspectRatio::Tall => (768, 1344),
    }
}

pub(crate) fn ratio_label(aspect: Option<AspectRatio>) -> String {
    aspect.unwrap_or(AspectRatio::Square).ratio_label()
}

#[cfg(test)]
mod tests {
    use promptpix_contracts::UniversalParams;

    use super::{prompt_only_style, resolve_style, styled_prompt, StyleResolution};

    fn native(name: &str) -> Option<&'static str> {
        (name == "anime").then_some("anime")
    }

    #[test]
    fn native_mapping_wins_and_keeps_prompt_clean() {
        let params = UniversalParams {
            prompt: Some("a fox".to_string()),
            style: Some("Anime".to_string()),
            ..UniversalParams::default()
        };
        let style = resolve_style(params.style.as_deref(), native);
        assert_eq!(style, StyleResolution::Native("anime"));
        assert_eq!(styled_prompt(&params, &style).as_deref(), Some("a fox"));
    }

    #[test]
    fn unmapped_style_is_injected_as_phrase() {
        let params = UniversalParams {
            prompt: Some("a fox".to_string()),
            style: Some("watercolor".to_string()),
            ..UniversalParams::default()
        };
        let style = resolve_style(params.style.as_deref(), native);
        assert_eq!(style.native(), None);
        let prompt = styled_prompt(&params, &style).unwrap_or_default();
        assert!(prompt.starts_with("a fox, "));
        assert!(prompt.contains("watercolor"));
    }

    #[test]
    fn unknown_style_names_still_degrade_to_prompt() {
        let style = prompt_only_style(Some("bauhaus"));
        assert_eq!(style, StyleResolution::Prompt("bauhaus style".to_string()));
        assert_eq!(prompt_only_style(Some("  ")), StyleResolution::None);
    }
}
