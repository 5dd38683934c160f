use std::sync::OnceLock;

use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleFamily {
    Photographic,
    Illustration,
    Painting,
    Render,
    Vector,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleSpec {
    pub name: String,
    pub phrase: String,
    pub family: StyleFamily,
}

impl StyleSpec {
    pub fn is_vector(&self) -> bool {
        self.family == StyleFamily::Vector
    }
}

/// The universal style vocabulary shared by every adapter.
///
/// Adapters map a name to a native style value when they have one; otherwise
/// the `phrase` is injected into the prompt.
#[derive(Debug, Clone)]
pub struct StyleVocabulary {
    styles: IndexMap<String, StyleSpec>,
}

impl StyleVocabulary {
    pub fn new(styles: Option<IndexMap<String, StyleSpec>>) -> Self {
        Self {
            styles: styles.unwrap_or_else(default_styles),
        }
    }

    pub fn universal() -> &'static StyleVocabulary {
        static UNIVERSAL: OnceLock<StyleVocabulary> = OnceLock::new();
        UNIVERSAL.get_or_init(|| StyleVocabulary::new(None))
    }

    pub fn get(&self, name: &str) -> Option<&StyleSpec> {
        self.styles.get(&normalize_style_name(name))
    }

    pub fn list(&self) -> impl Iterator<Item = &StyleSpec> {
        self.styles.values()
    }

    /// Prompt text describing `name`; unknown styles fall back to "<name> style".
    pub fn phrase_for(&self, name: &str) -> String {
        match self.get(name) {
            Some(spec) => spec.phrase.clone(),
            None => format!("{} style", name.trim()),
        }
    }

    pub fn is_vector(&self, name: &str) -> bool {
        self.get(name).map(StyleSpec::is_vector).unwrap_or(false)
    }
}

pub fn normalize_style_name(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace(['_', ' '], "-")
}

fn default_styles() -> IndexMap<String, StyleSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, phrase: &str, family: StyleFamily| {
        map.insert(
            name.to_string(),
            StyleSpec {
                name: name.to_string(),
                phrase: phrase.to_string(),
                family,
            },
        );
    };

    insert(
        "photographic",
        "photorealistic photograph, natural lighting",
        StyleFamily::Photographic,
    );
    insert(
        "cinematic",
        "cinematic film still, dramatic lighting, shallow depth of field",
        StyleFamily::Photographic,
    );
    insert(
        "analog-film",
        "analog film photograph, grain, faded colors",
        StyleFamily::Photographic,
    );
    insert(
        "anime",
        "anime style illustration, cel shading",
        StyleFamily::Illustration,
    );
    insert(
        "digital-art",
        "digital art, highly detailed",
        StyleFamily::Illustration,
    );
    insert(
        "illustration",
        "detailed digital illustration",
        StyleFamily::Illustration,
    );
    insert(
        "comic-book",
        "comic book art, bold ink outlines",
        StyleFamily::Illustration,
    );
    insert(
        "fantasy-art",
        "fantasy art, epic and ethereal",
        StyleFamily::Illustration,
    );
    insert(
        "pixel-art",
        "pixel art, limited palette",
        StyleFamily::Illustration,
    );
    insert(
        "neon-punk",
        "neon punk aesthetic, glowing neon colors",
        StyleFamily::Illustration,
    );
    insert(
        "watercolor",
        "watercolor painting, soft washes of color",
        StyleFamily::Painting,
    );
    insert(
        "oil-painting",
        "oil painting, visible brush strokes",
        StyleFamily::Painting,
    );
    insert(
        "sketch",
        "pencil sketch, hand-drawn lines",
        StyleFamily::Painting,
    );
    insert(
        "3d-render",
        "3D render, studio lighting, octane render",
        StyleFamily::Render,
    );
    insert(
        "isometric",
        "isometric 3D illustration",
        StyleFamily::Render,
    );
    insert("low-poly", "low poly 3D model", StyleFamily::Render);
    insert(
        "origami",
        "folded paper origami sculpture",
        StyleFamily::Render,
    );
    insert(
        "line-art",
        "clean line art, monochrome outlines",
        StyleFamily::Vector,
    );
    insert(
        "vector",
        "flat vector illustration, clean shapes",
        StyleFamily::Vector,
    );
    insert(
        "flat-design",
        "flat design, solid colors, minimal shading",
        StyleFamily::Vector,
    );
    insert(
        "logo",
        "minimal vector logo, simple geometric shapes",
        StyleFamily::Vector,
    );
    insert(
        "icon",
        "simple vector icon, centered, plain background",
        StyleFamily::Vector,
    );

    map
}

#[cfg(test)]
mod tests {
    use super::{StyleFamily, StyleVocabulary};

    #[test]
    fn lookup_normalizes_separators_and_case() {
        let vocabulary = StyleVocabulary::universal();
        let spec = vocabulary.get("Digital_Art").expect("digital-art present");
        assert_eq!(spec.name, "digital-art");
        assert_eq!(
            vocabulary.get("oil painting").map(|spec| spec.family),
            Some(StyleFamily::Painting)
        );
    }

    #[test]
    fn unknown_style_degrades_to_literal_phrase() {
        let vocabulary = StyleVocabulary::universal();
        assert_eq!(vocabulary.phrase_for(" art-deco "), "art-deco style");
        assert!(!vocabulary.is_vector("art-deco"));
    }

    #[test]
    fn vector_family_is_flagged() {
        let vocabulary = StyleVocabulary::universal();
        assert!(vocabulary.is_vector("logo"));
        assert!(vocabulary.is_vector("line-art"));
        assert!(!vocabulary.is_vector("photographic"));
    }
}
