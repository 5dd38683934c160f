use std::collections::BTreeMap;

use crate::attributes::{ReferenceAttr, TagAttributes};
use crate::hash::content_hash;

/// Literal attributes of the element an `#id` reference points at, as readable
/// before that element has produced anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorIdentity {
    pub id: String,
    pub provider: Option<String>,
    pub prompt: Option<String>,
}

/// Derives the content-addressed cache key for a tag.
///
/// Only the literal strings the author wrote contribute, each under a fixed
/// field name, and a field is present only when its attribute is. Fields are
/// serialized in sorted order so the key does not depend on attribute order.
/// Adding a new optional attribute therefore leaves every existing key intact
/// as long as the new field is skipped when absent.
pub fn derive_cache_key(
    attributes: &TagAttributes,
    theme_prompt: Option<&str>,
    anchor: Option<&AnchorIdentity>,
) -> String {
    let mut pairs = vec![
        ("provider", attributes.provider.as_deref()),
        ("operation", attributes.operation.as_deref()),
        ("prompt", attributes.prompt.as_deref()),
        ("theme", theme_prompt),
        ("aspect", attributes.aspect.as_deref()),
        ("style", attributes.style.as_deref()),
        ("quality", attributes.quality.as_deref()),
        ("format", attributes.format.as_deref()),
        ("negative_prompt", attributes.negative_prompt.as_deref()),
        ("seed", attributes.seed.as_deref()),
        ("params", attributes.params.as_deref()),
        ("ref", attributes.img_ref.as_deref()),
    ];
    if let (Some(ReferenceAttr::Element(_)), Some(anchor)) = (attributes.reference(), anchor) {
        pairs.push(("ref_id", Some(anchor.id.as_str())));
        pairs.push(("ref_provider", anchor.provider.as_deref()));
        pairs.push(("ref_prompt", anchor.prompt.as_deref()));
    }

    let fields: BTreeMap<&str, &str> = pairs
        .into_iter()
        .filter_map(|(name, value)| value.map(|value| (name, value)))
        .collect();
    let canonical = serde_json::to_string(&fields).unwrap_or_default();
    content_hash(&canonical)
}
