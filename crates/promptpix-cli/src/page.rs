use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use promptpix_contracts::TagAttributes;
use promptpix_engine::{Component, ComponentDirectory, ComponentState, ExecutionCore, ThemeScope};
use serde::Deserialize;

/// A themed group of tags. `theme` decorates every prompt nested below it
/// unless a closer section overrides it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PageSection {
    #[serde(default)]
    pub theme: Option<String>,
    pub tags: Vec<PageNode>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PageNode {
    Section(PageSection),
    Tag(TagAttributes),
}

impl PageSection {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read page {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse page {}", path.display()))
    }

    pub fn tag_count(&self) -> usize {
        self.tags
            .iter()
            .map(|node| match node {
                PageNode::Section(section) => section.tag_count(),
                PageNode::Tag(_) => 1,
            })
            .sum()
    }
}

/// Every tag of a page, mounted against one directory so `#id` references
/// resolve across sections.
pub struct Page {
    components: Vec<Component>,
}

impl Page {
    /// Mounts every tag against one directory and theme tree. Tags referencing
    /// an anchor mounted later in the page wait for it before keying.
    pub fn mount(core: &ExecutionCore, section: &PageSection) -> Self {
        let root = ThemeScope::root();
        let directory = ComponentDirectory::new();
        let mut components = Vec::with_capacity(section.tag_count());
        mount_section(core, &directory, &root, section, &mut components);
        Self { components }
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Waits for every component; they already run concurrently.
    pub async fn settle(&self) -> Vec<(String, ComponentState)> {
        let mut settled = Vec::with_capacity(self.components.len());
        for component in &self.components {
            let state = component.wait_settled().await;
            settled.push((component.id().to_string(), state));
        }
        settled
    }
}

fn mount_section(
    core: &ExecutionCore,
    directory: &ComponentDirectory,
    parent: &ThemeScope,
    section: &PageSection,
    components: &mut Vec<Component>,
) {
    let scope = parent.child();
    if let Some(theme) = &section.theme {
        scope.set_prompt(Some(theme.clone()));
    }
    for node in &section.tags {
        match node {
            PageNode::Tag(attributes) => components.push(Component::mount(
                core.clone(),
                directory.clone(),
                scope.clone(),
                attributes.clone(),
            )),
            PageNode::Section(inner) => mount_section(core, directory, &scope, inner, components),
        }
    }
}
