use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use promptpix_contracts::AnchorIdentity;

/// What other components can read about a mounted component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorSnapshot {
    pub id: String,
    pub provider: Option<String>,
    pub prompt: Option<String>,
    /// Final image URL once the component has settled on one.
    pub resolved: Option<String>,
}

impl AnchorSnapshot {
    pub fn identity(&self) -> AnchorIdentity {
        AnchorIdentity {
            id: self.id.clone(),
            provider: self.provider.clone(),
            prompt: self.prompt.clone(),
        }
    }
}

/// Registry of mounted components keyed by id, used to resolve `#id` references.
#[derive(Debug, Clone, Default)]
pub struct ComponentDirectory {
    entries: Arc<RwLock<BTreeMap<String, AnchorSnapshot>>>,
}

impl ComponentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: AnchorSnapshot) {
        match self.entries.write() {
            Ok(mut entries) => entries.insert(snapshot.id.clone(), snapshot),
            Err(poisoned) => poisoned
                .into_inner()
                .insert(snapshot.id.clone(), snapshot),
        };
    }

    pub fn remove(&self, id: &str) -> Option<AnchorSnapshot> {
        match self.entries.write() {
            Ok(mut entries) => entries.remove(id),
            Err(poisoned) => poisoned.into_inner().remove(id),
        }
    }

    pub fn get(&self, id: &str) -> Option<AnchorSnapshot> {
        match self.entries.read() {
            Ok(entries) => entries.get(id).cloned(),
            Err(poisoned) => poisoned.into_inner().get(id).cloned(),
        }
    }

    pub fn anchor_identity(&self, id: &str) -> Option<AnchorIdentity> {
        self.get(id).map(|snapshot| snapshot.identity())
    }

    pub fn resolved_output(&self, id: &str) -> Option<String> {
        self.get(id).and_then(|snapshot| snapshot.resolved)
    }

    pub fn ids(&self) -> Vec<String> {
        match self.entries.read() {
            Ok(entries) => entries.keys().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().keys().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AnchorSnapshot, ComponentDirectory};

    #[test]
    fn identity_is_readable_before_resolution() {
        let directory = ComponentDirectory::new();
        directory.publish(AnchorSnapshot {
            id: "src".to_string(),
            provider: Some("fal".to_string()),
            prompt: Some("a cat".to_string()),
            resolved: None,
        });
        let identity = directory.anchor_identity("src");
        assert_eq!(identity.map(|anchor| anchor.prompt), Some(Some("a cat".to_string())));
        assert_eq!(directory.resolved_output("src"), None);
    }

    #[test]
    fn republishing_replaces_and_remove_forgets() {
        let directory = ComponentDirectory::new();
        let mut snapshot = AnchorSnapshot {
            id: "src".to_string(),
            provider: None,
            prompt: None,
            resolved: None,
        };
        directory.publish(snapshot.clone());
        snapshot.resolved = Some("https://img.example/1.png".to_string());
        directory.publish(snapshot);
        assert_eq!(
            directory.resolved_output("src").as_deref(),
            Some("https://img.example/1.png")
        );
        assert_eq!(directory.ids(), vec!["src".to_string()]);
        assert!(directory.remove("src").is_some());
        assert_eq!(directory.get("src"), None);
    }
}
