use std::sync::{Arc, RwLock};

use tokio::sync::watch;

/// One level of a theme scope chain.
///
/// Scopes created from the same root share a change channel: every
/// [`ThemeScope::set_prompt`] anywhere in the tree bumps its epoch, and
/// subscribers re-resolve their own nearest prompt to see whether it moved.
#[derive(Debug, Clone)]
pub struct ThemeScope {
    node: Arc<ScopeNode>,
}

#[derive(Debug)]
struct ScopeNode {
    parent: Option<ThemeScope>,
    prompt: RwLock<Option<String>>,
    epoch: Arc<watch::Sender<u64>>,
}

impl Default for ThemeScope {
    fn default() -> Self {
        Self::root()
    }
}

impl ThemeScope {
    pub fn root() -> Self {
        let (epoch, _) = watch::channel(0);
        Self {
            node: Arc::new(ScopeNode {
                parent: None,
                prompt: RwLock::new(None),
                epoch: Arc::new(epoch),
            }),
        }
    }

    pub fn child(&self) -> Self {
        Self {
            node: Arc::new(ScopeNode {
                parent: Some(self.clone()),
                prompt: RwLock::new(None),
                epoch: self.node.epoch.clone(),
            }),
        }
    }

    pub fn with_prompt(self, prompt: impl Into<String>) -> Self {
        self.set_prompt(Some(prompt.into()));
        self
    }

    pub fn prompt(&self) -> Option<String> {
        match self.node.prompt.read() {
            Ok(prompt) => prompt.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set_prompt(&self, prompt: Option<String>) {
        let prompt = prompt.filter(|value| !value.trim().is_empty());
        let changed = {
            let mut current = match self.node.prompt.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let changed = *current != prompt;
            *current = prompt;
            changed
        };
        if changed {
            self.node.epoch.send_modify(|epoch| *epoch += 1);
        }
    }

    /// Nearest enclosing prompt, starting at this scope.
    pub fn resolve(&self) -> Option<String> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some(prompt) = current.prompt() {
                return Some(prompt);
            }
            scope = current.node.parent.as_ref();
        }
        None
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.node.epoch.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::ThemeScope;

    #[test]
    fn nearest_scope_wins() {
        let root = ThemeScope::root().with_prompt("noir");
        let section = root.child();
        let inner = section.child().with_prompt("pastel");
        assert_eq!(section.resolve().as_deref(), Some("noir"));
        assert_eq!(inner.resolve().as_deref(), Some("pastel"));
        inner.set_prompt(None);
        assert_eq!(inner.resolve().as_deref(), Some("noir"));
    }

    #[test]
    fn blank_prompts_do_not_shadow_parents() {
        let root = ThemeScope::root().with_prompt("noir");
        let child = root.child().with_prompt("   ");
        assert_eq!(child.resolve().as_deref(), Some("noir"));
    }

    #[tokio::test]
    async fn changes_anywhere_notify_descendants() -> anyhow::Result<()> {
        let root = ThemeScope::root();
        let leaf = root.child().child();
        let mut changes = leaf.subscribe();
        root.set_prompt(Some("watercolor".to_string()));
        changes.changed().await?;
        assert_eq!(leaf.resolve().as_deref(), Some("watercolor"));
        Ok(())
    }

    #[test]
    fn unchanged_prompt_does_not_bump_epoch() {
        let root = ThemeScope::root().with_prompt("noir");
        let changes = root.subscribe();
        root.set_prompt(Some("noir".to_string()));
        assert!(!changes.has_changed().unwrap_or(true));
    }
}
