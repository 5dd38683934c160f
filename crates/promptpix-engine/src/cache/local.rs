use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// A locally cached image reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalEntry {
    pub url: String,
    /// Unix milliseconds.
    pub stored_at: i64,
}

/// The fast, authoritative cache layer.
pub trait LocalLayer: Send + Sync {
    fn get(&self, key: &str) -> Option<LocalEntry>;
    fn set(&self, key: &str, entry: LocalEntry) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryLayer {
    entries: Mutex<BTreeMap<String, LocalEntry>>,
}

impl MemoryLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, LocalEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl LocalLayer for MemoryLayer {
    fn get(&self, key: &str) -> Option<LocalEntry> {
        self.lock().get(key).cloned()
    }

    fn set(&self, key: &str, entry: LocalEntry) -> anyhow::Result<()> {
        self.lock().insert(key.to_string(), entry);
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}

/// JSON-file backed layer shared between processes.
///
/// Reads always refresh from disk. Writes merge only the keys this instance
/// touched into the current file contents, so two writers never clobber each
/// other's unrelated entries.
#[derive(Debug)]
pub struct FileLayer {
    path: PathBuf,
    state: Mutex<FileState>,
}

#[derive(Debug, Default)]
struct FileState {
    payload: BTreeMap<String, LocalEntry>,
    dirty_keys: BTreeSet<String>,
}

impl FileLayer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(FileState::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FileState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn flush(&self, state: &mut FileState) -> anyhow::Result<()> {
        if state.dirty_keys.is_empty() {
            return Ok(());
        }
        let mut on_disk = read_entries(&self.path).unwrap_or_default();
        for key in &state.dirty_keys {
            match state.payload.get(key) {
                Some(entry) => on_disk.insert(key.clone(), entry.clone()),
                None => on_disk.remove(key),
            };
        }
        write_entries(&self.path, &on_disk)?;
        state.payload = on_disk;
        state.dirty_keys.clear();
        Ok(())
    }
}

impl LocalLayer for FileLayer {
    fn get(&self, key: &str) -> Option<LocalEntry> {
        let mut state = self.lock();
        state.payload = read_entries(&self.path).unwrap_or_default();
        state.payload.get(key).cloned()
    }

    fn set(&self, key: &str, entry: LocalEntry) -> anyhow::Result<()> {
        let mut state = self.lock();
        if state.payload.get(key) == Some(&entry) {
            return Ok(());
        }
        state.payload.insert(key.to_string(), entry);
        state.dirty_keys.insert(key.to_string());
        self.flush(&mut state)
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let mut state = self.lock();
        state.payload.remove(key);
        state.dirty_keys.insert(key.to_string());
        self.flush(&mut state)
    }
}

fn read_entries(path: &Path) -> Option<BTreeMap<String, LocalEntry>> {
    let raw = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

fn write_entries(path: &Path, entries: &BTreeMap<String, LocalEntry>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, serde_json::to_string_pretty(entries)?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
