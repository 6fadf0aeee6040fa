use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;

/// Session file name in the storage directory
const SESSION_FILE: &str = "session.json";

/// Persistent string slots that outlive the process.
///
/// The store only ever touches the `token` and `user` slots.
pub trait SessionStorage {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    /// Removing a slot that does not exist is not an error.
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// Process-local storage, gone when dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    slots: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.slots.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.slots.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.slots.remove(key);
        Ok(())
    }
}

/// Slots kept together in one JSON object on disk.
/// The file is re-read on every access and deleted once empty. A file that
/// no longer parses is replaced on the next write.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(SESSION_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_contents(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        std::fs::read_to_string(&self.path)
            .map(Some)
            .context("Failed to read session file")
    }

    fn read_slots(&self) -> Result<BTreeMap<String, String>> {
        match self.read_contents()? {
            Some(contents) => {
                serde_json::from_str(&contents).context("Failed to parse session file")
            }
            None => Ok(BTreeMap::new()),
        }
    }

    /// Slots to modify before a write, plus whether the file on disk was
    /// unparseable and must be overwritten regardless.
    fn slots_for_update(&self) -> Result<(BTreeMap<String, String>, bool)> {
        let contents = match self.read_contents()? {
            Some(contents) => contents,
            None => return Ok((BTreeMap::new(), false)),
        };
        match serde_json::from_str(&contents) {
            Ok(slots) => Ok((slots, false)),
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "Discarding unparseable session file");
                Ok((BTreeMap::new(), true))
            }
        }
    }

    fn write_slots(&self, slots: &BTreeMap<String, String>) -> Result<()> {
        if slots.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path).context("Failed to remove session file")?;
            }
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create storage directory")?;
        }
        let contents = serde_json::to_string_pretty(slots)?;
        std::fs::write(&self.path, contents).context("Failed to write session file")?;
        Ok(())
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_slots()?.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let (mut slots, _) = self.slots_for_update()?;
        slots.insert(key.to_string(), value.to_string());
        self.write_slots(&slots)
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let (mut slots, discarded) = self.slots_for_update()?;
        if slots.remove(key).is_some() || discarded {
            self.write_slots(&slots)?;
        }
        Ok(())
    }
}

impl<S: SessionStorage + ?Sized> SessionStorage for Box<S> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}
