use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

use crate::model::Session;

/// Key the whole session list is stored under.
pub const SESSIONS_KEY: &str = "TAB_FREEZER__SAVED_SESSIONS";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("stored data is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// String key-value storage, the shape of browser-local storage.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: String) -> Result<(), StoreError>;
}

/// Key-value pairs kept as one JSON object in a file.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data_dir>/tab-freezer/storage.json`
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tab-freezer")
            .join("storage.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value);
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&entries)?)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// The saved-session list. Every change rewrites the whole list.
pub struct SessionStore<K> {
    kv: K,
}

impl<K: KeyValueStore> SessionStore<K> {
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    /// All saved sessions; empty when nothing was ever stored.
    pub fn load(&self) -> Result<Vec<Session>, StoreError> {
        match self.kv.get(SESSIONS_KEY)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    pub fn replace(&self, sessions: &[Session]) -> Result<(), StoreError> {
        self.kv.set(SESSIONS_KEY, serde_json::to_string(sessions)?)
    }

    pub fn append(&self, session: Session) -> Result<(), StoreError> {
        let mut sessions = self.load()?;
        sessions.push(session);
        self.replace(&sessions)
    }

    /// Removes entry `index` of `sessions`, the list the caller rendered,
    /// and stores what is left.
    pub fn delete(
        &self,
        sessions: &mut Vec<Session>,
        index: usize,
    ) -> Result<Option<Session>, StoreError> {
        if index >= sessions.len() {
            return Ok(None);
        }
        let removed = sessions.remove(index);
        self.replace(sessions)?;
        Ok(Some(removed))
    }

    /// The stored value exactly as kept, for export.
    pub fn export_raw(&self) -> Result<Option<String>, StoreError> {
        self.kv.get(SESSIONS_KEY)
    }
}
