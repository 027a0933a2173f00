//! Per-session state store
//!
//! Scheduler pipeline state and mention caches are keyed by session ID and
//! held behind [`SessionStore`], so in-memory and on-disk backings are
//! interchangeable. Callers serialize writes per session; different
//! sessions may be used concurrently.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("Invalid session key: {0}")]
    InvalidKey(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Keyed storage for one kind of per-session value.
pub trait SessionStore<T>: Send + Sync {
    fn load(&self, session_id: &str) -> StoreResult<Option<T>>;

    fn save(&self, session_id: &str, value: &T) -> StoreResult<()>;

    /// Returns whether a value was present.
    fn remove(&self, session_id: &str) -> StoreResult<bool>;
}

/// Shared reference to a store
pub type SharedStore<T> = Arc<dyn SessionStore<T>>;

/// Process-local store.
pub struct InMemoryStore<T> {
    entries: RwLock<HashMap<String, T>>,
}

impl<T> InMemoryStore<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for InMemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync> SessionStore<T> for InMemoryStore<T> {
    fn load(&self, session_id: &str) -> StoreResult<Option<T>> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.get(session_id).cloned())
    }

    fn save(&self, session_id: &str, value: &T) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        entries.insert(session_id.to_string(), value.clone());
        Ok(())
    }

    fn remove(&self, session_id: &str) -> StoreResult<bool> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.remove(session_id).is_some())
    }
}

/// One pretty-printed JSON document per session in a directory.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session_id: &str) -> StoreResult<PathBuf> {
        let valid = !session_id.is_empty()
            && session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidKey(session_id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", session_id)))
    }
}

impl<T: Serialize + DeserializeOwned> SessionStore<T> for JsonFileStore {
    fn load(&self, session_id: &str) -> StoreResult<Option<T>> {
        let path = self.path_for(session_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, session_id: &str, value: &T) -> StoreResult<()> {
        let path = self.path_for(session_id)?;
        let content = serde_json::to_string_pretty(value)?;
        // Write then rename so a reader never sees a torn document.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &path)?;
        debug!(session_id, path = %path.display(), "Saved session state");
        Ok(())
    }

    fn remove(&self, session_id: &str) -> StoreResult<bool> {
        let path = self.path_for(session_id)?;
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)?;
        Ok(true)
    }
}
