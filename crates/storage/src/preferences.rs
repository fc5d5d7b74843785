use std::path::{Path, PathBuf};
use std::sync::RwLock;

use deskpilot_core::{PreferenceStore, Result};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Flat key/value preferences persisted as one JSON object.
pub struct JsonPreferences {
    path: PathBuf,
    values: RwLock<Map<String, Value>>,
}

impl JsonPreferences {
    /// A missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Map<String, Value>>(&raw) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Preferences file unreadable, starting fresh");
                    Map::new()
                }
            },
            Err(_) => Map::new(),
        };
        debug!(path = %path.display(), keys = values.len(), "Preferences loaded");
        Self {
            path,
            values: RwLock::new(values),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn remove(&self, key: &str) -> Result<Option<Value>> {
        let removed = self.write().remove(key);
        self.persist()?;
        Ok(removed)
    }

    pub fn all(&self) -> Map<String, Value> {
        self.read().clone()
    }

    fn persist(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&*self.read())?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Map<String, Value>> {
        self.values.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Map<String, Value>> {
        self.values.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl PreferenceStore for JsonPreferences {
    fn get(&self, key: &str) -> Option<Value> {
        self.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.write().insert(key.to_string(), value);
        self.persist()
    }
}
