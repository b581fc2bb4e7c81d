use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};
use thiserror::Error;

/// Fixed namespace the wizard state is stored under.
pub const WIZARD_STORAGE_KEY: &str = "quoteflow.wizard.v1";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("could not access wizard storage `{path}`: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("wizard storage `{path}` is not a JSON object: {source}")]
    Corrupt { path: PathBuf, source: serde_json::Error },
}

/// Tab-scoped key/value store holding serialized wizard state.
pub trait WizardStorage: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn save(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Clones share the same entries, which is how tests simulate a page reload.
#[derive(Clone, Default)]
pub struct InMemoryWizardStorage {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl InMemoryWizardStorage {
    fn with_entries<T>(&self, f: impl FnOnce(&mut BTreeMap<String, String>) -> T) -> T {
        match self.entries.lock() {
            Ok(mut entries) => f(&mut entries),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

impl WizardStorage for InMemoryWizardStorage {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.with_entries(|entries| entries.get(key).cloned()))
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.with_entries(|entries| entries.insert(key.to_string(), value.to_string()));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.with_entries(|entries| entries.remove(key));
        Ok(())
    }
}

/// One JSON object per file, keyed like browser session storage.
#[derive(Clone, Debug)]
pub struct JsonFileWizardStorage {
    path: PathBuf,
}

impl JsonFileWizardStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<Map<String, Value>, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(source) => return Err(StorageError::Io { path: self.path.clone(), source }),
        };
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&raw)
            .map_err(|source| StorageError::Corrupt { path: self.path.clone(), source })
    }

    fn write_entries(&self, entries: &Map<String, Value>) -> Result<(), StorageError> {
        let io_error = |source| StorageError::Io { path: self.path.clone(), source };

        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let body = serde_json::to_string_pretty(entries)
            .map_err(|source| StorageError::Corrupt { path: self.path.clone(), source })?;
        fs::write(&self.path, body).map_err(io_error)
    }
}

impl WizardStorage for JsonFileWizardStorage {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.read_entries()?;
        Ok(entries.get(key).and_then(Value::as_str).map(str::to_string))
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.read_entries()?;
        entries.insert(key.to_string(), Value::String(value.to_string()));
        self.write_entries(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.read_entries()?;
        if entries.remove(key).is_some() {
            self.write_entries(&entries)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::{
        InMemoryWizardStorage, JsonFileWizardStorage, StorageError, WizardStorage,
        WIZARD_STORAGE_KEY,
    };

    #[test]
    fn in_memory_storage_round_trips_and_removes() {
        let storage = InMemoryWizardStorage::default();
        let reloaded = storage.clone();

        storage.save(WIZARD_STORAGE_KEY, "{\"step\":1}").expect("save");
        assert_eq!(
            reloaded.load(WIZARD_STORAGE_KEY).expect("load").as_deref(),
            Some("{\"step\":1}")
        );

        reloaded.remove(WIZARD_STORAGE_KEY).expect("remove");
        assert_eq!(storage.load(WIZARD_STORAGE_KEY).expect("load"), None);
    }

    #[test]
    fn json_file_storage_keeps_other_keys() {
        let dir = TempDir::new().expect("tempdir");
        let storage = JsonFileWizardStorage::new(dir.path().join("nested").join("session.json"));

        assert_eq!(storage.load(WIZARD_STORAGE_KEY).expect("missing file"), None);

        storage.save("other.key", "keep me").expect("save other");
        storage.save(WIZARD_STORAGE_KEY, "state").expect("save state");
        storage.remove(WIZARD_STORAGE_KEY).expect("remove");

        assert_eq!(storage.load(WIZARD_STORAGE_KEY).expect("load"), None);
        assert_eq!(storage.load("other.key").expect("load").as_deref(), Some("keep me"));
    }

    #[test]
    fn json_file_storage_reports_corrupt_files() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("session.json");
        fs::write(&path, "not json").expect("write");

        let storage = JsonFileWizardStorage::new(&path);
        let error = storage.load(WIZARD_STORAGE_KEY).expect_err("corrupt");
        assert!(matches!(error, StorageError::Corrupt { .. }));
    }
}
