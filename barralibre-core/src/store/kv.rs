//! Local key-value storage backends for the persisted document.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use thiserror::Error;

/// Errors that can occur while reading or writing a stored value.
#[derive(Error, Debug)]
pub enum KvError {
    #[error("I/O error for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid storage key '{0}'")]
    InvalidKey(String),
}

/// A string-valued key-value store.
///
/// `set` replaces the whole value in one step: a reader never observes a
/// partially written value.
pub trait KeyValueStore {
    /// Returns `Ok(None)` when the key has never been written.
    fn get(&self, key: &str) -> Result<Option<String>, KvError>;
    fn set(&self, key: &str, value: &str) -> Result<(), KvError>;
    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), KvError>;
}

/// Stores each key as `<key>.json` inside a data directory.
#[derive(Debug, Clone)]
pub struct FileKvStore {
    data_dir: PathBuf,
}

impl FileKvStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    /// Returns the file backing `key`.
    pub fn path(&self, key: &str) -> Result<PathBuf, KvError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(KvError::InvalidKey(key.to_string()));
        }
        Ok(self.data_dir.join(format!("{}.json", key)))
    }
}

impl KeyValueStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let path = self.path(key)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(KvError::Io { path, source }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        let path = self.path(key)?;
        fs::create_dir_all(&self.data_dir).map_err(|source| KvError::Io {
            path: self.data_dir.clone(),
            source,
        })?;

        // Write next to the target, then rename over it.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).map_err(|source| KvError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| KvError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), KvError> {
        let path = self.path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(KvError::Io { path, source }),
        }
    }
}

/// In-memory store, for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), KvError> {
        self.entries().remove(key);
        Ok(())
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for &T {
    fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), KvError> {
        (**self).remove(key)
    }
}
