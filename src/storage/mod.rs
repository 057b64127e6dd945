//! Persistence of the monitor's state as opaque key-value blobs
//!
//! The roster, devices, event log, campus settings and the calamity flag are
//! each stored as one JSON blob under a logical key. Loading is forgiving: a
//! missing or corrupt blob falls back to the type's default so a damaged data
//! directory never prevents the dashboard from starting.

use crate::error::StorageError;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[cfg(test)]
use mockall::automock;

/// Logical keys under which state is persisted
pub mod keys {
    pub const ROSTER: &str = "roster";
    pub const DEVICES: &str = "devices";
    pub const EVENTS: &str = "events";
    pub const SETTINGS: &str = "settings";
    pub const CALAMITY_ACTIVE: &str = "calamity_active";
}

/// Blob storage keyed by logical name
#[cfg_attr(test, automock)]
pub trait KeyValueStore: Send {
    /// Read the blob stored under `key`, `None` if nothing was stored
    fn load(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the blob stored under `key`
    fn save(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete the blob stored under `key`; deleting a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

impl<T: KeyValueStore + Sync + ?Sized> KeyValueStore for Arc<T> {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).load(key)
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).save(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

/// Campus settings used to centre maps and sample rosters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub campus_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub zoom: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            campus_name: String::new(),
            latitude: 7.0731,
            longitude: 125.6128,
            zoom: 16,
        }
    }
}

/// Load and deserialize `key`, substituting the default on any failure
pub fn load_or_default<T>(store: &dyn KeyValueStore, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    match store.load(key) {
        Ok(Some(blob)) => match serde_json::from_str(&blob) {
            Ok(value) => value,
            Err(e) => {
                warn!("Stored '{}' is corrupt ({}), using defaults", key, e);
                T::default()
            }
        },
        Ok(None) => {
            debug!("Nothing stored under '{}', using defaults", key);
            T::default()
        }
        Err(e) => {
            warn!("Failed to read '{}' ({}), using defaults", key, e);
            T::default()
        }
    }
}

/// Serialize `value` and store it under `key`
pub fn save_json<T>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<(), StorageError>
where
    T: Serialize + ?Sized,
{
    let blob = serde_json::to_string(value)?;
    store.save(key, &blob)
}

fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

/// Store that keeps one `<key>.json` file per key in a directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KeyValueStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        // Write then rename so a crash mid-write leaves the old blob intact
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        debug!("Saved '{}' ({} bytes)", key, value.len());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store, used by tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        validate_key(key)?;
        let blobs = self
            .blobs
            .lock()
            .map_err(|_| StorageError::Io(std::io::Error::other("memory store poisoned")))?;
        Ok(blobs.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| StorageError::Io(std::io::Error::other("memory store poisoned")))?;
        blobs.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| StorageError::Io(std::io::Error::other("memory store poisoned")))?;
        blobs.remove(key);
        Ok(())
    }
}
