//! Settings Storage backed by a JSON file

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SettingsStore,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

const SETTINGS_FILE_NAME: &str = "settings.json";
const APP_DIR_NAME: &str = "vinylogue";

/// Typed value as it sits in the settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
enum StoredValue {
    String(String),
    Bool(bool),
    Int(i64),
}

impl StoredValue {
    fn type_name(&self) -> &'static str {
        match self {
            StoredValue::String(_) => "string",
            StoredValue::Bool(_) => "bool",
            StoredValue::Int(_) => "int",
        }
    }
}

/// JSON-file settings store implementation
///
/// The whole map is kept in memory and rewritten on every change. Writes go
/// to a sibling temp file first and are renamed into place, so a crash mid
/// write leaves the previous file intact.
///
/// A store created with [`FileSettingsStore::in_memory`] never touches disk.
pub struct FileSettingsStore {
    path: Option<PathBuf>,
    values: Mutex<BTreeMap<String, StoredValue>>,
}

impl FileSettingsStore {
    /// Open (or create) the settings file at `path`
    pub async fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BridgeError::Io)?;
        }

        let values = match tokio::fs::read(&path).await {
            Ok(raw) => match serde_json::from_slice(&raw) {
                Ok(values) => values,
                Err(e) => {
                    // A corrupt file must not brick the app; start fresh.
                    warn!(path = ?path, error = %e, "Settings file unreadable, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(BridgeError::Io(e)),
        };

        debug!(path = ?path, keys = values.len(), "Initialized settings store");

        Ok(Self {
            path: Some(path),
            values: Mutex::new(values),
        })
    }

    /// Open the settings file in the platform data directory
    pub async fn open_default() -> Result<Self> {
        Self::new(Self::default_path()?).await
    }

    /// Synchronous variant of [`FileSettingsStore::new`] for callers that
    /// assemble configuration before a runtime exists.
    pub fn open_blocking(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(BridgeError::Io)?;
        }

        let values = match std::fs::read(&path) {
            Ok(raw) => serde_json::from_slice(&raw).unwrap_or_else(|e| {
                warn!(path = ?path, error = %e, "Settings file unreadable, starting empty");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(BridgeError::Io(e)),
        };

        Ok(Self {
            path: Some(path),
            values: Mutex::new(values),
        })
    }

    /// Create an in-memory settings store (for testing)
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: Mutex::new(BTreeMap::new()),
        }
    }

    /// `<data dir>/vinylogue/settings.json`
    pub fn default_path() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR_NAME).join(SETTINGS_FILE_NAME))
            .ok_or_else(|| {
                BridgeError::NotAvailable("No data directory on this platform".to_string())
            })
    }

    async fn persist(&self, values: &BTreeMap<String, StoredValue>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let encoded = serde_json::to_vec_pretty(values).map_err(|e| {
            BridgeError::OperationFailed(format!("Failed to encode settings: {}", e))
        })?;

        write_atomically(path, &encoded).await.map_err(|e| {
            error!(path = ?path, error = %e, "Failed to write settings file");
            BridgeError::Io(e)
        })
    }

    /// Set a value, writing the file before the in-memory map changes
    async fn set_value(&self, key: &str, value: StoredValue) -> Result<()> {
        let mut values = self.values.lock().await;
        let type_name = value.type_name();

        let mut next = values.clone();
        next.insert(key.to_string(), value);
        self.persist(&next).await?;
        *values = next;

        debug!(key = key, value_type = type_name, "Stored setting");
        Ok(())
    }

    /// Get a value and verify its type
    async fn get_value(&self, key: &str, expected_type: &str) -> Result<Option<StoredValue>> {
        let values = self.values.lock().await;
        match values.get(key) {
            Some(value) if value.type_name() == expected_type => Ok(Some(value.clone())),
            Some(value) => Err(BridgeError::OperationFailed(format!(
                "Type mismatch for key '{}': expected {}, found {}",
                key,
                expected_type,
                value.type_name()
            ))),
            None => Ok(None),
        }
    }
}

async fn write_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.set_value(key, StoredValue::String(value.to_string()))
            .await
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        match self.get_value(key, "string").await? {
            Some(StoredValue::String(s)) => Ok(Some(s)),
            _ => Ok(None),
        }
    }

    async fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set_value(key, StoredValue::Bool(value)).await
    }

    async fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get_value(key, "bool").await? {
            Some(StoredValue::Bool(b)) => Ok(Some(b)),
            _ => Ok(None),
        }
    }

    async fn set_i64(&self, key: &str, value: i64) -> Result<()> {
        self.set_value(key, StoredValue::Int(value)).await
    }

    async fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        match self.get_value(key, "int").await? {
            Some(StoredValue::Int(i)) => Ok(Some(i)),
            _ => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().await;
        if !values.contains_key(key) {
            return Ok(());
        }

        let mut next = values.clone();
        next.remove(key);
        self.persist(&next).await?;
        *values = next;

        debug!(key = key, "Deleted setting");
        Ok(())
    }

    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.values.lock().await.contains_key(key))
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        Ok(self.values.lock().await.keys().cloned().collect())
    }

    async fn clear_all(&self) -> Result<()> {
        let mut values = self.values.lock().await;
        let next = BTreeMap::new();
        self.persist(&next).await?;
        *values = next;

        debug!("Cleared all settings");
        Ok(())
    }
}
