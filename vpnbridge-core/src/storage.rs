//! Persistent key-value storage
//!
//! The engine only depends on an asynchronous `get`/`set` contract. Two
//! backends are provided: a JSON file on disk and an in-memory map.

use crate::error::StorageError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Key of the cached server list
pub const SERVER_LIST_KEY: &str = "serverList";
/// Key of the origin to site context map
pub const SITE_CONTEXTS_KEY: &str = "siteContexts";
/// Key of the private browsing auto-connect policy
pub const AUTO_CONNECT_KEY: &str = "privateBrowsingAutoConnect";

/// Asynchronous key-value store; a write is durable once `set` returns `Ok`
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;
}

/// Read and deserialize a stored value
pub async fn get_typed<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match store.get(key).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| StorageError::Serialization {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        None => Ok(None),
    }
}

/// Serialize and store a value
pub async fn set_typed<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let value = serde_json::to_value(value).map_err(|e| StorageError::Serialization {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    store.set(key, value).await
}

/// Stores every key in one JSON object file
///
/// Writes go to a sibling temporary file that is then renamed over the
/// original, so a crash never leaves a truncated file behind.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Map<String, Value>, StorageError> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => {
                return Err(StorageError::Read {
                    reason: format!("{}: {}", self.path.display(), e),
                })
            }
        };

        match serde_json::from_slice(&contents) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(StorageError::Read {
                reason: format!("{} does not contain a JSON object", self.path.display()),
            }),
            Err(e) => Err(StorageError::Read {
                reason: format!("Failed to parse {}: {}", self.path.display(), e),
            }),
        }
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;

        let mut all = self.read_all().await?;
        all.insert(key.to_string(), value);

        let contents = serde_json::to_vec_pretty(&Value::Object(all)).map_err(|e| {
            StorageError::Serialization {
                key: key.to_string(),
                reason: e.to_string(),
            }
        })?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Write {
                    reason: format!("Failed to create {}: {}", parent.display(), e),
                })?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents)
            .await
            .map_err(|e| StorageError::Write {
                reason: format!("{}: {}", tmp.display(), e),
            })?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StorageError::Write {
                reason: format!("{}: {}", self.path.display(), e),
            })?;

        debug!(key, path = %self.path.display(), "Persisted storage key");
        Ok(())
    }
}

/// Volatile store for tests and ephemeral runs
///
/// Individual keys can be made read-only to exercise write failures.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
    rejected: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write to `key` fail
    pub fn reject_writes_to(&self, key: &str) {
        if let Ok(mut rejected) = self.rejected.lock() {
            rejected.insert(key.to_string());
        }
    }

    /// Undo [`MemoryStore::reject_writes_to`]
    pub fn accept_writes_to(&self, key: &str) {
        if let Ok(mut rejected) = self.rejected.lock() {
            rejected.remove(key);
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let values = self.values.lock().map_err(|e| StorageError::Read {
            reason: e.to_string(),
        })?;
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let rejected = self
            .rejected
            .lock()
            .map(|rejected| rejected.contains(key))
            .unwrap_or(false);
        if rejected {
            return Err(StorageError::Rejected {
                key: key.to_string(),
            });
        }

        let mut values = self.values.lock().map_err(|e| StorageError::Write {
            reason: e.to_string(),
        })?;
        values.insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("state.json"));

        assert_eq!(store.get("missing").await.unwrap(), None);

        store.set("a", json!({"x": 1})).await.unwrap();
        store.set("b", json!(true)).await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), Some(json!({"x": 1})));
        assert_eq!(store.get("b").await.unwrap(), Some(json!(true)));
    }

    #[tokio::test]
    async fn test_file_store_rejects_non_object() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(
            store.get("a").await,
            Err(StorageError::Read { .. })
        ));
    }

    #[tokio::test]
    async fn test_memory_store_rejected_key() {
        let store = MemoryStore::new();
        store.reject_writes_to("k");
        assert_eq!(
            store.set("k", json!(1)).await,
            Err(StorageError::Rejected {
                key: "k".to_string()
            })
        );
        store.accept_writes_to("k");
        assert!(store.set("k", json!(1)).await.is_ok());
    }
}
