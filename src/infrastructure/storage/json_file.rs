//! JSON file key store
//!
//! The whole store lives in memory and is rewritten to disk after every
//! mutation. Writes go to a sibling temp file which is then renamed over
//! the target, so a crash never leaves a half-written store behind.
//!
//! One process owns the file at a time: `load` takes an exclusive lock on a
//! sibling `.lock` file and keeps it until the store is dropped.

use std::ffi::OsStr;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::snapshot::StoreSnapshot;
use crate::domain::api_key::{ApiKey, ApiKeyValue, KeyStore};
use crate::domain::plan::Feature;
use crate::domain::usage::UsageRecord;
use crate::domain::DomainError;

#[derive(Debug)]
pub struct JsonFileKeyStore {
    path: PathBuf,
    state: Mutex<StoreSnapshot>,
    _lock: File,
}

impl JsonFileKeyStore {
    /// Load the store from `path`
    ///
    /// A missing file is created empty. A file that cannot be parsed is an
    /// error; it is never silently replaced. Fails while another handle,
    /// in this process or another, holds the store.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, DomainError> {
        let path = path.into();
        let lock = acquire_lock(&path).await?;

        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: StoreSnapshot = serde_json::from_slice(&bytes).map_err(|e| {
                    DomainError::storage(format!(
                        "Key store '{}' is corrupt: {}",
                        path.display(),
                        e
                    ))
                })?;
                snapshot.check_version()?;
                info!(
                    path = %path.display(),
                    keys = snapshot.keys.len(),
                    "Loaded key store"
                );
                snapshot
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let snapshot = StoreSnapshot::default();
                write_snapshot(&path, &snapshot).await?;
                info!(path = %path.display(), "Initialized empty key store");
                snapshot
            }
            Err(e) => {
                return Err(DomainError::storage(format!(
                    "Failed to read key store '{}': {}",
                    path.display(),
                    e
                )));
            }
        };

        Ok(Self {
            path,
            state: Mutex::new(snapshot),
            _lock: lock,
        })
    }

    /// Apply a mutation and persist the result while still holding the lock
    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut StoreSnapshot) -> Result<T, DomainError> + Send,
    ) -> Result<T, DomainError> {
        let mut state = self.state.lock().await;
        let result = f(&mut state)?;

        if let Err(e) = write_snapshot(&self.path, &state).await {
            // In-memory state keeps the change; the next successful write catches up
            error!(path = %self.path.display(), error = %e, "Failed to persist key store");
            return Err(e);
        }

        Ok(result)
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(OsStr::new(suffix));
    PathBuf::from(name)
}

async fn create_parent_dir(path: &Path) -> Result<(), DomainError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            DomainError::storage(format!(
                "Failed to create directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }
    Ok(())
}

// The data file itself is replaced on every write, so the lock lives on a
// sibling that is never renamed.
async fn acquire_lock(path: &Path) -> Result<File, DomainError> {
    create_parent_dir(path).await?;

    let lock_path = sibling(path, ".lock");
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| {
            DomainError::storage(format!(
                "Failed to open lock file '{}': {}",
                lock_path.display(),
                e
            ))
        })?;

    file.try_lock_exclusive().map_err(|e| {
        warn!(path = %path.display(), error = %e, "Key store is locked");
        DomainError::storage(format!(
            "Key store '{}' is in use by another process; stop the server or use the admin API",
            path.display()
        ))
    })?;

    debug!(path = %lock_path.display(), "Acquired key store lock");
    Ok(file)
}

async fn write_snapshot(path: &Path, snapshot: &StoreSnapshot) -> Result<(), DomainError> {
    let data = serde_json::to_vec_pretty(snapshot)
        .map_err(|e| DomainError::storage(format!("Failed to serialize key store: {}", e)))?;

    create_parent_dir(path).await?;

    let tmp = sibling(path, ".tmp");

    tokio::fs::write(&tmp, &data).await.map_err(|e| {
        DomainError::storage(format!("Failed to write '{}': {}", tmp.display(), e))
    })?;
    tokio::fs::rename(&tmp, path).await.map_err(|e| {
        DomainError::storage(format!("Failed to replace '{}': {}", path.display(), e))
    })?;

    debug!(path = %path.display(), bytes = data.len(), "Persisted key store");
    Ok(())
}

#[async_trait]
impl KeyStore for JsonFileKeyStore {
    async fn get_key(&self, value: &ApiKeyValue) -> Result<Option<ApiKey>, DomainError> {
        Ok(self.state.lock().await.keys.get(value).cloned())
    }

    async fn put_key(&self, key: ApiKey) -> Result<(), DomainError> {
        self.mutate(|state| {
            state.keys.insert(key.value().clone(), key);
            Ok(())
        })
        .await
    }

    async fn get_usage(&self, value: &ApiKeyValue) -> Result<Option<UsageRecord>, DomainError> {
        Ok(self.state.lock().await.usage.get(value).cloned())
    }

    async fn put_usage(
        &self,
        value: &ApiKeyValue,
        usage: UsageRecord,
    ) -> Result<(), DomainError> {
        self.mutate(|state| {
            state.usage.insert(value.clone(), usage);
            Ok(())
        })
        .await
    }

    async fn insert(&self, key: ApiKey, usage: UsageRecord) -> Result<(), DomainError> {
        self.mutate(|state| {
            state.usage.insert(key.value().clone(), usage);
            state.keys.insert(key.value().clone(), key);
            Ok(())
        })
        .await
    }

    async fn increment_usage(
        &self,
        value: &ApiKeyValue,
        feature: Feature,
    ) -> Result<u64, DomainError> {
        self.mutate(|state| state.increment(value, feature)).await
    }

    async fn list_keys(&self) -> Result<Vec<ApiKey>, DomainError> {
        Ok(self.state.lock().await.keys.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::plan::PlanId;
    use tempfile::TempDir;

    fn key(value: &str) -> ApiKey {
        ApiKey::new(ApiKeyValue::new(value).unwrap(), PlanId::pro(), "user_1")
    }

    #[tokio::test]
    async fn test_missing_file_is_created_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("api_keys.json");

        let store = JsonFileKeyStore::load(&path).await.unwrap();

        assert!(path.exists());
        assert!(store.list_keys().await.unwrap().is_empty());

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert!(raw["keys"].as_object().unwrap().is_empty());
        assert!(raw["usage"].as_object().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("api_keys.json");
        std::fs::write(&path, b"{not json").unwrap();

        let result = JsonFileKeyStore::load(&path).await;

        assert!(matches!(result, Err(DomainError::Storage { .. })));
        assert_eq!(std::fs::read(&path).unwrap(), b"{not json");
    }

    #[tokio::test]
    async fn test_newer_version_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("api_keys.json");
        std::fs::write(&path, br#"{"version": 2, "keys": {}, "usage": {}}"#).unwrap();

        assert!(JsonFileKeyStore::load(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_mutations_survive_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("api_keys.json");
        let k = key("cs_pro_persisted");

        {
            let store = JsonFileKeyStore::load(&path).await.unwrap();
            store.insert(k.clone(), UsageRecord::new()).await.unwrap();
            store
                .increment_usage(k.value(), Feature::MusicGenerations)
                .await
                .unwrap();
            store
                .increment_usage(k.value(), Feature::MusicGenerations)
                .await
                .unwrap();
        }

        let reloaded = JsonFileKeyStore::load(&path).await.unwrap();
        assert_eq!(reloaded.get_key(k.value()).await.unwrap(), Some(k.clone()));

        let usage = reloaded.get_usage(k.value()).await.unwrap().unwrap();
        assert_eq!(usage.count(Feature::MusicGenerations), 2);
        assert!(!dir.path().join("api_keys.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_second_handle_on_same_file_is_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("api_keys.json");
        let k = key("cs_pro_owned");

        let server = JsonFileKeyStore::load(&path).await.unwrap();
        server.insert(k.clone(), UsageRecord::new()).await.unwrap();

        let cli = JsonFileKeyStore::load(&path).await;
        match cli {
            Err(DomainError::Storage { message }) => assert!(message.contains("in use")),
            other => panic!("expected a storage error, got {:?}", other),
        }

        drop(server);

        let cli = JsonFileKeyStore::load(&path).await.unwrap();
        assert_eq!(cli.get_key(k.value()).await.unwrap(), Some(k));
    }

    #[tokio::test]
    async fn test_failed_write_keeps_memory_and_catches_up() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("api_keys.json");
        let k = key("cs_pro_unsaved");
        let store = JsonFileKeyStore::load(&path).await.unwrap();

        // A directory where the temp file goes makes the write fail
        let tmp = dir.path().join("api_keys.json.tmp");
        std::fs::create_dir(&tmp).unwrap();

        let result = store.insert(k.clone(), UsageRecord::new()).await;
        assert!(matches!(result, Err(DomainError::Storage { .. })));
        assert_eq!(store.get_key(k.value()).await.unwrap(), Some(k.clone()));

        let on_disk: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert!(on_disk["keys"].as_object().unwrap().is_empty());

        std::fs::remove_dir(&tmp).unwrap();
        store
            .increment_usage(k.value(), Feature::TextGenerations)
            .await
            .unwrap();
        drop(store);

        let reloaded = JsonFileKeyStore::load(&path).await.unwrap();
        assert_eq!(reloaded.get_key(k.value()).await.unwrap(), Some(k.clone()));
        let usage = reloaded.get_usage(k.value()).await.unwrap().unwrap();
        assert_eq!(usage.count(Feature::TextGenerations), 1);
    }

    #[tokio::test]
    async fn test_increment_unknown_key_does_not_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("api_keys.json");
        let store = JsonFileKeyStore::load(&path).await.unwrap();
        let before = std::fs::read(&path).unwrap();

        let value = ApiKeyValue::new("cs_free_ghost").unwrap();
        assert!(store
            .increment_usage(&value, Feature::LyricGenerations)
            .await
            .is_err());
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }
}
