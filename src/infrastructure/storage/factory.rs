//! Key store factory for runtime backend selection

use std::path::PathBuf;
use std::sync::Arc;

use crate::domain::api_key::KeyStore;
use crate::domain::DomainError;

use super::in_memory::InMemoryKeyStore;
use super::json_file::JsonFileKeyStore;
use super::postgres::{PostgresConfig, PostgresKeyStore};

/// Supported storage types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    /// Single JSON document on local disk
    JsonFile,
    /// In-memory storage (for testing/development)
    InMemory,
    /// PostgreSQL storage
    Postgres,
}

impl StorageType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" | "file" | "json_file" => Some(Self::JsonFile),
            "memory" | "inmemory" | "in-memory" | "in_memory" => Some(Self::InMemory),
            "postgres" | "postgresql" | "pg" => Some(Self::Postgres),
            _ => None,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone)]
pub enum StorageConfig {
    JsonFile(PathBuf),
    InMemory,
    Postgres(PostgresConfig),
}

impl StorageConfig {
    pub fn json_file(path: impl Into<PathBuf>) -> Self {
        Self::JsonFile(path.into())
    }

    pub fn in_memory() -> Self {
        Self::InMemory
    }

    pub fn postgres_url(url: impl Into<String>) -> Self {
        Self::Postgres(PostgresConfig::new(url))
    }

    pub fn storage_type(&self) -> StorageType {
        match self {
            Self::JsonFile(_) => StorageType::JsonFile,
            Self::InMemory => StorageType::InMemory,
            Self::Postgres(_) => StorageType::Postgres,
        }
    }
}

/// Factory for creating key store instances
#[derive(Debug)]
pub struct KeyStoreFactory;

impl KeyStoreFactory {
    /// Open the configured store; a corrupt or unreachable store is an error
    pub async fn create(config: &StorageConfig) -> Result<Arc<dyn KeyStore>, DomainError> {
        match config {
            StorageConfig::JsonFile(path) => Ok(Arc::new(JsonFileKeyStore::load(path).await?)),
            StorageConfig::InMemory => Ok(Arc::new(InMemoryKeyStore::new())),
            StorageConfig::Postgres(pg_config) => {
                Ok(Arc::new(PostgresKeyStore::connect(pg_config).await?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_type_parse() {
        assert_eq!(StorageType::parse("json"), Some(StorageType::JsonFile));
        assert_eq!(StorageType::parse("memory"), Some(StorageType::InMemory));
        assert_eq!(StorageType::parse("in-memory"), Some(StorageType::InMemory));
        assert_eq!(StorageType::parse("postgresql"), Some(StorageType::Postgres));
        assert_eq!(StorageType::parse("pg"), Some(StorageType::Postgres));
        assert_eq!(StorageType::parse("redis"), None);
    }

    #[tokio::test]
    async fn test_create_json_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = StorageConfig::json_file(dir.path().join("keys.json"));

        let store = KeyStoreFactory::create(&config).await.unwrap();
        assert!(store.list_keys().await.unwrap().is_empty());
        assert_eq!(config.storage_type(), StorageType::JsonFile);
    }

    #[tokio::test]
    async fn test_create_in_memory_store() {
        let store = KeyStoreFactory::create(&StorageConfig::in_memory())
            .await
            .unwrap();
        assert!(store.list_keys().await.unwrap().is_empty());
    }
}
