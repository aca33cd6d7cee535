//! In-memory key store

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::snapshot::StoreSnapshot;
use crate::domain::api_key::{ApiKey, ApiKeyValue, KeyStore};
use crate::domain::plan::Feature;
use crate::domain::usage::UsageRecord;
use crate::domain::DomainError;

/// Thread-safe in-memory key store
///
/// Useful for testing and development. Data is lost when the process terminates.
#[derive(Debug, Default)]
pub struct InMemoryKeyStore {
    state: RwLock<StoreSnapshot>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with keys, each with a fresh usage record
    pub fn with_keys(keys: Vec<ApiKey>) -> Self {
        let mut snapshot = StoreSnapshot::default();

        for key in keys {
            snapshot
                .usage
                .insert(key.value().clone(), UsageRecord::new());
            snapshot.keys.insert(key.value().clone(), key);
        }

        Self {
            state: RwLock::new(snapshot),
        }
    }
}

#[async_trait]
impl KeyStore for InMemoryKeyStore {
    async fn get_key(&self, value: &ApiKeyValue) -> Result<Option<ApiKey>, DomainError> {
        Ok(self.state.read().await.keys.get(value).cloned())
    }

    async fn put_key(&self, key: ApiKey) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        state.keys.insert(key.value().clone(), key);
        Ok(())
    }

    async fn get_usage(&self, value: &ApiKeyValue) -> Result<Option<UsageRecord>, DomainError> {
        Ok(self.state.read().await.usage.get(value).cloned())
    }

    async fn put_usage(
        &self,
        value: &ApiKeyValue,
        usage: UsageRecord,
    ) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        state.usage.insert(value.clone(), usage);
        Ok(())
    }

    async fn increment_usage(
        &self,
        value: &ApiKeyValue,
        feature: Feature,
    ) -> Result<u64, DomainError> {
        self.state.write().await.increment(value, feature)
    }

    async fn list_keys(&self) -> Result<Vec<ApiKey>, DomainError> {
        Ok(self.state.read().await.keys.values().cloned().collect())
    }
}
