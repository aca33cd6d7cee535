//! Key store trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

use super::entity::{ApiKey, ApiKeyValue};
use crate::domain::plan::{Feature, PlanId};
use crate::domain::usage::UsageRecord;
use crate::domain::DomainError;

/// Durable storage for keys and their usage records
///
/// Every mutating call is write-through: it returns only after the change is
/// durable (or fails with `DomainError::Storage`). Keys are never deleted.
///
/// The provided single-field updates read and then write; the caller must
/// serialize them. Stores shared between processes override them with one
/// conditional statement each.
#[async_trait]
pub trait KeyStore: Send + Sync + Debug {
    /// Get a key by value
    async fn get_key(&self, value: &ApiKeyValue) -> Result<Option<ApiKey>, DomainError>;

    /// Insert or replace a key
    async fn put_key(&self, key: ApiKey) -> Result<(), DomainError>;

    /// Get the usage record for a key
    async fn get_usage(&self, value: &ApiKeyValue) -> Result<Option<UsageRecord>, DomainError>;

    /// Insert or replace the usage record for a key
    async fn put_usage(&self, value: &ApiKeyValue, usage: UsageRecord)
        -> Result<(), DomainError>;

    /// Store a new key together with its usage record in one write
    async fn insert(&self, key: ApiKey, usage: UsageRecord) -> Result<(), DomainError> {
        let value = key.value().clone();
        self.put_key(key).await?;
        self.put_usage(&value, usage).await
    }

    /// Add one to a feature counter atomically and return the new count
    ///
    /// A key with no usage record gets a fresh one. An unknown key is
    /// `NotFound`.
    async fn increment_usage(
        &self,
        value: &ApiKeyValue,
        feature: Feature,
    ) -> Result<u64, DomainError>;

    /// All keys, active or not
    async fn list_keys(&self) -> Result<Vec<ApiKey>, DomainError>;

    /// Check whether a key value has ever been issued
    async fn contains_key(&self, value: &ApiKeyValue) -> Result<bool, DomainError> {
        Ok(self.get_key(value).await?.is_some())
    }

    /// Stamp `last_used_at` on an active key and return the updated key
    ///
    /// Unknown and inactive keys give `None` and are left untouched.
    async fn touch_key(
        &self,
        value: &ApiKeyValue,
        at: DateTime<Utc>,
    ) -> Result<Option<ApiKey>, DomainError> {
        let Some(mut key) = self.get_key(value).await? else {
            return Ok(None);
        };
        if !key.is_active() {
            return Ok(None);
        }

        key.record_usage_at(at);
        self.put_key(key.clone()).await?;
        Ok(Some(key))
    }

    /// Clear the active flag; returns whether the key exists
    async fn deactivate_key(&self, value: &ApiKeyValue) -> Result<bool, DomainError> {
        let Some(mut key) = self.get_key(value).await? else {
            return Ok(false);
        };

        if key.is_active() {
            key.deactivate();
            self.put_key(key).await?;
        }
        Ok(true)
    }

    /// Point a key at another plan; returns whether the key exists
    async fn set_key_plan(&self, value: &ApiKeyValue, plan: &PlanId) -> Result<bool, DomainError> {
        let Some(mut key) = self.get_key(value).await? else {
            return Ok(false);
        };

        key.set_plan(plan.clone());
        self.put_key(key).await?;
        Ok(true)
    }

    /// Replace a usage record only if its window still starts at `expected_last_reset`
    ///
    /// `None` expects no record at all. Returns whether the replacement was
    /// applied; `false` means someone else changed the window first.
    async fn replace_usage(
        &self,
        value: &ApiKeyValue,
        expected_last_reset: Option<DateTime<Utc>>,
        usage: UsageRecord,
    ) -> Result<bool, DomainError> {
        let current = self.get_usage(value).await?;
        if current.as_ref().map(UsageRecord::last_reset) != expected_last_reset {
            return Ok(false);
        }

        self.put_usage(value, usage).await?;
        Ok(true)
    }
}
