//! Whole-store state shared by the in-memory and JSON file backends

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::api_key::{ApiKey, ApiKeyValue};
use crate::domain::plan::Feature;
use crate::domain::usage::UsageRecord;
use crate::domain::DomainError;

pub(super) const SNAPSHOT_VERSION: u32 = 1;

/// Serialized layout: `{"version": 1, "keys": {...}, "usage": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(super) struct StoreSnapshot {
    pub version: u32,
    #[serde(default)]
    pub keys: BTreeMap<ApiKeyValue, ApiKey>,
    #[serde(default)]
    pub usage: BTreeMap<ApiKeyValue, UsageRecord>,
}

impl Default for StoreSnapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            keys: BTreeMap::new(),
            usage: BTreeMap::new(),
        }
    }
}

impl StoreSnapshot {
    pub fn increment(&mut self, value: &ApiKeyValue, feature: Feature) -> Result<u64, DomainError> {
        if !self.keys.contains_key(value) {
            return Err(DomainError::not_found(format!(
                "API key '{}' not found",
                value.redacted()
            )));
        }

        Ok(self
            .usage
            .entry(value.clone())
            .or_default()
            .increment(feature))
    }

    /// Reject layouts written by a newer release
    pub fn check_version(&self) -> Result<(), DomainError> {
        if self.version > SNAPSHOT_VERSION {
            return Err(DomainError::storage(format!(
                "Unsupported key store version {} (max {})",
                self.version, SNAPSHOT_VERSION
            )));
        }
        Ok(())
    }
}
