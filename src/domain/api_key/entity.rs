//! API key entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::validation::{validate_api_key_value, ApiKeyValidationError};
use crate::domain::plan::PlanId;

/// The opaque token a caller presents
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApiKeyValue(String);

impl ApiKeyValue {
    /// Create a new ApiKeyValue after validation
    pub fn new(value: impl Into<String>) -> Result<Self, ApiKeyValidationError> {
        let value = value.into();
        validate_api_key_value(&value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading characters, safe to put in logs
    pub fn redacted(&self) -> String {
        let prefix: String = self.0.chars().take(12).collect();
        format!("{}...", prefix)
    }
}

impl TryFrom<String> for ApiKeyValue {
    type Error = ApiKeyValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ApiKeyValue> for String {
    fn from(value: ApiKeyValue) -> Self {
        value.0
    }
}

impl std::fmt::Display for ApiKeyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// Debug output ends up in logs, so only the prefix is shown
impl std::fmt::Debug for ApiKeyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ApiKeyValue").field(&self.redacted()).finish()
    }
}

/// An issued API key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
    value: ApiKeyValue,
    plan: PlanId,
    owner_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    last_used_at: Option<DateTime<Utc>>,
    active: bool,
}

impl ApiKey {
    /// Create a new active key
    pub fn new(value: ApiKeyValue, plan: PlanId, owner_id: impl Into<String>) -> Self {
        Self {
            value,
            plan,
            owner_id: owner_id.into(),
            description: None,
            created_at: Utc::now(),
            last_used_at: None,
            active: true,
        }
    }

    /// Set description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    // Getters

    pub fn value(&self) -> &ApiKeyValue {
        &self.value
    }

    pub fn plan(&self) -> &PlanId {
        &self.plan
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_used_at(&self) -> Option<DateTime<Utc>> {
        self.last_used_at
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    // Mutations

    /// Mark the key as used at `at`
    pub fn record_usage_at(&mut self, at: DateTime<Utc>) {
        self.last_used_at = Some(at);
    }

    /// Deactivation is one-way; there is no way back to active
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn set_plan(&mut self, plan: PlanId) {
        self.plan = plan;
    }
}
