//! PostgreSQL key store with connection pooling

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::Row;
use tracing::info;

use crate::domain::api_key::{ApiKey, ApiKeyValue, KeyStore};
use crate::domain::plan::{Feature, PlanId};
use crate::domain::usage::UsageRecord;
use crate::domain::DomainError;

/// PostgreSQL storage configuration
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections to maintain
    pub min_connections: u32,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/keygate".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
        }
    }
}

impl PostgresConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }
}

const CREATE_KEYS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS api_keys (
        key TEXT PRIMARY KEY,
        data JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
"#;

const CREATE_USAGE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS api_key_usage (
        key TEXT PRIMARY KEY REFERENCES api_keys (key),
        data JSONB NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
"#;

// Single-statement increment; the row lock serializes concurrent callers
const INCREMENT_USAGE: &str = r#"
    UPDATE api_key_usage
    SET data = jsonb_set(
            data,
            ARRAY['counters', $2::text],
            to_jsonb(COALESCE((data->'counters'->>$2)::bigint, 0) + 1),
            true
        ),
        updated_at = NOW()
    WHERE key = $1
    RETURNING (data->'counters'->>$2)::bigint AS count
"#;

// Never reactivates: a key deactivated by another instance stays inactive
const TOUCH_KEY: &str = r#"
    UPDATE api_keys
    SET data = jsonb_set(data, '{last_used_at}', $2),
        updated_at = NOW()
    WHERE key = $1 AND (data->>'active')::boolean
    RETURNING data
"#;

const DEACTIVATE_KEY: &str = r#"
    UPDATE api_keys
    SET data = jsonb_set(data, '{active}', 'false'::jsonb),
        updated_at = NOW()
    WHERE key = $1
"#;

const SET_KEY_PLAN: &str = r#"
    UPDATE api_keys
    SET data = jsonb_set(data, '{plan}', $2),
        updated_at = NOW()
    WHERE key = $1
"#;

// Applies only while the stored window is the one the caller read
const REPLACE_USAGE: &str = r#"
    UPDATE api_key_usage
    SET data = $2,
        updated_at = NOW()
    WHERE key = $1 AND data->'last_reset' = $3
"#;

const CREATE_USAGE: &str = r#"
    INSERT INTO api_key_usage (key, data)
    VALUES ($1, $2)
    ON CONFLICT (key) DO NOTHING
"#;

/// Key store backed by two PostgreSQL tables holding JSONB documents
pub struct PostgresKeyStore {
    pool: PgPool,
}

impl Debug for PostgresKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresKeyStore").finish_non_exhaustive()
    }
}

impl PostgresKeyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and make sure both tables exist
    pub async fn connect(config: &PostgresConfig) -> Result<Self, DomainError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to connect to PostgreSQL: {}", e)))?;

        let store = Self::new(pool);
        store.ensure_tables().await?;
        info!("Connected to PostgreSQL key store");

        Ok(store)
    }

    pub async fn ensure_tables(&self) -> Result<(), DomainError> {
        for statement in [CREATE_KEYS_TABLE, CREATE_USAGE_TABLE] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| DomainError::storage(format!("Failed to create table: {}", e)))?;
        }
        Ok(())
    }

    async fn try_increment(
        &self,
        value: &ApiKeyValue,
        feature: Feature,
    ) -> Result<Option<u64>, DomainError> {
        let row = sqlx::query(INCREMENT_USAGE)
            .bind(value.as_str())
            .bind(feature.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to increment usage: {}", e)))?;

        Ok(row.map(|row| {
            let count: i64 = row.get("count");
            u64::try_from(count).unwrap_or(0)
        }))
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, DomainError> {
    serde_json::to_value(value)
        .map_err(|e| DomainError::storage(format!("Failed to serialize record: {}", e)))
}

fn from_json<T: serde::de::DeserializeOwned>(data: serde_json::Value) -> Result<T, DomainError> {
    serde_json::from_value(data)
        .map_err(|e| DomainError::storage(format!("Failed to deserialize record: {}", e)))
}

#[async_trait]
impl KeyStore for PostgresKeyStore {
    async fn get_key(&self, value: &ApiKeyValue) -> Result<Option<ApiKey>, DomainError> {
        let row = sqlx::query("SELECT data FROM api_keys WHERE key = $1")
            .bind(value.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to get key: {}", e)))?;

        row.map(|row| from_json(row.get("data"))).transpose()
    }

    async fn put_key(&self, key: ApiKey) -> Result<(), DomainError> {
        let data = to_json(&key)?;

        sqlx::query(
            r#"
            INSERT INTO api_keys (key, data)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()
            "#,
        )
        .bind(key.value().as_str())
        .bind(&data)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to store key: {}", e)))?;

        Ok(())
    }

    async fn get_usage(&self, value: &ApiKeyValue) -> Result<Option<UsageRecord>, DomainError> {
        let row = sqlx::query("SELECT data FROM api_key_usage WHERE key = $1")
            .bind(value.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to get usage: {}", e)))?;

        row.map(|row| from_json(row.get("data"))).transpose()
    }

    async fn put_usage(
        &self,
        value: &ApiKeyValue,
        usage: UsageRecord,
    ) -> Result<(), DomainError> {
        let data = to_json(&usage)?;

        sqlx::query(
            r#"
            INSERT INTO api_key_usage (key, data)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()
            "#,
        )
        .bind(value.as_str())
        .bind(&data)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to store usage: {}", e)))?;

        Ok(())
    }

    async fn insert(&self, key: ApiKey, usage: UsageRecord) -> Result<(), DomainError> {
        let key_data = to_json(&key)?;
        let usage_data = to_json(&usage)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))?;

        sqlx::query("INSERT INTO api_keys (key, data) VALUES ($1, $2)")
            .bind(key.value().as_str())
            .bind(&key_data)
            .execute(&mut *tx)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to store key: {}", e)))?;

        sqlx::query("INSERT INTO api_key_usage (key, data) VALUES ($1, $2)")
            .bind(key.value().as_str())
            .bind(&usage_data)
            .execute(&mut *tx)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to store usage: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to commit key: {}", e)))
    }

    async fn increment_usage(
        &self,
        value: &ApiKeyValue,
        feature: Feature,
    ) -> Result<u64, DomainError> {
        if let Some(count) = self.try_increment(value, feature).await? {
            return Ok(count);
        }

        if !self.contains_key(value).await? {
            return Err(DomainError::not_found(format!(
                "API key '{}' not found",
                value.redacted()
            )));
        }

        // Key exists without a usage row: seed one, then retry the increment
        let data = to_json(&UsageRecord::new())?;
        sqlx::query(CREATE_USAGE)
            .bind(value.as_str())
            .bind(&data)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to store usage: {}", e)))?;

        self.try_increment(value, feature)
            .await?
            .ok_or_else(|| DomainError::storage("Usage row vanished during increment"))
    }

    async fn list_keys(&self) -> Result<Vec<ApiKey>, DomainError> {
        let rows = sqlx::query("SELECT data FROM api_keys ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to list keys: {}", e)))?;

        rows.into_iter()
            .map(|row| from_json(row.get("data")))
            .collect()
    }

    async fn touch_key(
        &self,
        value: &ApiKeyValue,
        at: DateTime<Utc>,
    ) -> Result<Option<ApiKey>, DomainError> {
        let row = sqlx::query(TOUCH_KEY)
            .bind(value.as_str())
            .bind(Json(at))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to touch key: {}", e)))?;

        row.map(|row| from_json(row.get("data"))).transpose()
    }

    async fn deactivate_key(&self, value: &ApiKeyValue) -> Result<bool, DomainError> {
        let result = sqlx::query(DEACTIVATE_KEY)
            .bind(value.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to deactivate key: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_key_plan(&self, value: &ApiKeyValue, plan: &PlanId) -> Result<bool, DomainError> {
        let result = sqlx::query(SET_KEY_PLAN)
            .bind(value.as_str())
            .bind(Json(plan))
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to change key plan: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn replace_usage(
        &self,
        value: &ApiKeyValue,
        expected_last_reset: Option<DateTime<Utc>>,
        usage: UsageRecord,
    ) -> Result<bool, DomainError> {
        let data = to_json(&usage)?;

        let result = match expected_last_reset {
            Some(expected) => {
                sqlx::query(REPLACE_USAGE)
                    .bind(value.as_str())
                    .bind(&data)
                    .bind(Json(expected))
                    .execute(&self.pool)
                    .await
            }
            None => {
                sqlx::query(CREATE_USAGE)
                    .bind(value.as_str())
                    .bind(&data)
                    .execute(&self.pool)
                    .await
            }
        }
        .map_err(|e| DomainError::storage(format!("Failed to store usage: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_only_matches_active_keys() {
        assert!(TOUCH_KEY.contains("(data->>'active')::boolean"));
        assert!(TOUCH_KEY.contains("RETURNING data"));
    }

    #[test]
    fn test_single_field_updates_leave_other_fields_alone() {
        for statement in [TOUCH_KEY, DEACTIVATE_KEY, SET_KEY_PLAN] {
            assert!(statement.contains("jsonb_set(data,"));
        }
    }

    #[test]
    fn test_usage_replacement_is_conditional() {
        assert!(REPLACE_USAGE.contains("data->'last_reset' = $3"));
        assert!(CREATE_USAGE.contains("ON CONFLICT (key) DO NOTHING"));
    }
}
