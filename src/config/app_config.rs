use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::domain::plan::{PlanCatalog, PlanDefinition, PlanId, UnknownPlanPolicy};
use crate::domain::DomainError;
use crate::infrastructure::observability::MetricsConfig;
use crate::infrastructure::storage::{PostgresConfig, StorageConfig, StorageType};
use crate::infrastructure::upstream::UpstreamConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub plans: PlansConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Key store backend selection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// `json`, `memory` or `postgres`
    pub backend: String,
    /// File used by the `json` backend
    pub path: PathBuf,
    /// Connection URL for the `postgres` backend
    pub database_url: Option<String>,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlansConfig {
    #[serde(default)]
    pub unknown_plan_policy: UnknownPlanPolicy,
    #[serde(default = "default_fallback_plan")]
    pub fallback_plan: String,
    /// Extra plans, or overrides of the built-in ones
    #[serde(default)]
    pub definitions: BTreeMap<String, PlanDefinition>,
}

fn default_fallback_plan() -> String {
    "free".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminConfig {
    /// Secret expected in `X-Admin-Key`; admin routes are closed when unset
    pub admin_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for PlansConfig {
    fn default() -> Self {
        Self {
            unknown_plan_policy: UnknownPlanPolicy::default(),
            fallback_plan: default_fallback_plan(),
            definitions: BTreeMap::new(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: "json".to_string(),
            path: PathBuf::from("data/api_keys.json"),
            database_url: None,
            max_connections: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Built-in plans plus configured definitions, with the unknown-plan policy applied
    pub fn plan_catalog(&self) -> Result<PlanCatalog, DomainError> {
        let mut catalog = PlanCatalog::builtin();

        for (name, definition) in &self.plans.definitions {
            catalog = catalog.with_plan(PlanId::new(name.as_str())?, definition.clone());
        }

        let fallback = PlanId::new(self.plans.fallback_plan.as_str())?;
        catalog.with_policy(self.plans.unknown_plan_policy, fallback)
    }

    pub fn storage_config(&self) -> Result<StorageConfig, DomainError> {
        let backend = StorageType::parse(&self.storage.backend).ok_or_else(|| {
            DomainError::configuration(format!(
                "Unknown storage backend '{}'",
                self.storage.backend
            ))
        })?;

        match backend {
            StorageType::JsonFile => Ok(StorageConfig::json_file(&self.storage.path)),
            StorageType::InMemory => Ok(StorageConfig::in_memory()),
            StorageType::Postgres => {
                let url = self
                    .storage
                    .database_url
                    .clone()
                    .or_else(|| std::env::var("DATABASE_URL").ok())
                    .ok_or_else(|| {
                        DomainError::configuration(
                            "storage.database_url or DATABASE_URL is required for postgres",
                        )
                    })?;

                let mut pg = PostgresConfig::new(url);
                if let Some(max) = self.storage.max_connections {
                    pg = pg.with_max_connections(max);
                }
                Ok(StorageConfig::Postgres(pg))
            }
        }
    }

    /// Admin secret, ignoring blank values
    pub fn admin_key(&self) -> Option<String> {
        self.admin
            .admin_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::plan::{Feature, Quota};

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.storage.backend, "json");
        assert_eq!(config.plans.unknown_plan_policy, UnknownPlanPolicy::Fallback);
        assert_eq!(config.upstream.timeout_secs, 60);
        assert!(config.admin_key().is_none());
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_default_storage_is_json_file() {
        let config = AppConfig::default();

        match config.storage_config().unwrap() {
            StorageConfig::JsonFile(path) => assert_eq!(path, PathBuf::from("data/api_keys.json")),
            other => panic!("unexpected storage config {:?}", other),
        }
    }

    #[test]
    fn test_unknown_backend() {
        let mut config = AppConfig::default();
        config.storage.backend = "redis".to_string();

        assert!(matches!(
            config.storage_config(),
            Err(DomainError::Configuration { .. })
        ));
    }

    #[test]
    fn test_postgres_requires_url() {
        let mut config = AppConfig::default();
        config.storage.backend = "postgres".to_string();
        config.storage.database_url = Some("postgres://db/keys".to_string());

        match config.storage_config().unwrap() {
            StorageConfig::Postgres(pg) => assert_eq!(pg.url, "postgres://db/keys"),
            other => panic!("unexpected storage config {:?}", other),
        }
    }

    #[test]
    fn test_blank_admin_key_is_ignored() {
        let mut config = AppConfig::default();
        config.admin.admin_key = Some("   ".to_string());
        assert!(config.admin_key().is_none());

        config.admin.admin_key = Some("s3cret".to_string());
        assert_eq!(config.admin_key().as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_plan_definitions_extend_catalog() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "plans": {
                "unknown_plan_policy": "reject",
                "definitions": {
                    "team": {
                        "quotas": {"text_generations": 1000, "music_generations": -1},
                        "reset_period_days": 7
                    }
                }
            }
        }))
        .unwrap();

        let catalog = config.plan_catalog().unwrap();
        let team = PlanId::new("team").unwrap();

        assert_eq!(catalog.policy(), UnknownPlanPolicy::Reject);
        assert_eq!(
            catalog.quota_for(&team, Feature::TextGenerations).unwrap(),
            Quota::Limited(1000)
        );
        assert_eq!(
            catalog.quota_for(&team, Feature::MusicGenerations).unwrap(),
            Quota::Unlimited
        );
    }

    #[test]
    fn test_missing_fallback_plan() {
        let mut config = AppConfig::default();
        config.plans.fallback_plan = "gold".to_string();

        assert!(config.plan_catalog().is_err());
    }
}
