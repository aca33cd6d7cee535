//! Layered application configuration

mod app_config;

pub use app_config::{
    AdminConfig, AppConfig, LogFormat, LoggingConfig, PlansConfig, ServerConfig, StorageSettings,
};
