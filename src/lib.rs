//! keygate
//!
//! API-key issuance and plan-based usage metering for AI tool endpoints:
//! - Plan catalogue with per-feature quotas and periodic resets
//! - JSON file, in-memory and PostgreSQL key stores
//! - Access gate that admits, rejects and counts metered calls
//! - HTTP service forwarding admitted calls to upstream feature services

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;

use api::state::AppState;
use infrastructure::api_key::KeyManager;
use infrastructure::storage::KeyStoreFactory;
use infrastructure::upstream::HttpUpstreamClient;
use tracing::{info, warn};

/// Create the application state with custom configuration
pub async fn create_app_state_with_config(config: &AppConfig) -> anyhow::Result<AppState> {
    let catalog = config.plan_catalog()?;
    info!(
        plans = ?catalog.plan_ids().map(|p| p.as_str()).collect::<Vec<_>>(),
        policy = ?catalog.policy(),
        "Plan catalogue loaded"
    );

    let storage = config.storage_config()?;
    info!(backend = ?storage.storage_type(), "Opening key store");
    let store = KeyStoreFactory::create(&storage).await?;

    let key_manager = Arc::new(KeyManager::new(store, Arc::new(catalog)));
    let upstream = Arc::new(HttpUpstreamClient::new(&config.upstream)?);

    let state = AppState::new(key_manager, upstream);

    match config.admin_key() {
        Some(admin_key) => Ok(state.with_admin_key(admin_key)),
        None => {
            warn!("No admin key configured; key management routes are disabled");
            Ok(state)
        }
    }
}
