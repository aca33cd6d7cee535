//! Keys command - key management against the configured store

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::config::AppConfig;
use crate::domain::api_key::ApiKey;
use crate::infrastructure::api_key::KeyManager;
use crate::infrastructure::logging::init_logging;
use crate::infrastructure::storage::KeyStoreFactory;

#[derive(Debug, Args)]
pub struct KeysArgs {
    #[command(subcommand)]
    pub action: KeysAction,
}

#[derive(Debug, Subcommand)]
pub enum KeysAction {
    /// Issue a key on a plan
    Generate {
        #[arg(long, default_value = "free")]
        plan: String,
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },

    /// Issue a key that bypasses every limit
    God,

    /// Show usage against limits for a key
    Stats { key: String },

    /// Deactivate a key
    Deactivate { key: String },

    /// Move a key to another plan
    Upgrade { key: String, plan: String },

    /// List every key
    List,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct KeySummary<'a> {
    api_key: &'a str,
    plan: &'a str,
    owner_id: &'a str,
    active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

impl<'a> From<&'a ApiKey> for KeySummary<'a> {
    fn from(key: &'a ApiKey) -> Self {
        Self {
            api_key: key.value().as_str(),
            plan: key.plan().as_str(),
            owner_id: key.owner_id(),
            active: key.is_active(),
            description: key.description(),
        }
    }
}

pub async fn run(args: KeysArgs) -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config.logging);

    let manager = build_manager(&config).await?;
    execute(&manager, args.action).await
}

async fn build_manager(config: &AppConfig) -> anyhow::Result<KeyManager> {
    let catalog = config.plan_catalog()?;
    let store = KeyStoreFactory::create(&config.storage_config()?)
        .await
        .context("failed to open key store")?;

    Ok(KeyManager::new(store, Arc::new(catalog)))
}

async fn execute(manager: &KeyManager, action: KeysAction) -> anyhow::Result<()> {
    match action {
        KeysAction::Generate {
            plan,
            owner,
            description,
        } => {
            let key = manager.generate(&plan, owner, description).await?;
            print_json(&KeySummary::from(&key))
        }
        KeysAction::God => {
            let key = manager.create_god_key().await?;
            print_json(&KeySummary::from(&key))
        }
        KeysAction::Stats { key } => match manager.stats(&key).await? {
            Some(stats) => print_json(&stats),
            None => bail!("key is unknown or inactive"),
        },
        KeysAction::Deactivate { key } => {
            if !manager.deactivate(&key).await? {
                bail!("key not found");
            }
            println!("deactivated");
            Ok(())
        }
        KeysAction::Upgrade { key, plan } => {
            if !manager.upgrade_plan(&key, &plan).await? {
                bail!("key not found");
            }
            println!("upgraded to {}", plan);
            Ok(())
        }
        KeysAction::List => {
            let keys = manager.list().await?;
            let summaries: Vec<KeySummary<'_>> = keys.iter().map(KeySummary::from).collect();
            print_json(&summaries)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
