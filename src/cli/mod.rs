//! CLI module for keygate
//!
//! - `serve`: run the HTTP service (default)
//! - `keys`: manage keys directly against the configured store

pub mod keys;
pub mod serve;

use clap::{Parser, Subcommand};

/// keygate - API key issuance and metered access for AI tool endpoints
#[derive(Parser)]
#[command(name = "keygate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP service
    Serve,

    /// Manage API keys without going through the HTTP service
    Keys(keys::KeysArgs),
}
