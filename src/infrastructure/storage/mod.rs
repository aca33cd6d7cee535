//! Storage infrastructure - Key store backends

mod factory;
mod in_memory;
mod json_file;
mod postgres;
mod snapshot;

pub use factory::{KeyStoreFactory, StorageConfig, StorageType};
pub use in_memory::InMemoryKeyStore;
pub use json_file::JsonFileKeyStore;
pub use postgres::{PostgresConfig, PostgresKeyStore};
