//! API key domain
//!
//! Issued keys, the value callers present, and the store trait that owns
//! keys and their usage records.

mod entity;
mod repository;
mod validation;

pub use entity::{ApiKey, ApiKeyValue};
pub use repository::KeyStore;
pub use validation::{validate_api_key_value, ApiKeyValidationError};
