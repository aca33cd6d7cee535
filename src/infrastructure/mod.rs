//! Infrastructure layer - Key stores, key management and external services

pub mod api_key;
pub mod logging;
pub mod observability;
pub mod storage;
pub mod upstream;
