//! API key value validation

use thiserror::Error;

/// Errors that can occur when parsing a presented key value
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiKeyValidationError {
    #[error("API key cannot be empty")]
    Empty,

    #[error("API key exceeds maximum length of {0} characters")]
    TooLong(usize),

    #[error("API key contains invalid character: '{0}'")]
    InvalidCharacter(char),
}

const MAX_API_KEY_LENGTH: usize = 128;

/// Validate a key value as presented by a caller
///
/// Only the shape is checked: generated keys are `cs_<plan>_<token>`, but
/// values imported from older stores are accepted as long as they are
/// printable ASCII without whitespace.
pub fn validate_api_key_value(value: &str) -> Result<(), ApiKeyValidationError> {
    if value.is_empty() {
        return Err(ApiKeyValidationError::Empty);
    }

    if value.len() > MAX_API_KEY_LENGTH {
        return Err(ApiKeyValidationError::TooLong(MAX_API_KEY_LENGTH));
    }

    if let Some(c) = value.chars().find(|c| !c.is_ascii_graphic()) {
        return Err(ApiKeyValidationError::InvalidCharacter(c));
    }

    Ok(())
}
