//! API key generation
//!
//! Keys are `cs_<plan>_<token>` where the token is 32 bytes from a CSPRNG,
//! base64url-encoded without padding. The plan tag is informational only;
//! the stored plan is what counts.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;

use crate::domain::api_key::ApiKeyValue;
use crate::domain::plan::PlanId;
use crate::domain::DomainError;

const DEFAULT_PREFIX: &str = "cs";
const KEY_BYTES: usize = 32;

/// Generator for API key values
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    prefix: String,
}

impl KeyGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Generate a fresh key value tagged with `plan`
    pub fn generate(&self, plan: &PlanId) -> Result<ApiKeyValue, DomainError> {
        let mut random_bytes = [0u8; KEY_BYTES];
        rand::thread_rng().fill_bytes(&mut random_bytes);

        let token = URL_SAFE_NO_PAD.encode(&random_bytes);

        ApiKeyValue::new(format!("{}_{}_{}", self.prefix, plan, token))
            .map_err(|e| DomainError::internal(format!("Generated key is malformed: {}", e)))
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

/// Constant-time string comparison to prevent timing attacks
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
