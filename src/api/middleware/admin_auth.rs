//! Admin secret extractor
//!
//! Key management routes require the configured secret in `X-Admin-Key`.

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::{debug, warn};

use crate::api::state::AppState;
use crate::api::types::ApiError;
use crate::infrastructure::api_key::constant_time_compare;

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Extractor that requires the admin secret
#[derive(Debug, Clone, Copy)]
pub struct RequireAdminKey;

impl FromRequestParts<AppState> for RequireAdminKey {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.admin_key.as_deref() else {
            warn!(path = %parts.uri.path(), "Admin route called but no admin key is configured");
            return Err(ApiError::forbidden("Admin access is not configured"));
        };

        let presented = parts
            .headers
            .get(ADMIN_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::unauthorized("Admin key required in X-Admin-Key header"))?;

        if !constant_time_compare(presented, expected) {
            debug!(path = %parts.uri.path(), "Admin key mismatch");
            return Err(ApiError::forbidden("Invalid admin key"));
        }

        Ok(RequireAdminKey)
    }
}
