//! Key management endpoints

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::api::middleware::access_gate::{extract_api_key_from_body, extract_api_key_from_headers};
use crate::api::middleware::RequireAdminKey;
use crate::api::state::AppState;
use crate::api::types::ApiError;
use crate::domain::api_key::ApiKey;
use crate::domain::plan::PlanId;
use crate::domain::usage::KeyStats;
use crate::infrastructure::api_key::GateRejection;

fn default_plan() -> String {
    PlanId::free().as_str().to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKeyRequest {
    #[serde(default = "default_plan")]
    pub plan: String,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpgradeKeyRequest {
    pub plan: String,
}

/// A key as returned to admins, including its full value
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyResponse {
    pub api_key: String,
    pub plan: String,
    pub owner_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<&ApiKey> for KeyResponse {
    fn from(key: &ApiKey) -> Self {
        Self {
            api_key: key.value().as_str().to_string(),
            plan: key.plan().as_str().to_string(),
            owner_id: key.owner_id().to_string(),
            description: key.description().map(String::from),
            active: key.is_active(),
            created_at: key.created_at(),
            last_used_at: key.last_used_at(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListKeysResponse {
    pub keys: Vec<KeyResponse>,
    pub total: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateKeyResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeactivateKeyResponse {
    pub deactivated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpgradeKeyResponse {
    pub upgraded: bool,
}

/// POST /api/keys
pub async fn create_key(
    State(state): State<AppState>,
    _admin: RequireAdminKey,
    payload: Result<Json<CreateKeyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<KeyResponse>), ApiError> {
    let Json(request) = payload?;

    let key = state
        .key_manager
        .generate(&request.plan, request.owner_id, request.description)
        .await?;

    Ok((StatusCode::CREATED, Json(KeyResponse::from(&key))))
}

/// POST /api/keys/god
pub async fn create_god_key(
    State(state): State<AppState>,
    _admin: RequireAdminKey,
) -> Result<(StatusCode, Json<KeyResponse>), ApiError> {
    let key = state.key_manager.create_god_key().await?;
    info!(key = %key.value().redacted(), "God key issued through admin API");

    Ok((StatusCode::CREATED, Json(KeyResponse::from(&key))))
}

/// GET /api/keys
pub async fn list_keys(
    State(state): State<AppState>,
    _admin: RequireAdminKey,
) -> Result<Json<ListKeysResponse>, ApiError> {
    let keys: Vec<KeyResponse> = state
        .key_manager
        .list()
        .await?
        .iter()
        .map(KeyResponse::from)
        .collect();

    Ok(Json(ListKeysResponse {
        total: keys.len(),
        keys,
    }))
}

/// POST /api/keys/validate
///
/// Accepts the key in the same places as metered routes. An unknown or
/// deactivated key answers `{"valid": false}`.
pub async fn validate_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ValidateKeyResponse>, ApiError> {
    let value = extract_api_key_from_headers(&headers)
        .or_else(|| extract_api_key_from_body(&body))
        .ok_or(GateRejection::AuthRequired)?;

    let response = match state.key_manager.validate(&value).await? {
        Some(key) => ValidateKeyResponse {
            valid: true,
            plan: Some(key.plan().as_str().to_string()),
            owner_id: Some(key.owner_id().to_string()),
            description: key.description().map(String::from),
            created_at: Some(key.created_at()),
        },
        None => {
            debug!("Validation request for unknown or inactive key");
            ValidateKeyResponse::default()
        }
    };

    Ok(Json(response))
}

/// GET /api/keys/stats/{key}
pub async fn key_stats(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<KeyStats>, ApiError> {
    state
        .key_manager
        .stats(&key)
        .await?
        .map(Json)
        .ok_or_else(|| GateRejection::AuthInvalid.into())
}

/// POST /api/keys/{key}/deactivate
pub async fn deactivate_key(
    State(state): State<AppState>,
    _admin: RequireAdminKey,
    Path(key): Path<String>,
) -> Result<Json<DeactivateKeyResponse>, ApiError> {
    let deactivated = state.key_manager.deactivate(&key).await?;
    Ok(Json(DeactivateKeyResponse { deactivated }))
}

/// POST /api/keys/{key}/upgrade
pub async fn upgrade_key(
    State(state): State<AppState>,
    _admin: RequireAdminKey,
    Path(key): Path<String>,
    payload: Result<Json<UpgradeKeyRequest>, JsonRejection>,
) -> Result<Json<UpgradeKeyResponse>, ApiError> {
    let Json(request) = payload?;

    let upgraded = state.key_manager.upgrade_plan(&key, &request.plan).await?;
    Ok(Json(UpgradeKeyResponse { upgraded }))
}
