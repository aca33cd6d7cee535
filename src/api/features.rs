//! Metered feature endpoints
//!
//! Each route sits behind the access gate and forwards its JSON body to the
//! upstream service configured for the feature.

use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use tracing::warn;

use crate::api::state::AppState;
use crate::api::types::ApiError;
use crate::domain::plan::Feature;
use crate::infrastructure::api_key::Admission;

/// Route path and the feature it meters
pub const FEATURE_ROUTES: [(&str, Feature); 6] = [
    ("/api/generate-lyrics", Feature::LyricGenerations),
    ("/api/generate-music", Feature::MusicGenerations),
    ("/api/translate-code", Feature::CodeTranslations),
    ("/api/scan-vulnerabilities", Feature::VulnerabilityScans),
    ("/api/codebeat", Feature::CodebeatGenerations),
    ("/api/generate-text", Feature::TextGenerations),
];

/// POST on any metered route
pub async fn forward_feature(
    State(state): State<AppState>,
    Extension(admission): Extension<Admission>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(body) = payload?;

    let response = state
        .upstream
        .forward(admission.feature, body)
        .await
        .inspect_err(|e| {
            warn!(
                key = %admission.key.redacted(),
                feature = %admission.feature,
                error = %e,
                "Upstream call failed"
            );
        })?;

    Ok(Json(response))
}
