//! Access gate middleware for metered routes
//!
//! The key is taken from `X-API-Key`, then `Authorization: Bearer <key>`,
//! then the `apiKey` field of a JSON body. Admitted requests carry their
//! [`Admission`] as a request extension and are settled once the handler
//! has produced a response; only 2xx responses consume quota.

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::api::types::ApiError;
use crate::domain::plan::Feature;
use crate::infrastructure::api_key::AccessGate;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const API_KEY_BODY_FIELD: &str = "apiKey";

/// Largest body buffered while looking for `apiKey`
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Per-route state: the gate and the feature the route meters
#[derive(Debug, Clone)]
pub struct GateLayerState {
    pub gate: AccessGate,
    pub feature: Feature,
}

impl GateLayerState {
    pub fn new(gate: AccessGate, feature: Feature) -> Self {
        Self { gate, feature }
    }
}

pub async fn access_gate_middleware(
    State(layer): State<GateLayerState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| ApiError::bad_request("Request body is too large or unreadable"))?;

    let key = extract_api_key_from_headers(&parts.headers)
        .or_else(|| extract_api_key_from_body(&bytes));

    let admission = layer.gate.admit(key.as_deref(), layer.feature).await?;
    debug!(
        key = %admission.key.redacted(),
        feature = %admission.feature,
        outcome = admission.decision.outcome(),
        "Request admitted"
    );

    let mut request = Request::from_parts(parts, Body::from(bytes));
    request.extensions_mut().insert(admission.clone());

    let response = next.run(request).await;
    layer
        .gate
        .settle_logged(&admission, response.status().is_success())
        .await;

    Ok(response)
}

/// Key from `X-API-Key` or a bearer token; unreadable headers count as absent
pub fn extract_api_key_from_headers(headers: &HeaderMap) -> Option<String> {
    let from_api_key_header = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let from_bearer = || {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    from_api_key_header.or_else(from_bearer).map(str::to_string)
}

/// Key from the `apiKey` field of a JSON object body
pub fn extract_api_key_from_body(body: &Bytes) -> Option<String> {
    if body.is_empty() {
        return None;
    }

    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value
        .get(API_KEY_BODY_FIELD)?
        .as_str()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
