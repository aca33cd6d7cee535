//! HTTP error body and status mapping

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;
use crate::infrastructure::api_key::GateRejection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorType {
    InvalidRequestError,
    AuthenticationError,
    PermissionError,
    NotFoundError,
    RateLimitError,
    ServerError,
    ServiceUnavailableError,
}

impl std::fmt::Display for ApiErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::InvalidRequestError => "invalid_request_error",
            Self::AuthenticationError => "authentication_error",
            Self::PermissionError => "permission_error",
            Self::NotFoundError => "not_found_error",
            Self::RateLimitError => "rate_limit_error",
            Self::ServerError => "server_error",
            Self::ServiceUnavailableError => "service_unavailable_error",
        };
        f.write_str(name)
    }
}

/// Body of every error response: `{"error": {...}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: ApiErrorType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Counter value at the time a quota was hit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_usage: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

/// API error with status code
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub response: ApiErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, error_type: ApiErrorType, message: impl Into<String>) -> Self {
        Self {
            status,
            response: ApiErrorResponse {
                error: ApiErrorDetail {
                    message: message.into(),
                    error_type,
                    code: None,
                    current_usage: None,
                    limit: None,
                },
            },
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.response.error.code = Some(code.into());
        self
    }

    /// Attach the counter and limit of an exhausted quota
    pub fn with_usage(mut self, current_usage: u64, limit: u64) -> Self {
        self.response.error.current_usage = Some(current_usage);
        self.response.error.limit = Some(limit);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ApiErrorType::InvalidRequestError, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, ApiErrorType::AuthenticationError, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, ApiErrorType::PermissionError, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, ApiErrorType::NotFoundError, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, ApiErrorType::RateLimitError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, ApiErrorType::ServerError, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorType::ServiceUnavailableError,
            message,
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.response)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match &err {
            DomainError::NotFound { message } => Self::not_found(message),
            DomainError::Validation { message } => Self::bad_request(message),
            DomainError::UnknownPlan { .. } => {
                Self::bad_request(err.to_string()).with_code("unknown_plan")
            }
            DomainError::Upstream { .. } => Self::unavailable(err.to_string()),
            DomainError::Storage { message } => {
                Self::internal(message).with_code("storage_unavailable")
            }
            DomainError::Configuration { message } | DomainError::Internal { message } => {
                Self::internal(message)
            }
        }
    }
}

impl From<GateRejection> for ApiError {
    fn from(rejection: GateRejection) -> Self {
        match rejection {
            GateRejection::AuthRequired => {
                Self::unauthorized(rejection.to_string()).with_code("auth_required")
            }
            GateRejection::AuthInvalid => {
                Self::unauthorized(rejection.to_string()).with_code("auth_invalid")
            }
            GateRejection::RateLimited {
                current_usage,
                limit,
                ..
            } => Self::rate_limited(rejection.to_string())
                .with_code("rate_limited")
                .with_usage(current_usage, limit),
            GateRejection::Domain(err) => err.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}",
            self.response.error.error_type, self.response.error.message
        )
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::plan::Feature;

    #[test]
    fn test_domain_error_statuses() {
        let cases = [
            (DomainError::not_found("gone"), StatusCode::NOT_FOUND),
            (DomainError::validation("bad"), StatusCode::BAD_REQUEST),
            (DomainError::unknown_plan("gold"), StatusCode::BAD_REQUEST),
            (DomainError::storage("disk full"), StatusCode::INTERNAL_SERVER_ERROR),
            (
                DomainError::upstream("music_generations", "timeout"),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (DomainError::internal("boom"), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn test_unknown_plan_code() {
        let err = ApiError::from(DomainError::unknown_plan("gold"));
        assert_eq!(err.response.error.code.as_deref(), Some("unknown_plan"));
        assert!(err.response.error.message.contains("gold"));
    }

    #[test]
    fn test_rate_limited_body() {
        let err = ApiError::from(GateRejection::RateLimited {
            feature: Feature::CodeTranslations,
            current_usage: 5,
            limit: 5,
        });

        assert_eq!(err.status, StatusCode::TOO_MANY_REQUESTS);
        let json = serde_json::to_value(&err.response).unwrap();
        assert_eq!(json["error"]["type"], "rate_limit_error");
        assert_eq!(json["error"]["current_usage"], 5);
        assert_eq!(json["error"]["limit"], 5);
    }

    #[test]
    fn test_auth_rejections() {
        let required = ApiError::from(GateRejection::AuthRequired);
        let invalid = ApiError::from(GateRejection::AuthInvalid);

        assert_eq!(required.status, StatusCode::UNAUTHORIZED);
        assert_eq!(invalid.status, StatusCode::UNAUTHORIZED);
        assert_eq!(required.response.error.code.as_deref(), Some("auth_required"));

        let json = serde_json::to_string(&invalid.response).unwrap();
        assert!(!json.contains("current_usage"));
    }
}
