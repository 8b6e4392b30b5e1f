//! HTTP error types for `selfpass` server.
//!
//! Maps domain errors from `selfpass-core` and `selfpass-storage` into HTTP
//! responses. Every error variant produces a JSON body with a
//! machine-readable `error` field and a human-readable `message`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use selfpass_core::error::{ConfigError, ValueError};
use selfpass_storage::StorageError;

/// Application-level error returned from filters and handlers.
#[derive(Debug)]
pub enum AppError {
    /// Authentication failed.
    Unauthorized(String),
    /// The caller may not perform the operation.
    Forbidden(String),
    /// Requested resource not found.
    NotFound(String),
    /// Client sent invalid input.
    BadRequest(String),
    /// The operation conflicts with the current state.
    Conflict(String),
    /// The request URI exceeds the accepted length.
    UriTooLong,
    /// A session verification token arrived without a session cookie.
    CookiesRequired,
    /// Too many failed attempts from this address.
    IntruderLockout,
    /// The application could not load its configuration.
    ApplicationUnavailable(String),
    /// Internal server error.
    Internal(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl AppError {
    /// Machine-readable error code used in the response body.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Conflict(_) => "conflict",
            Self::UriTooLong => "uri_too_long",
            Self::CookiesRequired => "cookies_required",
            Self::IntruderLockout => "intruder_lockout",
            Self::ApplicationUnavailable(_) => "application_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let error = self.code();
        let (status, message) = match self {
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::UriTooLong => (
                StatusCode::URI_TOO_LONG,
                "request uri is too long".to_owned(),
            ),
            Self::CookiesRequired => (
                StatusCode::BAD_REQUEST,
                "cookies must be enabled to use this site".to_owned(),
            ),
            Self::IntruderLockout => (
                StatusCode::FORBIDDEN,
                "too many failed attempts, try again later".to_owned(),
            ),
            Self::ApplicationUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = ErrorBody { error, message };

        (status, axum::Json(body)).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Locked => Self::Conflict(err.to_string()),
            ConfigError::UnknownSetting { .. } => Self::NotFound(err.to_string()),
            ConfigError::InvalidValue { .. } | ConfigError::InvalidDocument { .. } => {
                Self::BadRequest(err.to_string())
            }
            ConfigError::Value(inner) => inner.into(),
            ConfigError::Xml(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<ValueError> for AppError {
    fn from(err: ValueError) -> Self {
        match err {
            ValueError::ConfigFormat { .. }
            | ValueError::Malformed { .. }
            | ValueError::TypeMismatch { .. } => Self::BadRequest(err.to_string()),
            ValueError::Encoder(_) | ValueError::Xml(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn body_carries_code_and_message() {
        let response = AppError::IntruderLockout.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "intruder_lockout");
        assert!(body["message"].as_str().unwrap().contains("failed attempts"));
    }

    #[test]
    fn config_errors_map_to_status() {
        let locked: AppError = ConfigError::Locked.into();
        assert_eq!(locked.code(), "conflict");
        let invalid: AppError = ConfigError::InvalidValue {
            key: "idleTimeoutSeconds".to_owned(),
            errors: vec!["too small".to_owned()],
        }
        .into();
        assert_eq!(invalid.code(), "bad_request");
    }
}
