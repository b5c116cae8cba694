// Error-to-response mapping for the HTTP layer.

use crate::core::auth::AuthError;
use crate::core::shop::ShopError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};

const INTERNAL_MESSAGE: &str = "Internal server error";

/// Error body shape: `{"errors": "<message>"}`.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    errors: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ApiError {
    /// 400: malformed input or a business-rule rejection.
    BadRequest(String),
    /// 401: missing, invalid or expired credentials.
    Unauthorized(String),
    /// 500: detail is logged, never returned.
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                INTERNAL_MESSAGE.to_string(),
            ),
        };

        (status, Json(ErrorResponse { errors: message })).into_response()
    }
}

impl From<ShopError> for ApiError {
    fn from(err: ShopError) -> Self {
        if err.is_rejection() {
            warn!(error = %err, "Shop request rejected");
            ApiError::BadRequest(err.to_string())
        } else {
            error!(error = %err, "Shop operation failed");
            ApiError::Internal
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => ApiError::Unauthorized(err.to_string()),
            AuthError::InvalidToken(_) => {
                ApiError::Unauthorized("Invalid or expired token".to_string())
            }
            AuthError::UsernameTaken(_) => ApiError::BadRequest(err.to_string()),
            AuthError::Storage(_) | AuthError::Internal(_) => {
                error!(error = %err, "Auth operation failed");
                ApiError::Internal
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
