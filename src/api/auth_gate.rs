// Access-control gate: resolves the bearer token on a request to a user id.

use super::api_error::ApiError;
use super::app_state::{AppState, Backend};
use crate::core::auth::extract_bearer_token;
use crate::core::shop::UserId;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

/// The authenticated caller. Extracting it rejects the request with 401 when
/// the `Authorization: Bearer <token>` header is missing or does not resolve.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub UserId);

#[async_trait]
impl<S: Backend> FromRequestParts<AppState<S>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<S>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

        let token = extract_bearer_token(header)
            .ok_or_else(|| ApiError::Unauthorized("Malformed authorization header".to_string()))?;

        let user_id = state.auth.resolve_identity(token).await?;
        Ok(AuthUser(user_id))
    }
}
