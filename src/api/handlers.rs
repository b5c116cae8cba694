// Route handlers. Each one validates its input, calls a core service and
// shapes the JSON reply.

use super::api_error::ApiError;
use super::app_state::{AppState, Backend};
use super::auth_gate::AuthUser;
use super::dto::{AuthRequest, AuthResponse, InfoResponse, SendCoinRequest};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

/// `GET /health` liveness probe.
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// `POST /api/auth`: log in, registering unseen usernames.
pub async fn auth_handler<S: Backend>(
    State(state): State<AppState<S>>,
    payload: Result<Json<AuthRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Json(request) = payload?;
    if request.username.is_empty() || request.password.is_empty() {
        return Err(ApiError::BadRequest(
            "username and password are required".to_string(),
        ));
    }

    let token = state.auth.login(&request.username, &request.password).await?;
    Ok(Json(AuthResponse { token }))
}

/// `GET /api/info`: balance, inventory and coin history of the caller.
pub async fn info_handler<S: Backend>(
    State(state): State<AppState<S>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<InfoResponse>, ApiError> {
    let info = state.shop.get_info(user_id).await?;
    Ok(Json(InfoResponse::from(info)))
}

/// `GET /api/buy/:item`
pub async fn buy_handler<S: Backend>(
    State(state): State<AppState<S>>,
    AuthUser(user_id): AuthUser,
    Path(item): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.shop.purchase(user_id, &item).await?;
    Ok(Json(json!({})))
}

/// `POST /api/sendCoin`
pub async fn send_coin_handler<S: Backend>(
    State(state): State<AppState<S>>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<SendCoinRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    if request.to_user.is_empty() {
        return Err(ApiError::BadRequest("toUser is required".to_string()));
    }
    if request.amount < 1 {
        return Err(ApiError::BadRequest(
            "amount must be a positive number of coins".to_string(),
        ));
    }

    state
        .shop
        .transfer(user_id, &request.to_user, request.amount)
        .await?;
    Ok(Json(json!({})))
}
