// Router construction.
//
// | Method | Path             | Auth   |
// |--------|------------------|--------|
// | GET    | `/health`        | none   |
// | POST   | `/api/auth`      | none   |
// | GET    | `/api/info`      | bearer |
// | GET    | `/api/buy/:item` | bearer |
// | POST   | `/api/sendCoin`  | bearer |

use super::app_state::{AppState, Backend};
use super::handlers::{
    auth_handler, buy_handler, health_handler, info_handler, send_coin_handler,
};
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Builds the full router with tracing on every request.
pub fn create_router<S: Backend>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/auth", post(auth_handler::<S>))
        .route("/api/info", get(info_handler::<S>))
        .route("/api/buy/:item", get(buy_handler::<S>))
        .route("/api/sendCoin", post(send_coin_handler::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
