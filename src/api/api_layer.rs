// HTTP layer - axum router, access-control gate and JSON handlers.
//
// Handlers only translate between JSON and the core services. Every shop
// route resolves the caller through the `AuthUser` extractor first.

#[path = "api_error.rs"]
mod api_error;
#[path = "app_state.rs"]
mod app_state;
#[path = "auth_gate.rs"]
mod auth_gate;
#[path = "dto.rs"]
mod dto;
#[path = "handlers.rs"]
mod handlers;
#[path = "routes.rs"]
mod routes;

pub use app_state::{AppState, Backend};
pub use routes::create_router;
