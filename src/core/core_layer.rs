// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "auth/mod.rs"]
pub mod auth;

#[path = "shop/mod.rs"]
pub mod shop;
