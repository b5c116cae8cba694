// Shared state handed to every request handler.

use crate::core::auth::{AccountStore, AuthService};
use crate::core::shop::{ShopService, ShopStore};
use std::sync::Arc;

/// A storage engine that can back the whole HTTP surface.
pub trait Backend: ShopStore + AccountStore + Clone + 'static {}

impl<T> Backend for T where T: ShopStore + AccountStore + Clone + 'static {}

/// Application state available to all handlers.
///
/// Cheap to clone, both services sit behind `Arc`.
pub struct AppState<S: Backend> {
    pub shop: Arc<ShopService<S>>,
    pub auth: Arc<AuthService<S>>,
}

impl<S: Backend> AppState<S> {
    pub fn new(shop: ShopService<S>, auth: AuthService<S>) -> Self {
        Self {
            shop: Arc::new(shop),
            auth: Arc::new(auth),
        }
    }
}

impl<S: Backend> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            shop: Arc::clone(&self.shop),
            auth: Arc::clone(&self.auth),
        }
    }
}
