// Auth module - credentials, bearer tokens and identity resolution

mod auth_service;
pub mod password;
pub mod token;

pub use auth_service::{Account, AccountStore, AuthConfig, AuthError, AuthService};
pub use token::{extract_bearer_token, TokenIssuer};
