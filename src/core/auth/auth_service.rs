// Authentication core - login-or-register and identity resolution
//
// This is the access-control gate behind the HTTP layer: it turns a
// username/password into a bearer token, and a bearer token back into a user
// id. The shop operations only ever see the resolved id.

use super::password::{hash_password, verify_password};
use super::token::TokenIssuer;
use crate::core::shop::UserId;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

// ============================================================================
// DOMAIN MODELS
// ============================================================================

/// A registered account as the auth layer sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Username already taken: {0}")]
    UsernameTaken(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// ============================================================================
// STORAGE TRAIT
// ============================================================================

/// Trait for persisting accounts.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Look up an account by its unique username.
    async fn find_account(&self, username: &str) -> Result<Option<Account>, AuthError>;

    /// Insert a new account with an opening balance.
    /// Fails with `UsernameTaken` if the name is already registered.
    async fn create_account(
        &self,
        username: &str,
        password_hash: &str,
        starting_coins: i64,
    ) -> Result<UserId, AuthError>;

    /// Whether an account with this id exists.
    async fn account_exists(&self, user_id: UserId) -> Result<bool, AuthError>;
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the auth service.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Coins credited to a freshly registered account.
    pub starting_coins: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            starting_coins: 1000,
        }
    }
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct AuthService<S: AccountStore> {
    store: S,
    tokens: TokenIssuer,
    config: AuthConfig,
}

impl<S: AccountStore> AuthService<S> {
    pub fn new(store: S, tokens: TokenIssuer, config: AuthConfig) -> Self {
        Self {
            store,
            tokens,
            config,
        }
    }

    /// Log in, registering the user first if the username is unseen.
    ///
    /// Returns a bearer token on success.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, AuthError> {
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let user_id = match self.store.find_account(username).await? {
            Some(account) => check_password(&account, password)?,
            None => self.register(username, password).await?,
        };

        debug!(user_id, "Issuing token");
        self.tokens.issue(user_id)
    }

    /// Resolve a bearer token to the user it was issued for.
    pub async fn resolve_identity(&self, token: &str) -> Result<UserId, AuthError> {
        let claims = self.tokens.validate(token)?;

        if !self.store.account_exists(claims.user_id).await? {
            return Err(AuthError::InvalidToken(format!(
                "user {} no longer exists",
                claims.user_id
            )));
        }

        Ok(claims.user_id)
    }

    async fn register(&self, username: &str, password: &str) -> Result<UserId, AuthError> {
        let password_hash = hash_password(password)?;

        match self
            .store
            .create_account(username, &password_hash, self.config.starting_coins)
            .await
        {
            Ok(user_id) => {
                info!(user_id, username, "Registered new user");
                Ok(user_id)
            }
            // Someone registered the same name between our lookup and insert;
            // their row wins and this becomes a normal login.
            Err(AuthError::UsernameTaken(_)) => {
                let account = self
                    .store
                    .find_account(username)
                    .await?
                    .ok_or(AuthError::InvalidCredentials)?;
                check_password(&account, password)
            }
            Err(err) => Err(err),
        }
    }
}

fn check_password(account: &Account, password: &str) -> Result<UserId, AuthError> {
    if verify_password(password, &account.password_hash) {
        Ok(account.id)
    } else {
        Err(AuthError::InvalidCredentials)
    }
}

// ============================================================================
// TESTS
// ============================================================================
