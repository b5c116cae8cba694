// Storage ports for the coin shop.
//
// The core defines WHAT it needs from storage; `infra/` provides the SQLite
// and in-memory implementations. Every balance mutation happens inside a
// `LedgerUnit`, which is the atomic unit of work: it either commits as a whole
// or leaves no trace.

use super::catalog::ItemType;
use super::shop_models::{NewCoinTransaction, UserId, UserInfo};
#[cfg(test)]
use super::shop_models::{CoinHistory, InventoryEntry};
use async_trait::async_trait;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShopError {
    #[error("User {0} not found")]
    UserNotFound(UserId),

    #[error("Unknown item: {0}")]
    UnknownItem(String),

    #[error("Unknown recipient: {0}")]
    UnknownRecipient(String),

    #[error("Insufficient funds: need {required} coins, but only have {available}")]
    InsufficientFunds { required: i64, available: i64 },

    #[error("Amount must be positive, got {0}")]
    InvalidAmount(i64),

    #[error("Sending coins to yourself is not allowed")]
    SelfTransfer,

    /// The atomic unit could not be applied as a whole (e.g. a guarded write
    /// matched no row, or the commit itself failed).
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    Storage(String),
}

impl ShopError {
    /// Whether the error is a business-rule rejection rather than a fault.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, ShopError::Conflict(_) | ShopError::Storage(_))
    }
}

// ============================================================================
// STORAGE TRAITS (PORTS)
// ============================================================================

/// Read access to the shop data plus the ability to open an atomic unit.
#[async_trait]
pub trait ShopStore: Send + Sync {
    /// Open a new atomic unit. While it is open no other unit can observe or
    /// interleave with its reads and writes.
    async fn begin_unit(&self) -> Result<Box<dyn LedgerUnit>, ShopError>;

    /// Balance, inventory and history of a user, read from one consistent
    /// snapshot of committed state. Fails with `UserNotFound` if absent.
    ///
    /// Inventory has one entry per owned item type, ordered by item type.
    /// History is oldest first; a counterpart that no longer resolves shows
    /// as `UNKNOWN_COUNTERPART`.
    async fn user_info(&self, user_id: UserId) -> Result<UserInfo, ShopError>;

    #[cfg(test)]
    async fn balance_of(&self, user_id: UserId) -> Result<i64, ShopError> {
        Ok(self.user_info(user_id).await?.coins)
    }

    #[cfg(test)]
    async fn inventory_for(&self, user_id: UserId) -> Result<Vec<InventoryEntry>, ShopError> {
        Ok(self.user_info(user_id).await?.inventory)
    }

    #[cfg(test)]
    async fn history_for(&self, user_id: UserId) -> Result<CoinHistory, ShopError> {
        Ok(self.user_info(user_id).await?.history)
    }
}

/// The ledger, inventory and transaction-log contracts, scoped to one
/// atomic unit. Nothing written through a unit is visible to anyone else
/// until `commit` succeeds; `rollback` (or dropping the unit) discards it.
#[async_trait]
pub trait LedgerUnit: Send {
    /// Resolve a username to its user id.
    async fn find_user_id(&mut self, username: &str) -> Result<Option<UserId>, ShopError>;

    /// Current balance as seen by this unit. Fails with `UserNotFound`.
    async fn get_balance(&mut self, user_id: UserId) -> Result<i64, ShopError>;

    /// Add `delta` (possibly negative) to a balance. Must refuse to take a
    /// balance below zero.
    async fn adjust_balance(&mut self, user_id: UserId, delta: i64) -> Result<(), ShopError>;

    /// Increment the (user, item) quantity, creating it at 1 when absent.
    async fn upsert_inventory(&mut self, user_id: UserId, item: ItemType)
        -> Result<(), ShopError>;

    /// Append to the transaction log. Never touches existing rows.
    async fn append_transaction(&mut self, record: NewCoinTransaction) -> Result<(), ShopError>;

    /// Make every write of this unit visible at once.
    async fn commit(self: Box<Self>) -> Result<(), ShopError>;

    /// Discard every write of this unit.
    async fn rollback(self: Box<Self>) -> Result<(), ShopError>;
}
