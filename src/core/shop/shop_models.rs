// Domain models for the coin shop.
//
// Plain data only: no storage or HTTP types leak in here, so the same models
// serve the SQLite store, the in-memory store and the API layer.

use super::catalog::ItemType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a registered user (the storage row id).
pub type UserId = i64;

/// Placeholder shown in history when the counterpart user no longer resolves.
pub const UNKNOWN_COUNTERPART: &str = "Unknown";

/// How many items of one type a user owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub item: ItemType,
    pub quantity: i64,
}

/// An immutable record of coins moving between users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinTransaction {
    pub id: i64,
    /// `None` for coins that did not originate from another user.
    pub sender: Option<UserId>,
    pub receiver: UserId,
    pub amount: i64,
    pub timestamp: DateTime<Utc>,
}

/// A transaction about to be appended to the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCoinTransaction {
    pub sender: Option<UserId>,
    pub receiver: UserId,
    pub amount: i64,
    pub timestamp: DateTime<Utc>,
}

/// One line of a user's history: who the coins came from or went to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryLine {
    pub counterpart: String,
    pub amount: i64,
}

/// Transfer history projected from the transaction log for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoinHistory {
    pub received: Vec<HistoryLine>,
    pub sent: Vec<HistoryLine>,
}

/// Everything `get_info` reports about a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub coins: i64,
    pub inventory: Vec<InventoryEntry>,
    pub history: CoinHistory,
}

/// Result of a successful purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseReceipt {
    pub item: ItemType,
    pub price: i64,
    pub new_balance: i64,
}

/// Result of a successful transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub receiver: UserId,
    pub amount: i64,
    pub sender_balance: i64,
}
