// Shop module - ledger, inventory and transaction-log rules for the coin shop

pub mod catalog;
pub mod shop_models;
mod shop_service;
mod shop_store;

pub use catalog::ItemType;
pub use shop_models::{
    CoinHistory, CoinTransaction, HistoryLine, InventoryEntry, NewCoinTransaction, UserId,
    UserInfo, UNKNOWN_COUNTERPART,
};
pub use shop_service::{ShopConfig, ShopService};
pub use shop_store::{LedgerUnit, ShopError, ShopStore};
