// This file provides an IN-MEMORY implementation of ShopStore and AccountStore.
//
// It honours the same atomicity contract as the SQLite store: a unit holds
// the state lock for its whole lifetime and works on a staged copy, which
// replaces the committed state on commit and is thrown away otherwise.

use crate::core::auth::{Account, AccountStore, AuthError};
use crate::core::shop::{
    CoinHistory, CoinTransaction, HistoryLine, InventoryEntry, ItemType, LedgerUnit,
    NewCoinTransaction, ShopError, ShopStore, UserId, UserInfo, UNKNOWN_COUNTERPART,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Data we store for each user.
#[derive(Clone, Debug)]
struct StoredUser {
    username: String,
    password_hash: String,
    coins: i64,
}

#[derive(Clone, Debug, Default)]
struct LedgerState {
    users: BTreeMap<UserId, StoredUser>,
    usernames: BTreeMap<String, UserId>,
    inventory: BTreeMap<(UserId, ItemType), i64>,
    transactions: Vec<CoinTransaction>,
    last_user_id: UserId,
}

impl LedgerState {
    fn username_of(&self, user_id: Option<UserId>) -> String {
        user_id
            .and_then(|id| self.users.get(&id))
            .map(|user| user.username.clone())
            .unwrap_or_else(|| UNKNOWN_COUNTERPART.to_string())
    }

    fn inventory_of(&self, user_id: UserId) -> Vec<InventoryEntry> {
        let mut entries: Vec<InventoryEntry> = self
            .inventory
            .iter()
            .filter(|((owner, _), quantity)| *owner == user_id && **quantity > 0)
            .map(|((_, item), quantity)| InventoryEntry {
                item: *item,
                quantity: *quantity,
            })
            .collect();

        // Same order as the SQLite store, which sorts on the stored name.
        entries.sort_by_key(|entry| entry.item.as_str());
        entries
    }

    fn history_of(&self, user_id: UserId) -> CoinHistory {
        let mut history = CoinHistory::default();

        for tx in &self.transactions {
            if tx.receiver == user_id {
                history.received.push(HistoryLine {
                    counterpart: self.username_of(tx.sender),
                    amount: tx.amount,
                });
            }
            if tx.sender == Some(user_id) {
                history.sent.push(HistoryLine {
                    counterpart: self.username_of(Some(tx.receiver)),
                    amount: tx.amount,
                });
            }
        }

        history
    }

    fn user_mut(&mut self, user_id: UserId) -> Result<&mut StoredUser, ShopError> {
        self.users
            .get_mut(&user_id)
            .ok_or(ShopError::UserNotFound(user_id))
    }
}

/// In-memory implementation of the shop and account stores.
///
/// Cheap to clone: clones share the same state.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the committed transaction log.
    #[cfg(test)]
    pub async fn transactions(&self) -> Vec<CoinTransaction> {
        self.state.lock().await.transactions.clone()
    }
}

/// A unit of work over a staged copy of the ledger.
struct InMemoryUnit {
    committed: OwnedMutexGuard<LedgerState>,
    staged: LedgerState,
}

#[async_trait]
impl ShopStore for InMemoryStore {
    async fn begin_unit(&self) -> Result<Box<dyn LedgerUnit>, ShopError> {
        let committed = Arc::clone(&self.state).lock_owned().await;
        let staged = committed.clone();
        Ok(Box::new(InMemoryUnit { committed, staged }))
    }

    async fn user_info(&self, user_id: UserId) -> Result<UserInfo, ShopError> {
        let state = self.state.lock().await;
        let coins = state
            .users
            .get(&user_id)
            .map(|user| user.coins)
            .ok_or(ShopError::UserNotFound(user_id))?;

        Ok(UserInfo {
            coins,
            inventory: state.inventory_of(user_id),
            history: state.history_of(user_id),
        })
    }
}

#[async_trait]
impl LedgerUnit for InMemoryUnit {
    async fn find_user_id(&mut self, username: &str) -> Result<Option<UserId>, ShopError> {
        Ok(self.staged.usernames.get(username).copied())
    }

    async fn get_balance(&mut self, user_id: UserId) -> Result<i64, ShopError> {
        Ok(self.staged.user_mut(user_id)?.coins)
    }

    async fn adjust_balance(&mut self, user_id: UserId, delta: i64) -> Result<(), ShopError> {
        let user = self.staged.user_mut(user_id)?;
        match user.coins.checked_add(delta) {
            Some(coins) if coins >= 0 => {
                user.coins = coins;
                Ok(())
            }
            _ => Err(ShopError::Conflict(format!(
                "balance of user {} cannot change by {}",
                user_id, delta
            ))),
        }
    }

    async fn upsert_inventory(
        &mut self,
        user_id: UserId,
        item: ItemType,
    ) -> Result<(), ShopError> {
        self.staged.user_mut(user_id)?;
        *self.staged.inventory.entry((user_id, item)).or_insert(0) += 1;
        Ok(())
    }

    async fn append_transaction(&mut self, record: NewCoinTransaction) -> Result<(), ShopError> {
        if record.amount <= 0 {
            return Err(ShopError::InvalidAmount(record.amount));
        }
        self.staged.user_mut(record.receiver)?;

        let id = self.staged.transactions.len() as i64 + 1;
        self.staged.transactions.push(CoinTransaction {
            id,
            sender: record.sender,
            receiver: record.receiver,
            amount: record.amount,
            timestamp: record.timestamp,
        });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), ShopError> {
        let InMemoryUnit {
            mut committed,
            staged,
        } = *self;
        *committed = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), ShopError> {
        Ok(())
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn find_account(&self, username: &str) -> Result<Option<Account>, AuthError> {
        let state = self.state.lock().await;
        Ok(state.usernames.get(username).and_then(|id| {
            state.users.get(id).map(|user| Account {
                id: *id,
                username: user.username.clone(),
                password_hash: user.password_hash.clone(),
            })
        }))
    }

    async fn create_account(
        &self,
        username: &str,
        password_hash: &str,
        starting_coins: i64,
    ) -> Result<UserId, AuthError> {
        let mut state = self.state.lock().await;
        if state.usernames.contains_key(username) {
            return Err(AuthError::UsernameTaken(username.to_string()));
        }

        state.last_user_id += 1;
        let id = state.last_user_id;
        state.users.insert(
            id,
            StoredUser {
                username: username.to_string(),
                password_hash: password_hash.to_string(),
                coins: starting_coins,
            },
        );
        state.usernames.insert(username.to_string(), id);
        Ok(id)
    }

    async fn account_exists(&self, user_id: UserId) -> Result<bool, AuthError> {
        Ok(self.state.lock().await.users.contains_key(&user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_uncommitted_unit_is_invisible() {
        let store = InMemoryStore::new();
        let alice = store.create_account("alice", "h", 100).await.unwrap();

        let mut unit = store.begin_unit().await.unwrap();
        unit.adjust_balance(alice, -40).await.unwrap();
        unit.upsert_inventory(alice, ItemType::Cup).await.unwrap();
        assert_eq!(unit.get_balance(alice).await.unwrap(), 60);
        unit.rollback().await.unwrap();

        assert_eq!(store.balance_of(alice).await.unwrap(), 100);
        assert!(store.inventory_for(alice).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_unit_is_rolled_back() {
        let store = InMemoryStore::new();
        let alice = store.create_account("alice", "h", 100).await.unwrap();

        {
            let mut unit = store.begin_unit().await.unwrap();
            unit.adjust_balance(alice, -100).await.unwrap();
        }

        assert_eq!(store.balance_of(alice).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_adjust_balance_refuses_overdraft() {
        let store = InMemoryStore::new();
        let alice = store.create_account("alice", "h", 10).await.unwrap();

        let mut unit = store.begin_unit().await.unwrap();
        assert!(matches!(
            unit.adjust_balance(alice, -11).await,
            Err(ShopError::Conflict(_))
        ));
        assert_eq!(
            unit.adjust_balance(77, 5).await,
            Err(ShopError::UserNotFound(77))
        );
        unit.commit().await.unwrap();

        assert_eq!(store.balance_of(alice).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_commit_publishes_all_writes() {
        let store = InMemoryStore::new();
        let alice = store.create_account("alice", "h", 100).await.unwrap();
        let bob = store.create_account("bob", "h", 0).await.unwrap();

        let mut unit = store.begin_unit().await.unwrap();
        assert_eq!(unit.find_user_id("bob").await.unwrap(), Some(bob));
        assert_eq!(unit.find_user_id("nobody").await.unwrap(), None);
        unit.adjust_balance(bob, 30).await.unwrap();
        unit.adjust_balance(alice, -30).await.unwrap();
        unit.append_transaction(NewCoinTransaction {
            sender: Some(alice),
            receiver: bob,
            amount: 30,
            timestamp: Utc::now(),
        })
        .await
        .unwrap();
        unit.commit().await.unwrap();

        assert_eq!(store.balance_of(alice).await.unwrap(), 70);
        assert_eq!(store.balance_of(bob).await.unwrap(), 30);
        let log = store.transactions().await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].id, 1);
    }

    #[tokio::test]
    async fn test_inventory_sorted_by_name() {
        let store = InMemoryStore::new();
        let alice = store.create_account("alice", "h", 0).await.unwrap();

        let mut unit = store.begin_unit().await.unwrap();
        unit.upsert_inventory(alice, ItemType::Umbrella).await.unwrap();
        unit.upsert_inventory(alice, ItemType::Book).await.unwrap();
        unit.upsert_inventory(alice, ItemType::Umbrella).await.unwrap();
        unit.commit().await.unwrap();

        let inventory = store.inventory_for(alice).await.unwrap();
        assert_eq!(
            inventory,
            vec![
                InventoryEntry {
                    item: ItemType::Book,
                    quantity: 1
                },
                InventoryEntry {
                    item: ItemType::Umbrella,
                    quantity: 2
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_user_info_reads_one_snapshot() {
        let store = InMemoryStore::new();
        let alice = store.create_account("alice", "h", 100).await.unwrap();
        let bob = store.create_account("bob", "h", 0).await.unwrap();

        let mut unit = store.begin_unit().await.unwrap();
        unit.adjust_balance(alice, -20).await.unwrap();
        unit.upsert_inventory(alice, ItemType::Cup).await.unwrap();
        unit.commit().await.unwrap();

        let info = store.user_info(alice).await.unwrap();
        assert_eq!(info.coins, 80);
        assert_eq!(
            info.inventory,
            vec![InventoryEntry {
                item: ItemType::Cup,
                quantity: 1
            }]
        );
        assert_eq!(info.history, CoinHistory::default());

        assert_eq!(
            store.user_info(bob + 1).await.unwrap_err(),
            ShopError::UserNotFound(bob + 1)
        );
    }

    #[tokio::test]
    async fn test_duplicate_username() {
        let store = InMemoryStore::new();
        store.create_account("alice", "h", 0).await.unwrap();

        assert_eq!(
            store.create_account("alice", "h2", 0).await,
            Err(AuthError::UsernameTaken("alice".to_string()))
        );
        assert!(store.account_exists(1).await.unwrap());
        assert!(!store.account_exists(2).await.unwrap());
    }
}
