// SQLite implementation of the ShopStore and AccountStore traits

use crate::core::auth::{Account, AccountStore, AuthError};
use crate::core::shop::{
    CoinHistory, HistoryLine, InventoryEntry, ItemType, LedgerUnit, NewCoinTransaction,
    ShopError, ShopStore, UserId, UserInfo, UNKNOWN_COUNTERPART,
};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions};
use sqlx::{Row, Sqlite, Transaction};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

const MEMORY_DATABASE: &str = ":memory:";

/// SQLite-backed store.
///
/// SQLite allows one writer at a time, so every atomic unit first takes the
/// store's writer gate and only then opens its transaction. All statements of
/// the unit run on that transaction.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    writer: Arc<Mutex<()>>,
}

impl SqliteStore {
    /// Create a new SQLite store at the given database path.
    /// `:memory:` gives a private in-memory database.
    pub async fn new(database_path: &str) -> anyhow::Result<Self> {
        let pool = if database_path == MEMORY_DATABASE {
            // Every connection to :memory: is its own database, so keep
            // exactly one and never recycle it.
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await?
        } else {
            if let Some(parent) = Path::new(database_path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect(&format!("sqlite://{}?mode=rwc", database_path))
                .await?
        };

        let store = Self {
            pool,
            writer: Arc::new(Mutex::new(())),
        };
        store.migrate().await?;
        Ok(store)
    }

    /// Run database migrations to create tables.
    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                coins INTEGER NOT NULL DEFAULT 1000 CHECK (coins >= 0),
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS inventory (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                item_type TEXT NOT NULL,
                quantity INTEGER NOT NULL DEFAULT 0 CHECK (quantity >= 0),
                UNIQUE (user_id, item_type)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS coin_transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sender_id INTEGER REFERENCES users(id),
                receiver_id INTEGER NOT NULL REFERENCES users(id),
                amount INTEGER NOT NULL CHECK (amount > 0),
                timestamp TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_coin_transactions_sender ON coin_transactions(sender_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_coin_transactions_receiver ON coin_transactions(receiver_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// An open SQLite transaction plus the writer gate it was opened under.
struct SqliteUnit {
    tx: Transaction<'static, Sqlite>,
    _writer: OwnedMutexGuard<()>,
}

#[async_trait]
impl ShopStore for SqliteStore {
    async fn begin_unit(&self) -> Result<Box<dyn LedgerUnit>, ShopError> {
        let writer = Arc::clone(&self.writer).lock_owned().await;
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ShopError::Storage(e.to_string()))?;

        Ok(Box::new(SqliteUnit {
            tx,
            _writer: writer,
        }))
    }

    async fn user_info(&self, user_id: UserId) -> Result<UserInfo, ShopError> {
        // One read transaction so balance, inventory and history agree.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ShopError::Storage(e.to_string()))?;

        let coins = read_balance(&mut tx, user_id).await?;
        let inventory = read_inventory(&mut tx, user_id).await?;
        let history = read_history(&mut tx, user_id).await?;

        tx.commit()
            .await
            .map_err(|e| ShopError::Storage(e.to_string()))?;

        Ok(UserInfo {
            coins,
            inventory,
            history,
        })
    }
}

async fn read_balance(conn: &mut SqliteConnection, user_id: UserId) -> Result<i64, ShopError> {
    let row = sqlx::query("SELECT coins FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| ShopError::Storage(e.to_string()))?;

    row.map(|row| row.get::<i64, _>("coins"))
        .ok_or(ShopError::UserNotFound(user_id))
}

async fn read_inventory(
    conn: &mut SqliteConnection,
    user_id: UserId,
) -> Result<Vec<InventoryEntry>, ShopError> {
    let rows = sqlx::query(
        r#"
        SELECT item_type, quantity
        FROM inventory
        WHERE user_id = ? AND quantity > 0
        ORDER BY item_type
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| ShopError::Storage(e.to_string()))?;

    let entries = rows
        .iter()
        .filter_map(|row| {
            let item_type: String = row.get("item_type");
            let item = ItemType::parse(&item_type)?;

            Some(InventoryEntry {
                item,
                quantity: row.get::<i64, _>("quantity"),
            })
        })
        .collect();

    Ok(entries)
}

async fn read_history(
    conn: &mut SqliteConnection,
    user_id: UserId,
) -> Result<CoinHistory, ShopError> {
    let received = history_lines(
        &mut *conn,
        r#"
        SELECT ct.amount, COALESCE(u.username, ?) AS counterpart
        FROM coin_transactions ct
        LEFT JOIN users u ON ct.sender_id = u.id
        WHERE ct.receiver_id = ?
        ORDER BY ct.id
        "#,
        user_id,
    )
    .await?;

    let sent = history_lines(
        &mut *conn,
        r#"
        SELECT ct.amount, COALESCE(u.username, ?) AS counterpart
        FROM coin_transactions ct
        LEFT JOIN users u ON ct.receiver_id = u.id
        WHERE ct.sender_id = ?
        ORDER BY ct.id
        "#,
        user_id,
    )
    .await?;

    Ok(CoinHistory { received, sent })
}

async fn history_lines(
    conn: &mut SqliteConnection,
    query: &str,
    user_id: UserId,
) -> Result<Vec<HistoryLine>, ShopError> {
    let rows = sqlx::query(query)
        .bind(UNKNOWN_COUNTERPART)
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| ShopError::Storage(e.to_string()))?;

    Ok(rows
        .iter()
        .map(|row| HistoryLine {
            counterpart: row.get::<String, _>("counterpart"),
            amount: row.get::<i64, _>("amount"),
        })
        .collect())
}

#[async_trait]
impl LedgerUnit for SqliteUnit {
    async fn find_user_id(&mut self, username: &str) -> Result<Option<UserId>, ShopError> {
        let row = sqlx::query("SELECT id FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| ShopError::Storage(e.to_string()))?;

        Ok(row.map(|row| row.get::<i64, _>("id")))
    }

    async fn get_balance(&mut self, user_id: UserId) -> Result<i64, ShopError> {
        read_balance(&mut self.tx, user_id).await
    }

    async fn adjust_balance(&mut self, user_id: UserId, delta: i64) -> Result<(), ShopError> {
        // The balance guard is re-checked by the UPDATE itself.
        let result = sqlx::query(
            r#"
            UPDATE users
            SET coins = coins + ?
            WHERE id = ? AND coins + ? >= 0
            "#,
        )
        .bind(delta)
        .bind(user_id)
        .bind(delta)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| ShopError::Storage(e.to_string()))?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        // Nothing matched: either the user is gone or the guard refused.
        self.get_balance(user_id).await?;
        Err(ShopError::Conflict(format!(
            "balance of user {} cannot change by {}",
            user_id, delta
        )))
    }

    async fn upsert_inventory(
        &mut self,
        user_id: UserId,
        item: ItemType,
    ) -> Result<(), ShopError> {
        sqlx::query(
            r#"
            INSERT INTO inventory (user_id, item_type, quantity)
            VALUES (?, ?, 1)
            ON CONFLICT(user_id, item_type) DO UPDATE SET
                quantity = quantity + 1
            "#,
        )
        .bind(user_id)
        .bind(item.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| ShopError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn append_transaction(&mut self, record: NewCoinTransaction) -> Result<(), ShopError> {
        sqlx::query(
            r#"
            INSERT INTO coin_transactions (sender_id, receiver_id, amount, timestamp)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(record.sender)
        .bind(record.receiver)
        .bind(record.amount)
        .bind(record.timestamp.to_rfc3339())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| ShopError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), ShopError> {
        let SqliteUnit { tx, _writer } = *self;
        tx.commit()
            .await
            .map_err(|e| ShopError::Conflict(e.to_string()))
    }

    async fn rollback(self: Box<Self>) -> Result<(), ShopError> {
        let SqliteUnit { tx, _writer } = *self;
        debug!("Rolling back SQLite transaction");
        tx.rollback()
            .await
            .map_err(|e| ShopError::Storage(e.to_string()))
    }
}

#[async_trait]
impl AccountStore for SqliteStore {
    async fn find_account(&self, username: &str) -> Result<Option<Account>, AuthError> {
        let row = sqlx::query("SELECT id, username, password_hash FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;

        Ok(row.map(|row| Account {
            id: row.get::<i64, _>("id"),
            username: row.get::<String, _>("username"),
            password_hash: row.get::<String, _>("password_hash"),
        }))
    }

    async fn create_account(
        &self,
        username: &str,
        password_hash: &str,
        starting_coins: i64,
    ) -> Result<UserId, AuthError> {
        let _writer = self.writer.lock().await;

        let result = sqlx::query(
            r#"
            INSERT INTO users (username, password_hash, coins)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(username)
        .bind(password_hash)
        .bind(starting_coins)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AuthError::UsernameTaken(username.to_string())
            }
            _ => AuthError::Storage(e.to_string()),
        })?;

        Ok(result.last_insert_rowid())
    }

    async fn account_exists(&self, user_id: UserId) -> Result<bool, AuthError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;

        Ok(row.get::<i64, _>("count") == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shop::{ShopConfig, ShopService};
    use chrono::Utc;

    async fn memory_store() -> SqliteStore {
        SqliteStore::new(MEMORY_DATABASE).await.unwrap()
    }

    fn service(store: &SqliteStore) -> ShopService<SqliteStore> {
        ShopService::new_with_config(store.clone(), ShopConfig::default())
    }

    #[tokio::test]
    async fn test_buy_item_scenario() {
        let store = memory_store().await;
        let alice = store.create_account("alice", "h", 100).await.unwrap();
        let shop = service(&store);

        shop.purchase(alice, "t-shirt").await.unwrap();

        let info = shop.get_info(alice).await.unwrap();
        assert_eq!(info.coins, 20);
        assert_eq!(
            info.inventory,
            vec![InventoryEntry {
                item: ItemType::TShirt,
                quantity: 1
            }]
        );
    }

    #[tokio::test]
    async fn test_buy_item_without_funds() {
        let store = memory_store().await;
        let alice = store.create_account("alice", "h", 30).await.unwrap();
        let shop = service(&store);

        let err = shop.purchase(alice, "book").await.unwrap_err();
        assert!(matches!(err, ShopError::InsufficientFunds { .. }));

        let info = shop.get_info(alice).await.unwrap();
        assert_eq!(info.coins, 30);
        assert!(info.inventory.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_keeps_item_types_apart() {
        let store = memory_store().await;
        let alice = store.create_account("alice", "h", 1000).await.unwrap();
        let shop = service(&store);

        shop.purchase(alice, "socks").await.unwrap();
        shop.purchase(alice, "book").await.unwrap();
        shop.purchase(alice, "socks").await.unwrap();

        let inventory = store.inventory_for(alice).await.unwrap();
        assert_eq!(
            inventory,
            vec![
                InventoryEntry {
                    item: ItemType::Book,
                    quantity: 1
                },
                InventoryEntry {
                    item: ItemType::Socks,
                    quantity: 2
                },
            ]
        );
        assert_eq!(store.balance_of(alice).await.unwrap(), 1000 - 50 - 2 * 10);
    }

    #[tokio::test]
    async fn test_send_coin_scenario() {
        let store = memory_store().await;
        let alice = store.create_account("alice", "h", 100).await.unwrap();
        let bob = store.create_account("bob", "h", 0).await.unwrap();
        let shop = service(&store);

        shop.transfer(alice, "bob", 50).await.unwrap();

        assert_eq!(store.balance_of(alice).await.unwrap(), 50);
        assert_eq!(store.balance_of(bob).await.unwrap(), 50);

        let alice_history = store.history_for(alice).await.unwrap();
        assert_eq!(
            alice_history.sent,
            vec![HistoryLine {
                counterpart: "bob".to_string(),
                amount: 50
            }]
        );
        assert!(alice_history.received.is_empty());

        let bob_history = store.history_for(bob).await.unwrap();
        assert_eq!(
            bob_history.received,
            vec![HistoryLine {
                counterpart: "alice".to_string(),
                amount: 50
            }]
        );
    }

    #[tokio::test]
    async fn test_send_coin_to_unknown_user() {
        let store = memory_store().await;
        let alice = store.create_account("alice", "h", 100).await.unwrap();
        let shop = service(&store);

        let err = shop.transfer(alice, "ghost", 10).await.unwrap_err();
        assert_eq!(err, ShopError::UnknownRecipient("ghost".to_string()));
        assert_eq!(store.balance_of(alice).await.unwrap(), 100);
        assert!(store.history_for(alice).await.unwrap().sent.is_empty());
    }

    #[tokio::test]
    async fn test_rolled_back_unit_leaves_no_trace() {
        let store = memory_store().await;
        let alice = store.create_account("alice", "h", 100).await.unwrap();
        let bob = store.create_account("bob", "h", 0).await.unwrap();

        let mut unit = store.begin_unit().await.unwrap();
        unit.adjust_balance(bob, 40).await.unwrap();
        unit.adjust_balance(alice, -40).await.unwrap();
        unit.append_transaction(NewCoinTransaction {
            sender: Some(alice),
            receiver: bob,
            amount: 40,
            timestamp: Utc::now(),
        })
        .await
        .unwrap();
        unit.rollback().await.unwrap();

        assert_eq!(store.balance_of(alice).await.unwrap(), 100);
        assert_eq!(store.balance_of(bob).await.unwrap(), 0);
        assert!(store.history_for(bob).await.unwrap().received.is_empty());
    }

    #[tokio::test]
    async fn test_failed_inventory_write_rolls_back_purchase() {
        let store = memory_store().await;
        let alice = store.create_account("alice", "h", 100).await.unwrap();
        let shop = service(&store);

        sqlx::query("DROP TABLE inventory")
            .execute(&store.pool)
            .await
            .unwrap();

        let err = shop.purchase(alice, "t-shirt").await.unwrap_err();
        assert!(matches!(err, ShopError::Storage(_)));

        store.migrate().await.unwrap();
        let info = shop.get_info(alice).await.unwrap();
        assert_eq!(info.coins, 100);
        assert!(info.inventory.is_empty());
    }

    #[tokio::test]
    async fn test_user_info_reads_one_snapshot() {
        let store = memory_store().await;
        let alice = store.create_account("alice", "h", 500).await.unwrap();
        let bob = store.create_account("bob", "h", 0).await.unwrap();
        let shop = service(&store);

        shop.purchase(alice, "book").await.unwrap();
        shop.transfer(alice, "bob", 100).await.unwrap();

        let info = store.user_info(alice).await.unwrap();
        assert_eq!(info.coins, 350);
        assert_eq!(info.inventory.len(), 1);
        assert_eq!(info.history.sent.len(), 1);

        assert_eq!(
            store.user_info(bob + 1).await.unwrap_err(),
            ShopError::UserNotFound(bob + 1)
        );
    }

    #[tokio::test]
    async fn test_adjust_balance_guard() {
        let store = memory_store().await;
        let alice = store.create_account("alice", "h", 10).await.unwrap();

        let mut unit = store.begin_unit().await.unwrap();
        assert!(matches!(
            unit.adjust_balance(alice, -11).await,
            Err(ShopError::Conflict(_))
        ));
        assert_eq!(
            unit.adjust_balance(999, 1).await,
            Err(ShopError::UserNotFound(999))
        );
        unit.rollback().await.unwrap();

        assert_eq!(store.balance_of(alice).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_history_placeholder_for_missing_sender() {
        let store = memory_store().await;
        let alice = store.create_account("alice", "h", 0).await.unwrap();

        let mut unit = store.begin_unit().await.unwrap();
        unit.append_transaction(NewCoinTransaction {
            sender: None,
            receiver: alice,
            amount: 15,
            timestamp: Utc::now(),
        })
        .await
        .unwrap();
        unit.commit().await.unwrap();

        let history = store.history_for(alice).await.unwrap();
        assert_eq!(
            history.received,
            vec![HistoryLine {
                counterpart: UNKNOWN_COUNTERPART.to_string(),
                amount: 15
            }]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_purchases_one_wins() {
        let store = memory_store().await;
        let alice = store.create_account("alice", "h", 500).await.unwrap();
        let shop = std::sync::Arc::new(service(&store));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let shop = std::sync::Arc::clone(&shop);
                tokio::spawn(async move { shop.purchase(alice, "hoody").await })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(ShopError::InsufficientFunds { .. }))));
        assert_eq!(store.balance_of(alice).await.unwrap(), 200);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_debits_never_overdraw() {
        let store = memory_store().await;
        let alice = store.create_account("alice", "h", 100).await.unwrap();
        let bob = store.create_account("bob", "h", 0).await.unwrap();
        let shop = std::sync::Arc::new(service(&store));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let shop = std::sync::Arc::clone(&shop);
                tokio::spawn(async move { shop.transfer(alice, "bob", 60).await })
            })
            .collect();

        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(err) => assert!(matches!(err, ShopError::InsufficientFunds { .. })),
            }
        }

        assert_eq!(ok, 1);
        assert_eq!(store.balance_of(alice).await.unwrap(), 40);
        assert_eq!(store.balance_of(bob).await.unwrap(), 60);
        assert_eq!(store.history_for(bob).await.unwrap().received.len(), 1);
    }

    #[tokio::test]
    async fn test_accounts() {
        let store = memory_store().await;

        assert!(store.find_account("alice").await.unwrap().is_none());
        let id = store.create_account("alice", "hash", 1000).await.unwrap();

        let account = store.find_account("alice").await.unwrap().unwrap();
        assert_eq!(account.id, id);
        assert_eq!(account.password_hash, "hash");
        assert!(store.account_exists(id).await.unwrap());
        assert!(!store.account_exists(id + 1).await.unwrap());

        assert_eq!(
            store.create_account("alice", "other", 1000).await,
            Err(AuthError::UsernameTaken("alice".to_string()))
        );
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("shop.db");
        let path = path.to_str().unwrap();

        let store = SqliteStore::new(path).await.unwrap();
        let alice = store.create_account("alice", "h", 100).await.unwrap();
        service(&store).purchase(alice, "pen").await.unwrap();
        store.close().await;

        let reopened = SqliteStore::new(path).await.unwrap();
        assert_eq!(reopened.balance_of(alice).await.unwrap(), 90);
        assert_eq!(reopened.inventory_for(alice).await.unwrap().len(), 1);
        reopened.close().await;
    }
}
