// Coin shop core - purchase and transfer business logic
//
// This module contains the rules that keep the ledger honest: no overdraft,
// coins conserved on transfer, and every multi-row mutation applied as one
// atomic unit. It has no HTTP or SQL code; storage comes in through the
// `ShopStore` trait.

use super::catalog::CatalogItem;
use super::shop_models::{
    NewCoinTransaction, PurchaseReceipt, TransferReceipt, UserId, UserInfo,
};
use super::shop_store::{LedgerUnit, ShopError, ShopStore};
use chrono::Utc;
use tracing::{debug, error, info};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the shop service.
#[derive(Debug, Clone, Default)]
pub struct ShopConfig {
    /// Whether a user may send coins to their own account.
    pub allow_self_transfer: bool,
}

// ============================================================================
// CORE SERVICE
// ============================================================================

/// The main service for shop operations.
///
/// Generic over S: ShopStore so the same rules run against SQLite in
/// production and against the in-memory store in tests.
pub struct ShopService<S: ShopStore> {
    store: S,
    config: ShopConfig,
}

impl<S: ShopStore> ShopService<S> {
    /// Create a new shop service with the given store.
    #[cfg(test)]
    pub fn new(store: S) -> Self {
        Self {
            store,
            config: ShopConfig::default(),
        }
    }

    /// Create a new shop service with custom configuration.
    pub fn new_with_config(store: S, config: ShopConfig) -> Self {
        Self { store, config }
    }

    /// Buy one item of `item_name` for `buyer`.
    ///
    /// Debits the catalog price and bumps the (buyer, item) inventory count in
    /// a single atomic unit. On any error nothing is applied.
    pub async fn purchase(
        &self,
        buyer: UserId,
        item_name: &str,
    ) -> Result<PurchaseReceipt, ShopError> {
        let entry = CatalogItem::lookup(item_name)
            .ok_or_else(|| ShopError::UnknownItem(item_name.to_string()))?;

        let mut unit = self.store.begin_unit().await?;
        let result = apply_purchase(unit.as_mut(), buyer, entry).await;
        let receipt = finish_unit(unit, result).await?;

        info!(
            user_id = buyer,
            item = %receipt.item,
            price = receipt.price,
            balance = receipt.new_balance,
            "Item purchased"
        );
        Ok(receipt)
    }

    /// Send `amount` coins from `sender` to the user named `to_username`.
    ///
    /// Credit, debit and the transaction-log append commit together or not
    /// at all.
    pub async fn transfer(
        &self,
        sender: UserId,
        to_username: &str,
        amount: i64,
    ) -> Result<TransferReceipt, ShopError> {
        if amount <= 0 {
            return Err(ShopError::InvalidAmount(amount));
        }

        let mut unit = self.store.begin_unit().await?;
        let result = self
            .apply_transfer(unit.as_mut(), sender, to_username, amount)
            .await;
        let receipt = finish_unit(unit, result).await?;

        info!(
            user_id = sender,
            receiver_id = receipt.receiver,
            amount = receipt.amount,
            balance = receipt.sender_balance,
            "Coins transferred"
        );
        Ok(receipt)
    }

    /// Balance, inventory and transfer history for one user.
    pub async fn get_info(&self, user_id: UserId) -> Result<UserInfo, ShopError> {
        self.store.user_info(user_id).await
    }

    async fn apply_transfer(
        &self,
        unit: &mut dyn LedgerUnit,
        sender: UserId,
        to_username: &str,
        amount: i64,
    ) -> Result<TransferReceipt, ShopError> {
        let receiver = unit
            .find_user_id(to_username)
            .await?
            .ok_or_else(|| ShopError::UnknownRecipient(to_username.to_string()))?;

        if receiver == sender && !self.config.allow_self_transfer {
            return Err(ShopError::SelfTransfer);
        }

        let balance = unit.get_balance(sender).await?;
        if balance < amount {
            return Err(ShopError::InsufficientFunds {
                required: amount,
                available: balance,
            });
        }

        unit.adjust_balance(receiver, amount).await?;
        unit.adjust_balance(sender, -amount).await?;
        unit.append_transaction(NewCoinTransaction {
            sender: Some(sender),
            receiver,
            amount,
            timestamp: Utc::now(),
        })
        .await?;

        let sender_balance = if receiver == sender {
            balance
        } else {
            balance - amount
        };

        Ok(TransferReceipt {
            receiver,
            amount,
            sender_balance,
        })
    }
}

async fn apply_purchase(
    unit: &mut dyn LedgerUnit,
    buyer: UserId,
    entry: CatalogItem,
) -> Result<PurchaseReceipt, ShopError> {
    let balance = unit.get_balance(buyer).await?;
    if balance < entry.price {
        return Err(ShopError::InsufficientFunds {
            required: entry.price,
            available: balance,
        });
    }

    unit.adjust_balance(buyer, -entry.price).await?;
    unit.upsert_inventory(buyer, entry.item).await?;

    Ok(PurchaseReceipt {
        item: entry.item,
        price: entry.price,
        new_balance: balance - entry.price,
    })
}

/// Commit the unit if the work succeeded, otherwise roll it back and hand the
/// original error to the caller.
async fn finish_unit<T>(
    unit: Box<dyn LedgerUnit>,
    result: Result<T, ShopError>,
) -> Result<T, ShopError> {
    match result {
        Ok(value) => {
            unit.commit().await?;
            Ok(value)
        }
        Err(err) => {
            debug!("Rolling back unit: {}", err);
            if let Err(rollback_err) = unit.rollback().await {
                error!("Failed to roll back unit: {}", rollback_err);
            }
            Err(err)
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
