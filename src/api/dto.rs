// Request and response bodies of the JSON API.

use crate::core::shop::{HistoryLine, InventoryEntry, UserInfo};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCoinRequest {
    pub to_user: String,
    pub amount: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub coins: i64,
    pub inventory: Vec<Item>,
    pub coin_history: CoinHistoryResponse,
}

#[derive(Debug, Serialize)]
pub struct Item {
    #[serde(rename = "type")]
    pub item_type: String,
    pub quantity: i64,
}

#[derive(Debug, Serialize)]
pub struct CoinHistoryResponse {
    pub received: Vec<ReceivedTransaction>,
    pub sent: Vec<SentTransaction>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedTransaction {
    pub from_user: String,
    pub amount: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentTransaction {
    pub to_user: String,
    pub amount: i64,
}

impl From<InventoryEntry> for Item {
    fn from(entry: InventoryEntry) -> Self {
        Item {
            item_type: entry.item.as_str().to_string(),
            quantity: entry.quantity,
        }
    }
}

impl From<HistoryLine> for ReceivedTransaction {
    fn from(line: HistoryLine) -> Self {
        ReceivedTransaction {
            from_user: line.counterpart,
            amount: line.amount,
        }
    }
}

impl From<HistoryLine> for SentTransaction {
    fn from(line: HistoryLine) -> Self {
        SentTransaction {
            to_user: line.counterpart,
            amount: line.amount,
        }
    }
}

impl From<UserInfo> for InfoResponse {
    fn from(info: UserInfo) -> Self {
        InfoResponse {
            coins: info.coins,
            inventory: info.inventory.into_iter().map(Item::from).collect(),
            coin_history: CoinHistoryResponse {
                received: info.history.received.into_iter().map(Into::into).collect(),
                sent: info.history.sent.into_iter().map(Into::into).collect(),
            },
        }
    }
}
