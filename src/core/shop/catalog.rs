// Shop catalog
//
// This module defines every purchasable item type and its fixed price.
// The catalog is reference data: nothing in the service ever mutates it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for shop items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ItemType {
    TShirt,
    Cup,
    Book,
    Pen,
    Powerbank,
    Hoody,
    Umbrella,
    Socks,
    Wallet,
    PinkHoody,
}

impl ItemType {
    /// Convert item type to the string used on the wire and in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::TShirt => "t-shirt",
            ItemType::Cup => "cup",
            ItemType::Book => "book",
            ItemType::Pen => "pen",
            ItemType::Powerbank => "powerbank",
            ItemType::Hoody => "hoody",
            ItemType::Umbrella => "umbrella",
            ItemType::Socks => "socks",
            ItemType::Wallet => "wallet",
            ItemType::PinkHoody => "pink-hoody",
        }
    }

    /// Parse item type from string. Matching is exact (case-sensitive).
    pub fn parse(s: &str) -> Option<Self> {
        ItemType::all().into_iter().find(|item| item.as_str() == s)
    }

    /// Get all item types, in catalog order.
    pub fn all() -> Vec<ItemType> {
        vec![
            ItemType::TShirt,
            ItemType::Cup,
            ItemType::Book,
            ItemType::Pen,
            ItemType::Powerbank,
            ItemType::Hoody,
            ItemType::Umbrella,
            ItemType::Socks,
            ItemType::Wallet,
            ItemType::PinkHoody,
        ]
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog entry: an item type and what it costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogItem {
    pub item: ItemType,
    pub price: i64,
}

impl CatalogItem {
    /// Get the catalog entry for an item type.
    pub fn get(item: ItemType) -> Self {
        let price = match item {
            ItemType::TShirt => 80,
            ItemType::Cup => 20,
            ItemType::Book => 50,
            ItemType::Pen => 10,
            ItemType::Powerbank => 200,
            ItemType::Hoody => 300,
            ItemType::Umbrella => 200,
            ItemType::Socks => 10,
            ItemType::Wallet => 50,
            ItemType::PinkHoody => 500,
        };
        CatalogItem { item, price }
    }

    /// Look up a catalog entry by its wire name.
    pub fn lookup(name: &str) -> Option<Self> {
        ItemType::parse(name).map(CatalogItem::get)
    }

    /// Get the whole catalog.
    #[cfg(test)]
    pub fn all() -> Vec<CatalogItem> {
        ItemType::all().into_iter().map(CatalogItem::get).collect()
    }
}
