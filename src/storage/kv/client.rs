//! The primitive operations the key-value driver needs from a store.
//!
//! Items are flat JSON objects. Every table has a single string hash key;
//! there are no secondary indexes, so anything not keyed is a scan.

use crate::error::Result;

use serde_json::{Map, Value};

/// One stored item: attribute name to value.
pub type Item = Map<String, Value>;

/// Table layout and provisioning hints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    /// Name of the string hash-key attribute.
    pub key: &'static str,
    pub read_units: i64,
    pub write_units: i64,
}

/// Attribute changes applied by [`KvClient::update_item`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemUpdate {
    pub set: Item,
    pub remove: Vec<String>,
}

impl ItemUpdate {
    #[must_use]
    pub fn set(mut self, attribute: &str, value: Value) -> Self {
        self.set.insert(attribute.to_string(), value);
        self
    }

    #[must_use]
    pub fn remove(mut self, attribute: &str) -> Self {
        self.remove.push(attribute.to_string());
        self
    }
}

/// Equality filter applied during a scan. All conditions must hold.
pub type ScanFilter<'a> = &'a [(&'a str, Value)];

/// A key-value store client.
///
/// Single-item writes are atomic; nothing spans items.
pub trait KvClient: Send + Sync {
    /// Backend name reported by [`crate::storage::Storage::dialect`].
    const NAME: &'static str;

    fn list_tables(&self) -> Result<Vec<String>>;

    fn create_table(&self, table: &TableSpec) -> Result<()>;

    /// Whether a freshly created table accepts reads and writes yet.
    fn table_ready(&self, table: &str) -> Result<bool>;

    fn get_item(&self, table: &str, key: &str, value: &str) -> Result<Option<Item>>;

    /// Insert only if no item has this key. Returns `false` on conflict.
    fn put_item_if_absent(&self, table: &str, key: &str, item: Item) -> Result<bool>;

    /// Apply `update` to an existing item. Returns `false` if it is missing.
    fn update_item(&self, table: &str, key: &str, value: &str, update: &ItemUpdate)
    -> Result<bool>;

    /// Remove an item. Returns `false` if it was missing.
    fn delete_item(&self, table: &str, key: &str, value: &str) -> Result<bool>;

    /// Every item matching `filter`, in no particular order.
    fn scan(&self, table: &str, filter: ScanFilter<'_>) -> Result<Vec<Item>>;
}

/// Whether `item` satisfies every equality condition in `filter`.
#[must_use]
pub fn matches_filter(item: &Item, filter: ScanFilter<'_>) -> bool {
    filter
        .iter()
        .all(|(attribute, expected)| item.get(*attribute) == Some(expected))
}
