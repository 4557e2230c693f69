//! In-memory key-value client.
//!
//! Backs tests and local development. Each call takes the store lock for
//! its own duration only, which gives the same per-item atomicity a managed
//! store offers.

use super::client::{Item, ItemUpdate, KvClient, ScanFilter, TableSpec, matches_filter};
use crate::error::{Error, Result};

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

#[derive(Debug)]
struct Table {
    key: &'static str,
    items: HashMap<String, Item>,
}

/// A [`KvClient`] holding everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryKvClient {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryKvClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, table: &str, f: impl FnOnce(&Table) -> T) -> Result<T> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables.get(table).map(f).ok_or_else(|| missing_table(table))
    }

    fn write<T>(&self, table: &str, f: impl FnOnce(&mut Table) -> T) -> Result<T> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables.get_mut(table).map(f).ok_or_else(|| missing_table(table))
    }
}

fn missing_table(table: &str) -> Error {
    Error::Backend(format!("table {table} does not exist"))
}

fn key_of(table: &Table, item: &Item) -> Result<String> {
    match item.get(table.key) {
        Some(Value::String(key)) => Ok(key.clone()),
        _ => Err(Error::Backend(format!(
            "item is missing string key attribute {}",
            table.key
        ))),
    }
}

impl KvClient for MemoryKvClient {
    const NAME: &'static str = "memory";

    fn list_tables(&self) -> Result<Vec<String>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = tables.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn create_table(&self, table: &TableSpec) -> Result<()> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        if tables.contains_key(&table.name) {
            return Err(Error::Backend(format!("table {} already exists", table.name)));
        }
        tables.insert(
            table.name.clone(),
            Table {
                key: table.key,
                items: HashMap::new(),
            },
        );
        Ok(())
    }

    fn table_ready(&self, table: &str) -> Result<bool> {
        self.read(table, |_| true)
    }

    fn get_item(&self, table: &str, _key: &str, value: &str) -> Result<Option<Item>> {
        self.read(table, |t| t.items.get(value).cloned())
    }

    fn put_item_if_absent(&self, table: &str, _key: &str, item: Item) -> Result<bool> {
        self.write(table, |t| {
            let key = key_of(t, &item)?;
            if t.items.contains_key(&key) {
                return Ok(false);
            }
            t.items.insert(key, item);
            Ok(true)
        })?
    }

    fn update_item(
        &self,
        table: &str,
        _key: &str,
        value: &str,
        update: &ItemUpdate,
    ) -> Result<bool> {
        self.write(table, |t| {
            let Some(item) = t.items.get_mut(value) else {
                return false;
            };
            for (attribute, new_value) in &update.set {
                item.insert(attribute.clone(), new_value.clone());
            }
            for attribute in &update.remove {
                item.remove(attribute);
            }
            true
        })
    }

    fn delete_item(&self, table: &str, _key: &str, value: &str) -> Result<bool> {
        self.write(table, |t| t.items.remove(value).is_some())
    }

    fn scan(&self, table: &str, filter: ScanFilter<'_>) -> Result<Vec<Item>> {
        self.read(table, |t| {
            t.items
                .values()
                .filter(|item| matches_filter(item, filter))
                .cloned()
                .collect()
        })
    }
}
