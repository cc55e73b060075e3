use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::dynamodb::{Item, ProductStore, ScanPage, PARTITION_KEY};

const DEFAULT_PAGE_SIZE: usize = 100;

/// In-process store ordered by `productId`, paging the way DynamoDB does.
pub struct MemoryStore {
    items: Mutex<BTreeMap<String, Item>>,
    page_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }
}

impl MemoryStore {
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            items: Mutex::new(BTreeMap::new()),
            page_size: page_size.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.items().map(|items| items.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn items(&self) -> Result<MutexGuard<'_, BTreeMap<String, Item>>> {
        self.items
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

fn product_id(item: &Item) -> Result<String> {
    match item.get(PARTITION_KEY) {
        Some(Value::String(id)) => {
            check_key(id)?;
            Ok(id.clone())
        }
        _ => bail!("missing the key {} in the item", PARTITION_KEY),
    }
}

/// Mirrors DynamoDB's ValidationException for empty string key values.
fn check_key(product_id: &str) -> Result<()> {
    if product_id.is_empty() {
        bail!("the key {} must not be an empty string", PARTITION_KEY);
    }
    Ok(())
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn get_item(&self, product_id: &str) -> Result<Option<Item>> {
        check_key(product_id)?;
        Ok(self.items()?.get(product_id).cloned())
    }

    async fn scan_page(&self, exclusive_start_key: Option<Item>) -> Result<ScanPage> {
        let items = self.items()?;
        let lower = match exclusive_start_key {
            Some(key) => Bound::Excluded(product_id(&key)?),
            None => Bound::Unbounded,
        };

        let mut remaining = items.range((lower, Bound::Unbounded));
        let page: Vec<Item> = remaining
            .by_ref()
            .take(self.page_size)
            .map(|(_, item)| item.clone())
            .collect();

        let last_evaluated_key = match (remaining.next(), page.last()) {
            (Some(_), Some(last)) => {
                let mut key = Item::new();
                key.insert(PARTITION_KEY.to_string(), Value::String(product_id(last)?));
                Some(key)
            }
            _ => None,
        };

        Ok(ScanPage {
            items: page,
            last_evaluated_key,
        })
    }

    async fn put_item(&self, item: Item) -> Result<()> {
        let id = product_id(&item)?;
        self.items()?.insert(id, item);
        Ok(())
    }

    async fn update_item(&self, product_id: &str, field: &str, value: Value) -> Result<Item> {
        if field == PARTITION_KEY {
            bail!("cannot update attribute {}, it is part of the key", field);
        }
        check_key(product_id)?;

        let mut items = self.items()?;
        let item = items.entry(product_id.to_string()).or_insert_with(|| {
            let mut item = Item::new();
            item.insert(PARTITION_KEY.to_string(), Value::String(product_id.to_string()));
            item
        });
        item.insert(field.to_string(), value.clone());

        let mut updated = Item::new();
        updated.insert(field.to_string(), value);
        Ok(updated)
    }

    async fn delete_item(&self, product_id: &str) -> Result<Option<Item>> {
        check_key(product_id)?;
        Ok(self.items()?.remove(product_id))
    }
}
