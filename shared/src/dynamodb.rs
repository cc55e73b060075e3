use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client;
use serde_json::{Map, Value};
use tracing::debug;

/// Partition key of the inventory table.
pub const PARTITION_KEY: &str = "productId";

/// A schemaless product record.
pub type Item = Map<String, Value>;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ScanPage {
    pub items: Vec<Item>,
    /// Present when the store has more items after this page.
    pub last_evaluated_key: Option<Item>,
}

/// The document store behind the inventory API.
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn get_item(&self, product_id: &str) -> Result<Option<Item>>;

    async fn scan_page(&self, exclusive_start_key: Option<Item>) -> Result<ScanPage>;

    /// Writes the whole record, replacing anything stored under its key.
    async fn put_item(&self, item: Item) -> Result<()>;

    /// Sets one attribute and returns the attributes that were written.
    async fn update_item(&self, product_id: &str, field: &str, value: Value) -> Result<Item>;

    /// Returns the record as it was before deletion, if there was one.
    async fn delete_item(&self, product_id: &str) -> Result<Option<Item>>;
}

/// Collects every item by following continuation keys until the store stops
/// returning one.
pub async fn scan_all<S>(store: &S) -> Result<Vec<Item>>
where
    S: ProductStore + ?Sized,
{
    let mut exclusive_start_key = None;
    let mut items = Vec::new();

    loop {
        let page = store.scan_page(exclusive_start_key.take()).await?;
        items.extend(page.items);

        match page.last_evaluated_key {
            Some(key) => exclusive_start_key = Some(key),
            None => break,
        }
    }

    Ok(items)
}

pub struct DynamoDbStore {
    client: Client,
    table_name: String,
    page_size: Option<i32>,
}

impl DynamoDbStore {
    pub fn new(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
            page_size: None,
        }
    }

    pub fn with_page_size(mut self, page_size: Option<i32>) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

fn key(product_id: &str) -> HashMap<String, AttributeValue> {
    HashMap::from([(
        PARTITION_KEY.to_string(),
        AttributeValue::S(product_id.to_string()),
    )])
}

/// The attribute name is bound through `#field`, never spliced into the text.
const UPDATE_EXPRESSION: &str = "SET #field = :value";
const UPDATE_RETURN_VALUES: ReturnValue = ReturnValue::UpdatedNew;
const DELETE_RETURN_VALUES: ReturnValue = ReturnValue::AllOld;

type UpdateBindings = (HashMap<String, String>, HashMap<String, AttributeValue>);

fn update_bindings(field: &str, value: Value) -> Result<UpdateBindings> {
    let names = HashMap::from([("#field".to_string(), field.to_string())]);
    let values = HashMap::from([(
        ":value".to_string(),
        serde_dynamo::to_attribute_value(value)?,
    )]);

    Ok((names, values))
}

fn to_attributes(item: Item) -> Result<HashMap<String, AttributeValue>> {
    Ok(serde_dynamo::to_item(item)?)
}

fn from_attributes(attributes: HashMap<String, AttributeValue>) -> Result<Item> {
    Ok(serde_dynamo::from_item(attributes)?)
}

#[async_trait]
impl ProductStore for DynamoDbStore {
    async fn get_item(&self, product_id: &str) -> Result<Option<Item>> {
        debug!("GetItem {} from {}", product_id, self.table_name);

        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .set_key(Some(key(product_id)))
            .send()
            .await?;

        output.item.map(from_attributes).transpose()
    }

    async fn scan_page(&self, exclusive_start_key: Option<Item>) -> Result<ScanPage> {
        let exclusive_start_key = exclusive_start_key.map(to_attributes).transpose()?;

        let output = self
            .client
            .scan()
            .table_name(&self.table_name)
            .set_limit(self.page_size)
            .set_exclusive_start_key(exclusive_start_key)
            .send()
            .await?;

        let items = output
            .items
            .unwrap_or_default()
            .into_iter()
            .map(from_attributes)
            .collect::<Result<Vec<Item>>>()?;
        debug!("Scan returned {} items from {}", items.len(), self.table_name);

        Ok(ScanPage {
            items,
            last_evaluated_key: output.last_evaluated_key.map(from_attributes).transpose()?,
        })
    }

    async fn put_item(&self, item: Item) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(to_attributes(item)?))
            .send()
            .await?;

        Ok(())
    }

    async fn update_item(&self, product_id: &str, field: &str, value: Value) -> Result<Item> {
        let (names, values) = update_bindings(field, value)?;

        let output = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .set_key(Some(key(product_id)))
            .update_expression(UPDATE_EXPRESSION)
            .set_expression_attribute_names(Some(names))
            .set_expression_attribute_values(Some(values))
            .return_values(UPDATE_RETURN_VALUES)
            .send()
            .await?;

        Ok(output
            .attributes
            .map(from_attributes)
            .transpose()?
            .unwrap_or_default())
    }

    async fn delete_item(&self, product_id: &str) -> Result<Option<Item>> {
        let output = self
            .client
            .delete_item()
            .table_name(&self.table_name)
            .set_key(Some(key(product_id)))
            .return_values(DELETE_RETURN_VALUES)
            .send()
            .await?;

        output.attributes.map(from_attributes).transpose()
    }
}
