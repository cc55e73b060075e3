use lambda_http::{run, service_fn, Error};
use shared::config::{load_aws_config, InventoryConfig};
use shared::dynamodb::DynamoDbStore;
use tracing::info;

use crate::router::Router;

mod error;
mod router;

#[tokio::main]
async fn main() -> Result<(), Error> {
    shared::log::init();

    let config = InventoryConfig::from_env()?;
    let aws_config = load_aws_config().await;
    let store = DynamoDbStore::new(aws_sdk_dynamodb::Client::new(&aws_config), &config.table_name)
        .with_page_size(config.scan_page_size);
    info!("Serving table {}", store.table_name());

    let router = Router::new(store, config.updatable_fields);

    run(service_fn(|event| router.handle(event))).await
}
