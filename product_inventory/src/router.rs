use lambda_http::http::header::CONTENT_TYPE;
use lambda_http::http::{Method, StatusCode};
use lambda_http::{Body, Error, Request, RequestExt, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use shared::dynamodb::{scan_all, Item, ProductStore, PARTITION_KEY};
use tracing::{error, info, warn};

use crate::error::ApiError;

const HEALTH_PATH: &str = "/health";
const PRODUCT_PATH: &str = "/product";
const PRODUCTS_PATH: &str = "/products";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest {
    product_id: String,
    update_key: String,
    update_value: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteRequest {
    product_id: String,
}

/// Maps inventory API requests onto a [`ProductStore`].
pub struct Router<S> {
    store: S,
    updatable_fields: Option<Vec<String>>,
}

impl<S: ProductStore> Router<S> {
    pub fn new(store: S, updatable_fields: Option<Vec<String>>) -> Self {
        Self {
            store,
            updatable_fields,
        }
    }

    /// Always answers with a response; only a failure to build one is an error.
    pub async fn handle(&self, event: Request) -> Result<Response<Body>, Error> {
        info!("Request event: {} {}", event.method(), event.uri().path());

        match self.route(&event).await {
            Ok(body) => json_response(StatusCode::OK, body.as_ref()),
            Err(err) => {
                match &err {
                    ApiError::Store(cause) => error!("Store request failed: {:#}", cause),
                    ApiError::BadRequest(reason) => warn!("Rejected request: {}", reason),
                    ApiError::NotFound => {}
                }
                json_response(err.status(), Some(&err.body()))
            }
        }
    }

    async fn route(&self, event: &Request) -> Result<Option<Value>, ApiError> {
        let method = event.method();
        let path = event.uri().path();

        match (method, path) {
            (&Method::GET, HEALTH_PATH) => Ok(None),
            (&Method::GET, PRODUCT_PATH) => {
                let product_id = event
                    .query_string_parameters_ref()
                    .and_then(|params| params.first(PARTITION_KEY))
                    .ok_or_else(|| ApiError::bad_request("productId query parameter is required"))?;
                self.get_product(valid_product_id(product_id)?).await
            }
            (&Method::GET, PRODUCTS_PATH) => self.get_products().await.map(Some),
            (&Method::POST, PRODUCT_PATH) => {
                let item = match parse_body::<Value>(event)? {
                    Value::Object(item) => item,
                    _ => return Err(ApiError::bad_request("request body must be a JSON object")),
                };
                self.save_product(item).await.map(Some)
            }
            (&Method::PATCH, PRODUCT_PATH) => {
                let request: UpdateRequest = parse_body(event)?;
                self.modify_product(request).await.map(Some)
            }
            (&Method::DELETE, PRODUCT_PATH) => {
                let request: DeleteRequest = parse_body(event)?;
                self.delete_product(valid_product_id(&request.product_id)?)
                    .await
                    .map(Some)
            }
            _ => Err(ApiError::NotFound),
        }
    }

    async fn get_product(&self, product_id: &str) -> Result<Option<Value>, ApiError> {
        let item = self.store.get_item(product_id).await?;
        Ok(item.map(Value::Object))
    }

    async fn get_products(&self) -> Result<Value, ApiError> {
        let products = scan_all(&self.store).await?;
        info!("Scanned {} products", products.len());

        Ok(json!({ "products": products }))
    }

    async fn save_product(&self, item: Item) -> Result<Value, ApiError> {
        match item.get(PARTITION_KEY) {
            Some(Value::String(id)) => {
                valid_product_id(id)?;
            }
            _ => return Err(ApiError::bad_request("productId must be a non-empty string")),
        }

        self.store.put_item(item.clone()).await?;

        Ok(json!({
            "Operation": "SAVE",
            "Message": "SUCCESS",
            "Item": item,
        }))
    }

    async fn modify_product(&self, request: UpdateRequest) -> Result<Value, ApiError> {
        valid_product_id(&request.product_id)?;
        self.check_updatable(&request.update_key)?;

        let updated = self
            .store
            .update_item(&request.product_id, &request.update_key, request.update_value)
            .await?;

        Ok(json!({
            "Operation": "UPDATE",
            "Message": "SUCCESS",
            "Item": updated,
        }))
    }

    async fn delete_product(&self, product_id: &str) -> Result<Value, ApiError> {
        let deleted = self.store.delete_item(product_id).await?;

        Ok(json!({
            "Operation": "DELETE",
            "Message": "SUCCESS",
            "Item": deleted,
        }))
    }

    fn check_updatable(&self, field: &str) -> Result<(), ApiError> {
        if field.is_empty() {
            return Err(ApiError::bad_request("updateKey must not be empty"));
        }
        if field == PARTITION_KEY {
            return Err(ApiError::bad_request("productId cannot be updated"));
        }
        if let Some(allowed) = &self.updatable_fields {
            if !allowed.iter().any(|name| name == field) {
                return Err(ApiError::bad_request(format!(
                    "updateKey {} is not an updatable field",
                    field
                )));
            }
        }
        Ok(())
    }
}

/// DynamoDB refuses empty strings as key values, so they never reach the store.
fn valid_product_id(product_id: &str) -> Result<&str, ApiError> {
    if product_id.is_empty() {
        return Err(ApiError::bad_request("productId must be a non-empty string"));
    }
    Ok(product_id)
}

fn parse_body<T: DeserializeOwned>(event: &Request) -> Result<T, ApiError> {
    serde_json::from_slice(event.body().as_ref())
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON: {}", e)))
}

/// No body means an empty payload, matching a serialised `undefined`.
fn json_response(status: StatusCode, body: Option<&Value>) -> Result<Response<Body>, Error> {
    let body = match body {
        Some(value) => Body::Text(serde_json::to_string(value)?),
        None => Body::Empty,
    };

    let response = Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(body)
        .map_err(Box::new)?;

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use shared::dynamodb::ScanPage;
    use shared::memory::MemoryStore;
    use std::collections::HashMap;

    fn router() -> Router<MemoryStore> {
        Router::new(MemoryStore::with_page_size(3), None)
    }

    fn request(method: &str, path: &str, body: Option<Value>) -> Request {
        let body = match body {
            Some(value) => Body::Text(value.to_string()),
            None => Body::Empty,
        };
        lambda_http::http::Request::builder()
            .method(method)
            .uri(path)
            .body(body)
            .unwrap()
    }

    fn get_product(product_id: &str) -> Request {
        request("GET", PRODUCT_PATH, None).with_query_string_parameters(HashMap::from([(
            "productId".to_string(),
            product_id.to_string(),
        )]))
    }

    fn body_of(response: &Response<Body>) -> Option<Value> {
        match response.body() {
            Body::Empty => None,
            Body::Text(text) => Some(serde_json::from_str(text).unwrap()),
            Body::Binary(bytes) => Some(serde_json::from_slice(bytes).unwrap()),
        }
    }

    async fn send(router: &Router<MemoryStore>, event: Request) -> (StatusCode, Option<Value>) {
        let response = router.handle(event).await.unwrap();
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        (response.status(), body_of(&response))
    }

    struct FailingStore;

    #[async_trait]
    impl ProductStore for FailingStore {
        async fn get_item(&self, _: &str) -> Result<Option<Item>> {
            Err(anyhow!("ResourceNotFoundException: table missing"))
        }

        async fn scan_page(&self, _: Option<Item>) -> Result<ScanPage> {
            Err(anyhow!("ResourceNotFoundException: table missing"))
        }

        async fn put_item(&self, _: Item) -> Result<()> {
            Err(anyhow!("ResourceNotFoundException: table missing"))
        }

        async fn update_item(&self, _: &str, _: &str, _: Value) -> Result<Item> {
            Err(anyhow!("ResourceNotFoundException: table missing"))
        }

        async fn delete_item(&self, _: &str) -> Result<Option<Item>> {
            Err(anyhow!("ResourceNotFoundException: table missing"))
        }
    }

    #[tokio::test]
    async fn health_check_has_empty_body() {
        let (status, body) = send(&router(), request("GET", "/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, None);
    }

    #[tokio::test]
    async fn save_then_get() {
        let router = router();
        let widget = json!({ "productId": "p1", "name": "Widget" });

        let (status, body) = send(&router, request("POST", "/product", Some(widget.clone()))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            Some(json!({ "Operation": "SAVE", "Message": "SUCCESS", "Item": widget }))
        );

        let (status, body) = send(&router, get_product("p1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Some(widget));
    }

    #[tokio::test]
    async fn save_overwrites_existing_record() {
        let router = router();
        let widget = json!({ "productId": "p1", "name": "Widget", "price": 3 });
        send(&router, request("POST", "/product", Some(widget))).await;
        let gadget = json!({ "productId": "p1", "name": "Gadget" });
        send(&router, request("POST", "/product", Some(gadget))).await;

        let (_, body) = send(&router, get_product("p1")).await;
        assert_eq!(body, Some(json!({ "productId": "p1", "name": "Gadget" })));
    }

    #[tokio::test]
    async fn get_missing_product_is_empty() {
        let (status, body) = send(&router(), get_product("nope")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, None);
    }

    #[tokio::test]
    async fn get_without_product_id_is_rejected() {
        let (status, body) = send(&router(), request("GET", "/product", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.unwrap()["message"].as_str().unwrap().contains("productId"));
    }

    #[tokio::test]
    async fn update_changes_only_one_field() {
        let router = router();
        let widget = json!({ "productId": "p1", "name": "Widget", "price": 3 });
        send(&router, request("POST", "/product", Some(widget))).await;

        let patch = json!({ "productId": "p1", "updateKey": "price", "updateValue": 5 });
        let (status, body) = send(&router, request("PATCH", "/product", Some(patch))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            Some(json!({ "Operation": "UPDATE", "Message": "SUCCESS", "Item": { "price": 5 } }))
        );

        let (_, body) = send(&router, get_product("p1")).await;
        assert_eq!(body, Some(json!({ "productId": "p1", "name": "Widget", "price": 5 })));
    }

    #[tokio::test]
    async fn update_rejects_key_and_unlisted_fields() {
        let router = Router::new(MemoryStore::default(), Some(vec!["price".to_string()]));

        for key in ["productId", "", "name"] {
            let patch = json!({ "productId": "p1", "updateKey": key, "updateValue": "x" });
            let (status, _) = send(&router, request("PATCH", "/product", Some(patch))).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "updateKey {:?}", key);
        }
        assert!(router.store.is_empty());

        let patch = json!({ "productId": "p1", "updateKey": "price", "updateValue": 9 });
        let (status, _) = send(&router, request("PATCH", "/product", Some(patch))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn update_requires_value() {
        let patch = json!({ "productId": "p1", "updateKey": "price" });
        let (status, _) = send(&router(), request("PATCH", "/product", Some(patch))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_returns_snapshot_and_removes() {
        let router = router();
        let widget = json!({ "productId": "p1", "name": "Widget" });
        send(&router, request("POST", "/product", Some(widget.clone()))).await;

        let delete = request("DELETE", "/product", Some(json!({ "productId": "p1" })));
        let (status, body) = send(&router, delete).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            Some(json!({ "Operation": "DELETE", "Message": "SUCCESS", "Item": widget }))
        );

        let (status, body) = send(&router, get_product("p1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, None);
    }

    #[tokio::test]
    async fn delete_missing_product_has_null_item() {
        let delete = request("DELETE", "/product", Some(json!({ "productId": "ghost" })));
        let (status, body) = send(&router(), delete).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.unwrap()["Item"], Value::Null);
    }

    #[tokio::test]
    async fn products_spans_every_page() {
        let router = router();
        let mut expected = Vec::new();
        for i in 0..10 {
            let product = json!({ "productId": format!("p{:02}", i), "stock": i });
            send(&router, request("POST", "/product", Some(product.clone()))).await;
            expected.push(product);
        }

        let (status, body) = send(&router, request("GET", "/products", None)).await;
        assert_eq!(status, StatusCode::OK);

        let mut products = body.unwrap()["products"].as_array().unwrap().clone();
        products.sort_by_key(|p| p["productId"].as_str().unwrap().to_string());
        assert_eq!(products, expected);
    }

    #[tokio::test]
    async fn products_on_empty_table() {
        let (status, body) = send(&router(), request("GET", "/products", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Some(json!({ "products": [] })));
    }

    #[tokio::test]
    async fn unknown_routes_are_not_found() {
        let router = router();
        let cases = [
            ("GET", "/"),
            ("PUT", "/product"),
            ("POST", "/products"),
            ("DELETE", "/products"),
            ("POST", "/health"),
            ("GET", "/product/p1"),
            ("PATCH", "/Product"),
        ];

        for (method, path) in cases {
            let (status, body) = send(&router, request(method, path, None)).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{} {}", method, path);
            assert_eq!(body, Some(json!("404 Not Found")));
        }
    }

    #[tokio::test]
    async fn malformed_bodies_are_rejected() {
        let router = router();
        let cases = [
            request("POST", "/product", None),
            request("POST", "/product", Some(json!(["not", "an", "object"]))),
            request("POST", "/product", Some(json!({ "name": "no key" }))),
            request("POST", "/product", Some(json!({ "productId": 12 }))),
            request("DELETE", "/product", Some(json!({}))),
            request("PATCH", "/product", Some(json!({ "productId": "p1" }))),
            request("POST", "/product", Some(json!({ "productId": "" }))),
            request("DELETE", "/product", Some(json!({ "productId": "" }))),
            request(
                "PATCH",
                "/product",
                Some(json!({ "productId": "", "updateKey": "name", "updateValue": "x" })),
            ),
            get_product(""),
        ];

        for event in cases {
            let (status, body) = send(&router, event).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(body.unwrap()["message"].is_string());
        }
        assert!(router.store.is_empty());
    }

    #[tokio::test]
    async fn store_failures_become_server_errors() {
        let router = Router::new(FailingStore, None);
        let cases = [
            request("GET", "/products", None),
            request("POST", "/product", Some(json!({ "productId": "p1" }))),
            request(
                "PATCH",
                "/product",
                Some(json!({ "productId": "p1", "updateKey": "name", "updateValue": "x" })),
            ),
            request("DELETE", "/product", Some(json!({ "productId": "p1" }))),
            request("GET", "/product", None).with_query_string_parameters(HashMap::from([(
                "productId".to_string(),
                "p1".to_string(),
            )])),
        ];

        for event in cases {
            let response = router.handle(event).await.unwrap();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(
                body_of(&response),
                Some(json!({ "message": "Internal Server Error" }))
            );
        }

        let response = router.handle(request("GET", "/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
