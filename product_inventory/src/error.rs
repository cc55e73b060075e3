use lambda_http::http::StatusCode;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("404 Not Found")]
    NotFound,
    #[error("{0}")]
    BadRequest(String),
    #[error("store request failed: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Store failures are reported generically, the details stay in the logs.
    pub fn body(&self) -> Value {
        match self {
            ApiError::NotFound => Value::String(self.to_string()),
            ApiError::BadRequest(message) => json!({ "message": message }),
            ApiError::Store(_) => json!({ "message": "Internal Server Error" }),
        }
    }
}
