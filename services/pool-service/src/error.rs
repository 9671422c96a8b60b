//! HTTP error mapping
//!
//! Empty pools and unknown ids never reach this type; they are ordinary
//! responses. Only store faults become a 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

/// A store failure surfaced to an HTTP caller.
#[derive(Debug)]
pub struct ApiError(account_pool::Error);

impl From<account_pool::Error> for ApiError {
    fn from(err: account_pool::Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "store failure while serving request");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

/// Result alias for handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
