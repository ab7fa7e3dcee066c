use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use scriptshop_shared::protocol::ErrorBody;
use scriptshop_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    /// Request conflicts with stored state (already purchased, final payment).
    #[error("{0}")]
    Conflict(String),

    #[error("Payment required")]
    PaymentRequired,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Upload exceeds the {max} byte limit")]
    PayloadTooLarge { max: usize },

    /// Missing upstream credentials or an unreachable dependency.
    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("Unable to verify purchase")]
    PurchaseCheck(String),

    /// Bucket store failures; the message is shown to the caller.
    #[error("{0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServerError::BadRequest(_) | ServerError::Conflict(_) => StatusCode::BAD_REQUEST,
            ServerError::PaymentRequired | ServerError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::PurchaseCheck(_) | ServerError::Storage(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ServerError::PurchaseCheck(detail) => {
                tracing::error!(error = %detail, "Purchase lookup failed");
                self.to_string()
            }
            ServerError::Internal(detail) => {
                tracing::error!(error = %detail, "Request failed");
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };

        (status, axum::Json(ErrorBody { error: message })).into_response()
    }
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ServerError::NotFound("Record not found".into()),
            StoreError::Validation(msg) => ServerError::BadRequest(msg),
            StoreError::InvalidTransition { from, to } => {
                ServerError::Conflict(format!("Payment cannot move from {from} to {to}"))
            }
            other => ServerError::Internal(other.to_string()),
        }
    }
}

/// Store lookup of an item, where a missing row means "Item not found".
pub fn missing_item(e: StoreError) -> ServerError {
    match e {
        StoreError::NotFound => ServerError::NotFound("Item not found".into()),
        other => other.into(),
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        ServerError::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<PathRejection> for ServerError {
    fn from(rejection: PathRejection) -> Self {
        ServerError::BadRequest(format!("Invalid path: {}", rejection.body_text()))
    }
}
