use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Standard error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Not Found", "Conflict")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Invalid cart: {0}")]
    InvalidCart(String),

    #[error("Product unavailable: {0}")]
    ProductUnavailable(String),

    #[error("Insufficient stock for {product}: requested {requested}, available {available}")]
    InsufficientStock {
        product: String,
        requested: i32,
        available: i32,
    },

    #[error("Invoice number collision, retry the checkout")]
    InvoiceCollision,

    #[error("Transaction {0} not found")]
    TransactionNotFound(String),

    #[error("Transaction {0} is already canceled")]
    AlreadyCanceled(Uuid),

    #[error("Cancellation window of {0} hours has expired")]
    CancelWindowExpired(i64),

    #[error("A cancellation reason is required")]
    ReasonRequired,

    #[error("Invalid webhook signature")]
    InvalidWebhookSignature,

    #[error("Payment gateway error: {0}")]
    GatewaySessionError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::InvalidCart(_) | Self::ValidationError(_) | Self::ReasonRequired => {
                StatusCode::BAD_REQUEST
            }
            Self::ProductUnavailable(_)
            | Self::InsufficientStock { .. }
            | Self::CancelWindowExpired(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvoiceCollision | Self::AlreadyCanceled(_) => StatusCode::CONFLICT,
            Self::TransactionNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidWebhookSignature => StatusCode::UNAUTHORIZED,
            Self::GatewaySessionError(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Message suitable for HTTP responses. Internal failures return a
    /// generic message so implementation details never leak; the invalid
    /// signature case is deliberately opaque to the caller.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) | Self::Other(_) => "Internal server error".to_string(),
            Self::InvalidWebhookSignature => "Unauthorized".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (status, Json(err)).into_response()
    }
}
