use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    errors::ServiceError,
    handlers::common::{created_response, success_response, validate_input, PaginationParams},
    models::PaymentMethod,
    services::transactions::CreateTransactionRequest,
    AppState,
};

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreatePendingTransactionRequest {
    #[serde(flatten)]
    #[validate]
    pub cart: CreateTransactionRequest,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CancelTransactionRequest {
    pub reason: String,
    pub actor_id: Uuid,
}

/// Cash checkout: completes synchronously, stock decremented up front.
#[utoipa::path(
    post,
    path = "/api/v1/transactions",
    request_body = CreateTransactionRequest,
    responses(
        (status = 201, description = "Transaction completed"),
        (status = 400, description = "Invalid cart", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock or unavailable product", body = crate::errors::ErrorResponse),
        (status = 409, description = "Invoice collision", body = crate::errors::ErrorResponse)
    ),
    tag = "Transactions"
)]
pub async fn create_cash_transaction(
    State(state): State<AppState>,
    Json(payload): Json<CreateTransactionRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let transaction = state
        .services
        .transactions
        .create_transaction(payload, PaymentMethod::Cash)
        .await?;
    Ok(created_response(transaction))
}

/// Gateway checkout: persists a pending transaction for session creation.
#[utoipa::path(
    post,
    path = "/api/v1/transactions/pending",
    request_body = CreatePendingTransactionRequest,
    responses(
        (status = 201, description = "Pending transaction created"),
        (status = 400, description = "Invalid cart or payment method", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    tag = "Transactions"
)]
pub async fn create_pending_transaction(
    State(state): State<AppState>,
    Json(payload): Json<CreatePendingTransactionRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    if payload.payment_method.is_cash() {
        return Err(ServiceError::ValidationError(
            "cash transactions settle synchronously; use POST /transactions".to_string(),
        ));
    }
    let transaction = state
        .services
        .transactions
        .create_transaction(payload.cart, payload.payment_method)
        .await?;
    Ok(created_response(transaction))
}

/// Cancels a transaction within the cancellation window.
#[utoipa::path(
    post,
    path = "/api/v1/transactions/{id}/cancel",
    params(("id" = Uuid, Path, description = "Transaction id")),
    request_body = CancelTransactionRequest,
    responses(
        (status = 200, description = "Transaction canceled"),
        (status = 400, description = "Reason missing", body = crate::errors::ErrorResponse),
        (status = 404, description = "Transaction not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Already canceled", body = crate::errors::ErrorResponse),
        (status = 422, description = "Cancellation window expired", body = crate::errors::ErrorResponse)
    ),
    tag = "Transactions"
)]
pub async fn cancel_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelTransactionRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let transaction = state
        .services
        .transactions
        .cancel(id, &payload.reason, payload.actor_id)
        .await?;
    Ok(success_response(transaction))
}

/// Receipt view of a single transaction.
#[utoipa::path(
    get,
    path = "/api/v1/transactions/{id}",
    params(("id" = Uuid, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Transaction with line items"),
        (status = 404, description = "Transaction not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Transactions"
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let detail = state.services.transactions.get_transaction(id).await?;
    Ok(success_response(detail))
}

/// Paginated transaction listing, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/transactions",
    params(PaginationParams),
    responses((status = 200, description = "Transactions page")),
    tag = "Transactions"
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = state
        .services
        .transactions
        .list_transactions(pagination.page, pagination.per_page)
        .await?;
    Ok(success_response(page))
}
