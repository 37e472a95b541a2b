use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    gateway::CustomerDetails,
    handlers::common::success_response,
    services::payments::WebhookNotification,
    AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePaymentRequest {
    pub transaction_id: Uuid,
    #[serde(default)]
    pub customer_details: CustomerDetails,
}

/// Opens a hosted-payment session for a pending transaction.
#[utoipa::path(
    post,
    path = "/api/v1/payment/create",
    request_body = CreatePaymentRequest,
    responses(
        (status = 200, description = "Gateway session token and redirect URL"),
        (status = 404, description = "Transaction not found", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway session failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn create_payment(
    State(state): State<AppState>,
    Json(payload): Json<CreatePaymentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let session = state
        .services
        .payments
        .create_session(payload.transaction_id, payload.customer_details)
        .await?;
    Ok(success_response(session))
}

/// Gateway-pushed payment notification. Signature-checked payloads are
/// always acknowledged with `{"success": true}` so the gateway does not
/// retry-storm; invalid signatures get a generic rejection before any
/// state change.
#[utoipa::path(
    post,
    path = "/api/v1/payment/webhook",
    request_body = WebhookNotification,
    responses(
        (status = 200, description = "Notification acknowledged"),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    Json(raw): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ServiceError> {
    let notification: WebhookNotification = serde_json::from_value(raw.clone())
        .map_err(|e| ServiceError::ValidationError(format!("invalid webhook payload: {}", e)))?;

    match state.services.payments.handle_webhook(notification, raw).await {
        Ok(()) => {}
        Err(ServiceError::InvalidWebhookSignature) => {
            return Err(ServiceError::InvalidWebhookSignature);
        }
        Err(e) => {
            // Processing failures are logged but still acknowledged; the
            // gateway will not learn anything useful from a 5xx and would
            // only hammer the endpoint with retries.
            warn!(error = %e, "Webhook processing failed, acknowledging anyway");
        }
    }
    Ok(success_response(json!({ "success": true })))
}

/// Manual status poll; applies the same state machine as the webhook.
#[utoipa::path(
    get,
    path = "/api/v1/payment/status/{order_id}",
    params(("order_id" = String, Path, description = "Gateway order id (invoice number)")),
    responses(
        (status = 200, description = "Mapped payment status"),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway unreachable", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_status(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let status = state.services.payments.poll_status(&order_id).await?;
    Ok(success_response(json!({
        "order_id": order_id,
        "payment_status": status,
    })))
}
