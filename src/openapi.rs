use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Kasira API",
        version = "1.0.0",
        description = r#"
# Kasira Point-of-Sale API

Backend for a retail point-of-sale: transaction checkout (cash and hosted
payment gateway), stock tracking, cancellations with a 24-hour window, and
daily sales reporting.

## Error Handling

Errors share a consistent envelope:

```json
{
  "error": "Insufficient stock",
  "message": "insufficient stock for Kopi Susu: requested 5, available 2",
  "timestamp": "2024-03-01T00:00:00Z"
}
```

## Pagination

List endpoints accept `page` (default 1) and `per_page` (default 20).
        "#
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Transactions", description = "Checkout and cancellation endpoints"),
        (name = "Payments", description = "Gateway session and notification endpoints"),
        (name = "Reports", description = "Sales aggregation endpoints"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        // Transactions
        crate::handlers::transactions::create_cash_transaction,
        crate::handlers::transactions::create_pending_transaction,
        crate::handlers::transactions::cancel_transaction,
        crate::handlers::transactions::get_transaction,
        crate::handlers::transactions::list_transactions,

        // Payments
        crate::handlers::payments::create_payment,
        crate::handlers::payments::payment_webhook,
        crate::handlers::payments::payment_status,

        // Reports
        crate::handlers::reports::daily_sales_report,

        // Health
        crate::handlers::health::health_check,
        crate::handlers::health::readiness_check,
    ),
    components(
        schemas(
            // Transaction types
            crate::services::transactions::CartItemRequest,
            crate::services::transactions::CreateTransactionRequest,
            crate::services::transactions::TransactionResponse,
            crate::services::transactions::TransactionItemResponse,
            crate::services::transactions::TransactionDetailResponse,
            crate::services::transactions::TransactionListResponse,
            crate::handlers::transactions::CreatePendingTransactionRequest,
            crate::handlers::transactions::CancelTransactionRequest,

            // Payment types
            crate::handlers::payments::CreatePaymentRequest,
            crate::services::payments::WebhookNotification,
            crate::gateway::CustomerDetails,
            crate::gateway::GatewaySession,

            // Discount types
            crate::discount::DiscountSpec,
            crate::discount::DiscountKind,

            // Report types
            crate::services::reports::DailySalesReport,

            // Shared enums
            crate::models::PaymentMethod,
            crate::models::TransactionStatus,
            crate::models::PaymentStatus,

            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_generates() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Kasira"));
        assert!(json.contains("/api/v1/transactions"));
        assert!(json.contains("/api/v1/payment/webhook"));
    }
}
