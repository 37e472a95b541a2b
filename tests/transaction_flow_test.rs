//! Integration tests for the checkout and cancellation flow.

mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use common::{response_json, TestApp};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::json;
use uuid::Uuid;

use kasira_api::entities::{transaction, transaction_cancel_log};

#[tokio::test]
async fn cash_checkout_applies_order_discount() {
    let app = TestApp::new().await;
    let product_id = app.seed_product("Kopi Susu", 25_000, 10).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/transactions",
            Some(json!({
                "items": [{ "product_id": product_id, "quantity": 2 }],
                "cashier_id": Uuid::new_v4(),
                "discount": { "kind": "percentage", "value": 10 }
            })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["subtotal"], 50_000);
    assert_eq!(body["discount_amount"], 5_000);
    assert_eq!(body["total_amount"], 45_000);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["payment_status"], "paid");
    assert_eq!(body["payment_method"], "cash");

    assert_eq!(app.stock_of(product_id).await, 8);
}

#[tokio::test]
async fn insufficient_stock_leaves_no_partial_state() {
    let app = TestApp::new().await;
    let scarce = app.seed_product("Teh Botol", 5_000, 1).await;
    let plenty = app.seed_product("Roti Bakar", 12_000, 10).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/transactions",
            Some(json!({
                "items": [
                    { "product_id": plenty, "quantity": 2 },
                    { "product_id": scarce, "quantity": 5 }
                ],
                "cashier_id": Uuid::new_v4()
            })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = response_json(response).await;
    assert!(body["message"].as_str().unwrap().contains("Teh Botol"));

    // Nothing written, nothing decremented.
    assert_eq!(app.stock_of(scarce).await, 1);
    assert_eq!(app.stock_of(plenty).await, 10);
    let list = app
        .request(Method::GET, "/api/v1/transactions", None)
        .await;
    assert_eq!(response_json(list).await["total"], 0);
}

#[tokio::test]
async fn invoice_numbers_increment_within_the_day() {
    let app = TestApp::new().await;
    let product_id = app.seed_product("Nasi Goreng", 20_000, 10).await;

    let mut invoices = Vec::new();
    for _ in 0..2 {
        let response = app
            .request(
                Method::POST,
                "/api/v1/transactions",
                Some(json!({
                    "items": [{ "product_id": product_id, "quantity": 1 }],
                    "cashier_id": Uuid::new_v4()
                })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = response_json(response).await;
        invoices.push(body["invoice_number"].as_str().unwrap().to_string());
    }

    let today = Utc::now().format("%Y%m%d").to_string();
    assert_eq!(invoices[0], format!("INV-{}-0001", today));
    assert_eq!(invoices[1], format!("INV-{}-0002", today));
}

#[tokio::test]
async fn cancel_restores_stock_and_writes_one_log_row() {
    let app = TestApp::new().await;
    let product_id = app.seed_product("Es Teh", 8_000, 10).await;
    let actor = Uuid::new_v4();

    let response = app
        .request(
            Method::POST,
            "/api/v1/transactions",
            Some(json!({
                "items": [{ "product_id": product_id, "quantity": 3 }],
                "cashier_id": actor
            })),
        )
        .await;
    let transaction_id = response_json(response).await["id"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(app.stock_of(product_id).await, 7);

    let cancel = app
        .request(
            Method::POST,
            &format!("/api/v1/transactions/{}/cancel", transaction_id),
            Some(json!({ "reason": "customer changed their mind", "actor_id": actor })),
        )
        .await;
    assert_eq!(cancel.status(), StatusCode::OK);
    let body = response_json(cancel).await;
    assert_eq!(body["status"], "canceled");
    assert_eq!(app.stock_of(product_id).await, 10);

    let logs = transaction_cancel_log::Entity::find()
        .filter(
            transaction_cancel_log::Column::TransactionId
                .eq(Uuid::parse_str(&transaction_id).unwrap()),
        )
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].reason, "customer changed their mind");

    // A second cancel is a conflict, not a double restore.
    let again = app
        .request(
            Method::POST,
            &format!("/api/v1/transactions/{}/cancel", transaction_id),
            Some(json!({ "reason": "double tap", "actor_id": actor })),
        )
        .await;
    assert_eq!(again.status(), StatusCode::CONFLICT);
    assert_eq!(app.stock_of(product_id).await, 10);
}

#[tokio::test]
async fn cancel_requires_a_reason() {
    let app = TestApp::new().await;
    let product_id = app.seed_product("Pisang Goreng", 6_000, 5).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/transactions",
            Some(json!({
                "items": [{ "product_id": product_id, "quantity": 1 }],
                "cashier_id": Uuid::new_v4()
            })),
        )
        .await;
    let transaction_id = response_json(response).await["id"]
        .as_str()
        .unwrap()
        .to_string();

    let cancel = app
        .request(
            Method::POST,
            &format!("/api/v1/transactions/{}/cancel", transaction_id),
            Some(json!({ "reason": "   ", "actor_id": Uuid::new_v4() })),
        )
        .await;
    assert_eq!(cancel.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.stock_of(product_id).await, 4);
}

#[tokio::test]
async fn cancel_window_closes_after_24_hours() {
    let app = TestApp::new().await;
    let product_id = app.seed_product("Bakso", 15_000, 5).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/transactions",
            Some(json!({
                "items": [{ "product_id": product_id, "quantity": 1 }],
                "cashier_id": Uuid::new_v4()
            })),
        )
        .await;
    let transaction_id =
        Uuid::parse_str(response_json(response).await["id"].as_str().unwrap()).unwrap();

    // Age the transaction past the window.
    let model = transaction::Entity::find_by_id(transaction_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    let mut active: transaction::ActiveModel = model.into();
    active.created_at = Set(Utc::now() - Duration::hours(25));
    active.update(&*app.state.db).await.unwrap();

    let cancel = app
        .request(
            Method::POST,
            &format!("/api/v1/transactions/{}/cancel", transaction_id),
            Some(json!({ "reason": "too late", "actor_id": Uuid::new_v4() })),
        )
        .await;
    assert_eq!(cancel.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.stock_of(product_id).await, 4);
}

#[tokio::test]
async fn unknown_transaction_is_not_found() {
    let app = TestApp::new().await;
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/transactions/{}", Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn pending_endpoint_rejects_cash() {
    let app = TestApp::new().await;
    let product_id = app.seed_product("Mie Ayam", 13_000, 5).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/transactions/pending",
            Some(json!({
                "items": [{ "product_id": product_id, "quantity": 1 }],
                "cashier_id": Uuid::new_v4(),
                "payment_method": "cash"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.stock_of(product_id).await, 5);
}

#[tokio::test]
async fn duplicate_cart_lines_are_rejected() {
    let app = TestApp::new().await;
    let product_id = app.seed_product("Sate Ayam", 22_000, 10).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/transactions",
            Some(json!({
                "items": [
                    { "product_id": product_id, "quantity": 1 },
                    { "product_id": product_id, "quantity": 2 }
                ],
                "cashier_id": Uuid::new_v4()
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.stock_of(product_id).await, 10);
}

#[tokio::test]
async fn receipt_view_snapshots_line_items() {
    let app = TestApp::new().await;
    let product_id = app.seed_product("Ayam Geprek", 18_000, 10).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/transactions",
            Some(json!({
                "items": [{
                    "product_id": product_id,
                    "quantity": 2,
                    "discount": { "kind": "nominal", "value": 1000 }
                }],
                "cashier_id": Uuid::new_v4()
            })),
        )
        .await;
    let transaction_id = response_json(response).await["id"]
        .as_str()
        .unwrap()
        .to_string();

    let detail = app
        .request(
            Method::GET,
            &format!("/api/v1/transactions/{}", transaction_id),
            None,
        )
        .await;
    assert_eq!(detail.status(), StatusCode::OK);
    let body = response_json(detail).await;
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["product_name"], "Ayam Geprek");
    assert_eq!(items[0]["unit_price"], 18_000);
    assert_eq!(items[0]["subtotal"], 36_000);
    assert_eq!(items[0]["discount_amount"], 1_000);
    assert_eq!(items[0]["total"], 35_000);
    assert_eq!(body["total_amount"], 35_000);
}
