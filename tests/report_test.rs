//! Integration tests for the daily sales rollup.

mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, TestApp};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn daily_report_counts_only_completed_transactions() {
    let app = TestApp::new().await;
    let product_id = app.seed_product("Kopi Tubruk", 10_000, 20).await;
    let cashier = Uuid::new_v4();

    // Two completed cash sales, one with a discount.
    for discount in [None, Some(json!({ "kind": "nominal", "value": 2000 }))] {
        let mut body = json!({
            "items": [{ "product_id": product_id, "quantity": 2 }],
            "cashier_id": cashier
        });
        if let Some(d) = discount {
            body["discount"] = d;
        }
        let response = app
            .request(Method::POST, "/api/v1/transactions", Some(body))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    // One still-pending gateway checkout that must not count.
    let pending = app
        .request(
            Method::POST,
            "/api/v1/transactions/pending",
            Some(json!({
                "items": [{ "product_id": product_id, "quantity": 1 }],
                "cashier_id": cashier,
                "payment_method": "qris"
            })),
        )
        .await;
    assert_eq!(pending.status(), StatusCode::CREATED);

    let report = app
        .request(Method::GET, "/api/v1/reports/sales/daily", None)
        .await;
    assert_eq!(report.status(), StatusCode::OK);
    let body = response_json(report).await;

    assert_eq!(body["total_transactions"], 2);
    assert_eq!(body["gross_sales"], 40_000);
    assert_eq!(body["discount_total"], 2_000);
    assert_eq!(body["net_sales"], 38_000);
    assert_eq!(body["by_payment_method"]["cash"], 38_000);
    assert!(body["by_payment_method"].get("qris").is_none());
}

#[tokio::test]
async fn report_for_an_empty_day_is_all_zeroes() {
    let app = TestApp::new().await;
    let report = app
        .request(
            Method::GET,
            "/api/v1/reports/sales/daily?date=2020-01-01",
            None,
        )
        .await;
    assert_eq!(report.status(), StatusCode::OK);
    let body = response_json(report).await;
    assert_eq!(body["date"], "2020-01-01");
    assert_eq!(body["total_transactions"], 0);
    assert_eq!(body["net_sales"], 0);
}
