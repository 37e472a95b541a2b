//! Kasira API Library
//!
//! Core functionality for the Kasira point-of-sale backend: transaction
//! checkout, stock tracking, payment-gateway integration, and reporting.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod discount;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod migrator;
pub mod models;
pub mod openapi;
pub mod services;

use axum::{
    routing::{get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

/// Versioned API routes.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        // Transactions
        .route(
            "/transactions",
            post(handlers::transactions::create_cash_transaction)
                .get(handlers::transactions::list_transactions),
        )
        .route(
            "/transactions/pending",
            post(handlers::transactions::create_pending_transaction),
        )
        .route(
            "/transactions/:id",
            get(handlers::transactions::get_transaction),
        )
        .route(
            "/transactions/:id/cancel",
            post(handlers::transactions::cancel_transaction),
        )
        // Payments
        .route("/payment/create", post(handlers::payments::create_payment))
        .route("/payment/webhook", post(handlers::payments::payment_webhook))
        .route(
            "/payment/status/:order_id",
            get(handlers::payments::payment_status),
        )
        // Reports
        .route(
            "/reports/sales/daily",
            get(handlers::reports::daily_sales_report),
        )
}
