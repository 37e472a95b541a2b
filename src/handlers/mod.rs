use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    gateway::PaymentGateway,
    services::{
        payments::PaymentService, reports::ReportService, transactions::TransactionService,
    },
};

pub mod common;
pub mod health;
pub mod payments;
pub mod reports;
pub mod transactions;

/// Service container threaded through handlers via `AppState`.
#[derive(Clone)]
pub struct AppServices {
    pub transactions: Arc<TransactionService>,
    pub payments: Arc<PaymentService>,
    pub reports: Arc<ReportService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: EventSender,
        config: &AppConfig,
    ) -> Self {
        Self {
            transactions: Arc::new(TransactionService::new(
                db.clone(),
                event_sender.clone(),
                config.cancel_window_hours,
            )),
            payments: Arc::new(PaymentService::new(
                db.clone(),
                gateway,
                event_sender,
                config.gateway_server_key.clone(),
                config.enabled_payments(),
            )),
            reports: Arc::new(ReportService::new(db)),
        }
    }
}
