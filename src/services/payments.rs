//! Gateway session creation and the payment state machine.
//!
//! Webhook deliveries and manual status polls both funnel into
//! [`PaymentService::apply_payment_event`], which is idempotent: replaying
//! an event rewrites the same payment row and transition guards keyed on
//! the current transaction status prevent double completion or double
//! stock restoration.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::payment::{self, Entity as PaymentEntity};
use crate::entities::transaction::{self, Entity as TransactionEntity};
use crate::entities::transaction_item::{self, Entity as TransactionItemEntity};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::{
    self, CreateSessionRequest, CustomerDetails, GatewaySession, GatewayStatusReport,
    PaymentGateway,
};
use crate::models::{PaymentStatus, TransactionStatus};
use crate::services::transactions::parse_status;

const FRAUD_CHALLENGE: &str = "challenge";

/// Webhook notification body pushed by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookNotification {
    pub order_id: String,
    pub status_code: String,
    pub gross_amount: String,
    pub signature_key: String,
    #[schema(value_type = String)]
    pub transaction_status: gateway::GatewayTransactionStatus,
    pub fraud_status: Option<String>,
    pub transaction_id: Option<String>,
    pub payment_type: Option<String>,
}

#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DbPool>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: EventSender,
    server_key: String,
    enabled_payments: Vec<String>,
}

impl PaymentService {
    pub fn new(
        db: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: EventSender,
        server_key: String,
        enabled_payments: Vec<String>,
    ) -> Self {
        Self {
            db,
            gateway,
            event_sender,
            server_key,
            enabled_payments,
        }
    }

    /// Opens a hosted-payment session for a pending gateway transaction and
    /// records the payment row. A gateway failure surfaces to the caller
    /// but leaves the pending transaction in place for retry or cancel.
    #[instrument(skip(self, customer), fields(transaction_id = %transaction_id))]
    pub async fn create_session(
        &self,
        transaction_id: Uuid,
        customer: CustomerDetails,
    ) -> Result<GatewaySession, ServiceError> {
        let model = TransactionEntity::find_by_id(transaction_id)
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::TransactionNotFound(transaction_id.to_string()))?;

        if parse_status(&model.status)? != TransactionStatus::Pending {
            return Err(ServiceError::ValidationError(format!(
                "transaction {} is not awaiting payment",
                transaction_id
            )));
        }

        let session = self
            .gateway
            .create_session(CreateSessionRequest {
                order_id: model.invoice_number.clone(),
                gross_amount: model.total_amount,
                customer,
                enabled_payments: self.enabled_payments.clone(),
            })
            .await?;

        let now = Utc::now();
        match PaymentEntity::find()
            .filter(payment::Column::TransactionId.eq(transaction_id))
            .one(&*self.db)
            .await?
        {
            Some(existing) => {
                let mut active: payment::ActiveModel = existing.into();
                active.token = Set(Some(session.token.clone()));
                active.redirect_url = Set(Some(session.redirect_url.clone()));
                active.updated_at = Set(Some(now));
                active.update(&*self.db).await?;
            }
            None => {
                payment::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    transaction_id: Set(transaction_id),
                    gateway_order_id: Set(model.invoice_number.clone()),
                    gateway_transaction_id: Set(None),
                    payment_type: Set(model.payment_method.clone()),
                    amount: Set(model.total_amount),
                    status: Set(PaymentStatus::Pending.to_string()),
                    fraud_status: Set(None),
                    token: Set(Some(session.token.clone())),
                    redirect_url: Set(Some(session.redirect_url.clone())),
                    raw_response: Set(serde_json::json!({})),
                    created_at: Set(now),
                    updated_at: Set(None),
                }
                .insert(&*self.db)
                .await?;
            }
        }

        self.event_sender
            .emit(Event::GatewaySessionCreated { transaction_id })
            .await;
        info!(invoice = %model.invoice_number, "Gateway session created");
        Ok(session)
    }

    /// Verifies a webhook payload's signature and applies it. Invalid
    /// signatures reject before any state change; an unknown order id is
    /// logged and acknowledged so the gateway stops retrying.
    #[instrument(skip(self, notification, raw))]
    pub async fn handle_webhook(
        &self,
        notification: WebhookNotification,
        raw: serde_json::Value,
    ) -> Result<(), ServiceError> {
        if !gateway::verify_signature(
            &notification.order_id,
            &notification.status_code,
            &notification.gross_amount,
            &notification.signature_key,
            &self.server_key,
        ) {
            warn!(order_id = %notification.order_id, "Webhook signature verification failed");
            return Err(ServiceError::InvalidWebhookSignature);
        }

        let report = GatewayStatusReport {
            order_id: notification.order_id,
            transaction_id: notification.transaction_id,
            transaction_status: notification.transaction_status,
            fraud_status: notification.fraud_status,
            payment_type: notification.payment_type,
        };

        match self.apply_payment_event(&report, Some(raw)).await {
            Ok(_) => Ok(()),
            Err(ServiceError::TransactionNotFound(_)) => {
                warn!(order_id = %report.order_id, "Webhook for unknown order acknowledged");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Polls the gateway for an order and applies the result through the
    /// same state machine as the webhook path.
    #[instrument(skip(self))]
    pub async fn poll_status(&self, order_id: &str) -> Result<PaymentStatus, ServiceError> {
        let report = self.gateway.fetch_status(order_id).await?;
        self.apply_payment_event(&report, None).await
    }

    /// The state machine proper. One atomic write-set per event: payment
    /// row upsert plus at most one transaction transition. Transitions are
    /// claimed with a conditional update on the stored status, so two
    /// concurrently delivered events for the same order cannot both
    /// complete the transaction or both restore its stock.
    async fn apply_payment_event(
        &self,
        report: &GatewayStatusReport,
        raw: Option<serde_json::Value>,
    ) -> Result<PaymentStatus, ServiceError> {
        let mapped = gateway::map_gateway_status(report.transaction_status);
        let challenged = report.fraud_status.as_deref() == Some(FRAUD_CHALLENGE);
        // A challenged capture is recorded as pending until fraud review
        // resolves it.
        let recorded = if challenged && mapped == PaymentStatus::Paid {
            PaymentStatus::Pending
        } else {
            mapped
        };
        let now = Utc::now();

        let txn = self.db.begin().await?;

        let model = TransactionEntity::find()
            .filter(transaction::Column::InvoiceNumber.eq(report.order_id.clone()))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::TransactionNotFound(report.order_id.clone()))?;

        let current = parse_status(&model.status)?;
        let old_payment_status = model.payment_status.clone();
        let transaction_id = model.id;
        let version = model.version;

        // Payment row converges on the same state however often the event
        // is replayed.
        self.upsert_payment(&txn, &model, report, recorded, now, raw)
            .await?;

        let mut completed = false;
        let mut restored: Vec<(Uuid, i32)> = Vec::new();

        match (mapped, current) {
            (PaymentStatus::Paid, TransactionStatus::Pending) if challenged => {
                // Needs manual review; hold the transaction open.
                info!(%transaction_id, "Payment challenged by fraud review, staying pending");
            }
            (PaymentStatus::Paid, TransactionStatus::Pending) => {
                let result = TransactionEntity::update_many()
                    .col_expr(
                        transaction::Column::Status,
                        Expr::value(TransactionStatus::Completed.to_string()),
                    )
                    .col_expr(
                        transaction::Column::PaymentStatus,
                        Expr::value(PaymentStatus::Paid.to_string()),
                    )
                    .col_expr(transaction::Column::PaidAt, Expr::value(now))
                    .col_expr(transaction::Column::Version, Expr::value(version + 1))
                    .filter(transaction::Column::Id.eq(transaction_id))
                    .filter(
                        transaction::Column::Status.eq(TransactionStatus::Pending.to_string()),
                    )
                    .exec(&txn)
                    .await?;
                completed = result.rows_affected == 1;
            }
            (PaymentStatus::Failed | PaymentStatus::Expired, TransactionStatus::Pending) => {
                // Claim the cancellation before touching stock; of two
                // racing events, only the one whose update matched performs
                // the restore.
                let result = TransactionEntity::update_many()
                    .col_expr(
                        transaction::Column::Status,
                        Expr::value(TransactionStatus::Canceled.to_string()),
                    )
                    .col_expr(
                        transaction::Column::PaymentStatus,
                        Expr::value(mapped.to_string()),
                    )
                    .col_expr(transaction::Column::CanceledAt, Expr::value(now))
                    .col_expr(transaction::Column::Version, Expr::value(version + 1))
                    .filter(transaction::Column::Id.eq(transaction_id))
                    .filter(
                        transaction::Column::Status.eq(TransactionStatus::Pending.to_string()),
                    )
                    .exec(&txn)
                    .await?;

                if result.rows_affected == 1 {
                    let items = TransactionItemEntity::find()
                        .filter(transaction_item::Column::TransactionId.eq(transaction_id))
                        .all(&txn)
                        .await?;
                    for item in &items {
                        crate::services::inventory::restore(&txn, item.product_id, item.quantity)
                            .await?;
                        restored.push((item.product_id, item.quantity));
                    }
                }
            }
            _ => {
                // Terminal or unchanged transaction; the payment row update
                // above is the whole effect.
            }
        }

        txn.commit().await?;

        let new_payment_status = recorded.to_string();
        if old_payment_status != new_payment_status {
            self.event_sender
                .emit(Event::PaymentStatusChanged {
                    transaction_id,
                    old_status: old_payment_status,
                    new_status: new_payment_status,
                })
                .await;
        }
        if completed {
            self.event_sender
                .emit(Event::TransactionCompleted { transaction_id })
                .await;
        }
        for (product_id, quantity) in restored {
            self.event_sender
                .emit(Event::StockRestored {
                    product_id,
                    quantity,
                })
                .await;
        }

        Ok(recorded)
    }

    /// `status` is the challenge-adjusted status to record, not the raw
    /// gateway mapping.
    async fn upsert_payment<C: sea_orm::ConnectionTrait>(
        &self,
        db: &C,
        model: &transaction::Model,
        report: &GatewayStatusReport,
        status: PaymentStatus,
        now: chrono::DateTime<Utc>,
        raw: Option<serde_json::Value>,
    ) -> Result<(), ServiceError> {
        match PaymentEntity::find()
            .filter(payment::Column::TransactionId.eq(model.id))
            .one(db)
            .await?
        {
            Some(existing) => {
                let mut active: payment::ActiveModel = existing.into();
                active.gateway_transaction_id = Set(report.transaction_id.clone());
                active.status = Set(status.to_string());
                active.fraud_status = Set(report.fraud_status.clone());
                if let Some(payment_type) = &report.payment_type {
                    active.payment_type = Set(payment_type.clone());
                }
                if let Some(raw) = raw {
                    active.raw_response = Set(raw);
                }
                active.updated_at = Set(Some(now));
                active.update(db).await?;
            }
            None => {
                payment::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    transaction_id: Set(model.id),
                    gateway_order_id: Set(report.order_id.clone()),
                    gateway_transaction_id: Set(report.transaction_id.clone()),
                    payment_type: Set(report
                        .payment_type
                        .clone()
                        .unwrap_or_else(|| model.payment_method.clone())),
                    amount: Set(model.total_amount),
                    status: Set(status.to_string()),
                    fraud_status: Set(report.fraud_status.clone()),
                    token: Set(None),
                    redirect_url: Set(None),
                    raw_response: Set(raw.unwrap_or_else(|| serde_json::json!({}))),
                    created_at: Set(now),
                    updated_at: Set(None),
                }
                .insert(db)
                .await?;
            }
        }
        Ok(())
    }
}
