//! Transaction ledger: converts a cart into a persisted transaction with
//! line items and decremented stock, and owns the explicit cancel path.
//!
//! Every write-set here runs inside one database transaction; a failure on
//! any step leaves no partial state behind.

use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::discount::{self, DiscountSpec};
use crate::entities::payment;
use crate::entities::product::{self, Entity as ProductEntity};
use crate::entities::transaction::{
    self, ActiveModel as TransactionActiveModel, Entity as TransactionEntity,
    Model as TransactionModel,
};
use crate::entities::transaction_cancel_log;
use crate::entities::transaction_item::{self, Entity as TransactionItemEntity};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{PaymentMethod, PaymentStatus, TransactionStatus};
use crate::services::inventory;

const INVOICE_RETRY_ATTEMPTS: u32 = 3;

/// One cart line. `price` overrides the catalog unit price when set, so a
/// cashier override survives on the receipt snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct CartItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    pub price: Option<i64>,
    pub discount: Option<DiscountSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct CreateTransactionRequest {
    #[validate(length(min = 1, message = "Cart must contain at least one item"))]
    pub items: Vec<CartItemRequest>,
    pub cashier_id: Uuid,
    pub discount: Option<DiscountSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub invoice_number: String,
    pub cashier_id: Uuid,
    pub status: TransactionStatus,
    pub payment_method: String,
    pub payment_status: PaymentStatus,
    pub subtotal: i64,
    pub discount_amount: i64,
    pub total_amount: i64,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionItemResponse {
    pub product_id: Uuid,
    pub product_name: String,
    pub unit_price: i64,
    pub quantity: i32,
    pub discount_amount: i64,
    pub subtotal: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionDetailResponse {
    #[serde(flatten)]
    pub transaction: TransactionResponse,
    pub items: Vec<TransactionItemResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionListResponse {
    pub transactions: Vec<TransactionResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Priced view of one cart line after catalog lookup and per-item discount.
struct PricedLine {
    product_id: Uuid,
    product_name: String,
    unit_price: i64,
    quantity: i32,
    discount_amount: i64,
    discounted_price: i64,
    subtotal: i64,
}

#[derive(Clone)]
pub struct TransactionService {
    db: Arc<DbPool>,
    event_sender: EventSender,
    cancel_window_hours: i64,
}

impl TransactionService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender, cancel_window_hours: i64) -> Self {
        Self {
            db,
            event_sender,
            cancel_window_hours,
        }
    }

    /// Creates a transaction from a cart. Cash completes synchronously;
    /// gateway methods persist as pending with stock already committed.
    #[instrument(skip(self, request), fields(cashier_id = %request.cashier_id, method = %method))]
    pub async fn create_transaction(
        &self,
        request: CreateTransactionRequest,
        method: PaymentMethod,
    ) -> Result<TransactionResponse, ServiceError> {
        request.validate()?;
        validate_cart(&request.items)?;

        let lines = self.price_cart(&request.items).await?;
        let items_subtotal: i64 = lines.iter().map(|l| l.discounted_price).sum();
        let order_discount = discount::apply(items_subtotal, request.discount);
        let total_amount = order_discount.final_amount;

        for attempt in 0..INVOICE_RETRY_ATTEMPTS {
            let invoice_number = self.next_invoice_number().await?;
            match self
                .persist_transaction(
                    &request,
                    method,
                    &lines,
                    items_subtotal,
                    total_amount,
                    order_discount.discount_amount,
                    &invoice_number,
                )
                .await
            {
                Ok(model) => {
                    self.event_sender
                        .emit(Event::TransactionCreated {
                            transaction_id: model.id,
                            invoice_number: model.invoice_number.clone(),
                            total_amount: model.total_amount,
                        })
                        .await;
                    for line in &lines {
                        self.event_sender
                            .emit(Event::StockDecremented {
                                product_id: line.product_id,
                                quantity: line.quantity,
                            })
                            .await;
                    }
                    if method.is_cash() {
                        self.event_sender
                            .emit(Event::TransactionCompleted {
                                transaction_id: model.id,
                            })
                            .await;
                    }
                    info!(transaction_id = %model.id, invoice = %model.invoice_number, "Transaction created");
                    return model_to_response(model);
                }
                Err(e) if is_unique_violation(&e) => {
                    warn!(attempt, "Invoice number collision, regenerating");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        error!("Invoice sequence exhausted retries");
        Err(ServiceError::InvoiceCollision)
    }

    /// Cancels a transaction inside the cancellation window, restoring each
    /// item's stock and appending exactly one cancel-log row.
    #[instrument(skip(self, reason), fields(transaction_id = %transaction_id, actor = %actor))]
    pub async fn cancel(
        &self,
        transaction_id: Uuid,
        reason: &str,
        actor: Uuid,
    ) -> Result<TransactionResponse, ServiceError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ServiceError::ReasonRequired);
        }

        let now = Utc::now();
        let txn = self.db.begin().await?;

        let model = TransactionEntity::find_by_id(transaction_id)
            .one(&txn)
            .await?
            .ok_or(ServiceError::TransactionNotFound(transaction_id.to_string()))?;

        let status = parse_status(&model.status)?;
        if status == TransactionStatus::Canceled {
            return Err(ServiceError::AlreadyCanceled(transaction_id));
        }
        if now - model.created_at > Duration::hours(self.cancel_window_hours) {
            return Err(ServiceError::CancelWindowExpired(self.cancel_window_hours));
        }

        // Claim the cancellation before touching stock. The status guard
        // makes a cancel racing a failed-payment event restore exactly
        // once: whichever transition matched the stored status wins, the
        // other sees zero rows affected.
        let result = TransactionEntity::update_many()
            .col_expr(
                transaction::Column::Status,
                Expr::value(TransactionStatus::Canceled.to_string()),
            )
            .col_expr(transaction::Column::CanceledAt, Expr::value(now))
            .col_expr(transaction::Column::CanceledBy, Expr::value(actor))
            .col_expr(transaction::Column::Version, Expr::value(model.version + 1))
            .filter(transaction::Column::Id.eq(transaction_id))
            .filter(transaction::Column::Status.ne(TransactionStatus::Canceled.to_string()))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::AlreadyCanceled(transaction_id));
        }

        let items = TransactionItemEntity::find()
            .filter(transaction_item::Column::TransactionId.eq(transaction_id))
            .all(&txn)
            .await?;
        for item in &items {
            inventory::restore(&txn, item.product_id, item.quantity).await?;
        }

        transaction_cancel_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            transaction_id: Set(transaction_id),
            reason: Set(reason.to_string()),
            canceled_by: Set(actor),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let updated = TransactionEntity::find_by_id(transaction_id)
            .one(&txn)
            .await?
            .ok_or(ServiceError::TransactionNotFound(transaction_id.to_string()))?;

        txn.commit().await?;

        for item in &items {
            self.event_sender
                .emit(Event::StockRestored {
                    product_id: item.product_id,
                    quantity: item.quantity,
                })
                .await;
        }
        self.event_sender
            .emit(Event::TransactionCanceled {
                transaction_id,
                reason: reason.to_string(),
            })
            .await;

        info!(transaction_id = %transaction_id, "Transaction canceled");
        model_to_response(updated)
    }

    /// Receipt view: transaction plus its immutable line items.
    #[instrument(skip(self))]
    pub async fn get_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<TransactionDetailResponse, ServiceError> {
        let model = TransactionEntity::find_by_id(transaction_id)
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::TransactionNotFound(transaction_id.to_string()))?;

        let items = TransactionItemEntity::find()
            .filter(transaction_item::Column::TransactionId.eq(transaction_id))
            .all(&*self.db)
            .await?;

        Ok(TransactionDetailResponse {
            transaction: model_to_response(model)?,
            items: items.into_iter().map(item_to_response).collect(),
        })
    }

    /// Lists transactions for reporting, newest first.
    #[instrument(skip(self))]
    pub async fn list_transactions(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<TransactionListResponse, ServiceError> {
        let paginator = TransactionEntity::find()
            .order_by_desc(transaction::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let models = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok(TransactionListResponse {
            transactions: models
                .into_iter()
                .map(model_to_response)
                .collect::<Result<_, _>>()?,
            total,
            page,
            per_page,
        })
    }

    /// Looks up a transaction by its gateway order id (the invoice number).
    pub async fn find_by_invoice(
        &self,
        invoice_number: &str,
    ) -> Result<Option<TransactionModel>, ServiceError> {
        let model = TransactionEntity::find()
            .filter(transaction::Column::InvoiceNumber.eq(invoice_number))
            .one(&*self.db)
            .await?;
        Ok(model)
    }

    /// Resolves cart lines against the catalog: active products only, unit
    /// price snapshots, per-item discounts applied, availability pre-checked
    /// in one read. The conditional decrement at persist time is the
    /// authoritative guard; this check exists to fail fast with a named
    /// product before any write.
    async fn price_cart(
        &self,
        items: &[CartItemRequest],
    ) -> Result<Vec<PricedLine>, ServiceError> {
        let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let products = ProductEntity::find()
            .filter(product::Column::Id.is_in(product_ids.clone()))
            .all(&*self.db)
            .await?;
        let stocks = inventory::load_many(&*self.db, &product_ids).await?;

        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            let product = products
                .iter()
                .find(|p| p.id == item.product_id)
                .ok_or_else(|| {
                    ServiceError::ProductUnavailable(format!(
                        "product {} does not exist",
                        item.product_id
                    ))
                })?;
            if !product.is_active {
                return Err(ServiceError::ProductUnavailable(format!(
                    "{} is no longer sold",
                    product.name
                )));
            }

            let on_hand = stocks
                .iter()
                .find(|s| s.product_id == item.product_id)
                .map(|s| s.quantity)
                .unwrap_or(0);
            if on_hand < item.quantity {
                return Err(ServiceError::InsufficientStock {
                    product: product.name.clone(),
                    requested: item.quantity,
                    available: on_hand,
                });
            }

            let unit_price = item.price.unwrap_or(product.price);
            let base = unit_price * item.quantity as i64;
            let outcome = discount::apply(base, item.discount);
            lines.push(PricedLine {
                product_id: product.id,
                product_name: product.name.clone(),
                unit_price,
                quantity: item.quantity,
                discount_amount: outcome.discount_amount,
                discounted_price: outcome.final_amount,
                subtotal: base,
            });
        }
        Ok(lines)
    }

    /// Next `INV-{YYYYMMDD}-{NNNN}` number: same-day count plus one. Racy by
    /// construction; the unique index on `invoice_number` turns a lost race
    /// into a retried conflict.
    async fn next_invoice_number(&self) -> Result<String, ServiceError> {
        let now = Utc::now();
        let day_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| ServiceError::InternalError("invalid day start".into()))?
            .and_utc();

        let count = TransactionEntity::find()
            .filter(transaction::Column::CreatedAt.gte(day_start))
            .count(&*self.db)
            .await?;

        Ok(format!(
            "INV-{}-{:04}",
            now.format("%Y%m%d"),
            count + 1
        ))
    }

    /// The atomic write-set: transaction row, line items, conditional stock
    /// decrements, and for cash a settled payment record.
    #[allow(clippy::too_many_arguments)]
    async fn persist_transaction(
        &self,
        request: &CreateTransactionRequest,
        method: PaymentMethod,
        lines: &[PricedLine],
        subtotal: i64,
        total_amount: i64,
        discount_amount: i64,
        invoice_number: &str,
    ) -> Result<TransactionModel, ServiceError> {
        let now = Utc::now();
        let transaction_id = Uuid::new_v4();
        let (status, payment_status, paid_at) = if method.is_cash() {
            (TransactionStatus::Completed, PaymentStatus::Paid, Some(now))
        } else {
            (TransactionStatus::Pending, PaymentStatus::Pending, None)
        };
        let normalized = DiscountSpec::normalize(request.discount);

        let txn = self.db.begin().await?;

        let model = TransactionActiveModel {
            id: Set(transaction_id),
            invoice_number: Set(invoice_number.to_string()),
            cashier_id: Set(request.cashier_id),
            status: Set(status.to_string()),
            payment_method: Set(method.to_string()),
            payment_status: Set(payment_status.to_string()),
            subtotal: Set(subtotal),
            discount_type: Set(normalized.map(|d| d.kind.to_string())),
            discount_value: Set(normalized.map(|d| d.value)),
            discount_amount: Set(discount_amount),
            total_amount: Set(total_amount),
            created_at: Set(now),
            paid_at: Set(paid_at),
            canceled_at: Set(None),
            canceled_by: Set(None),
            version: Set(1),
        }
        .insert(&txn)
        .await?;

        for line in lines {
            transaction_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                transaction_id: Set(transaction_id),
                product_id: Set(line.product_id),
                product_name: Set(line.product_name.clone()),
                unit_price: Set(line.unit_price),
                quantity: Set(line.quantity),
                discount_amount: Set(line.discount_amount),
                discounted_price: Set(line.discounted_price),
                subtotal: Set(line.subtotal),
            }
            .insert(&txn)
            .await?;

            inventory::decrement(&txn, line.product_id, &line.product_name, line.quantity)
                .await?;
        }

        if method.is_cash() {
            payment::ActiveModel {
                id: Set(Uuid::new_v4()),
                transaction_id: Set(transaction_id),
                gateway_order_id: Set(invoice_number.to_string()),
                gateway_transaction_id: Set(None),
                payment_type: Set(method.to_string()),
                amount: Set(total_amount),
                status: Set(PaymentStatus::Paid.to_string()),
                fraud_status: Set(None),
                token: Set(None),
                redirect_url: Set(None),
                raw_response: Set(serde_json::json!({})),
                created_at: Set(now),
                updated_at: Set(None),
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;
        Ok(model)
    }
}

fn validate_cart(items: &[CartItemRequest]) -> Result<(), ServiceError> {
    let mut seen = HashSet::new();
    for item in items {
        if item.quantity <= 0 {
            return Err(ServiceError::InvalidCart(format!(
                "quantity for product {} must be positive",
                item.product_id
            )));
        }
        if let Some(price) = item.price {
            if price <= 0 {
                return Err(ServiceError::InvalidCart(format!(
                    "price for product {} must be positive",
                    item.product_id
                )));
            }
        }
        if !seen.insert(item.product_id) {
            return Err(ServiceError::InvalidCart(format!(
                "product {} appears more than once in the cart",
                item.product_id
            )));
        }
    }
    Ok(())
}

fn is_unique_violation(err: &ServiceError) -> bool {
    match err {
        ServiceError::DatabaseError(db_err) => {
            matches!(db_err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
        }
        _ => false,
    }
}

pub(crate) fn parse_status(raw: &str) -> Result<TransactionStatus, ServiceError> {
    TransactionStatus::from_str(raw)
        .map_err(|_| ServiceError::InternalError(format!("corrupt transaction status: {raw}")))
}

fn parse_payment_status(raw: &str) -> Result<PaymentStatus, ServiceError> {
    PaymentStatus::from_str(raw)
        .map_err(|_| ServiceError::InternalError(format!("corrupt payment status: {raw}")))
}

/// A status column that fails to parse is data corruption and surfaces as
/// an internal error rather than being reported as some other state.
pub(crate) fn model_to_response(
    model: TransactionModel,
) -> Result<TransactionResponse, ServiceError> {
    let status = parse_status(&model.status)?;
    let payment_status = parse_payment_status(&model.payment_status)?;
    Ok(TransactionResponse {
        id: model.id,
        invoice_number: model.invoice_number,
        cashier_id: model.cashier_id,
        status,
        payment_method: model.payment_method,
        payment_status,
        subtotal: model.subtotal,
        discount_amount: model.discount_amount,
        total_amount: model.total_amount,
        created_at: model.created_at,
        paid_at: model.paid_at,
        canceled_at: model.canceled_at,
    })
}

fn item_to_response(model: transaction_item::Model) -> TransactionItemResponse {
    TransactionItemResponse {
        product_id: model.product_id,
        product_name: model.product_name,
        unit_price: model.unit_price,
        quantity: model.quantity,
        discount_amount: model.discount_amount,
        subtotal: model.subtotal,
        total: model.discounted_price,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_product_ids_are_rejected() {
        let product_id = Uuid::new_v4();
        let items = vec![
            CartItemRequest {
                product_id,
                quantity: 1,
                price: None,
                discount: None,
            },
            CartItemRequest {
                product_id,
                quantity: 2,
                price: None,
                discount: None,
            },
        ];
        assert!(matches!(
            validate_cart(&items),
            Err(ServiceError::InvalidCart(_))
        ));
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        let items = vec![CartItemRequest {
            product_id: Uuid::new_v4(),
            quantity: 0,
            price: None,
            discount: None,
        }];
        assert!(matches!(
            validate_cart(&items),
            Err(ServiceError::InvalidCart(_))
        ));
    }

    #[test]
    fn model_to_response_maps_statuses() {
        let now = Utc::now();
        let model = TransactionModel {
            id: Uuid::new_v4(),
            invoice_number: "INV-20250601-0001".to_string(),
            cashier_id: Uuid::new_v4(),
            status: "completed".to_string(),
            payment_method: "cash".to_string(),
            payment_status: "paid".to_string(),
            subtotal: 50_000,
            discount_type: Some("percentage".to_string()),
            discount_value: Some(10),
            discount_amount: 5_000,
            total_amount: 45_000,
            created_at: now,
            paid_at: Some(now),
            canceled_at: None,
            canceled_by: None,
            version: 1,
        };
        let response = model_to_response(model).unwrap();
        assert_eq!(response.status, TransactionStatus::Completed);
        assert_eq!(response.payment_status, PaymentStatus::Paid);
        assert_eq!(response.total_amount, 45_000);
    }

    #[test]
    fn corrupt_status_column_is_an_error() {
        let now = Utc::now();
        let mut model = TransactionModel {
            id: Uuid::new_v4(),
            invoice_number: "INV-20250601-0002".to_string(),
            cashier_id: Uuid::new_v4(),
            status: "garbled".to_string(),
            payment_method: "cash".to_string(),
            payment_status: "paid".to_string(),
            subtotal: 10_000,
            discount_type: None,
            discount_value: None,
            discount_amount: 0,
            total_amount: 10_000,
            created_at: now,
            paid_at: None,
            canceled_at: None,
            canceled_by: None,
            version: 0,
        };
        assert!(matches!(
            model_to_response(model.clone()),
            Err(ServiceError::InternalError(_))
        ));

        model.status = "completed".to_string();
        model.payment_status = "garbled".to_string();
        assert!(matches!(
            model_to_response(model),
            Err(ServiceError::InternalError(_))
        ));
    }
}
