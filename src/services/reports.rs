//! Read-only rollups over the transaction ledger.

use chrono::{NaiveDate, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

use crate::db::DbPool;
use crate::entities::transaction::{self, Entity as TransactionEntity};
use crate::errors::ServiceError;
use crate::models::TransactionStatus;

/// Daily sales summary over completed transactions.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DailySalesReport {
    pub date: NaiveDate,
    pub total_transactions: u64,
    pub gross_sales: i64,
    pub discount_total: i64,
    pub net_sales: i64,
    pub by_payment_method: HashMap<String, i64>,
}

#[derive(Clone)]
pub struct ReportService {
    db: Arc<DbPool>,
}

impl ReportService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Rolls up completed transactions paid on the given calendar date.
    #[instrument(skip(self))]
    pub async fn daily_sales(&self, date: NaiveDate) -> Result<DailySalesReport, ServiceError> {
        let day_start = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| ServiceError::ValidationError("invalid report date".into()))?
            .and_utc();
        let day_end = day_start + chrono::Duration::days(1);

        let rows = TransactionEntity::find()
            .filter(transaction::Column::Status.eq(TransactionStatus::Completed.to_string()))
            .filter(transaction::Column::PaidAt.gte(day_start))
            .filter(transaction::Column::PaidAt.lt(day_end))
            .all(&*self.db)
            .await?;

        let mut by_payment_method: HashMap<String, i64> = HashMap::new();
        let mut gross_sales = 0i64;
        let mut discount_total = 0i64;
        let mut net_sales = 0i64;
        for row in &rows {
            gross_sales += row.subtotal;
            discount_total += row.discount_amount;
            net_sales += row.total_amount;
            *by_payment_method
                .entry(row.payment_method.clone())
                .or_default() += row.total_amount;
        }

        Ok(DailySalesReport {
            date,
            total_transactions: rows.len() as u64,
            gross_sales,
            discount_total,
            net_sales,
            by_payment_method,
        })
    }

    /// Today's rollup, store-local semantics left to the caller's clock.
    pub async fn today(&self) -> Result<DailySalesReport, ServiceError> {
        self.daily_sales(Utc::now().date_naive()).await
    }
}
