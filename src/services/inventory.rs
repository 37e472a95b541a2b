//! Stock store operations. Everything here is generic over
//! [`ConnectionTrait`] so the ledger and the payment state machine can run
//! stock mutations inside their own database transactions.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::entities::stock::{self, Entity as StockEntity};
use crate::errors::ServiceError;

/// Current on-hand quantity for a product. Zero when no stock row exists.
pub async fn available<C: ConnectionTrait>(db: &C, product_id: Uuid) -> Result<i32, ServiceError> {
    let row = StockEntity::find_by_id(product_id).one(db).await?;
    Ok(row.map(|s| s.quantity).unwrap_or(0))
}

/// Loads the stock rows for a set of products in one read.
pub async fn load_many<C: ConnectionTrait>(
    db: &C,
    product_ids: &[Uuid],
) -> Result<Vec<stock::Model>, ServiceError> {
    let rows = StockEntity::find()
        .filter(stock::Column::ProductId.is_in(product_ids.iter().copied()))
        .all(db)
        .await?;
    Ok(rows)
}

/// Decrements stock, guarded against oversell: the update only applies when
/// the remaining quantity covers the request, so two racing checkouts for
/// the last unit cannot both succeed.
pub async fn decrement<C: ConnectionTrait>(
    db: &C,
    product_id: Uuid,
    product_name: &str,
    quantity: i32,
) -> Result<(), ServiceError> {
    let result = StockEntity::update_many()
        .col_expr(
            stock::Column::Quantity,
            Expr::col(stock::Column::Quantity).sub(quantity),
        )
        .col_expr(stock::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(stock::Column::ProductId.eq(product_id))
        .filter(stock::Column::Quantity.gte(quantity))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        let remaining = available(db, product_id).await?;
        return Err(ServiceError::InsufficientStock {
            product: product_name.to_string(),
            requested: quantity,
            available: remaining,
        });
    }
    Ok(())
}

/// Restores stock after a cancellation or a failed/expired gateway payment.
/// No upper bound is enforced.
pub async fn restore<C: ConnectionTrait>(
    db: &C,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    StockEntity::update_many()
        .col_expr(
            stock::Column::Quantity,
            Expr::col(stock::Column::Quantity).add(quantity),
        )
        .col_expr(stock::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(stock::Column::ProductId.eq(product_id))
        .exec(db)
        .await?;
    Ok(())
}
