use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A sale. Status and payment status are stored as lowercase strings and
/// parsed through the enums in [`crate::models`]. After creation only the
/// payment state machine and the cancel path mutate this row.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Human-facing `INV-{YYYYMMDD}-{NNNN}` identifier, unique per store.
    #[sea_orm(unique)]
    pub invoice_number: String,
    pub cashier_id: Uuid,
    pub status: String,
    pub payment_method: String,
    pub payment_status: String,
    /// Sum of line-item totals after per-item discounts.
    pub subtotal: i64,
    pub discount_type: Option<String>,
    pub discount_value: Option<i64>,
    pub discount_amount: i64,
    pub total_amount: i64,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub canceled_by: Option<Uuid>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::transaction_item::Entity")]
    TransactionItem,
    #[sea_orm(has_one = "super::payment::Entity")]
    Payment,
    #[sea_orm(has_many = "super::transaction_cancel_log::Entity")]
    CancelLog,
}

impl Related<super::transaction_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TransactionItem.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payment.def()
    }
}

impl Related<super::transaction_cancel_log::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CancelLog.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
