use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Gateway payment record, at most one per transaction. The unique
/// `transaction_id` column is the upsert key that makes duplicate webhook
/// deliveries converge on a single row.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub transaction_id: Uuid,
    /// Order id sent to the gateway; equals the invoice number.
    pub gateway_order_id: String,
    pub gateway_transaction_id: Option<String>,
    pub payment_type: String,
    pub amount: i64,
    pub status: String,
    pub fraud_status: Option<String>,
    pub token: Option<String>,
    pub redirect_url: Option<String>,
    /// Last raw gateway payload, kept verbatim for reconciliation.
    pub raw_response: Json,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::transaction::Entity",
        from = "Column::TransactionId",
        to = "super::transaction::Column::Id"
    )]
    Transaction,
}

impl Related<super::transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transaction.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
