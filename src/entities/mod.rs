pub mod payment;
pub mod product;
pub mod stock;
pub mod transaction;
pub mod transaction_cancel_log;
pub mod transaction_item;
