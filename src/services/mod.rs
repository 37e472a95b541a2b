pub mod inventory;
pub mod payments;
pub mod reports;
pub mod transactions;
