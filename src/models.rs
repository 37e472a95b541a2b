//! Domain enums persisted as string columns on the transaction tables.
//!
//! Status values are stored lowercase (`pending`, `completed`, ...) and
//! parsed back through strum at the service boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strum::{Display, EnumString};
use utoipa::ToSchema;

/// Lifecycle state of a transaction. Transitions are one-directional:
/// pending -> {completed, canceled}; completed -> canceled only through an
/// explicit cancel inside the cancellation window.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, ToSchema,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Canceled,
}

/// Settlement state reported against a transaction's payment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, ToSchema,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Expired,
}

/// Gateway channels the hosted payment page can settle through.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, ToSchema,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GatewayChannel {
    Qris,
    BankTransfer,
    Ewallet,
    CreditCard,
}

/// Closed set of payment methods. Cash settles synchronously at checkout;
/// everything else routes through the hosted gateway and settles via
/// webhook or status poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    Cash,
    Gateway(GatewayChannel),
}

impl PaymentMethod {
    pub fn is_cash(&self) -> bool {
        matches!(self, PaymentMethod::Cash)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Cash => write!(f, "cash"),
            PaymentMethod::Gateway(channel) => write!(f, "{}", channel),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown payment method: {0}")]
pub struct ParsePaymentMethodError(String);

impl FromStr for PaymentMethod {
    type Err = ParsePaymentMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "cash" {
            return Ok(PaymentMethod::Cash);
        }
        GatewayChannel::from_str(s)
            .map(PaymentMethod::Gateway)
            .map_err(|_| ParsePaymentMethodError(s.to_string()))
    }
}

impl Serialize for PaymentMethod {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PaymentMethod {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        code.parse().map_err(serde::de::Error::custom)
    }
}

impl utoipa::PartialSchema for PaymentMethod {
    fn schema() -> utoipa::openapi::RefOr<utoipa::openapi::schema::Schema> {
        String::schema()
    }
}

impl utoipa::ToSchema for PaymentMethod {}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("cash", PaymentMethod::Cash)]
    #[test_case("qris", PaymentMethod::Gateway(GatewayChannel::Qris))]
    #[test_case("bank_transfer", PaymentMethod::Gateway(GatewayChannel::BankTransfer))]
    #[test_case("ewallet", PaymentMethod::Gateway(GatewayChannel::Ewallet))]
    #[test_case("credit_card", PaymentMethod::Gateway(GatewayChannel::CreditCard))]
    fn payment_method_codes_round_trip(code: &str, expected: PaymentMethod) {
        let parsed: PaymentMethod = code.parse().unwrap();
        assert_eq!(parsed, expected);
        assert_eq!(parsed.to_string(), code);
    }

    #[test]
    fn unknown_payment_method_is_rejected() {
        assert!("store_credit".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn status_strings_are_lowercase() {
        assert_eq!(TransactionStatus::Pending.to_string(), "pending");
        assert_eq!(PaymentStatus::Expired.to_string(), "expired");
        assert_eq!(
            "completed".parse::<TransactionStatus>().unwrap(),
            TransactionStatus::Completed
        );
    }
}
