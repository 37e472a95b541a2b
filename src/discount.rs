//! Discount arithmetic for line items and transaction totals.
//!
//! All amounts are integer currency units (whole rupiah). The same
//! calculator is applied twice per checkout: once per line item on
//! `unit_price * quantity`, then once more on the summed subtotal. Each
//! application clamps independently, so a transaction-level discount can
//! never drive the grand total negative.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;
use validator::Validate;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, ToSchema,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DiscountKind {
    Percentage,
    Nominal,
}

/// A requested discount. `value` is a percentage for
/// [`DiscountKind::Percentage`] and an absolute amount for
/// [`DiscountKind::Nominal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Validate)]
pub struct DiscountSpec {
    pub kind: DiscountKind,
    pub value: i64,
}

impl DiscountSpec {
    /// A non-positive value means "no discount".
    pub fn normalize(spec: Option<DiscountSpec>) -> Option<DiscountSpec> {
        spec.filter(|s| s.value > 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscountOutcome {
    pub discount_amount: i64,
    pub final_amount: i64,
}

/// Applies a discount spec to a base amount.
///
/// Percentage discounts round half-up; both kinds clamp the discount to
/// `[0, base]`, so `final_amount` always lands in `[0, base]`.
pub fn apply(base: i64, spec: Option<DiscountSpec>) -> DiscountOutcome {
    let base = base.max(0);
    let discount_amount = match DiscountSpec::normalize(spec) {
        None => 0,
        Some(DiscountSpec {
            kind: DiscountKind::Percentage,
            value,
        }) => {
            let raw = (base as i128 * value as i128 + 50) / 100;
            (raw as i64).clamp(0, base)
        }
        Some(DiscountSpec {
            kind: DiscountKind::Nominal,
            value,
        }) => value.clamp(0, base),
    };

    DiscountOutcome {
        discount_amount,
        final_amount: base - discount_amount,
    }
}
