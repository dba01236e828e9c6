//! Pricing engine
//!
//! Deterministic quote computation: base price, automatic discount batch,
//! optional coupon, platform fee. Same inputs against the same backing
//! records produce an identical breakdown, so the price shown to the buyer
//! matches the price charged.

mod engine;
mod rules;

pub use engine::{Quote, compute_breakdown, platform_fee_amount, quote};
pub use rules::{batch_discount_amount, coupon_is_valid, select_batch};

use rust_decimal::prelude::*;
use serde::Serialize;

/// Rounding strategy for monetary values (2 decimal places, half-up)
const DECIMAL_PLACES: u32 = 2;

/// Round a monetary amount to 2 decimal places, midpoint away from zero
#[inline]
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Price breakdown returned by a quote and persisted onto each order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceBreakdown {
    pub base_price: Decimal,
    pub batch_discount: Decimal,
    pub coupon_discount: Decimal,
    pub subtotal: Decimal,
    pub platform_fee: Decimal,
    pub total: Decimal,
}

impl PriceBreakdown {
    /// Combined discount persisted on the order row
    pub fn discount(&self) -> Decimal {
        self.batch_discount + self.coupon_discount
    }
}
