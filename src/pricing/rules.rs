//! Batch and coupon applicability rules

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::db::batches::DiscountBatch;
use crate::db::coupons::Coupon;

use super::round_money;

/// Check whether a batch is applicable right now.
///
/// DATE batches apply while `active && start_date <= now <= end_date`
/// (an unset bound is open). VOLUME batches apply while
/// `active && current_sales < max_sales` (unset cap means unlimited).
pub fn batch_is_applicable(batch: &DiscountBatch, now: DateTime<Utc>) -> bool {
    if !batch.active {
        return false;
    }
    match batch.batch_type.as_str() {
        "DATE" => {
            let started = batch.start_date.is_none_or(|s| s <= now);
            let not_ended = batch.end_date.is_none_or(|e| now <= e);
            started && not_ended
        }
        "VOLUME" => batch.max_sales.is_none_or(|max| batch.current_sales < max),
        _ => false,
    }
}

/// Discount a batch yields for a given base price, capped at the base price
pub fn batch_discount_amount(batch: &DiscountBatch, base_price: Decimal) -> Decimal {
    let raw = match batch.discount_type.as_str() {
        "PERCENTAGE" => base_price * batch.discount_value / Decimal::ONE_HUNDRED,
        "FIXED" => batch.discount_value,
        _ => Decimal::ZERO,
    };
    round_money(raw.clamp(Decimal::ZERO, base_price))
}

/// Select the applicable discount batch.
///
/// When several batches are simultaneously applicable the one yielding the
/// highest discount for this base price wins; remaining ties go to the
/// lowest batch id, so selection never depends on row order.
pub fn select_batch<'a>(
    batches: &'a [DiscountBatch],
    base_price: Decimal,
    now: DateTime<Utc>,
) -> Option<&'a DiscountBatch> {
    batches
        .iter()
        .filter(|b| batch_is_applicable(b, now))
        .max_by(|a, b| {
            batch_discount_amount(a, base_price)
                .cmp(&batch_discount_amount(b, base_price))
                .then_with(|| b.id.cmp(&a.id)) // reversed: max_by keeps the lowest id
        })
}

/// Validate a coupon against the modality and the subtotal so far.
///
/// An invalid coupon yields zero discount at the quote layer rather than an
/// error; callers only need the boolean.
pub fn coupon_is_valid(
    coupon: &Coupon,
    modality_id: Uuid,
    subtotal_so_far: Decimal,
    now: DateTime<Utc>,
) -> bool {
    if !coupon.active {
        return false;
    }
    if coupon.valid_from.is_some_and(|s| now < s) {
        return false;
    }
    if coupon.valid_until.is_some_and(|e| now > e) {
        return false;
    }
    if coupon.max_uses.is_some_and(|max| coupon.current_uses >= max) {
        return false;
    }
    if coupon.min_purchase.is_some_and(|min| subtotal_so_far < min) {
        return false;
    }
    if let Some(allowed) = &coupon.modality_ids
        && !allowed.contains(&modality_id)
    {
        return false;
    }
    true
}

/// Discount a coupon yields on the subtotal so far, capped so the subtotal
/// never goes negative
pub fn coupon_discount_amount(coupon: &Coupon, subtotal_so_far: Decimal) -> Decimal {
    let raw = match coupon.discount_type.as_str() {
        "PERCENTAGE" => subtotal_so_far * coupon.discount_value / Decimal::ONE_HUNDRED,
        "FIXED" => coupon.discount_value,
        _ => Decimal::ZERO,
    };
    round_money(raw.clamp(Decimal::ZERO, subtotal_so_far))
}
