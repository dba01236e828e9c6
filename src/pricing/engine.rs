//! Quote computation

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::PlatformFee;
use crate::db::batches::DiscountBatch;
use crate::db::coupons::Coupon;
use crate::db::{batches, coupons, events};
use crate::error::{AppError, AppResult};

use super::rules::{batch_discount_amount, coupon_discount_amount, coupon_is_valid, select_batch};
use super::{PriceBreakdown, round_money};

/// A computed quote: the breakdown plus the records that produced it, so
/// order creation can count the batch sale and the coupon use.
#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub breakdown: PriceBreakdown,
    pub batch_id: Option<Uuid>,
    pub coupon_id: Option<Uuid>,
}

/// Platform fee for a subtotal, per configuration
pub fn platform_fee_amount(fee: &PlatformFee, subtotal: Decimal) -> Decimal {
    match fee {
        PlatformFee::Percentage(rate) => round_money(subtotal * rate),
        PlatformFee::Flat(amount) => round_money(*amount),
    }
}

/// Compute a price breakdown from the backing records.
///
/// Pure: the same records at the same instant always produce an identical
/// breakdown. Invalid coupons contribute zero discount rather than failing.
pub fn compute_breakdown(
    base_price: Decimal,
    batches: &[DiscountBatch],
    coupon: Option<&Coupon>,
    modality_id: Uuid,
    now: DateTime<Utc>,
    fee: &PlatformFee,
) -> (PriceBreakdown, Option<Uuid>, Option<Uuid>) {
    let batch = select_batch(batches, base_price, now);
    let batch_discount = batch
        .map(|b| batch_discount_amount(b, base_price))
        .unwrap_or(Decimal::ZERO);

    let after_batch = (base_price - batch_discount).max(Decimal::ZERO);

    let applied_coupon =
        coupon.filter(|c| coupon_is_valid(c, modality_id, after_batch, now));
    let coupon_discount = applied_coupon
        .map(|c| coupon_discount_amount(c, after_batch))
        .unwrap_or(Decimal::ZERO);

    let subtotal = (base_price - batch_discount - coupon_discount).max(Decimal::ZERO);
    let platform_fee = platform_fee_amount(fee, subtotal);
    let total = subtotal + platform_fee;

    (
        PriceBreakdown {
            base_price,
            batch_discount,
            coupon_discount,
            subtotal,
            platform_fee,
            total,
        },
        batch.map(|b| b.id),
        applied_coupon.map(|c| c.id),
    )
}

/// Quote the price for one registration in a modality.
///
/// Looks up the modality, the event's active batches and the coupon (if a
/// code was supplied) and delegates to [`compute_breakdown`].
pub async fn quote(
    pool: &PgPool,
    fee: &PlatformFee,
    event_id: Uuid,
    modality_id: Uuid,
    coupon_code: Option<&str>,
) -> AppResult<Quote> {
    let modality = events::find_modality(pool, modality_id)
        .await?
        .filter(|m| m.event_id == event_id)
        .ok_or_else(|| AppError::not_found(format!("Modality {modality_id}")))?;

    let batches = batches::list_for_event(pool, event_id).await?;

    let coupon = match coupon_code {
        Some(code) => coupons::find_by_code(pool, event_id, code).await?,
        None => None,
    };

    let (breakdown, batch_id, coupon_id) = compute_breakdown(
        modality.base_price,
        &batches,
        coupon.as_ref(),
        modality_id,
        Utc::now(),
        fee,
    );

    Ok(Quote {
        breakdown,
        batch_id,
        coupon_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    fn batch(value: &str) -> DiscountBatch {
        DiscountBatch {
            id: Uuid::from_bytes([1; 16]),
            event_id: Uuid::from_bytes([0xEE; 16]),
            batch_type: "DATE".into(),
            start_date: None,
            end_date: None,
            max_sales: None,
            current_sales: 0,
            discount_type: "FIXED".into(),
            discount_value: dec(value),
            active: true,
        }
    }

    fn coupon(value: &str) -> Coupon {
        Coupon {
            id: Uuid::from_bytes([2; 16]),
            event_id: Uuid::from_bytes([0xEE; 16]),
            code: "RUN".into(),
            discount_type: "FIXED".into(),
            discount_value: dec(value),
            valid_from: None,
            valid_until: None,
            max_uses: None,
            current_uses: 0,
            min_purchase: None,
            modality_ids: None,
            active: true,
        }
    }

    #[test]
    fn breakdown_with_batch_coupon_and_percentage_fee() {
        // base 100.00, batch -10.00, coupon -5.00, fee 10%
        let m = Uuid::from_bytes([0x44; 16]);
        let fee = PlatformFee::Percentage(dec("0.10"));
        let (b, batch_id, coupon_id) = compute_breakdown(
            dec("100.00"),
            &[batch("10.00")],
            Some(&coupon("5.00")),
            m,
            now(),
            &fee,
        );

        assert_eq!(b.batch_discount, dec("10.00"));
        assert_eq!(b.coupon_discount, dec("5.00"));
        assert_eq!(b.subtotal, dec("85.00"));
        assert_eq!(b.platform_fee, dec("8.50"));
        assert_eq!(b.total, dec("93.50"));
        assert!(batch_id.is_some());
        assert!(coupon_id.is_some());
    }

    #[test]
    fn breakdown_is_deterministic() {
        let m = Uuid::from_bytes([0x44; 16]);
        let fee = PlatformFee::Percentage(dec("0.10"));
        let batches = [batch("10.00")];
        let c = coupon("5.00");

        let first = compute_breakdown(dec("100.00"), &batches, Some(&c), m, now(), &fee);
        for _ in 0..10 {
            let again = compute_breakdown(dec("100.00"), &batches, Some(&c), m, now(), &fee);
            assert_eq!(again.0, first.0);
            assert_eq!(again.1, first.1);
            assert_eq!(again.2, first.2);
        }
    }

    #[test]
    fn invalid_coupon_contributes_zero_not_error() {
        let m = Uuid::from_bytes([0x44; 16]);
        let fee = PlatformFee::Percentage(dec("0.10"));
        let mut c = coupon("5.00");
        c.active = false;

        let (b, _, coupon_id) =
            compute_breakdown(dec("100.00"), &[], Some(&c), m, now(), &fee);
        assert_eq!(b.coupon_discount, Decimal::ZERO);
        assert_eq!(b.subtotal, dec("100.00"));
        assert!(coupon_id.is_none());
    }

    #[test]
    fn subtotal_floors_at_zero() {
        let m = Uuid::from_bytes([0x44; 16]);
        let fee = PlatformFee::Percentage(dec("0.10"));

        let (b, _, _) = compute_breakdown(
            dec("20.00"),
            &[batch("20.00")],
            Some(&coupon("5.00")),
            m,
            now(),
            &fee,
        );
        assert_eq!(b.subtotal, Decimal::ZERO);
        assert_eq!(b.total, Decimal::ZERO);
    }

    #[test]
    fn total_always_subtotal_plus_fee() {
        let m = Uuid::from_bytes([0x44; 16]);
        for (base, batch_v, coupon_v, rate) in [
            ("100.00", "10.00", "5.00", "0.10"),
            ("33.33", "0.01", "0.02", "0.07"),
            ("5.00", "4.99", "5.00", "0.25"),
        ] {
            let fee = PlatformFee::Percentage(dec(rate));
            let (b, _, _) = compute_breakdown(
                dec(base),
                &[batch(batch_v)],
                Some(&coupon(coupon_v)),
                m,
                now(),
                &fee,
            );
            assert_eq!(b.total, b.subtotal + b.platform_fee);
        }
    }

    #[test]
    fn flat_fee() {
        let m = Uuid::from_bytes([0x44; 16]);
        let fee = PlatformFee::Flat(dec("3.50"));
        let (b, _, _) = compute_breakdown(dec("50.00"), &[], None, m, now(), &fee);
        assert_eq!(b.platform_fee, dec("3.50"));
        assert_eq!(b.total, dec("53.50"));
    }
}
