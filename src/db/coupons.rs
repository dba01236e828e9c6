//! Coupon queries

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Coupon {
    pub id: Uuid,
    pub event_id: Uuid,
    pub code: String,
    pub discount_type: String, // 'PERCENTAGE' | 'FIXED'
    pub discount_value: Decimal,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    pub current_uses: i32,
    pub min_purchase: Option<Decimal>,
    pub modality_ids: Option<Vec<Uuid>>,
    pub active: bool,
}

pub async fn find_by_code(
    pool: &PgPool,
    event_id: Uuid,
    code: &str,
) -> Result<Option<Coupon>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM coupons WHERE event_id = $1 AND code = $2")
        .bind(event_id)
        .bind(code)
        .fetch_optional(pool)
        .await
}

/// Consume one coupon use, conditional on the usage cap.
pub async fn increment_uses(
    tx: &mut Transaction<'_, Postgres>,
    coupon_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE coupons
         SET current_uses = current_uses + 1
         WHERE id = $1 AND active AND (max_uses IS NULL OR current_uses < max_uses)",
    )
    .bind(coupon_id)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() == 1)
}
