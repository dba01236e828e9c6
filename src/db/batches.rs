//! Discount batch queries

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DiscountBatch {
    pub id: Uuid,
    pub event_id: Uuid,
    pub batch_type: String, // 'DATE' | 'VOLUME'
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub max_sales: Option<i32>,
    pub current_sales: i32,
    pub discount_type: String, // 'PERCENTAGE' | 'FIXED'
    pub discount_value: Decimal,
    pub active: bool,
}

pub async fn list_for_event(
    pool: &PgPool,
    event_id: Uuid,
) -> Result<Vec<DiscountBatch>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM discount_batches WHERE event_id = $1 AND active")
        .bind(event_id)
        .fetch_all(pool)
        .await
}

/// Count one sale against a batch. Conditional on the volume cap, so a batch
/// that sold out between quote and creation fails here instead of
/// overshooting `max_sales`.
pub async fn increment_sales(
    tx: &mut Transaction<'_, Postgres>,
    batch_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE discount_batches
         SET current_sales = current_sales + 1
         WHERE id = $1 AND active AND (max_sales IS NULL OR current_sales < max_sales)",
    )
    .bind(batch_id)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() == 1)
}
