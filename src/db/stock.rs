//! Apparel size stock counters
//!
//! Every mutation is a single conditional UPDATE; `rows_affected == 0`
//! means the condition did not hold and nothing was partially incremented.

use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SizeStock {
    pub event_id: Uuid,
    pub size: String,
    pub stock: i32,
    pub reserved: i32,
    pub sold: i32,
}

pub async fn find(
    pool: &PgPool,
    event_id: Uuid,
    size: &str,
) -> Result<Option<SizeStock>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM size_stock WHERE event_id = $1 AND size = $2")
        .bind(event_id)
        .bind(size)
        .fetch_optional(pool)
        .await
}

/// Reserve one unit of the requested size, only while
/// `stock - reserved - sold > 0`. Returns whether the reservation took.
pub async fn reserve(
    tx: &mut Transaction<'_, Postgres>,
    event_id: Uuid,
    size: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE size_stock
         SET reserved = reserved + 1
         WHERE event_id = $1 AND size = $2 AND stock - reserved - sold > 0",
    )
    .bind(event_id)
    .bind(size)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Promote a reservation to a sale when the order confirms.
///
/// Callers invoke this only when the order's own terminal transition fired,
/// so the promotion runs at most once per order.
pub async fn promote_to_sold(pool: &PgPool, event_id: Uuid, size: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE size_stock
         SET reserved = reserved - 1, sold = sold + 1
         WHERE event_id = $1 AND size = $2 AND reserved > 0",
    )
    .bind(event_id)
    .bind(size)
    .execute(pool)
    .await?;
    Ok(())
}

/// Release a reservation when the order cancels.
pub async fn release(pool: &PgPool, event_id: Uuid, size: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE size_stock
         SET reserved = reserved - 1
         WHERE event_id = $1 AND size = $2 AND reserved > 0",
    )
    .bind(event_id)
    .bind(size)
    .execute(pool)
    .await?;
    Ok(())
}
