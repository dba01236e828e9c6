//! Event and modality queries

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Event {
    pub id: Uuid,
    pub organizer_id: Uuid,
    pub name: String,
    pub published: bool,
    pub registration_start: DateTime<Utc>,
    pub registration_end: DateTime<Utc>,
    pub requires_apparel_size: bool,
    pub order_seq: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Modality {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub base_price: Decimal,
    pub max_slots: Option<i32>,
    pub active: bool,
}

pub async fn find_event(pool: &PgPool, id: Uuid) -> Result<Option<Event>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM events WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_modality(pool: &PgPool, id: Uuid) -> Result<Option<Modality>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM modalities WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Lock the modality row for the remainder of the transaction.
///
/// Serializes the capacity check against concurrent order creation for the
/// same modality; without the lock two requests could both observe
/// `count < max_slots` and oversell the last slot.
pub async fn lock_modality(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<Modality>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM modalities WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
}

/// Atomically advance the per-event order number sequence and return the
/// next value. Concurrent creations never collide or skip.
pub async fn next_order_number(
    tx: &mut Transaction<'_, Postgres>,
    event_id: Uuid,
) -> Result<i64, sqlx::Error> {
    let row: (i64,) =
        sqlx::query_as("UPDATE events SET order_seq = order_seq + 1 WHERE id = $1 RETURNING order_seq")
            .bind(event_id)
            .fetch_one(&mut **tx)
            .await?;
    Ok(row.0)
}
