//! Order queries and terminal state transitions
//!
//! Terminal transitions are conditional updates guarded by
//! `status = 'PENDING'`; callers check `rows_affected` to learn whether the
//! transition actually fired. Re-running a transition against an already
//! terminal order is a no-op, which is what makes webhook/poll races and
//! at-least-once webhook delivery converge on one recorded transition.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Internal order lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_db(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(OrderStatus::Pending),
            "CONFIRMED" => Some(OrderStatus::Confirmed),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

/// Processor-side payment state mirrored onto the order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Approved,
    Rejected,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_db(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Approved => "APPROVED",
            PaymentStatus::Rejected => "REJECTED",
            PaymentStatus::Cancelled => "CANCELLED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderRow {
    pub id: Uuid,
    pub event_id: Uuid,
    pub modality_id: Uuid,
    pub participant_id: Uuid,
    pub buyer_id: Uuid,
    pub coupon_id: Option<Uuid>,
    pub order_number: i64,
    pub base_price: Decimal,
    pub discount: Decimal,
    pub subtotal: Decimal,
    pub platform_fee: Decimal,
    pub total: Decimal,
    pub status: String,
    pub payment_status: String,
    pub payment_id: Option<String>,
    pub payment_method: Option<String>,
    pub processor_fee: Option<Decimal>,
    pub apparel_size: Option<String>,
    pub checkout_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl OrderRow {
    pub fn is_terminal(&self) -> bool {
        self.status != "PENDING"
    }
}

/// Everything needed to persist one pending order
pub struct NewOrder {
    pub id: Uuid,
    pub event_id: Uuid,
    pub modality_id: Uuid,
    pub participant_id: Uuid,
    pub buyer_id: Uuid,
    pub coupon_id: Option<Uuid>,
    pub order_number: i64,
    pub base_price: Decimal,
    pub discount: Decimal,
    pub subtotal: Decimal,
    pub platform_fee: Decimal,
    pub total: Decimal,
    pub apparel_size: Option<String>,
    pub checkout_ref: String,
    pub created_at: DateTime<Utc>,
}

pub async fn insert(tx: &mut Transaction<'_, Postgres>, o: &NewOrder) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO orders (id, event_id, modality_id, participant_id, buyer_id, coupon_id,
                             order_number, base_price, discount, subtotal, platform_fee, total,
                             status, payment_status, apparel_size, checkout_ref, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                 'PENDING', 'PENDING', $13, $14, $15)",
    )
    .bind(o.id)
    .bind(o.event_id)
    .bind(o.modality_id)
    .bind(o.participant_id)
    .bind(o.buyer_id)
    .bind(o.coupon_id)
    .bind(o.order_number)
    .bind(o.base_price)
    .bind(o.discount)
    .bind(o.subtotal)
    .bind(o.platform_fee)
    .bind(o.total)
    .bind(o.apparel_size.as_deref())
    .bind(&o.checkout_ref)
    .bind(o.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<OrderRow>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_ids(pool: &PgPool, ids: &[Uuid]) -> Result<Vec<OrderRow>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE id = ANY($1) ORDER BY order_number")
        .bind(ids)
        .fetch_all(pool)
        .await
}

/// Count active (PENDING/CONFIRMED) orders for a modality, inside the
/// transaction that holds the modality row lock.
pub async fn count_active_for_modality(
    tx: &mut Transaction<'_, Postgres>,
    modality_id: Uuid,
) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as(
        "SELECT count(*) FROM orders
         WHERE modality_id = $1 AND status IN ('PENDING', 'CONFIRMED')",
    )
    .bind(modality_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(row.0)
}

pub async fn has_active_order(
    tx: &mut Transaction<'_, Postgres>,
    participant_id: Uuid,
    event_id: Uuid,
    modality_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let row: (bool,) = sqlx::query_as(
        "SELECT EXISTS (
             SELECT 1 FROM orders
             WHERE participant_id = $1 AND event_id = $2 AND modality_id = $3
               AND status IN ('PENDING', 'CONFIRMED')
         )",
    )
    .bind(participant_id)
    .bind(event_id)
    .bind(modality_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(row.0)
}

/// Mirror an external intermediate payment status onto a still-pending
/// order. The internal state does not change.
pub async fn mark_processing(pool: &PgPool, order_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE orders SET payment_status = 'PROCESSING'
         WHERE id = $1 AND status = 'PENDING'",
    )
    .bind(order_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Pending orders stamped with the same checkout-preference pseudo id prefix,
/// excluding the given order. These were paid by the same checkout payment.
pub async fn list_pending_by_payment_prefix(
    pool: &PgPool,
    prefix: &str,
    exclude: Uuid,
) -> Result<Vec<OrderRow>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM orders
         WHERE status = 'PENDING' AND id <> $2
           AND payment_id IS NOT NULL
           AND left(payment_id, length($1) + 1) = $1 || '_'
         ORDER BY order_number",
    )
    .bind(prefix)
    .bind(exclude)
    .fetch_all(pool)
    .await
}

/// The primary order of a checkout group: the lowest order number among the
/// orders created together. The checkout preference's `external_reference`
/// carries this order's id.
pub async fn find_group_primary(
    pool: &PgPool,
    checkout_ref: &str,
) -> Result<Option<OrderRow>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM orders WHERE checkout_ref = $1 ORDER BY order_number LIMIT 1",
    )
    .bind(checkout_ref)
    .fetch_optional(pool)
    .await
}

/// An order previously stamped with this processor payment id, if any.
pub async fn find_by_payment_id(
    pool: &PgPool,
    payment_id: &str,
) -> Result<Option<OrderRow>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE payment_id = $1 LIMIT 1")
        .bind(payment_id)
        .fetch_optional(pool)
        .await
}

/// Stamp the processor payment id discovered during reconciliation so future
/// lookups can fetch the payment directly.
pub async fn set_payment_id(
    pool: &PgPool,
    order_id: Uuid,
    payment_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE orders SET payment_id = $1 WHERE id = $2")
        .bind(payment_id)
        .bind(order_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Stamp the checkout-preference pseudo payment id (`<preferenceId>_<orderId>`)
/// at checkout creation time.
pub async fn set_preference_payment_id(
    pool: &PgPool,
    order_id: Uuid,
    preference_id: &str,
) -> Result<(), sqlx::Error> {
    let pseudo = format!("{preference_id}_{order_id}");
    sqlx::query("UPDATE orders SET payment_id = $1 WHERE id = $2 AND status = 'PENDING'")
        .bind(pseudo)
        .bind(order_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// PENDING → CONFIRMED/APPROVED. Returns whether the transition fired; a
/// `false` means the order was already terminal and nothing was re-stamped.
pub async fn confirm(
    pool: &PgPool,
    order_id: Uuid,
    payment_id: &str,
    payment_method: Option<&str>,
    processor_fee: Option<Decimal>,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE orders
         SET status = 'CONFIRMED', payment_status = 'APPROVED',
             payment_id = $2, payment_method = $3, processor_fee = $4, confirmed_at = $5
         WHERE id = $1 AND status = 'PENDING'",
    )
    .bind(order_id)
    .bind(payment_id)
    .bind(payment_method)
    .bind(processor_fee)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// PENDING → CANCELLED with the given payment status. Same idempotency
/// contract as [`confirm`].
pub async fn cancel(
    pool: &PgPool,
    order_id: Uuid,
    payment_status: PaymentStatus,
    payment_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE orders
         SET status = 'CANCELLED', payment_status = $2,
             payment_id = COALESCE($3, payment_id), cancelled_at = $4
         WHERE id = $1 AND status = 'PENDING'",
    )
    .bind(order_id)
    .bind(payment_status.as_db())
    .bind(payment_id)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Recently created pending orders, oldest first, bounded — the sweep input.
pub async fn list_pending_for_sweep(
    pool: &PgPool,
    window_hours: i64,
    limit: i64,
) -> Result<Vec<OrderRow>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM orders
         WHERE status = 'PENDING' AND created_at > now() - ($1 * interval '1 hour')
         ORDER BY created_at
         LIMIT $2",
    )
    .bind(window_hours)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn list_by_buyer(pool: &PgPool, buyer_id: Uuid) -> Result<Vec<OrderRow>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE buyer_id = $1 ORDER BY created_at")
        .bind(buyer_id)
        .fetch_all(pool)
        .await
}
