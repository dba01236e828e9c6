//! Order creation
//!
//! Validates eligibility, reserves inventory, assigns sequential order
//! numbers and persists pending orders. One request may register several
//! participants; all of its orders are created in a single transaction so a
//! failed reservation never leaves counters partially incremented.

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::orders::{NewOrder, OrderRow};
use crate::db::{batches, coupons, events, orders as order_store, stock};
use crate::error::{AppError, AppResult};
use crate::pricing;
use crate::state::AppState;

/// One participant registration inside a checkout
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationEntry {
    pub participant_id: Uuid,
    pub modality_id: Uuid,
    pub apparel_size: Option<String>,
}

/// A checkout request: one buyer registering one or more participants
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationRequest {
    pub event_id: Uuid,
    pub participants: Vec<RegistrationEntry>,
    pub coupon_code: Option<String>,
}

/// Row locks are acquired in ascending modality id order by every
/// transaction (participant id as a stable tie-break), so two checkouts
/// over overlapping modalities queue on the lowest shared modality instead
/// of deadlocking.
fn lock_order(entries: &[RegistrationEntry]) -> Vec<&RegistrationEntry> {
    let mut sorted: Vec<&RegistrationEntry> = entries.iter().collect();
    sorted.sort_by_key(|e| (e.modality_id, e.participant_id));
    sorted
}

/// Create pending orders for a registration request.
///
/// Failure taxonomy: `NotFound` for a missing event/modality, `Validation`
/// for an unpublished event, closed window or inactive modality, `Conflict`
/// for a duplicate active order, sold-out capacity/size, or an exhausted
/// batch/coupon.
pub async fn create_orders(
    state: &AppState,
    buyer_id: Uuid,
    req: &RegistrationRequest,
) -> AppResult<Vec<OrderRow>> {
    let event = events::find_event(&state.pool, req.event_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Event {}", req.event_id)))?;

    if !event.published {
        return Err(AppError::validation("event is not published"));
    }
    let now = Utc::now();
    if now < event.registration_start || now > event.registration_end {
        return Err(AppError::validation("registration window is closed"));
    }
    if req.participants.is_empty() {
        return Err(AppError::validation("at least one participant is required"));
    }

    let entries = lock_order(&req.participants);

    // Quote every entry up front; quotes are deterministic so the price
    // persisted below is the price the buyer was shown.
    let mut quotes = Vec::with_capacity(entries.len());
    for entry in &entries {
        let quote = pricing::quote(
            &state.pool,
            &state.config.platform_fee,
            event.id,
            entry.modality_id,
            req.coupon_code.as_deref(),
        )
        .await?;
        quotes.push(quote);
    }

    let checkout_ref = format!("chk_{}", Uuid::new_v4().simple());
    let mut created_ids = Vec::with_capacity(entries.len());

    let mut tx = state.pool.begin().await.map_err(AppError::from)?;

    // Phase one: take the modality locks (in lock_order's global order),
    // validate and reserve inventory. The event row and the discount
    // counters are not touched until every modality lock is held, keeping
    // the overall acquisition order identical across transactions.
    let mut prepared = Vec::with_capacity(entries.len());
    for (entry, quote) in entries.iter().zip(&quotes) {
        let modality = events::lock_modality(&mut tx, entry.modality_id)
            .await?
            .filter(|m| m.event_id == event.id)
            .ok_or_else(|| AppError::not_found(format!("Modality {}", entry.modality_id)))?;

        if !modality.active {
            return Err(AppError::validation(format!(
                "modality {} is not active",
                modality.name
            )));
        }

        if let Some(max_slots) = modality.max_slots {
            let active = order_store::count_active_for_modality(&mut tx, modality.id).await?;
            if active >= i64::from(max_slots) {
                return Err(AppError::conflict(format!(
                    "modality {} is sold out",
                    modality.name
                )));
            }
        }

        if order_store::has_active_order(&mut tx, entry.participant_id, event.id, modality.id)
            .await?
        {
            return Err(AppError::conflict(format!(
                "participant {} already has an active order for this modality",
                entry.participant_id
            )));
        }

        let apparel_size = if event.requires_apparel_size {
            let size = entry
                .apparel_size
                .as_deref()
                .ok_or_else(|| AppError::validation("apparel size is required for this event"))?;
            if !stock::reserve(&mut tx, event.id, size).await? {
                return Err(AppError::conflict("size sold out"));
            }
            Some(size.to_string())
        } else {
            None
        };

        prepared.push((*entry, quote, modality, apparel_size));
    }

    // Phase two: sequence, persist, and count the sales against the
    // batch/coupon that priced each order. Both increments are conditional
    // so a tier that filled up since the quote fails the checkout instead
    // of overshooting its cap.
    for (entry, quote, modality, apparel_size) in prepared {
        let order_number = events::next_order_number(&mut tx, event.id).await?;

        let order = NewOrder {
            id: Uuid::new_v4(),
            event_id: event.id,
            modality_id: modality.id,
            participant_id: entry.participant_id,
            buyer_id,
            coupon_id: quote.coupon_id,
            order_number,
            base_price: quote.breakdown.base_price,
            discount: quote.breakdown.discount(),
            subtotal: quote.breakdown.subtotal,
            platform_fee: quote.breakdown.platform_fee,
            total: quote.breakdown.total,
            apparel_size,
            checkout_ref: checkout_ref.clone(),
            created_at: now,
        };
        order_store::insert(&mut tx, &order)
            .await
            .map_err(map_duplicate)?;
        created_ids.push(order.id);

        if let Some(batch_id) = quote.batch_id
            && !batches::increment_sales(&mut tx, batch_id).await?
        {
            return Err(AppError::conflict("discount batch is no longer available"));
        }
        if let Some(coupon_id) = quote.coupon_id
            && !coupons::increment_uses(&mut tx, coupon_id).await?
        {
            return Err(AppError::conflict("coupon exhausted"));
        }
    }

    tx.commit().await.map_err(AppError::from)?;

    tracing::info!(
        event = %event.id,
        buyer = %buyer_id,
        orders = created_ids.len(),
        checkout_ref = %checkout_ref,
        "Orders created"
    );

    Ok(order_store::find_by_ids(&state.pool, &created_ids).await?)
}

/// A unique-index violation on the partial active-order index means another
/// request registered the same participant concurrently.
fn map_duplicate(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &e
        && db.code().as_deref() == Some("23505")
    {
        return AppError::conflict("participant already has an active order for this modality");
    }
    AppError::from(e)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(modality_byte: u8, participant_byte: u8) -> RegistrationEntry {
        RegistrationEntry {
            participant_id: Uuid::from_bytes([participant_byte; 16]),
            modality_id: Uuid::from_bytes([modality_byte; 16]),
            apparel_size: None,
        }
    }

    #[test]
    fn lock_order_is_global_regardless_of_request_order() {
        let forward = [entry(1, 9), entry(2, 8)];
        let reverse = [entry(2, 8), entry(1, 9)];

        let a: Vec<Uuid> = lock_order(&forward).iter().map(|e| e.modality_id).collect();
        let b: Vec<Uuid> = lock_order(&reverse).iter().map(|e| e.modality_id).collect();
        assert_eq!(a, b);
        assert!(a.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn lock_order_breaks_modality_ties_by_participant() {
        let entries = [entry(5, 7), entry(5, 2), entry(3, 9)];
        let sorted = lock_order(&entries);

        assert_eq!(sorted[0].modality_id, Uuid::from_bytes([3; 16]));
        assert_eq!(sorted[1].participant_id, Uuid::from_bytes([2; 16]));
        assert_eq!(sorted[2].participant_id, Uuid::from_bytes([7; 16]));
    }
}
