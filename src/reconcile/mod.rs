//! Payment reconciliation
//!
//! Aligns internal order state with the processor's authoritative payment
//! record. Three triggers share one code path: webhook push, single-order
//! pull sync and the periodic sweep. The terminal transition is a
//! conditional update, so any interleaving of triggers records exactly one
//! CONFIRMED or CANCELLED transition per order.

mod lookup;
mod sweep;

pub use lookup::{FoundPayment, LookupStrategy, PaymentSource, find_payment};
pub use sweep::{SweepFailure, SweepReport, run_sweep};

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::db::orders::{self as order_store, OrderRow, PaymentStatus};
use crate::db::{events, stock};
use crate::error::{AppError, AppResult};
use crate::gateway::{Payment, select_credential};
use crate::state::AppState;

/// Result of one reconciliation pass over one order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The order was already terminal; nothing was touched
    AlreadyFinal,
    Confirmed,
    Cancelled,
    /// A payment exists but has no terminal outcome yet
    StillPending,
    /// The processor has no payment for this order
    NoPaymentFound,
}

/// Reconcile one order against the processor.
///
/// When the payment settles a whole checkout, the pending sibling orders
/// stamped with the same preference pseudo id are transitioned too, so a
/// webhook for the primary order settles the entire group.
pub async fn sync_order(state: &AppState, order_id: Uuid) -> AppResult<SyncOutcome> {
    let order = order_store::find_by_id(&state.pool, order_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Order {order_id}")))?;
    if order.is_terminal() {
        return Ok(SyncOutcome::AlreadyFinal);
    }

    let event = events::find_event(&state.pool, order.event_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Event {}", order.event_id)))?;
    let credential =
        select_credential(&state.pool, &state.vault, &state.config, event.organizer_id).await?;

    // The pseudo id is replaced by the real payment id on transition, so the
    // group prefix must be captured before anything is applied.
    let group_prefix = preference_prefix(order.payment_id.as_deref()).map(str::to_string);

    let mut found =
        find_payment(state.gateway.as_ref(), &credential.access_token, &order).await?;

    // A non-primary sibling's own id never appears as `external_reference`;
    // its payment is only reachable through the group's primary order.
    if found.is_none()
        && let Some(checkout_ref) = &order.checkout_ref
        && let Some(primary) = order_store::find_group_primary(&state.pool, checkout_ref).await?
        && primary.id != order.id
    {
        found = find_payment(state.gateway.as_ref(), &credential.access_token, &primary).await?;
    }

    let Some(found) = found else {
        return Ok(SyncOutcome::NoPaymentFound);
    };

    let outcome = apply_payment(state, &order, &found.payment).await?;

    match outcome {
        SyncOutcome::Confirmed | SyncOutcome::Cancelled => {
            if let Some(prefix) = group_prefix {
                let siblings =
                    order_store::list_pending_by_payment_prefix(&state.pool, &prefix, order.id)
                        .await?;
                for sibling in &siblings {
                    apply_payment(state, sibling, &found.payment).await?;
                }
            }
        }
        SyncOutcome::StillPending => {
            // Persist a discovered id only on rows that had none; a pseudo id
            // is kept because it is what ties a checkout group together.
            if found.strategy == LookupStrategy::ExternalReference && order.payment_id.is_none() {
                order_store::set_payment_id(&state.pool, order.id, &found.payment.id.to_string())
                    .await?;
            }
        }
        _ => {}
    }

    Ok(outcome)
}

/// Reconcile from a webhook notification carrying only a payment id.
///
/// The notification body is never trusted: the payment is re-fetched from
/// the processor and the order is resolved through its `external_reference`.
pub async fn sync_by_payment(state: &AppState, payment_id: &str) -> AppResult<SyncOutcome> {
    if let Some(order) = order_store::find_by_payment_id(&state.pool, payment_id).await? {
        return sync_order(state, order.id).await;
    }

    let token = state
        .config
        .fallback_app_token
        .as_deref()
        .or(state.config.fallback_seller_token.as_deref())
        .ok_or_else(|| {
            AppError::Reconciliation("no application token available to resolve webhook".into())
        })?;
    let payment = state
        .gateway
        .get_payment(token, payment_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Payment {payment_id}")))?;

    let order_id = payment
        .external_reference
        .as_deref()
        .and_then(|r| Uuid::parse_str(r).ok())
        .ok_or_else(|| {
            AppError::Reconciliation(format!(
                "payment {payment_id} carries no usable external_reference"
            ))
        })?;
    sync_order(state, order_id).await
}

/// Apply one observed payment to one order. Inventory follows the order's
/// own transition: promote the size reservation on confirm, release it on
/// cancel, and only when this call actually fired the transition.
async fn apply_payment(
    state: &AppState,
    order: &OrderRow,
    payment: &Payment,
) -> AppResult<SyncOutcome> {
    let now = Utc::now();
    let payment_id = payment.id.to_string();
    // The fee belongs to the checkout's primary order, the one the payment
    // references; stamping it on every sibling would multiply it.
    let order_ref = order.id.to_string();
    let is_reference_order = payment.external_reference.as_deref() == Some(order_ref.as_str());

    match payment.status.as_str() {
        "approved" => {
            let fee = if is_reference_order {
                processor_fee(payment)
            } else {
                None
            };
            let fired = order_store::confirm(
                &state.pool,
                order.id,
                &payment_id,
                payment.payment_method_id.as_deref(),
                fee,
                now,
            )
            .await?;
            if !fired {
                return Ok(SyncOutcome::AlreadyFinal);
            }
            if let Some(size) = &order.apparel_size {
                stock::promote_to_sold(&state.pool, order.event_id, size).await?;
            }
            tracing::info!(order = %order.id, payment = payment.id, "Order confirmed");
            Ok(SyncOutcome::Confirmed)
        }
        "rejected" => cancel_order(state, order, PaymentStatus::Rejected, &payment_id, now).await,
        "cancelled" => cancel_order(state, order, PaymentStatus::Cancelled, &payment_id, now).await,
        "refunded" | "charged_back" => {
            cancel_order(state, order, PaymentStatus::Refunded, &payment_id, now).await
        }
        "in_process" | "authorized" => {
            order_store::mark_processing(&state.pool, order.id).await?;
            Ok(SyncOutcome::StillPending)
        }
        _ => Ok(SyncOutcome::StillPending),
    }
}

async fn cancel_order(
    state: &AppState,
    order: &OrderRow,
    payment_status: PaymentStatus,
    payment_id: &str,
    now: chrono::DateTime<Utc>,
) -> AppResult<SyncOutcome> {
    let fired =
        order_store::cancel(&state.pool, order.id, payment_status, Some(payment_id), now).await?;
    if !fired {
        return Ok(SyncOutcome::AlreadyFinal);
    }
    if let Some(size) = &order.apparel_size {
        stock::release(&state.pool, order.event_id, size).await?;
    }
    tracing::info!(
        order = %order.id,
        payment_status = payment_status.as_db(),
        "Order cancelled"
    );
    Ok(SyncOutcome::Cancelled)
}

/// Processor fee for an approved payment, by fallback chain: the sum of the
/// itemized fee entries, else gross minus net minus the marketplace fee,
/// else unknown.
fn processor_fee(payment: &Payment) -> Option<Decimal> {
    if !payment.fee_details.is_empty() {
        return Some(payment.fee_details.iter().map(|f| f.amount).sum());
    }
    let gross = payment.transaction_amount?;
    let net = payment
        .transaction_details
        .as_ref()?
        .net_received_amount?;
    let marketplace = payment.marketplace_fee.unwrap_or(Decimal::ZERO);
    Some(gross - net - marketplace)
}

/// The shared prefix of a preference pseudo payment id, if the order carries
/// one.
fn preference_prefix(payment_id: Option<&str>) -> Option<&str> {
    let (prefix, suffix) = payment_id?.rsplit_once('_')?;
    if prefix.is_empty() || suffix.is_empty() {
        return None;
    }
    Some(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{FeeDetail, TransactionDetails};

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn approved_payment() -> Payment {
        Payment {
            id: 555,
            status: "approved".into(),
            status_detail: Some("accredited".into()),
            payment_method_id: Some("pix".into()),
            external_reference: None,
            transaction_amount: None,
            marketplace_fee: None,
            fee_details: Vec::new(),
            transaction_details: None,
        }
    }

    #[test]
    fn fee_from_itemized_details() {
        let mut p = approved_payment();
        p.fee_details = vec![
            FeeDetail { amount: dec("3.10") },
            FeeDetail { amount: dec("0.90") },
        ];
        // Itemized entries win even when the arithmetic inputs are present.
        p.transaction_amount = Some(dec("93.50"));
        p.transaction_details = Some(TransactionDetails {
            net_received_amount: Some(dec("80.00")),
        });

        assert_eq!(processor_fee(&p), Some(dec("4.00")));
    }

    #[test]
    fn fee_from_gross_minus_net_minus_marketplace() {
        let mut p = approved_payment();
        p.transaction_amount = Some(dec("93.50"));
        p.marketplace_fee = Some(dec("8.50"));
        p.transaction_details = Some(TransactionDetails {
            net_received_amount: Some(dec("81.00")),
        });

        assert_eq!(processor_fee(&p), Some(dec("4.00")));
    }

    #[test]
    fn fee_arithmetic_without_marketplace_fee() {
        let mut p = approved_payment();
        p.transaction_amount = Some(dec("93.50"));
        p.transaction_details = Some(TransactionDetails {
            net_received_amount: Some(dec("89.50")),
        });

        assert_eq!(processor_fee(&p), Some(dec("4.00")));
    }

    #[test]
    fn fee_unknown_when_nothing_usable() {
        let mut p = approved_payment();
        p.transaction_amount = Some(dec("93.50"));

        assert_eq!(processor_fee(&p), None);
    }

    #[test]
    fn preference_prefix_extraction() {
        assert_eq!(preference_prefix(Some("pref123_orderA")), Some("pref123"));
        assert_eq!(preference_prefix(Some("123456789")), None);
        assert_eq!(preference_prefix(Some("_x")), None);
        assert_eq!(preference_prefix(Some("x_")), None);
        assert_eq!(preference_prefix(None), None);
    }
}
