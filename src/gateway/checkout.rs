//! Checkout preference creation
//!
//! Builds one processor checkout session for a set of orders created
//! together. `external_reference` is set to the primary order's id — the
//! immutable correlation key reconciliation depends on.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::db::orders as order_store;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

use super::select_credential;

/// A created checkout session, ready for buyer redirect
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub checkout_url: String,
    pub preference_id: String,
}

/// Create a checkout preference for one or more orders from the same event.
///
/// Selects a processor credential by priority, attaches the marketplace fee
/// only when the credential supports split payment, and picks the sandbox
/// checkout URL for test credentials.
pub async fn create_checkout(
    state: &AppState,
    order_ids: &[Uuid],
    payer_email: &str,
) -> AppResult<CheckoutSession> {
    if order_ids.is_empty() {
        return Err(AppError::validation("checkout requires at least one order"));
    }

    let orders = order_store::find_by_ids(&state.pool, order_ids).await?;
    if orders.len() != order_ids.len() {
        return Err(AppError::not_found("one or more orders"));
    }

    let event_id = orders[0].event_id;
    if orders.iter().any(|o| o.event_id != event_id) {
        return Err(AppError::validation(
            "all orders in a checkout must belong to the same event",
        ));
    }
    if let Some(done) = orders.iter().find(|o| o.is_terminal()) {
        return Err(AppError::conflict(format!(
            "order {} is already {}",
            done.id, done.status
        )));
    }

    let event = crate::db::events::find_event(&state.pool, event_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Event {event_id}")))?;

    let credential =
        select_credential(&state.pool, &state.vault, &state.config, event.organizer_id).await?;

    let amount: Decimal = orders.iter().map(|o| o.total).sum();
    let platform_fee: Decimal = orders.iter().map(|o| o.platform_fee).sum();

    // Orders are returned ordered by order_number; the first is the primary
    // order whose id becomes the correlation key.
    let primary = &orders[0];
    let base = &state.config.public_base_url;

    let mut preference = json!({
        "items": [{
            "title": format!("{} — registration x{}", event.name, orders.len()),
            "quantity": 1,
            "unit_price": amount.to_f64().unwrap_or_default(),
        }],
        "payer": { "email": payer_email },
        "back_urls": {
            "success": format!("{base}/checkout/success"),
            "failure": format!("{base}/checkout/failure"),
            "pending": format!("{base}/checkout/pending"),
        },
        "auto_return": "approved",
        "notification_url": format!("{base}/webhooks/processor"),
        "external_reference": primary.id.to_string(),
        "metadata": {
            "checkout_ref": primary.checkout_ref,
            "order_ids": order_ids,
        },
    });
    if credential.supports_split {
        preference["marketplace_fee"] = json!(platform_fee.to_f64().unwrap_or_default());
    }

    let created = state
        .gateway
        .create_preference(&credential.access_token, &preference)
        .await?;

    // Stamp each order with the preference pseudo payment id
    // (`<preferenceId>_<orderId>`) so a checkout group is reconstructible
    // before the real payment id is known.
    for order in &orders {
        order_store::set_preference_payment_id(&state.pool, order.id, &created.id).await?;
    }

    let checkout_url = if credential.is_test {
        created
            .sandbox_init_point
            .clone()
            .unwrap_or_else(|| created.init_point.clone())
    } else {
        created.init_point.clone()
    };

    tracing::info!(
        preference_id = %created.id,
        orders = orders.len(),
        source = ?credential.source,
        "Checkout preference created"
    );

    Ok(CheckoutSession {
        checkout_url,
        preference_id: created.id,
    })
}
