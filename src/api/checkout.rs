//! Checkout endpoint
//!
//! POST /api/checkout — creates the pending orders and the processor
//! checkout session in one flow and returns the redirect URL. The buyer id
//! arrives from the auth collaborator as the `x-buyer-id` header.

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::orders as order_store;
use crate::db::orders::OrderRow;
use crate::error::{AppError, AppResult};
use crate::gateway;
use crate::orders::{RegistrationEntry, RegistrationRequest, create_orders};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub event_id: Uuid,
    pub participants: Vec<RegistrationEntry>,
    pub coupon_code: Option<String>,
    pub payer_email: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub orders: Vec<OrderRow>,
    pub checkout_url: String,
    pub preference_id: String,
}

pub async fn create_checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CheckoutRequest>,
) -> AppResult<(StatusCode, Json<CheckoutResponse>)> {
    let buyer_id = buyer_id_from(&headers)?;

    let registration = RegistrationRequest {
        event_id: req.event_id,
        participants: req.participants,
        coupon_code: req.coupon_code,
    };
    let created = create_orders(&state, buyer_id, &registration).await?;
    let ids: Vec<Uuid> = created.iter().map(|o| o.id).collect();

    let session = gateway::create_checkout(&state, &ids, &req.payer_email).await?;

    // Re-read: checkout creation stamped the preference pseudo payment ids.
    let orders = order_store::find_by_ids(&state.pool, &ids).await?;

    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            orders,
            checkout_url: session.checkout_url,
            preference_id: session.preference_id,
        }),
    ))
}

fn buyer_id_from(headers: &HeaderMap) -> AppResult<Uuid> {
    headers
        .get("x-buyer-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| AppError::validation("x-buyer-id header missing or not a UUID"))
}
