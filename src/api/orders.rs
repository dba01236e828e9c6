//! Order sync, sweep trigger and grouped listing endpoints

use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;
use uuid::Uuid;

use crate::db::orders as order_store;
use crate::db::orders::OrderRow;
use crate::error::{AppError, AppResult};
use crate::orders::{OrderGroup, group_orders};
use crate::reconcile::{self, SweepReport, SyncOutcome};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub outcome: SyncOutcome,
    pub order: OrderRow,
}

/// POST /api/orders/{order_id}/sync — client-initiated pull sync
pub async fn sync_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<SyncResponse>> {
    let outcome = reconcile::sync_order(&state, order_id).await?;
    let order = order_store::find_by_id(&state.pool, order_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Order {order_id}")))?;
    Ok(Json(SyncResponse { outcome, order }))
}

/// POST /api/reconcile/sweep — manual sweep trigger
pub async fn trigger_sweep(State(state): State<AppState>) -> AppResult<Json<SweepReport>> {
    Ok(Json(reconcile::run_sweep(&state).await?))
}

/// GET /api/buyers/{buyer_id}/orders — orders grouped by checkout
pub async fn list_grouped(
    State(state): State<AppState>,
    Path(buyer_id): Path<Uuid>,
) -> AppResult<Json<Vec<OrderGroup>>> {
    let rows = order_store::list_by_buyer(&state.pool, buyer_id).await?;
    Ok(Json(group_orders(rows)))
}
