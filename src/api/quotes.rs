//! Quote endpoint
//!
//! GET /api/events/{event_id}/modalities/{modality_id}/quote?coupon=CODE

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::pricing::{self, Quote};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct QuoteParams {
    pub coupon: Option<String>,
}

pub async fn get_quote(
    State(state): State<AppState>,
    Path((event_id, modality_id)): Path<(Uuid, Uuid)>,
    Query(params): Query<QuoteParams>,
) -> AppResult<Json<Quote>> {
    let quote = pricing::quote(
        &state.pool,
        &state.config.platform_fee,
        event_id,
        modality_id,
        params.coupon.as_deref(),
    )
    .await?;
    Ok(Json(quote))
}
