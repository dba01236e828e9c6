//! API routes

pub mod checkout;
pub mod credentials;
pub mod health;
pub mod orders;
pub mod quotes;
pub mod webhook;

use axum::Router;
use axum::routing::{get, post, put};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the service router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/api/events/{event_id}/modalities/{modality_id}/quote",
            get(quotes::get_quote),
        )
        .route("/api/checkout", post(checkout::create_checkout))
        .route("/api/orders/{order_id}/sync", post(orders::sync_order))
        .route("/api/reconcile/sweep", post(orders::trigger_sweep))
        .route("/api/buyers/{buyer_id}/orders", get(orders::list_grouped))
        .route(
            "/api/organizers/{organizer_id}/credentials",
            put(credentials::store_credential),
        )
        .route("/webhooks/processor", post(webhook::handle_webhook))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
