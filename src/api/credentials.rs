//! Organizer credential endpoint
//!
//! PUT /api/organizers/{organizer_id}/credentials — stores the organizer's
//! processor tokens. Tokens are encrypted before they touch the database
//! and never appear in a response or a log line.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::credentials as credential_store;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct StoreCredentialRequest {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub collector_id: Option<String>,
    #[serde(default)]
    pub is_test: bool,
}

pub async fn store_credential(
    State(state): State<AppState>,
    Path(organizer_id): Path<Uuid>,
    Json(req): Json<StoreCredentialRequest>,
) -> AppResult<StatusCode> {
    if req.access_token.is_empty() {
        return Err(AppError::validation("access_token must not be empty"));
    }

    let access_token_enc = state
        .vault
        .encrypt(&req.access_token)
        .map_err(|e| AppError::credential(format!("token encryption failed: {e}")))?;
    let refresh_token_enc = match &req.refresh_token {
        Some(token) => Some(
            state
                .vault
                .encrypt(token)
                .map_err(|e| AppError::credential(format!("token encryption failed: {e}")))?,
        ),
        None => None,
    };

    credential_store::upsert(
        &state.pool,
        organizer_id,
        &access_token_enc,
        refresh_token_enc.as_deref(),
        req.collector_id.as_deref(),
        req.is_test,
    )
    .await?;

    tracing::info!(organizer = %organizer_id, is_test = req.is_test, "Credential stored");
    Ok(StatusCode::NO_CONTENT)
}
