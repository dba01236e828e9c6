//! Organizer gateway credential storage
//!
//! Tokens are at rest as `ivHex:authTagHex:cipherHex` and decrypted only
//! transiently for a single outbound processor call.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GatewayCredential {
    pub organizer_id: Uuid,
    pub access_token_enc: String,
    pub refresh_token_enc: Option<String>,
    pub collector_id: Option<String>,
    pub is_test: bool,
    pub updated_at: DateTime<Utc>,
}

pub async fn find_by_organizer(
    pool: &PgPool,
    organizer_id: Uuid,
) -> Result<Option<GatewayCredential>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM gateway_credentials WHERE organizer_id = $1")
        .bind(organizer_id)
        .fetch_optional(pool)
        .await
}

pub async fn upsert(
    pool: &PgPool,
    organizer_id: Uuid,
    access_token_enc: &str,
    refresh_token_enc: Option<&str>,
    collector_id: Option<&str>,
    is_test: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO gateway_credentials
             (organizer_id, access_token_enc, refresh_token_enc, collector_id, is_test, updated_at)
         VALUES ($1, $2, $3, $4, $5, now())
         ON CONFLICT (organizer_id) DO UPDATE SET
             access_token_enc = $2, refresh_token_enc = $3,
             collector_id = $4, is_test = $5, updated_at = now()",
    )
    .bind(organizer_id)
    .bind(access_token_enc)
    .bind(refresh_token_enc)
    .bind(collector_id)
    .bind(is_test)
    .execute(pool)
    .await?;
    Ok(())
}
