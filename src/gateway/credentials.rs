//! Processor credential selection
//!
//! Priority order: the organizer's own connected token (split payment
//! supported), then the configured fallback seller token (split supported,
//! sandbox), then the configured application token (no seller authorization,
//! so no split). A decryption failure is terminal for that organizer's flow
//! only; the caller decides whether to isolate it.

use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;
use crate::crypto::MasterKey;
use crate::db::credentials as credential_store;
use crate::error::{AppError, AppResult};

/// Where the selected token came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Organizer's connected account
    Organizer,
    /// Configured fallback seller (sandbox testing)
    FallbackSeller,
    /// Configured application token
    Application,
}

/// A resolved credential for one outbound processor call
#[derive(Clone)]
pub struct CheckoutCredential {
    pub access_token: String,
    pub source: CredentialSource,
    /// Whether a marketplace fee can be attached to the preference
    pub supports_split: bool,
    /// Test credentials get the sandbox checkout URL
    pub is_test: bool,
}

impl std::fmt::Debug for CheckoutCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutCredential")
            .field("source", &self.source)
            .field("supports_split", &self.supports_split)
            .field("is_test", &self.is_test)
            .finish_non_exhaustive()
    }
}

/// Select the processor credential for an organizer
pub async fn select_credential(
    pool: &PgPool,
    vault: &MasterKey,
    config: &Config,
    organizer_id: Uuid,
) -> AppResult<CheckoutCredential> {
    if let Some(stored) = credential_store::find_by_organizer(pool, organizer_id).await? {
        let access_token = vault.decrypt(&stored.access_token_enc).map_err(|e| {
            AppError::credential(format!("organizer {organizer_id} token unusable: {e}"))
        })?;
        return Ok(CheckoutCredential {
            access_token,
            source: CredentialSource::Organizer,
            supports_split: true,
            is_test: stored.is_test,
        });
    }

    if let Some(token) = &config.fallback_seller_token {
        return Ok(CheckoutCredential {
            access_token: token.clone(),
            source: CredentialSource::FallbackSeller,
            supports_split: true,
            is_test: true,
        });
    }

    if let Some(token) = &config.fallback_app_token {
        return Ok(CheckoutCredential {
            access_token: token.clone(),
            source: CredentialSource::Application,
            supports_split: false,
            is_test: false,
        });
    }

    Err(AppError::credential(format!(
        "no processor credential available for organizer {organizer_id}"
    )))
}
