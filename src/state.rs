//! Shared application state
//!
//! Everything a handler needs is constructed once here and injected; no
//! component reaches for a module-level singleton.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::crypto::MasterKey;
use crate::db;
use crate::gateway::ProcessorClient;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL connection pool
    pub pool: PgPool,
    pub config: Arc<Config>,
    /// Credential vault key
    pub vault: MasterKey,
    /// Payment processor REST client
    pub gateway: Arc<ProcessorClient>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self, BoxError> {
        let pool = db::connect(&config.database_url).await?;
        let vault = MasterKey::from_hex(&config.master_key_hex)?;
        let gateway =
            ProcessorClient::new(&config.processor_base_url, config.processor_timeout_ms)?;

        Ok(Self {
            pool,
            config: Arc::new(config),
            vault,
            gateway: Arc::new(gateway),
        })
    }
}
