//! Database access layer
//!
//! Plain-sqlx query modules, one file per aggregate. All multi-step writes
//! run inside explicit transactions; the hot counters (order sequencing,
//! size reservations, batch sales, coupon uses) are single conditional
//! UPDATEs checked via `rows_affected`.

pub mod batches;
pub mod coupons;
pub mod credentials;
pub mod events;
pub mod orders;
pub mod stock;

use sqlx::PgPool;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Connect to PostgreSQL and apply migrations
pub async fn connect(database_url: &str) -> Result<PgPool, BoxError> {
    let pool = PgPool::connect(database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database connected, migrations applied");
    Ok(pool)
}
