use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Opens the session store pool. `acquire_timeout` keeps a saturated pool
/// from stalling requests past the store timeout.
pub async fn create_pool(
    database_url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await?;
    Ok(pool)
}
