//! Retires device sessions idle for longer than `SESSION_INACTIVITY_DAYS`.
//! Meant to run from cron; expired devices see `reason = "expired"` on their
//! next validity check, and their next heartbeat opens a fresh row.

use chrono::{Duration, Utc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sessionguard_backend::{
    config::Config,
    db::connection::create_pool,
    repositories::{with_timeout, PgSessionStore, SessionStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "session_expiry=info,sessionguard_backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    let pool = create_pool(
        &config.database_url,
        config.db_max_connections,
        config.store_timeout,
    )
    .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    let store = PgSessionStore::new(pool.clone());

    let now = Utc::now();
    let window = Duration::try_days(config.session_inactivity_days).ok_or_else(|| {
        anyhow::anyhow!(
            "SESSION_INACTIVITY_DAYS out of range: {}",
            config.session_inactivity_days
        )
    })?;
    let cutoff = now - window;
    // The sweep touches many rows; give it more headroom than a request.
    let expired = with_timeout(config.store_timeout * 30, store.expire_inactive(cutoff, now)).await?;
    tracing::info!(
        expired,
        cutoff = %cutoff,
        inactivity_days = config.session_inactivity_days,
        "Expired inactive device sessions"
    );

    if expired > 0 {
        sqlx::query("VACUUM (ANALYZE) device_sessions")
            .execute(&pool)
            .await?;
    }

    Ok(())
}
