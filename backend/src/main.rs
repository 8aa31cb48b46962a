use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sessionguard_backend::{
    config::{mask_secret, Config, StoreBackend},
    db::connection::create_pool,
    repositories::{InMemorySessionStore, PgSessionStore, SessionStore},
    router::build_router,
    services::{
        DisabledGeoLocator, GeoLocator, HttpGeoLocator, HttpIdentityProvider, IdentityProvider,
        InMemoryIdentityProvider,
    },
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sessionguard_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;
    tracing::info!(
        session_store = ?config.session_store,
        jwt_secret = %mask_secret(&config.jwt_secret),
        idp_admin_url = config.idp_admin_url.as_deref().unwrap_or("<disabled>"),
        idp_service_key = %mask_secret(&config.idp_service_key),
        geolocation_url = config.geolocation_url.as_deref().unwrap_or("<disabled>"),
        store_timeout_ms = config.store_timeout.as_millis() as u64,
        bind_addr = %config.bind_addr,
        "Loaded configuration from environment/.env"
    );

    let store: Arc<dyn SessionStore> = match config.session_store {
        StoreBackend::Postgres => {
            let pool = create_pool(
                &config.database_url,
                config.db_max_connections,
                config.store_timeout,
            )
            .await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            Arc::new(PgSessionStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory session store; sessions are lost on restart");
            Arc::new(InMemorySessionStore::new())
        }
    };

    let identity_provider: Arc<dyn IdentityProvider> = match config.idp_admin_url.as_deref() {
        Some(url) => Arc::new(HttpIdentityProvider::new(
            url,
            config.idp_service_key.clone(),
            config.idp_timeout,
        )?),
        None => {
            tracing::warn!("IDP_ADMIN_URL not set; auth sessions are only invalidated locally");
            Arc::new(InMemoryIdentityProvider::new())
        }
    };

    let geo_locator: Arc<dyn GeoLocator> = match config.geolocation_url.as_deref() {
        Some(url) => Arc::new(HttpGeoLocator::new(url, config.geolocation_timeout)?),
        None => Arc::new(DisabledGeoLocator),
    };

    let bind_addr = config.bind_addr;
    let app = build_router(AppState::new(config, store, identity_provider, geo_locator));

    // Start server
    tracing::info!("Server listening on {}", bind_addr);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
