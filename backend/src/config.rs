use anyhow::anyhow;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Which [`crate::repositories::SessionStore`] backend to run with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(anyhow!("Invalid SESSION_STORE value: {}", other)),
        }
    }
}

/// Upper bound for `SESSION_INACTIVITY_DAYS` (ten years).
pub const MAX_SESSION_INACTIVITY_DAYS: i64 = 3650;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub session_store: StoreBackend,
    pub jwt_secret: String,
    pub store_timeout: Duration,
    pub db_max_connections: u32,
    pub idp_admin_url: Option<String>,
    pub idp_service_key: String,
    pub idp_timeout: Duration,
    pub geolocation_url: Option<String>,
    pub geolocation_timeout: Duration,
    pub session_inactivity_days: i64,
    pub cors_allow_origins: Vec<String>,
    pub bind_addr: SocketAddr,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. `load` feeds it the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = non_empty("DATABASE_URL")
            .unwrap_or_else(|| "postgres://localhost:5432/sessionguard".to_string());

        let session_store = non_empty("SESSION_STORE")
            .map(|raw| raw.parse())
            .transpose()?
            .unwrap_or(StoreBackend::Postgres);

        let jwt_secret = non_empty("JWT_SECRET")
            .unwrap_or_else(|| "your-secret-key-change-this-in-production".to_string());

        let millis = |key: &str, default: u64| {
            Duration::from_millis(
                non_empty(key)
                    .and_then(|raw| raw.trim().parse().ok())
                    .unwrap_or(default),
            )
        };

        let db_max_connections = non_empty("DB_MAX_CONNECTIONS")
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(10);

        let session_inactivity_days = non_empty("SESSION_INACTIVITY_DAYS")
            .and_then(|raw| raw.trim().parse().ok())
            .filter(|days: &i64| *days > 0)
            .unwrap_or(30);
        if session_inactivity_days > MAX_SESSION_INACTIVITY_DAYS {
            return Err(anyhow!(
                "SESSION_INACTIVITY_DAYS must be at most {}, got {}",
                MAX_SESSION_INACTIVITY_DAYS,
                session_inactivity_days
            ));
        }

        let cors_allow_origins = non_empty("CORS_ALLOW_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let bind_raw = non_empty("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_addr: SocketAddr = bind_raw
            .trim()
            .parse()
            .map_err(|_| anyhow!("Invalid BIND_ADDR value: {}", bind_raw))?;

        Ok(Config {
            database_url,
            session_store,
            jwt_secret,
            store_timeout: millis("STORE_TIMEOUT_MS", 2000),
            db_max_connections,
            idp_admin_url: non_empty("IDP_ADMIN_URL"),
            idp_service_key: non_empty("IDP_SERVICE_KEY").unwrap_or_default(),
            idp_timeout: millis("IDP_TIMEOUT_MS", 3000),
            geolocation_url: non_empty("GEOLOCATION_URL"),
            geolocation_timeout: millis("GEOLOCATION_TIMEOUT_MS", 1500),
            session_inactivity_days,
            cors_allow_origins,
            bind_addr,
        })
    }
}

pub fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "<empty>".into();
    }
    let prefix = s.chars().take(4).collect::<String>();
    format!("{}*** (len={})", prefix, s.len())
}
