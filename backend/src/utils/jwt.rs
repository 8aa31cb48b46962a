use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::models::AuthIdentity;
use crate::types::UserId;

/// Claims carried by identity provider access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,        // user id
    pub session_id: String, // identity provider auth session
    pub exp: i64,           // expiration time
    pub iat: i64,           // issued at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<i64>, // first authentication, survives refreshes
}

impl Claims {
    pub fn new(user_id: UserId, session_id: impl Into<String>, expiration_minutes: i64) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id.to_string(),
            session_id: session_id.into(),
            exp: (now + Duration::minutes(expiration_minutes)).timestamp(),
            iat: now.timestamp(),
            auth_time: None,
        }
    }

    /// When the auth session was established: `auth_time`, else `iat`.
    pub fn authenticated_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.auth_time.unwrap_or(self.iat), 0)
            .single()
    }

    pub fn into_identity(self) -> anyhow::Result<AuthIdentity> {
        let user_id: UserId = self
            .sub
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid subject claim: {}", e))?;
        if self.session_id.trim().is_empty() {
            anyhow::bail!("Missing session_id claim");
        }
        let authenticated_at = self
            .authenticated_at()
            .ok_or_else(|| anyhow::anyhow!("Invalid authentication time claim"))?;
        Ok(AuthIdentity::new(user_id, self.session_id, authenticated_at))
    }
}

pub fn create_access_token(claims: &Claims, secret: &str) -> anyhow::Result<String> {
    let token = encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?;

    Ok(token)
}

pub fn verify_access_token(token: &str, secret: &str) -> anyhow::Result<Claims> {
    let validation = Validation::default();
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &validation,
    )?;

    Ok(token_data.claims)
}
