//! Caller identity as asserted by the external identity provider.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::types::UserId;

/// Identity attached to every authenticated request by the auth middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthIdentity {
    pub user_id: UserId,
    /// Identity provider auth session (one per login on one device).
    pub auth_session_id: String,
    /// When the auth session was established.
    pub authenticated_at: DateTime<Utc>,
}

impl AuthIdentity {
    pub fn new(user_id: UserId, auth_session_id: impl Into<String>, authenticated_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            auth_session_id: auth_session_id.into(),
            authenticated_at,
        }
    }

    /// Stable correlation key for this login instance.
    pub fn device_key(&self) -> String {
        derive_device_key(&self.auth_session_id)
    }
}

/// Hashes the auth session reference so the raw IdP id never doubles as the
/// public correlation key.
pub fn derive_device_key(auth_session_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(auth_session_id.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_key_is_stable_and_distinct_per_auth_session() {
        let user_id = UserId::new();
        let a = AuthIdentity::new(user_id, "auth-1", Utc::now());
        let again = AuthIdentity::new(user_id, "auth-1", Utc::now());
        let b = AuthIdentity::new(user_id, "auth-2", Utc::now());
        assert_eq!(a.device_key(), again.device_key());
        assert_ne!(a.device_key(), b.device_key());
        assert_eq!(a.device_key().len(), 64);
        assert_ne!(a.device_key(), a.auth_session_id);
    }
}
