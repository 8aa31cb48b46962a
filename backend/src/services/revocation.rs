//! User-initiated revocation: one device, all other devices, sign-out.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

use crate::error::SessionError;
use crate::models::{AuthIdentity, DeviceSession, RevokedReason};
use crate::repositories::{with_timeout, SessionStore};
use crate::services::identity_provider::IdentityProvider;
use crate::types::SessionId;

/// Parses a client supplied session id.
pub fn parse_session_id(raw: &str) -> Result<SessionId, SessionError> {
    raw.parse()
        .map_err(|_| SessionError::Validation(format!("Invalid session id: {}", raw.trim())))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokeOutcome {
    pub session_id: SessionId,
    /// The row was already terminal before this call.
    pub already_revoked: bool,
    /// Whether the identity provider accepted the invalidation.
    pub provider_invalidated: bool,
}

/// Result of revoking every other device of an account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkRevocation {
    pub revoked: Vec<SessionId>,
    /// Sessions revoked in the store whose auth session the identity
    /// provider did not confirm as invalidated.
    pub failed: Vec<SessionId>,
}

impl BulkRevocation {
    pub fn revoked_count(&self) -> usize {
        self.revoked.len()
    }

    pub fn invalidated_count(&self) -> usize {
        self.revoked.len() - self.failed.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Revoked {} of {} sessions",
            self.invalidated_count(),
            self.revoked_count()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SignOutScope {
    /// This device only.
    #[default]
    Local,
    /// This device and every other device of the account.
    Global,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignOutOutcome {
    pub scope: SignOutScope,
    /// Rows removed for the caller's own device.
    pub removed: u64,
    pub provider_invalidated: bool,
    /// Present for global sign-out.
    pub others: Option<BulkRevocation>,
}

pub struct RevocationService {
    store: Arc<dyn SessionStore>,
    identity_provider: Arc<dyn IdentityProvider>,
    store_timeout: Duration,
}

impl RevocationService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        identity_provider: Arc<dyn IdentityProvider>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            identity_provider,
            store_timeout,
        }
    }

    /// Revokes one of the caller's other devices.
    ///
    /// Missing and foreign sessions fail identically. Repeating the call on a
    /// revoked row succeeds with the same terminal state and asks the identity
    /// provider again.
    pub async fn revoke_session(
        &self,
        identity: &AuthIdentity,
        target: SessionId,
    ) -> Result<RevokeOutcome, SessionError> {
        let session = with_timeout(self.store_timeout, self.store.get(target))
            .await?
            .filter(|s| s.user_id == identity.user_id)
            .ok_or(SessionError::NotFoundOrNotOwned)?;

        if session.device_key == identity.device_key() {
            return Err(SessionError::Validation(
                "Cannot revoke the current session; use sign-out instead".to_string(),
            ));
        }

        let already_revoked = session.is_revoked();
        let revoked = with_timeout(
            self.store_timeout,
            self.store.revoke(target, RevokedReason::UserRevoked, Utc::now()),
        )
        .await?
        .ok_or(SessionError::NotFoundOrNotOwned)?;

        let provider_invalidated = self.invalidate_at_provider(&revoked).await;

        tracing::info!(
            user_id = %identity.user_id,
            session_id = %target,
            already_revoked,
            provider_invalidated,
            "Device session revoked"
        );

        Ok(RevokeOutcome {
            session_id: target,
            already_revoked,
            provider_invalidated,
        })
    }

    /// Revokes every device of the account except the caller's, then
    /// invalidates each revoked auth session at the identity provider.
    pub async fn revoke_all_except(
        &self,
        identity: &AuthIdentity,
    ) -> Result<BulkRevocation, SessionError> {
        let device_key = identity.device_key();
        let revoked_rows = with_timeout(
            self.store_timeout,
            self.store
                .revoke_all_except(identity.user_id, &device_key, Utc::now()),
        )
        .await?;

        let mut result = BulkRevocation::default();
        // Sequential: keeps the identity provider request rate per account flat.
        for session in &revoked_rows {
            result.revoked.push(session.id);
            if !self.invalidate_at_provider(session).await {
                result.failed.push(session.id);
            }
        }

        if result.is_complete() {
            tracing::info!(
                user_id = %identity.user_id,
                revoked = result.revoked_count(),
                "Revoked all other device sessions"
            );
        } else {
            tracing::warn!(
                user_id = %identity.user_id,
                revoked = result.revoked_count(),
                failed = result.failed_count(),
                "Bulk revocation finished with identity provider failures"
            );
        }

        Ok(result)
    }

    /// Signs the caller's device out and, for [`SignOutScope::Global`], every
    /// other device first.
    pub async fn sign_out(
        &self,
        identity: &AuthIdentity,
        scope: SignOutScope,
    ) -> Result<SignOutOutcome, SessionError> {
        let others = match scope {
            SignOutScope::Local => None,
            SignOutScope::Global => Some(self.revoke_all_except(identity).await?),
        };

        let removed = with_timeout(
            self.store_timeout,
            self.store
                .delete_by_device_key(identity.user_id, &identity.device_key()),
        )
        .await?;

        let provider_invalidated = match self
            .identity_provider
            .invalidate_session(&identity.auth_session_id)
            .await
        {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    error = ?err,
                    user_id = %identity.user_id,
                    "Failed to invalidate auth session on sign-out"
                );
                false
            }
        };

        tracing::info!(user_id = %identity.user_id, ?scope, removed, "Signed out");

        Ok(SignOutOutcome {
            scope,
            removed,
            provider_invalidated,
            others,
        })
    }

    async fn invalidate_at_provider(&self, session: &DeviceSession) -> bool {
        match self
            .identity_provider
            .invalidate_session(&session.auth_session_id)
            .await
        {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    error = ?err,
                    user_id = %session.user_id,
                    session_id = %session.id,
                    "Identity provider invalidation failed"
                );
                false
            }
        }
    }
}
