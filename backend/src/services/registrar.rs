//! Heartbeat registration, validity checks and session listing.
//!
//! Verdicts returned here are authoritative: `revoked = true` and
//! `reason = revoked` are only produced from an explicit revocation. Storage
//! trouble always comes back as [`SessionError::TransientStorage`].

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

use crate::error::SessionError;
use crate::models::{
    AuthIdentity, DeviceSession, Heartbeat, RevokedReason, SessionStatus, TouchOutcome,
};
use crate::repositories::{with_timeout, SessionStore};
use crate::services::geolocation::{resolve_location, GeoLocator};
use crate::services::identity_provider::IdentityProvider;
use crate::types::SessionId;
use crate::utils::fingerprint::parse_fingerprint;

/// Request details observed by the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct RequestMetadata {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TrackVerdict {
    pub revoked: bool,
    /// Whether this heartbeat created the device's row.
    #[serde(default)]
    pub created: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    #[schema(value_type = Option<String>)]
    pub session_id: Option<SessionId>,
}

impl TrackVerdict {
    fn revoked(session_id: Option<SessionId>) -> Self {
        Self {
            revoked: true,
            created: false,
            session_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    Revoked,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ValidityVerdict {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<InvalidReason>,
}

impl ValidityVerdict {
    pub fn valid() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn invalid(reason: InvalidReason) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
        }
    }
}

/// A session row as shown to its owner.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: DeviceSession,
    pub status: SessionStatus,
    /// Computed per request from the caller's own device key.
    pub is_current: bool,
}

impl SessionView {
    fn from_session(session: DeviceSession, current_device_key: &str) -> Self {
        let is_current = !session.is_revoked() && session.device_key == current_device_key;
        Self {
            status: session.status(),
            session,
            is_current,
        }
    }
}

pub struct SessionRegistrar {
    store: Arc<dyn SessionStore>,
    identity_provider: Arc<dyn IdentityProvider>,
    geo_locator: Arc<dyn GeoLocator>,
    store_timeout: Duration,
    geolocation_timeout: Duration,
}

impl SessionRegistrar {
    pub fn new(
        store: Arc<dyn SessionStore>,
        identity_provider: Arc<dyn IdentityProvider>,
        geo_locator: Arc<dyn GeoLocator>,
        store_timeout: Duration,
        geolocation_timeout: Duration,
    ) -> Self {
        Self {
            store,
            identity_provider,
            geo_locator,
            store_timeout,
            geolocation_timeout,
        }
    }

    /// Records a heartbeat for the caller's device and returns the
    /// revocation verdict.
    pub async fn track_session(
        &self,
        identity: &AuthIdentity,
        metadata: &RequestMetadata,
    ) -> Result<TrackVerdict, SessionError> {
        let device_key = identity.device_key();

        match self
            .identity_provider
            .is_session_active(&identity.auth_session_id)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(
                    user_id = %identity.user_id,
                    device_key = %device_key,
                    "Heartbeat from an auth session the identity provider already invalidated"
                );
                return Ok(TrackVerdict::revoked(None));
            }
            Err(err) => {
                tracing::warn!(
                    error = ?err,
                    user_id = %identity.user_id,
                    "Identity provider lookup failed; falling back to the session store"
                );
            }
        }

        let raw_user_agent = metadata.user_agent.clone().filter(|ua| !ua.trim().is_empty());
        let fingerprint = parse_fingerprint(raw_user_agent.as_deref().unwrap_or_default());
        let location = resolve_location(
            self.geo_locator.as_ref(),
            metadata.ip_address.as_deref(),
            self.geolocation_timeout,
        )
        .await;

        let heartbeat = Heartbeat {
            user_id: identity.user_id,
            device_key: device_key.clone(),
            auth_session_id: identity.auth_session_id.clone(),
            authenticated_at: identity.authenticated_at,
            ip_address: metadata.ip_address.clone(),
            raw_user_agent,
            fingerprint,
            location,
            at: Utc::now(),
        };

        let outcome = with_timeout(self.store_timeout, self.store.touch(&heartbeat)).await?;
        let verdict = match outcome {
            TouchOutcome::Created(session) => {
                tracing::info!(
                    user_id = %identity.user_id,
                    session_id = %session.id,
                    browser = %session.browser,
                    os = %session.os,
                    "Registered new device session"
                );
                TrackVerdict {
                    revoked: false,
                    created: true,
                    session_id: Some(session.id),
                }
            }
            TouchOutcome::Updated(session) => TrackVerdict {
                revoked: false,
                created: false,
                session_id: Some(session.id),
            },
            TouchOutcome::Revoked(session) => {
                tracing::info!(
                    user_id = %identity.user_id,
                    session_id = %session.id,
                    "Heartbeat from a revoked device session"
                );
                TrackVerdict::revoked(Some(session.id))
            }
        };
        Ok(verdict)
    }

    /// Single lookup; never writes.
    pub async fn check_validity(
        &self,
        identity: &AuthIdentity,
    ) -> Result<ValidityVerdict, SessionError> {
        let device_key = identity.device_key();
        let session = with_timeout(
            self.store_timeout,
            self.store.find_by_device_key(identity.user_id, &device_key),
        )
        .await?;

        Ok(match session.and_then(|s| s.revoked_reason) {
            None => ValidityVerdict::valid(),
            Some(RevokedReason::UserRevoked) => ValidityVerdict::invalid(InvalidReason::Revoked),
            Some(RevokedReason::InactivityExpired) => {
                ValidityVerdict::invalid(InvalidReason::Expired)
            }
        })
    }

    /// Sessions of the caller's account, most recently active first.
    pub async fn list_sessions(
        &self,
        identity: &AuthIdentity,
    ) -> Result<Vec<SessionView>, SessionError> {
        let device_key = identity.device_key();
        let sessions =
            with_timeout(self.store_timeout, self.store.list_by_user(identity.user_id)).await?;
        Ok(sessions
            .into_iter()
            .map(|session| SessionView::from_session(session, &device_key))
            .collect())
    }
}
