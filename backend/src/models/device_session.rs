//! Models for tracking authenticated device sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::types::{SessionId, UserId};
use crate::utils::fingerprint::Fingerprint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
/// Coarse device class derived from the user agent.
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
    Unknown,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Desktop => "desktop",
            DeviceType::Mobile => "mobile",
            DeviceType::Tablet => "tablet",
            DeviceType::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
/// Why a session reached its terminal state.
pub enum RevokedReason {
    /// The account owner revoked the device.
    UserRevoked,
    /// The inactivity sweep retired the device.
    InactivityExpired,
}

/// Lifecycle state derived from `revoked_at`/`revoked_reason`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Revoked,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
/// Database representation of one authenticated device.
pub struct DeviceSession {
    /// Unique identifier for the session record.
    #[schema(value_type = String)]
    pub id: SessionId,
    /// Account owning the session.
    #[schema(value_type = String)]
    pub user_id: UserId,
    /// Correlation key derived from the identity provider's auth session.
    pub device_key: String,
    /// Identity provider auth session reference, used for invalidation only.
    #[serde(skip_serializing, default)]
    pub auth_session_id: String,
    /// Last observed client address.
    pub ip_address: Option<String>,
    /// Last observed user agent.
    pub raw_user_agent: Option<String>,
    pub browser: String,
    pub os: String,
    pub device_type: DeviceType,
    /// Best-effort human readable location for `ip_address`.
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_reason: Option<RevokedReason>,
}

impl DeviceSession {
    /// Builds a fresh row for a device's first heartbeat.
    pub fn from_heartbeat(heartbeat: &Heartbeat) -> Self {
        Self {
            id: SessionId::new(),
            user_id: heartbeat.user_id,
            device_key: heartbeat.device_key.clone(),
            auth_session_id: heartbeat.auth_session_id.clone(),
            ip_address: heartbeat.ip_address.clone(),
            raw_user_agent: heartbeat.raw_user_agent.clone(),
            browser: heartbeat.fingerprint.browser.clone(),
            os: heartbeat.fingerprint.os.clone(),
            device_type: heartbeat.fingerprint.device_type,
            location: heartbeat.location.clone(),
            created_at: heartbeat.at,
            last_active_at: heartbeat.at,
            revoked_at: None,
            revoked_reason: None,
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn status(&self) -> SessionStatus {
        match (self.revoked_at, self.revoked_reason) {
            (None, _) => SessionStatus::Active,
            (Some(_), Some(RevokedReason::InactivityExpired)) => SessionStatus::Expired,
            (Some(_), _) => SessionStatus::Revoked,
        }
    }

    /// Applies a heartbeat to an active row. `last_active_at` never moves
    /// backwards and a failed location lookup keeps the previous value.
    pub fn apply_heartbeat(&mut self, heartbeat: &Heartbeat) {
        self.ip_address = heartbeat.ip_address.clone();
        self.raw_user_agent = heartbeat.raw_user_agent.clone();
        self.browser = heartbeat.fingerprint.browser.clone();
        self.os = heartbeat.fingerprint.os.clone();
        self.device_type = heartbeat.fingerprint.device_type;
        if heartbeat.location.is_some() {
            self.location = heartbeat.location.clone();
        }
        self.auth_session_id = heartbeat.auth_session_id.clone();
        if heartbeat.at > self.last_active_at {
            self.last_active_at = heartbeat.at;
        }
    }

    /// Moves the row into its terminal state. A revoked row is left untouched.
    pub fn mark_revoked(&mut self, reason: RevokedReason, at: DateTime<Utc>) -> bool {
        if self.is_revoked() {
            return false;
        }
        self.revoked_at = Some(at);
        self.revoked_reason = Some(reason);
        true
    }
}

/// Everything a heartbeat writes into the store.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    pub user_id: UserId,
    pub device_key: String,
    pub auth_session_id: String,
    /// When the underlying auth session was established at the identity provider.
    pub authenticated_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub raw_user_agent: Option<String>,
    pub fingerprint: Fingerprint,
    pub location: Option<String>,
    pub at: DateTime<Utc>,
}

/// Result of an atomic heartbeat upsert.
#[derive(Debug, Clone)]
pub enum TouchOutcome {
    /// First heartbeat for this device, or the first one after its previous
    /// row expired from inactivity; a new row exists.
    Created(DeviceSession),
    /// Existing active row refreshed.
    Updated(DeviceSession),
    /// The device was revoked by its owner; nothing was written.
    Revoked(DeviceSession),
}

impl TouchOutcome {
    pub fn session(&self) -> &DeviceSession {
        match self {
            TouchOutcome::Created(s) | TouchOutcome::Updated(s) | TouchOutcome::Revoked(s) => s,
        }
    }

    pub fn is_revoked(&self) -> bool {
        matches!(self, TouchOutcome::Revoked(_))
    }
}

/// Per-account record of the most recent bulk revocation.
#[derive(Debug, Clone, FromRow)]
pub struct RevocationWatermark {
    pub user_id: UserId,
    pub revoked_before: DateTime<Utc>,
    pub except_device_key: String,
}

impl RevocationWatermark {
    /// Whether a device seen for the first time must be born revoked.
    ///
    /// Identity provider claims carry whole seconds, so the comparison is made
    /// at that precision: a login within the same second as the bulk
    /// revocation is treated as having happened after it.
    pub fn covers(&self, device_key: &str, authenticated_at: DateTime<Utc>) -> bool {
        device_key != self.except_device_key
            && authenticated_at.timestamp() < self.revoked_before.timestamp()
    }
}
