//! Data models shared across the session store, services and API handlers.

pub mod auth_identity;
pub mod device_session;

pub use auth_identity::AuthIdentity;
pub use device_session::{
    DeviceSession, DeviceType, Heartbeat, RevocationWatermark, RevokedReason, SessionStatus,
    TouchOutcome,
};
