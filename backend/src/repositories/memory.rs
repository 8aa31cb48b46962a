//! In-process session store with the same semantics as the Postgres backend.
//!
//! A single mutex guards every row, which trivially gives the per-account
//! single-writer ordering the store contract requires.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::models::{
    DeviceSession, Heartbeat, RevocationWatermark, RevokedReason, SessionStatus, TouchOutcome,
};
use crate::repositories::session_store::SessionStore;
use crate::types::{SessionId, UserId};

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, DeviceSession>,
    watermarks: HashMap<UserId, RevocationWatermark>,
}

impl Inner {
    fn latest_for_device(&self, user_id: UserId, device_key: &str) -> Option<&DeviceSession> {
        self.sessions
            .values()
            .filter(|s| s.user_id == user_id && s.device_key == device_key)
            .max_by(|a, b| {
                (!a.is_revoked(), a.created_at, a.id).cmp(&(!b.is_revoked(), b.created_at, b.id))
            })
    }
}

#[derive(Default)]
pub struct InMemorySessionStore {
    inner: Mutex<Inner>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session: &DeviceSession) -> Result<DeviceSession, StoreError> {
        let mut inner = self.inner.lock().await;
        if !session.is_revoked()
            && inner.sessions.values().any(|s| {
                s.user_id == session.user_id && s.device_key == session.device_key && !s.is_revoked()
            })
        {
            return Err(StoreError::DuplicateActive {
                device_key: session.device_key.clone(),
            });
        }
        inner.sessions.insert(session.id, session.clone());
        Ok(session.clone())
    }

    async fn get(&self, id: SessionId) -> Result<Option<DeviceSession>, StoreError> {
        Ok(self.inner.lock().await.sessions.get(&id).cloned())
    }

    async fn find_by_device_key(
        &self,
        user_id: UserId,
        device_key: &str,
    ) -> Result<Option<DeviceSession>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.latest_for_device(user_id, device_key).cloned())
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<DeviceSession>, StoreError> {
        let inner = self.inner.lock().await;
        let mut sessions: Vec<DeviceSession> = inner
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| {
            (b.last_active_at, b.created_at, b.id).cmp(&(a.last_active_at, a.created_at, a.id))
        });
        Ok(sessions)
    }

    async fn touch(&self, heartbeat: &Heartbeat) -> Result<TouchOutcome, StoreError> {
        let mut inner = self.inner.lock().await;

        let existing = inner
            .latest_for_device(heartbeat.user_id, &heartbeat.device_key)
            .map(|s| (s.id, s.status()));

        // An expired device falls through and opens a new row.
        if let Some((id, status)) = existing {
            if let Some(session) = inner.sessions.get_mut(&id) {
                match status {
                    SessionStatus::Revoked => return Ok(TouchOutcome::Revoked(session.clone())),
                    SessionStatus::Active => {
                        session.apply_heartbeat(heartbeat);
                        return Ok(TouchOutcome::Updated(session.clone()));
                    }
                    SessionStatus::Expired => {}
                }
            }
        }

        let mut session = DeviceSession::from_heartbeat(heartbeat);
        let born_revoked = inner
            .watermarks
            .get(&heartbeat.user_id)
            .map(|w| w.covers(&heartbeat.device_key, heartbeat.authenticated_at))
            .unwrap_or(false);
        if born_revoked {
            session.mark_revoked(RevokedReason::UserRevoked, heartbeat.at);
        }
        inner.sessions.insert(session.id, session.clone());
        if born_revoked {
            Ok(TouchOutcome::Revoked(session))
        } else {
            Ok(TouchOutcome::Created(session))
        }
    }

    async fn revoke(
        &self,
        id: SessionId,
        reason: RevokedReason,
        at: DateTime<Utc>,
    ) -> Result<Option<DeviceSession>, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.sessions.get_mut(&id).map(|session| {
            session.mark_revoked(reason, at);
            session.clone()
        }))
    }

    async fn revoke_all_except(
        &self,
        user_id: UserId,
        current_device_key: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<DeviceSession>, StoreError> {
        let mut inner = self.inner.lock().await;

        let mut revoked = Vec::new();
        for session in inner.sessions.values_mut() {
            if session.user_id == user_id
                && session.device_key != current_device_key
                && session.mark_revoked(RevokedReason::UserRevoked, at)
            {
                revoked.push(session.clone());
            }
        }

        let revoked_before = inner
            .watermarks
            .get(&user_id)
            .map(|w| w.revoked_before.max(at))
            .unwrap_or(at);
        inner.watermarks.insert(
            user_id,
            RevocationWatermark {
                user_id,
                revoked_before,
                except_device_key: current_device_key.to_string(),
            },
        );

        Ok(revoked)
    }

    async fn delete_by_device_key(
        &self,
        user_id: UserId,
        device_key: &str,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        let before = inner.sessions.len();
        inner
            .sessions
            .retain(|_, s| !(s.user_id == user_id && s.device_key == device_key));
        Ok((before - inner.sessions.len()) as u64)
    }

    async fn expire_inactive(
        &self,
        cutoff: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        let mut expired = 0;
        for session in inner.sessions.values_mut() {
            if session.last_active_at < cutoff
                && session.mark_revoked(RevokedReason::InactivityExpired, at)
            {
                expired += 1;
            }
        }
        Ok(expired)
    }
}
