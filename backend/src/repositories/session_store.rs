//! Session store trait shared by the Postgres and in-memory backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;

use crate::error::StoreError;
use crate::models::{DeviceSession, Heartbeat, RevokedReason, TouchOutcome};
use crate::types::{SessionId, UserId};

/// Durable record of device sessions per account.
///
/// Implementations must make `touch` and `revoke_all_except` atomic per
/// account: concurrent first heartbeats for one device produce one row, and a
/// heartbeat racing a bulk revocation is either revoked or excluded.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a row as-is.
    async fn create(&self, session: &DeviceSession) -> Result<DeviceSession, StoreError>;

    async fn get(&self, id: SessionId) -> Result<Option<DeviceSession>, StoreError>;

    /// Latest row for a device, revoked or not. Single lookup, no writes.
    async fn find_by_device_key(
        &self,
        user_id: UserId,
        device_key: &str,
    ) -> Result<Option<DeviceSession>, StoreError>;

    /// All rows for an account, most recently active first.
    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<DeviceSession>, StoreError>;

    /// Upsert keyed by `(user_id, device_key)`.
    async fn touch(&self, heartbeat: &Heartbeat) -> Result<TouchOutcome, StoreError>;

    /// Idempotent; returns the row in its terminal state, or `None` if it
    /// does not exist.
    async fn revoke(
        &self,
        id: SessionId,
        reason: RevokedReason,
        at: DateTime<Utc>,
    ) -> Result<Option<DeviceSession>, StoreError>;

    /// Revokes every active row of the account except `current_device_key`
    /// and records the revocation watermark. Returns the rows revoked by
    /// this call.
    async fn revoke_all_except(
        &self,
        user_id: UserId,
        current_device_key: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<DeviceSession>, StoreError>;

    /// Removes every row of one device (explicit full sign-out).
    async fn delete_by_device_key(
        &self,
        user_id: UserId,
        device_key: &str,
    ) -> Result<u64, StoreError>;

    /// Moves active rows idle since before `cutoff` to the expired state.
    async fn expire_inactive(
        &self,
        cutoff: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}

/// Bounds a store call so a stalled backend surfaces as a transient error.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn stalled_calls_become_timeouts() {
        let result: Result<(), StoreError> = with_timeout(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(StoreError::Timeout(d)) if d == Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn fast_calls_pass_through() {
        let result = with_timeout(Duration::from_secs(1), async { Ok::<_, StoreError>(7) }).await;
        assert_eq!(result.expect("value"), 7);
    }
}
