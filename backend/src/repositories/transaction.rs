//! Transaction helpers for the session store.

use sqlx::postgres::PgTransaction;
use sqlx::PgPool;

use crate::error::StoreError;
use crate::types::UserId;

/// Mixed into every account lock key so session locks never collide with
/// advisory locks taken by other subsystems sharing the database.
const SESSION_LOCK_NAMESPACE: i64 = 0x5345_5353_0000_0000;

/// Begin a transaction and take the account's single-writer lock.
///
/// The lock is transaction scoped and released on commit or rollback, so
/// heartbeats and bulk revocations for one account observe each other's
/// writes in a total order.
pub async fn begin_account_transaction(
    db: &PgPool,
    user_id: UserId,
) -> Result<PgTransaction<'_>, StoreError> {
    let mut tx = db.begin().await?;
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(account_lock_key(user_id))
        .execute(&mut *tx)
        .await?;
    Ok(tx)
}

/// Commit a transaction.
pub async fn commit_transaction(tx: PgTransaction<'_>) -> Result<(), StoreError> {
    tx.commit().await.map_err(StoreError::from)
}

/// Derive the advisory lock key from the first 8 bytes of the account UUID.
pub fn account_lock_key(user_id: UserId) -> i64 {
    let bytes = user_id.as_uuid().as_bytes();
    let key = i64::from_be_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ]);
    key ^ SESSION_LOCK_NAMESPACE
}
