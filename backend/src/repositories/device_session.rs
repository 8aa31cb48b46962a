use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgConnection, PgPool};

use crate::error::StoreError;
use crate::models::{
    DeviceSession, Heartbeat, RevocationWatermark, RevokedReason, SessionStatus, TouchOutcome,
};
use crate::repositories::session_store::SessionStore;
use crate::repositories::transaction::{begin_account_transaction, commit_transaction};
use crate::types::{SessionId, UserId};

const SESSION_COLUMNS: &str = "id, user_id, device_key, auth_session_id, ip_address, \
    raw_user_agent, browser, os, device_type, location, created_at, last_active_at, \
    revoked_at, revoked_reason";

#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn insert_session(
    conn: &mut PgConnection,
    session: &DeviceSession,
) -> Result<DeviceSession, sqlx::Error> {
    let sql = format!(
        r#"
        INSERT INTO device_sessions
            (id, user_id, device_key, auth_session_id, ip_address, raw_user_agent,
             browser, os, device_type, location, created_at, last_active_at,
             revoked_at, revoked_reason)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        RETURNING {SESSION_COLUMNS}
        "#
    );
    sqlx::query_as::<_, DeviceSession>(&sql)
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.device_key)
        .bind(&session.auth_session_id)
        .bind(&session.ip_address)
        .bind(&session.raw_user_agent)
        .bind(&session.browser)
        .bind(&session.os)
        .bind(session.device_type)
        .bind(&session.location)
        .bind(session.created_at)
        .bind(session.last_active_at)
        .bind(session.revoked_at)
        .bind(session.revoked_reason)
        .fetch_one(conn)
        .await
}

async fn latest_for_device(
    conn: &mut PgConnection,
    user_id: UserId,
    device_key: &str,
) -> Result<Option<DeviceSession>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {SESSION_COLUMNS}
        FROM device_sessions
        WHERE user_id = $1 AND device_key = $2
        ORDER BY (revoked_at IS NULL) DESC, created_at DESC, id DESC
        LIMIT 1
        "#
    );
    sqlx::query_as::<_, DeviceSession>(&sql)
        .bind(user_id)
        .bind(device_key)
        .fetch_optional(conn)
        .await
}

/// Refreshes an active row. Returns `None` when the row was retired after it
/// was read; the inactivity sweep does not take the account lock.
async fn refresh_session(
    conn: &mut PgConnection,
    id: SessionId,
    heartbeat: &Heartbeat,
) -> Result<Option<DeviceSession>, sqlx::Error> {
    let sql = format!(
        r#"
        UPDATE device_sessions
        SET ip_address = $2,
            raw_user_agent = $3,
            browser = $4,
            os = $5,
            device_type = $6,
            location = COALESCE($7, location),
            auth_session_id = $8,
            last_active_at = GREATEST(last_active_at, $9)
        WHERE id = $1 AND revoked_at IS NULL
        RETURNING {SESSION_COLUMNS}
        "#
    );
    sqlx::query_as::<_, DeviceSession>(&sql)
        .bind(id)
        .bind(&heartbeat.ip_address)
        .bind(&heartbeat.raw_user_agent)
        .bind(&heartbeat.fingerprint.browser)
        .bind(&heartbeat.fingerprint.os)
        .bind(heartbeat.fingerprint.device_type)
        .bind(&heartbeat.location)
        .bind(&heartbeat.auth_session_id)
        .bind(heartbeat.at)
        .fetch_optional(conn)
        .await
}

/// Inserts the row for a device without a live session, born revoked when
/// the account's last bulk revocation covers it.
async fn open_session(
    conn: &mut PgConnection,
    heartbeat: &Heartbeat,
) -> Result<TouchOutcome, sqlx::Error> {
    let mut session = DeviceSession::from_heartbeat(heartbeat);
    let born_revoked = find_watermark(&mut *conn, heartbeat.user_id)
        .await?
        .map(|w| w.covers(&heartbeat.device_key, heartbeat.authenticated_at))
        .unwrap_or(false);
    if born_revoked {
        session.mark_revoked(RevokedReason::UserRevoked, heartbeat.at);
        Ok(TouchOutcome::Revoked(insert_session(conn, &session).await?))
    } else {
        Ok(TouchOutcome::Created(insert_session(conn, &session).await?))
    }
}

fn map_insert_error(err: sqlx::Error, session: &DeviceSession) -> StoreError {
    let duplicate = err
        .as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false);
    if duplicate {
        StoreError::DuplicateActive {
            device_key: session.device_key.clone(),
        }
    } else {
        StoreError::Database(err)
    }
}

async fn find_watermark(
    conn: &mut PgConnection,
    user_id: UserId,
) -> Result<Option<RevocationWatermark>, sqlx::Error> {
    sqlx::query_as::<_, RevocationWatermark>(
        r#"
        SELECT user_id, revoked_before, except_device_key
        FROM session_revocation_watermarks
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await
}

async fn revoke_by_id(
    conn: &mut PgConnection,
    id: SessionId,
    reason: RevokedReason,
    at: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE device_sessions
        SET revoked_at = $2, revoked_reason = $3
        WHERE id = $1 AND revoked_at IS NULL
        "#,
    )
    .bind(id)
    .bind(at)
    .bind(reason)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

async fn find_by_id(
    conn: &mut PgConnection,
    id: SessionId,
) -> Result<Option<DeviceSession>, sqlx::Error> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM device_sessions WHERE id = $1");
    sqlx::query_as::<_, DeviceSession>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, session: &DeviceSession) -> Result<DeviceSession, StoreError> {
        let mut tx = begin_account_transaction(&self.pool, session.user_id).await?;
        let created = insert_session(&mut tx, session)
            .await
            .map_err(|err| map_insert_error(err, session))?;
        commit_transaction(tx).await?;
        Ok(created)
    }

    async fn get(&self, id: SessionId) -> Result<Option<DeviceSession>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(find_by_id(&mut conn, id).await?)
    }

    async fn find_by_device_key(
        &self,
        user_id: UserId,
        device_key: &str,
    ) -> Result<Option<DeviceSession>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(latest_for_device(&mut conn, user_id, device_key).await?)
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<DeviceSession>, StoreError> {
        let sql = format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM device_sessions
            WHERE user_id = $1
            ORDER BY last_active_at DESC, created_at DESC, id DESC
            "#
        );
        let sessions = sqlx::query_as::<_, DeviceSession>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(sessions)
    }

    async fn touch(&self, heartbeat: &Heartbeat) -> Result<TouchOutcome, StoreError> {
        let mut tx = begin_account_transaction(&self.pool, heartbeat.user_id).await?;

        let latest = latest_for_device(&mut tx, heartbeat.user_id, &heartbeat.device_key).await?;
        // Expired devices get a new row; only an owner revocation is final.
        let outcome = match latest {
            Some(existing) => match existing.status() {
                SessionStatus::Revoked => TouchOutcome::Revoked(existing),
                SessionStatus::Active => match refresh_session(&mut tx, existing.id, heartbeat).await? {
                    Some(updated) => TouchOutcome::Updated(updated),
                    None => open_session(&mut tx, heartbeat).await?,
                },
                SessionStatus::Expired => open_session(&mut tx, heartbeat).await?,
            },
            None => open_session(&mut tx, heartbeat).await?,
        };

        commit_transaction(tx).await?;
        Ok(outcome)
    }

    async fn revoke(
        &self,
        id: SessionId,
        reason: RevokedReason,
        at: DateTime<Utc>,
    ) -> Result<Option<DeviceSession>, StoreError> {
        let Some(session) = self.get(id).await? else {
            return Ok(None);
        };
        if session.is_revoked() {
            return Ok(Some(session));
        }

        let mut tx = begin_account_transaction(&self.pool, session.user_id).await?;
        revoke_by_id(&mut tx, id, reason, at).await?;
        let revoked = find_by_id(&mut tx, id).await?;
        commit_transaction(tx).await?;
        Ok(revoked)
    }

    async fn revoke_all_except(
        &self,
        user_id: UserId,
        current_device_key: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<DeviceSession>, StoreError> {
        let mut tx = begin_account_transaction(&self.pool, user_id).await?;

        let sql = format!(
            r#"
            UPDATE device_sessions
            SET revoked_at = $3, revoked_reason = $4
            WHERE user_id = $1 AND device_key <> $2 AND revoked_at IS NULL
            RETURNING {SESSION_COLUMNS}
            "#
        );
        let revoked = sqlx::query_as::<_, DeviceSession>(&sql)
            .bind(user_id)
            .bind(current_device_key)
            .bind(at)
            .bind(RevokedReason::UserRevoked)
            .fetch_all(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO session_revocation_watermarks (user_id, revoked_before, except_device_key)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE
            SET revoked_before = GREATEST(session_revocation_watermarks.revoked_before, EXCLUDED.revoked_before),
                except_device_key = EXCLUDED.except_device_key
            "#,
        )
        .bind(user_id)
        .bind(at)
        .bind(current_device_key)
        .execute(&mut *tx)
        .await?;

        commit_transaction(tx).await?;
        Ok(revoked)
    }

    async fn delete_by_device_key(
        &self,
        user_id: UserId,
        device_key: &str,
    ) -> Result<u64, StoreError> {
        let mut tx = begin_account_transaction(&self.pool, user_id).await?;
        let result = sqlx::query("DELETE FROM device_sessions WHERE user_id = $1 AND device_key = $2")
            .bind(user_id)
            .bind(device_key)
            .execute(&mut *tx)
            .await?;
        commit_transaction(tx).await?;
        Ok(result.rows_affected())
    }

    async fn expire_inactive(
        &self,
        cutoff: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE device_sessions
            SET revoked_at = $2, revoked_reason = $3
            WHERE revoked_at IS NULL AND last_active_at < $1
            "#,
        )
        .bind(cutoff)
        .bind(at)
        .bind(RevokedReason::InactivityExpired)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
