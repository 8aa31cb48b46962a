use chrono::{Duration as ChronoDuration, Utc};
use sessionguard_backend::{
    error::StoreError,
    models::{DeviceSession, Heartbeat, RevokedReason, TouchOutcome},
    repositories::{PgSessionStore, SessionStore},
    types::{SessionId, UserId},
    utils::fingerprint::parse_fingerprint,
};
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;

mod support;

use support::{reset_tables, test_pool, CHROME_WINDOWS};

async fn integration_guard() -> tokio::sync::MutexGuard<'static, ()> {
    static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
    GUARD.get_or_init(|| Mutex::new(())).lock().await
}

fn heartbeat(user_id: UserId, device_key: &str, at: chrono::DateTime<Utc>) -> Heartbeat {
    Heartbeat {
        user_id,
        device_key: device_key.to_string(),
        auth_session_id: format!("auth-{device_key}"),
        authenticated_at: at - ChronoDuration::seconds(5),
        ip_address: Some("198.51.100.7".into()),
        raw_user_agent: Some(CHROME_WINDOWS.into()),
        fingerprint: parse_fingerprint(CHROME_WINDOWS),
        location: Some("Lisbon, Portugal".into()),
        at,
    }
}

fn assert_same_millis(left: chrono::DateTime<Utc>, right: chrono::DateTime<Utc>) {
    assert_eq!(left.timestamp_millis(), right.timestamp_millis());
}

#[tokio::test]
async fn touch_creates_then_refreshes_without_losing_location() {
    let _guard = integration_guard().await;
    let pool = test_pool().await;
    reset_tables(&pool).await;
    let store = PgSessionStore::new(pool);
    let user_id = UserId::new();
    let now = Utc::now();

    let created = store.touch(&heartbeat(user_id, "laptop", now)).await.expect("touch");
    assert!(matches!(created, TouchOutcome::Created(_)));

    let mut later = heartbeat(user_id, "laptop", now + ChronoDuration::seconds(30));
    later.location = None;
    let updated = store.touch(&later).await.expect("touch again");
    let TouchOutcome::Updated(row) = updated else {
        panic!("expected update");
    };
    assert_eq!(row.id, created.session().id);
    assert_eq!(row.location.as_deref(), Some("Lisbon, Portugal"));
    assert_same_millis(row.last_active_at, later.at);

    // An out-of-order heartbeat never moves activity backwards.
    let stale = heartbeat(user_id, "laptop", now);
    let row = store.touch(&stale).await.expect("stale touch");
    assert_same_millis(row.session().last_active_at, later.at);
}

#[tokio::test]
async fn concurrent_first_heartbeats_produce_one_row() {
    let _guard = integration_guard().await;
    let pool = test_pool().await;
    reset_tables(&pool).await;
    let store = Arc::new(PgSessionStore::new(pool));
    let user_id = UserId::new();
    let now = Utc::now();

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let store = store.clone();
            let hb = heartbeat(user_id, "phone", now + ChronoDuration::milliseconds(i * 100));
            tokio::spawn(async move { store.touch(&hb).await })
        })
        .collect();
    for handle in handles {
        handle.await.expect("join").expect("touch");
    }

    let rows = store.list_by_user(user_id).await.expect("list");
    assert_eq!(rows.len(), 1);
    assert_same_millis(rows[0].last_active_at, now + ChronoDuration::milliseconds(500));
}

#[tokio::test]
async fn revocation_is_terminal_and_idempotent() {
    let _guard = integration_guard().await;
    let pool = test_pool().await;
    reset_tables(&pool).await;
    let store = PgSessionStore::new(pool.clone());
    let user_id = UserId::new();
    let now = Utc::now();
    let id = store
        .touch(&heartbeat(user_id, "tablet", now))
        .await
        .expect("touch")
        .session()
        .id;

    let first = store
        .revoke(id, RevokedReason::UserRevoked, now)
        .await
        .expect("revoke")
        .expect("row");
    let second = store
        .revoke(id, RevokedReason::InactivityExpired, now + ChronoDuration::minutes(1))
        .await
        .expect("revoke again")
        .expect("row");
    assert_eq!(second.revoked_reason, Some(RevokedReason::UserRevoked));
    assert_eq!(
        first.revoked_at.map(|t| t.timestamp_millis()),
        second.revoked_at.map(|t| t.timestamp_millis())
    );

    let outcome = store
        .touch(&heartbeat(user_id, "tablet", now + ChronoDuration::minutes(2)))
        .await
        .expect("touch revoked");
    assert!(outcome.is_revoked());

    // The trigger refuses to clear a revocation even from raw SQL.
    let cleared = sqlx::query(
        "UPDATE device_sessions SET revoked_at = NULL, revoked_reason = NULL WHERE id = $1",
    )
    .bind(id)
    .execute(&pool)
    .await;
    assert!(cleared.is_err());

    assert!(store
        .revoke(SessionId::new(), RevokedReason::UserRevoked, now)
        .await
        .expect("revoke missing")
        .is_none());
}

#[tokio::test]
async fn revoke_all_except_spares_current_and_sets_watermark() {
    let _guard = integration_guard().await;
    let pool = test_pool().await;
    reset_tables(&pool).await;
    let store = PgSessionStore::new(pool);
    let user_id = UserId::new();
    let stranger = UserId::new();
    let now = Utc::now();
    for key in ["a", "b", "c"] {
        store.touch(&heartbeat(user_id, key, now)).await.expect("touch");
    }
    store.touch(&heartbeat(stranger, "b", now)).await.expect("touch stranger");

    let at = now + ChronoDuration::seconds(1);
    let revoked = store.revoke_all_except(user_id, "a", at).await.expect("revoke all");
    let mut keys: Vec<_> = revoked.iter().map(|s| s.device_key.as_str()).collect();
    keys.sort();
    assert_eq!(keys, vec!["b", "c"]);

    let active: Vec<_> = store
        .list_by_user(user_id)
        .await
        .expect("list")
        .into_iter()
        .filter(|s| !s.is_revoked())
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].device_key, "a");
    let foreign = store
        .find_by_device_key(stranger, "b")
        .await
        .expect("find")
        .expect("row");
    assert!(!foreign.is_revoked());

    let mut late = heartbeat(user_id, "d", at + ChronoDuration::seconds(2));
    late.authenticated_at = now;
    assert!(store.touch(&late).await.expect("late").is_revoked());

    let mut fresh = heartbeat(user_id, "e", at + ChronoDuration::seconds(3));
    fresh.authenticated_at = at + ChronoDuration::seconds(2);
    assert!(matches!(
        store.touch(&fresh).await.expect("fresh"),
        TouchOutcome::Created(_)
    ));
}

#[tokio::test]
async fn expiry_and_full_sign_out() {
    let _guard = integration_guard().await;
    let pool = test_pool().await;
    reset_tables(&pool).await;
    let store = PgSessionStore::new(pool);
    let user_id = UserId::new();
    let now = Utc::now();
    store
        .touch(&heartbeat(user_id, "old", now - ChronoDuration::days(45)))
        .await
        .expect("touch old");
    store.touch(&heartbeat(user_id, "new", now)).await.expect("touch new");

    let expired = store
        .expire_inactive(now - ChronoDuration::days(30), now)
        .await
        .expect("expire");
    assert_eq!(expired, 1);
    let old = store
        .find_by_device_key(user_id, "old")
        .await
        .expect("find")
        .expect("row");
    assert_eq!(old.revoked_reason, Some(RevokedReason::InactivityExpired));

    assert_eq!(
        store.delete_by_device_key(user_id, "new").await.expect("delete"),
        1
    );
    assert!(store
        .find_by_device_key(user_id, "new")
        .await
        .expect("find")
        .is_none());
}

#[tokio::test]
async fn sweep_committing_mid_heartbeat_never_yields_a_refreshed_expired_row() {
    let _guard = integration_guard().await;
    let pool = test_pool().await;
    reset_tables(&pool).await;
    let store = Arc::new(PgSessionStore::new(pool.clone()));
    let user_id = UserId::new();
    let now = Utc::now();
    let id = store
        .touch(&heartbeat(user_id, "laptop", now))
        .await
        .expect("touch")
        .session()
        .id;

    // An uncommitted sweep holds the row lock, so the heartbeat reads the
    // row as active and then waits on its UPDATE.
    let mut sweep = pool.begin().await.expect("begin sweep");
    sqlx::query(
        "UPDATE device_sessions SET revoked_at = $2, revoked_reason = 'inactivity_expired' \
         WHERE id = $1 AND revoked_at IS NULL",
    )
    .bind(id)
    .bind(now)
    .execute(&mut *sweep)
    .await
    .expect("sweep update");

    let touching = {
        let store = store.clone();
        let hb = heartbeat(user_id, "laptop", now + ChronoDuration::seconds(10));
        tokio::spawn(async move { store.touch(&hb).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    sweep.commit().await.expect("commit sweep");

    let outcome = touching.await.expect("join").expect("touch");
    let TouchOutcome::Created(fresh) = outcome else {
        panic!("expected a new row after the sweep");
    };
    assert_ne!(fresh.id, id);

    let swept = store.get(id).await.expect("get").expect("row");
    assert_eq!(swept.revoked_reason, Some(RevokedReason::InactivityExpired));
    assert_same_millis(swept.last_active_at, now);
}

#[tokio::test]
async fn expired_device_heartbeat_opens_a_new_row() {
    let _guard = integration_guard().await;
    let pool = test_pool().await;
    reset_tables(&pool).await;
    let store = PgSessionStore::new(pool);
    let user_id = UserId::new();
    let now = Utc::now();
    let old = store
        .touch(&heartbeat(user_id, "phone", now - ChronoDuration::days(40)))
        .await
        .expect("touch")
        .session()
        .id;
    store
        .expire_inactive(now - ChronoDuration::days(30), now)
        .await
        .expect("expire");

    let outcome = store
        .touch(&heartbeat(user_id, "phone", now))
        .await
        .expect("touch after expiry");
    assert!(matches!(outcome, TouchOutcome::Created(_)));
    let latest = store
        .find_by_device_key(user_id, "phone")
        .await
        .expect("find")
        .expect("row");
    assert!(!latest.is_revoked());
    assert_ne!(latest.id, old);
}

#[tokio::test]
async fn create_maps_second_active_row_to_duplicate_error() {
    let _guard = integration_guard().await;
    let pool = test_pool().await;
    reset_tables(&pool).await;
    let store = PgSessionStore::new(pool);
    let hb = heartbeat(UserId::new(), "desk", Utc::now());
    store
        .create(&DeviceSession::from_heartbeat(&hb))
        .await
        .expect("first row");
    let err = store
        .create(&DeviceSession::from_heartbeat(&hb))
        .await
        .expect_err("duplicate");
    assert!(matches!(err, StoreError::DuplicateActive { .. }));
}
