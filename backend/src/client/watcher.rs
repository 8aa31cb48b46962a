//! Keeps a signed-in device honest: heartbeats, validity polling and forced
//! logout once the server reports the device revoked.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::client::api::{HeartbeatStatus, SessionApi};
use crate::client::schedule::Schedule;
use crate::services::{InvalidReason, ValidityVerdict};

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const VALIDITY_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Why a device was sent back to the sign-in page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    SessionRevoked,
    SessionExpired,
}

impl LogoutReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogoutReason::SessionRevoked => "session_revoked",
            LogoutReason::SessionExpired => "session_expired",
        }
    }

    /// Sign-in entry point carrying the reason code.
    pub fn sign_in_path(&self) -> String {
        format!("/auth/login?reason={}", self.as_str())
    }
}

/// Which validity verdicts end the local session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ForcedLogoutPolicy {
    /// Inactivity expiry only forces a logout when enabled.
    pub logout_on_expired: bool,
}

impl ForcedLogoutPolicy {
    pub fn reason_for(&self, verdict: &ValidityVerdict) -> Option<LogoutReason> {
        if verdict.valid {
            return None;
        }
        match verdict.reason {
            Some(InvalidReason::Revoked) => Some(LogoutReason::SessionRevoked),
            Some(InvalidReason::Expired) if self.logout_on_expired => {
                Some(LogoutReason::SessionExpired)
            }
            _ => None,
        }
    }
}

/// Local side effects of a forced logout.
#[cfg_attr(test, mockall::automock)]
pub trait LogoutHandler: Send + Sync {
    /// Drops every locally held credential for the account.
    fn purge_credentials(&self);
    fn redirect_to_sign_in(&self, reason: LogoutReason);
}

#[derive(Debug, Clone, Copy)]
pub struct WatcherConfig {
    pub heartbeat_interval: Duration,
    pub validity_check_interval: Duration,
    pub policy: ForcedLogoutPolicy,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: HEARTBEAT_INTERVAL,
            validity_check_interval: VALIDITY_CHECK_INTERVAL,
            policy: ForcedLogoutPolicy::default(),
        }
    }
}

/// Fires the logout handler at most once.
struct LogoutGate {
    handler: Arc<dyn LogoutHandler>,
    fired: AtomicBool,
}

impl LogoutGate {
    fn force(&self, reason: LogoutReason) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(reason = reason.as_str(), "Forcing local logout");
        self.handler.purge_credentials();
        self.handler.redirect_to_sign_in(reason);
    }

    fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

async fn run_heartbeat(api: &dyn SessionApi, gate: &LogoutGate) {
    if gate.has_fired() {
        return;
    }
    match api.heartbeat().await {
        Ok(HeartbeatStatus::Revoked) => gate.force(LogoutReason::SessionRevoked),
        Ok(HeartbeatStatus::Active { created }) => {
            tracing::debug!(created, "Heartbeat accepted");
        }
        Err(err) => tracing::warn!(error = %err, "Heartbeat failed"),
    }
}

async fn run_validity_check(api: &dyn SessionApi, gate: &LogoutGate, policy: ForcedLogoutPolicy) {
    if gate.has_fired() {
        return;
    }
    match api.check_validity().await {
        Ok(verdict) => {
            if let Some(reason) = policy.reason_for(&verdict) {
                gate.force(reason);
            }
        }
        // Transport errors and 5xx never end the session.
        Err(err) => tracing::warn!(error = %err, "Session validity check failed"),
    }
}

/// Background polling for one signed-in device. Dropping it stops polling.
pub struct SessionWatcher {
    heartbeat: Schedule,
    validity: Schedule,
    gate: Arc<LogoutGate>,
}

impl SessionWatcher {
    pub fn start(
        api: Arc<dyn SessionApi>,
        handler: Arc<dyn LogoutHandler>,
        config: WatcherConfig,
    ) -> Self {
        let gate = Arc::new(LogoutGate {
            handler,
            fired: AtomicBool::new(false),
        });

        let heartbeat = {
            let api = api.clone();
            let gate = gate.clone();
            Schedule::spawn(config.heartbeat_interval, true, move || {
                let api = api.clone();
                let gate = gate.clone();
                async move { run_heartbeat(api.as_ref(), &gate).await }
            })
        };

        let validity = {
            let gate = gate.clone();
            let policy = config.policy;
            Schedule::spawn(config.validity_check_interval, false, move || {
                let api = api.clone();
                let gate = gate.clone();
                async move { run_validity_check(api.as_ref(), &gate, policy).await }
            })
        };

        Self {
            heartbeat,
            validity,
            gate,
        }
    }

    /// Call when the app regains focus.
    pub fn on_focus(&self) {
        self.validity.run_now();
    }

    /// Sends a heartbeat now, e.g. right after a token refresh.
    pub fn heartbeat_now(&self) {
        self.heartbeat.run_now();
    }

    pub fn is_logged_out(&self) -> bool {
        self.gate.has_fired()
    }
}
