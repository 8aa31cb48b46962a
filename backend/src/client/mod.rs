//! Device-side half of the session protocol: heartbeats every five minutes,
//! validity checks every thirty seconds and on focus, forced logout on an
//! authoritative revocation.

pub mod api;
pub mod schedule;
pub mod watcher;

pub use api::{ClientError, HeartbeatStatus, HttpSessionApi, SessionApi};
pub use schedule::Schedule;
pub use watcher::{ForcedLogoutPolicy, LogoutHandler, LogoutReason, SessionWatcher, WatcherConfig};
