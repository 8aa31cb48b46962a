pub mod device_session;
pub mod memory;
pub mod session_store;
pub mod transaction;

pub use device_session::PgSessionStore;
pub use memory::InMemorySessionStore;
pub use session_store::{with_timeout, SessionStore};
