pub mod fingerprint;
pub mod jwt;
pub mod network;

pub use fingerprint::{parse_fingerprint, Fingerprint};
pub use network::{extract_ip, extract_user_agent, request_metadata};
