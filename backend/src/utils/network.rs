use axum::http::{header::USER_AGENT, HeaderMap};

use crate::services::RequestMetadata;

/// Client address as reported by the first proxy hop.
pub fn extract_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        return value
            .split(',')
            .next()
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty());
    }
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}

pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|agent| agent.trim().to_string())
        .filter(|agent| !agent.is_empty())
}

pub fn request_metadata(headers: &HeaderMap) -> RequestMetadata {
    RequestMetadata {
        ip_address: extract_ip(headers),
        user_agent: extract_user_agent(headers),
    }
}
