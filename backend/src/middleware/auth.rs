use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::{models::AuthIdentity, state::AppState, utils::jwt::verify_access_token};

/// Resolves the identity provider token into an [`AuthIdentity`] request
/// extension. Any failure is a plain 401.
pub async fn auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = extract_auth_header(request.headers());
    let identity = authenticate_request(auth_header.as_deref(), state.jwt_secret())?;
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

fn parse_bearer_token(header: &str) -> Option<&str> {
    if let Some(rest) = header.strip_prefix("Bearer ") {
        return Some(rest);
    }
    if let Some(space_idx) = header.find(' ') {
        let (scheme, rest) = header.split_at(space_idx);
        if scheme.eq_ignore_ascii_case("bearer") {
            return Some(rest.trim_start());
        }
    }
    None
}

fn authenticate_request(auth_header: Option<&str>, secret: &str) -> Result<AuthIdentity, StatusCode> {
    let token = auth_header
        .and_then(parse_bearer_token)
        .filter(|token| !token.is_empty())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let claims = verify_access_token(token, secret).map_err(|err| {
        tracing::debug!(error = %err, "Rejected access token");
        StatusCode::UNAUTHORIZED
    })?;

    claims.into_identity().map_err(|err| {
        tracing::debug!(error = %err, "Access token carries unusable claims");
        StatusCode::UNAUTHORIZED
    })
}

fn extract_auth_header(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_owned())
}
