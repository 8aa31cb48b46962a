use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::AppError,
    handlers::sessions::RevokeAllResponse,
    models::AuthIdentity,
    services::{SignOutScope, TrackVerdict},
    state::AppState,
    utils::network::request_metadata,
};

/// Heartbeat. A revoked device gets `403 {"revoked": true}` so clients that
/// only look at the status code still log out.
pub async fn track_session(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthIdentity>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<TrackVerdict>), AppError> {
    let metadata = request_metadata(&headers);
    let verdict = state.registrar.track_session(&identity, &metadata).await?;
    let status = if verdict.revoked {
        StatusCode::FORBIDDEN
    } else {
        StatusCode::OK
    };
    Ok((status, Json(verdict)))
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SignOutRequest {
    #[serde(default)]
    pub scope: SignOutScope,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SignOutResponse {
    pub message: String,
    pub scope: SignOutScope,
    pub provider_invalidated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_sessions: Option<RevokeAllResponse>,
}

pub async fn sign_out(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthIdentity>,
    Json(payload): Json<SignOutRequest>,
) -> Result<Json<SignOutResponse>, AppError> {
    let outcome = state.revocation.sign_out(&identity, payload.scope).await?;

    let message = match outcome.scope {
        SignOutScope::Local => "Signed out".to_string(),
        SignOutScope::Global => "Signed out of all devices".to_string(),
    };
    Ok(Json(SignOutResponse {
        message,
        scope: outcome.scope,
        provider_invalidated: outcome.provider_invalidated,
        other_sessions: outcome.others.as_ref().map(RevokeAllResponse::from),
    }))
}
