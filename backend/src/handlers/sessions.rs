use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::AppError,
    models::AuthIdentity,
    services::{revocation::parse_session_id, BulkRevocation, SessionView, ValidityVerdict},
    state::AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionView>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RevokeSessionResponse {
    pub message: String,
    pub session_id: String,
    pub already_revoked: bool,
    /// False when the identity provider could not be reached; the device is
    /// still forced out on its next validity check.
    pub provider_invalidated: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RevokeAllResponse {
    pub revoked: usize,
    pub invalidated: usize,
    pub failed: usize,
    pub complete: bool,
    pub message: String,
}

impl From<&BulkRevocation> for RevokeAllResponse {
    fn from(result: &BulkRevocation) -> Self {
        Self {
            revoked: result.revoked_count(),
            invalidated: result.invalidated_count(),
            failed: result.failed_count(),
            complete: result.is_complete(),
            message: result.summary(),
        }
    }
}

pub async fn check_session(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthIdentity>,
) -> Result<Json<ValidityVerdict>, AppError> {
    let verdict = state.registrar.check_validity(&identity).await?;
    Ok(Json(verdict))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthIdentity>,
) -> Result<Json<SessionListResponse>, AppError> {
    let sessions = state.registrar.list_sessions(&identity).await?;
    Ok(Json(SessionListResponse { sessions }))
}

pub async fn revoke_session(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthIdentity>,
    Path(session_id): Path<String>,
) -> Result<Json<RevokeSessionResponse>, AppError> {
    if session_id.trim().is_empty() {
        return Err(AppError::BadRequest("Session ID is required".into()));
    }
    let target = parse_session_id(&session_id)?;

    let outcome = state.revocation.revoke_session(&identity, target).await?;

    Ok(Json(RevokeSessionResponse {
        message: "Session revoked".to_string(),
        session_id: outcome.session_id.to_string(),
        already_revoked: outcome.already_revoked,
        provider_invalidated: outcome.provider_invalidated,
    }))
}

pub async fn revoke_all_sessions(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthIdentity>,
) -> Result<Json<RevokeAllResponse>, AppError> {
    let result = state.revocation.revoke_all_except(&identity).await?;
    Ok(Json(RevokeAllResponse::from(&result)))
}
