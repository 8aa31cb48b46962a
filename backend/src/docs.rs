#![allow(dead_code)] // OpenAPI doc stubs are only referenced by utoipa macros.

use crate::{
    error::ErrorResponse,
    handlers::{
        auth::{SignOutRequest, SignOutResponse},
        sessions::{RevokeAllResponse, RevokeSessionResponse, SessionListResponse},
    },
    models::{DeviceSession, DeviceType, RevokedReason, SessionStatus},
    services::{InvalidReason, SessionView, SignOutScope, TrackVerdict, ValidityVerdict},
};
use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        track_session_doc,
        sign_out_doc,
        check_session_doc,
        list_sessions_doc,
        revoke_session_doc,
        revoke_all_sessions_doc
    ),
    components(
        schemas(
            // heartbeat & validity
            TrackVerdict,
            ValidityVerdict,
            InvalidReason,
            // listing
            SessionListResponse,
            SessionView,
            DeviceSession,
            DeviceType,
            RevokedReason,
            SessionStatus,
            // revocation
            RevokeSessionResponse,
            RevokeAllResponse,
            SignOutRequest,
            SignOutResponse,
            SignOutScope,
            ErrorResponse
        )
    ),
    modifiers(&SecuritySchemes),
    tags(
        (name = "Auth", description = "Heartbeat and sign-out"),
        (name = "Sessions", description = "Device session listing, validity and revocation")
    ),
    security(("BearerAuth" = []))
)]
pub struct ApiDoc;

struct SecuritySchemes;

impl Modify for SecuritySchemes {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_default();

        let mut bearer = Http::new(HttpAuthScheme::Bearer);
        bearer.bearer_format = Some("JWT".to_string());

        components.add_security_scheme("BearerAuth", SecurityScheme::Http(bearer));
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/track-session",
    responses(
        (status = 200, description = "Heartbeat recorded", body = TrackVerdict),
        (status = 403, description = "This device has been revoked", body = TrackVerdict),
        (status = 401, description = "Missing or invalid token"),
        (status = 503, description = "Session store unavailable", body = ErrorResponse)
    ),
    tag = "Auth"
)]
fn track_session_doc() {}

#[utoipa::path(
    post,
    path = "/api/auth/sign-out",
    request_body = SignOutRequest,
    responses(
        (status = 200, body = SignOutResponse),
        (status = 503, body = ErrorResponse)
    ),
    tag = "Auth"
)]
fn sign_out_doc() {}

#[utoipa::path(
    get,
    path = "/api/sessions/check",
    responses(
        (status = 200, description = "Validity verdict for the calling device", body = ValidityVerdict),
        (status = 503, body = ErrorResponse)
    ),
    tag = "Sessions"
)]
fn check_session_doc() {}

#[utoipa::path(
    get,
    path = "/api/sessions",
    responses(
        (status = 200, body = SessionListResponse),
        (status = 503, body = ErrorResponse)
    ),
    tag = "Sessions"
)]
fn list_sessions_doc() {}

#[utoipa::path(
    delete,
    path = "/api/sessions/{id}",
    params(("id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, body = RevokeSessionResponse),
        (status = 400, description = "Malformed id or current session", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 503, body = ErrorResponse)
    ),
    tag = "Sessions"
)]
fn revoke_session_doc() {}

#[utoipa::path(
    post,
    path = "/api/sessions/revoke-all",
    responses(
        (status = 200, description = "Every other device revoked", body = RevokeAllResponse),
        (status = 503, body = ErrorResponse)
    ),
    tag = "Sessions"
)]
fn revoke_all_sessions_doc() {}
