//! Session management endpoints.
//!
//! - GET `/` - List live sessions of the current user
//! - DELETE `/{token_id}` - Revoke one token (own token or admin)

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
};
use serde::Serialize;
use std::sync::Arc;

use super::error::ApiError;
use crate::auth::Auth;
use crate::db::TokenType;
use crate::impl_has_auth_backend;
use crate::issuer::refresh_token_id;
use crate::jwt::now_secs;
use crate::service::AuthService;
use crate::users::ROLE_ADMIN;

#[derive(Clone)]
pub struct SessionsState {
    pub service: Arc<AuthService>,
}

impl_has_auth_backend!(SessionsState);

pub fn router(state: SessionsState) -> Router {
    Router::new()
        .route("/", get(list_sessions))
        .route("/{token_id}", delete(revoke_session))
        .with_state(state)
}

#[derive(Serialize)]
struct SessionInfo {
    token_id: String,
    token_type: TokenType,
    expires_at: u64,
    /// The presented access token or its paired refresh token
    is_current: bool,
}

#[derive(Serialize)]
struct ListSessionsResponse {
    sessions: Vec<SessionInfo>,
}

async fn list_sessions(
    State(state): State<SessionsState>,
    Auth(claims): Auth,
) -> Result<impl IntoResponse, ApiError> {
    let records = state.service.list_sessions(&claims.user_id).await?;

    let now = now_secs();
    let current_refresh = refresh_token_id(&claims.token_id, &claims.user_id);
    let sessions = records
        .into_iter()
        .filter(|r| !r.is_expired_at(now))
        .map(|r| SessionInfo {
            is_current: r.token_id == claims.token_id || r.token_id == current_refresh,
            token_id: r.token_id,
            token_type: r.token_type,
            expires_at: r.expires_at,
        })
        .collect();

    Ok((StatusCode::OK, Json(ListSessionsResponse { sessions })))
}

#[derive(Serialize)]
struct RevokeResponse {
    revoked: bool,
}

/// Revoke a single ledger record by token id.
async fn revoke_session(
    State(state): State<SessionsState>,
    Auth(claims): Auth,
    Path(token_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let ledger = state.service.ledger();

    let Some(record) = ledger.lookup(&token_id).await? else {
        // Already revoked or never existed
        return Ok((StatusCode::OK, Json(RevokeResponse { revoked: false })));
    };

    if record.user_id != claims.user_id && !claims.has_role(ROLE_ADMIN) {
        return Err(ApiError::forbidden("Cannot revoke another user's session"));
    }

    let revoked = ledger.revoke(&token_id).await?;
    Ok((StatusCode::OK, Json(RevokeResponse { revoked })))
}
