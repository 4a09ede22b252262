//! Authentication endpoints.
//!
//! - POST `/login` - Exchange username and password for a token pair
//! - POST `/register` - Create an account and start a session
//! - POST `/refresh` - Exchange a refresh token for a new pair
//! - POST `/logout` - Revoke the pair of the presented access token
//! - POST `/logout-all` - Revoke every session of the caller
//! - GET `/whoami` - Claims of the presented access token

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, validate_username};
use crate::auth::{Auth, OptionalAuth, authorization_header, bearer_token};
use crate::db::{CreateUserError, DEFAULT_ROLES, SqliteUserStore};
use crate::error::AuthError;
use crate::impl_has_auth_backend;
use crate::issuer::TokenPair;
use crate::rate_limit::{RateLimitConfig, rate_limit_login, rate_limit_register};
use crate::service::AuthService;
use crate::users::User;

#[derive(Clone)]
pub struct AuthState {
    pub service: Arc<AuthService>,
    pub users: SqliteUserStore,
    pub no_signup: bool,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

impl_has_auth_backend!(AuthState);

pub fn router(state: AuthState) -> Router {
    let open_router = Router::new()
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/logout-all", post(logout_all))
        .route("/whoami", get(whoami))
        .with_state(state.clone());

    let login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_login,
        ));

    let router = Router::new().merge(open_router).merge(login_router);

    if state.no_signup {
        router
    } else {
        let register_router = Router::new()
            .route("/register", post(register))
            .with_state(state.clone())
            .layer(middleware::from_fn_with_state(
                state.rate_limit_config,
                rate_limit_register,
            ));
        router.merge(register_router)
    }
}

#[derive(Serialize)]
pub struct TokenResponse {
    user_id: String,
    username: String,
    email: String,
    roles: Vec<String>,
    token_type: &'static str,
    access_token: String,
    refresh_token: String,
    access_expires_at: u64,
    refresh_expires_at: u64,
}

impl TokenResponse {
    pub fn new(pair: TokenPair, user: &User) -> Self {
        Self {
            user_id: pair.user_id,
            username: user.username.clone(),
            email: user.email.clone(),
            roles: user.role_list().map(str::to_string).collect(),
            token_type: "Bearer",
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            access_expires_at: pair.access_expires_at,
            refresh_expires_at: pair.refresh_expires_at,
        }
    }
}

/// Describe a freshly issued pair together with its owner.
async fn token_response(state: &AuthState, pair: TokenPair) -> Result<TokenResponse, ApiError> {
    let user = state
        .users
        .get_by_id(&pair.user_id)
        .await
        .map_err(|e| ApiError::db_error("Failed to load user", e))?
        .ok_or(AuthError::UserNotFound)?;
    Ok(TokenResponse::new(pair, &user))
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

/// Log in. A valid access token presented with the request is revoked
/// together with its refresh token before the credentials are checked.
async fn login(
    State(state): State<AuthState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if let Ok(previous) = state
        .service
        .authenticate(authorization_header(&headers))
        .await
    {
        state.service.logout_claims(&previous).await?;
    }

    let pair = state
        .service
        .login(payload.username.trim(), &payload.password)
        .await?;

    Ok((StatusCode::OK, Json(token_response(&state, pair).await?)))
}

#[derive(Deserialize)]
struct RegisterRequest {
    username: String,
    #[serde(default)]
    email: String,
    password: String,
}

async fn register(
    State(state): State<AuthState>,
    OptionalAuth(current): OptionalAuth,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if current.is_some() {
        return Err(ApiError::unauthorized("Already logged in"));
    }

    let username = payload.username.trim();
    validate_username(username)?;
    if payload.password.is_empty() {
        return Err(ApiError::bad_request("Password cannot be empty"));
    }

    let user = match state
        .users
        .create(username, payload.email.trim(), &payload.password, DEFAULT_ROLES)
        .await
    {
        Ok(user) => user,
        Err(CreateUserError::UsernameTaken) => {
            return Err(ApiError::conflict("Username is already taken"));
        }
        Err(e) => return Err(ApiError::db_error("Failed to create user", e)),
    };
    info!(user_id = %user.id, username = %user.username, "User registered");

    let pair = state.service.start_session(&user).await?;

    Ok((StatusCode::CREATED, Json(TokenResponse::new(pair, &user))))
}

#[derive(Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

async fn refresh(
    State(state): State<AuthState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let refresh_token = payload.refresh_token.trim();
    if refresh_token.is_empty() {
        return Err(ApiError::unprocessable("refresh_token is required"));
    }

    let pair = state.service.refresh(refresh_token).await?;
    Ok((StatusCode::CREATED, Json(token_response(&state, pair).await?)))
}

/// Logout succeeds whether or not the presented token is usable.
async fn logout(
    State(state): State<AuthState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Ok(token) = bearer_token(authorization_header(&headers)) {
        state.service.logout(token).await?;
    }
    Ok((StatusCode::OK, Json(serde_json::json!({ "success": true }))))
}

#[derive(Serialize)]
struct LogoutAllResponse {
    revoked: u64,
}

async fn logout_all(
    State(state): State<AuthState>,
    Auth(claims): Auth,
) -> Result<impl IntoResponse, ApiError> {
    let revoked = state.service.logout_all(&claims.user_id).await?;
    Ok((StatusCode::OK, Json(LogoutAllResponse { revoked })))
}

async fn whoami(Auth(claims): Auth) -> impl IntoResponse {
    Json(claims)
}
