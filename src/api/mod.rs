mod auth;
mod error;
mod sessions;

use axum::Router;
use std::sync::Arc;

use crate::db::SqliteUserStore;
use crate::rate_limit::RateLimitConfig;
use crate::service::AuthService;

pub use auth::TokenResponse;
pub use error::ApiError;

/// Create the API router.
pub fn create_api_router(
    service: Arc<AuthService>,
    users: SqliteUserStore,
    no_signup: bool,
    rate_limit_config: Arc<RateLimitConfig>,
) -> Router {
    let auth_state = auth::AuthState {
        service: service.clone(),
        users,
        no_signup,
        rate_limit_config,
    };

    let sessions_state = sessions::SessionsState { service };

    Router::new()
        .nest("/auth", auth::router(auth_state))
        .nest("/sessions", sessions::router(sessions_state))
}
