//! Authentication error responses.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::AuthError;

/// Map an [`AuthError`] to a status and a client-safe message.
/// Internal failures are logged here and reported generically.
pub fn denial(error: &AuthError) -> (StatusCode, &'static str) {
    match error {
        AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "Invalid credentials"),
        AuthError::MissingCredentials => (StatusCode::UNAUTHORIZED, "Not authenticated"),
        AuthError::Malformed | AuthError::InvalidSignature => {
            (StatusCode::UNAUTHORIZED, "Invalid token")
        }
        AuthError::Expired => (StatusCode::UNAUTHORIZED, "Token expired"),
        AuthError::Revoked => (StatusCode::UNAUTHORIZED, "Token has been revoked"),
        AuthError::UserNotFound => (StatusCode::FORBIDDEN, "User not found"),
        AuthError::DuplicateToken | AuthError::SigningFailed(_) | AuthError::PersistenceFailure(_) => {
            tracing::error!(error = %error, "Authentication backend failure");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

/// Rejection of the auth extractors. 401 responses carry a
/// `WWW-Authenticate: Bearer` challenge.
#[derive(Debug)]
pub struct ApiAuthError(pub AuthError);

impl From<AuthError> for ApiAuthError {
    fn from(error: AuthError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        let (status, message) = denial(&self.0);
        let mut response = (status, Json(ErrorResponse { error: message })).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }

        response
    }
}
