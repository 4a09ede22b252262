//! Axum extractors for authentication.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::bearer::authorization_header;
use super::errors::ApiAuthError;
use super::state::HasAuthBackend;
use crate::jwt::AccessClaims;

/// Extractor for endpoints that require a valid access token.
/// Reads `Authorization: Bearer <token>` and runs the authenticator.
pub struct Auth(pub AccessClaims);

impl<S> FromRequestParts<S> for Auth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        state
            .authenticator()
            .authenticate(authorization_header(&parts.headers))
            .await
            .map(Auth)
            .map_err(ApiAuthError::from)
    }
}

/// Optional authentication extractor - never fails.
/// Useful for endpoints that behave differently for signed-in callers.
pub struct OptionalAuth(pub Option<AccessClaims>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let claims = state
            .authenticator()
            .authenticate(authorization_header(&parts.headers))
            .await
            .ok();
        Ok(OptionalAuth(claims))
    }
}
