//! `Authorization: Bearer <token>` parsing.

use axum::http::{HeaderMap, header};

use crate::error::{AuthError, Result};

/// Extract the token from an `Authorization` header value.
pub fn bearer_token(authorization: Option<&str>) -> Result<&str> {
    let value = authorization
        .ok_or(AuthError::MissingCredentials)?
        .trim();
    let (scheme, token) = value
        .split_once(' ')
        .ok_or(AuthError::MissingCredentials)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MissingCredentials);
    }

    let token = token.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(AuthError::MissingCredentials);
    }
    Ok(token)
}

/// The raw `Authorization` header, if present and valid ASCII.
pub fn authorization_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::AUTHORIZATION)?.to_str().ok()
}
