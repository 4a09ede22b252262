//! Request gate for protected routes.

use std::sync::Arc;

use crate::db::SessionLedger;
use crate::error::Result;
use crate::jwt::{AccessClaims, JwtConfig, now_secs};

use super::bearer::bearer_token;

/// Verifies access tokens. In strict mode every request also requires the
/// token id to be present in the session ledger, so a revoked token stops
/// working before its embedded expiry.
#[derive(Clone)]
pub struct Authenticator {
    jwt: Arc<JwtConfig>,
    ledger: SessionLedger,
    strict: bool,
}

impl Authenticator {
    pub fn new(jwt: Arc<JwtConfig>, ledger: SessionLedger, strict: bool) -> Self {
        Self {
            jwt,
            ledger,
            strict,
        }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Authenticate a raw `Authorization` header value.
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<AccessClaims> {
        let token = bearer_token(authorization)?;
        self.authenticate_token(token).await
    }

    /// Authenticate a bare access token.
    pub async fn authenticate_token(&self, token: &str) -> Result<AccessClaims> {
        let claims = AccessClaims::try_from(self.jwt.access().verify(token)?)?;
        if self.strict {
            self.ledger.check(&claims.token_id, now_secs()).await?;
        }
        Ok(claims)
    }
}
