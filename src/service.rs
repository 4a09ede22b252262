//! Token lifecycle operations: login, logout, refresh and session listing.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::auth::Authenticator;
use crate::db::{PairRevocation, SessionLedger, SessionRecord};
use crate::error::{AuthError, Result};
use crate::events::{AuthEvent, AuthObserver, TracingObserver};
use crate::issuer::{TokenIssuer, TokenPair};
use crate::jwt::{AccessClaims, JwtConfig, RefreshClaims};
use crate::users::{User, UserStore};

/// Signing secrets and verification policy.
#[derive(Clone)]
pub struct AuthConfig {
    /// Secret for access tokens
    pub access_secret: Vec<u8>,
    /// Secret for refresh tokens, must differ from `access_secret`
    pub refresh_secret: Vec<u8>,
    /// Require access tokens to be present in the session ledger
    pub strict_sessions: bool,
}

/// Progress of a refresh. On failure the last completed stage is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStage {
    Received,
    Verified,
    OldRevoked,
    UserReloaded,
    Reissued,
    Persisted,
    Done,
}

impl fmt::Display for RefreshStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RefreshStage::Received => "received",
            RefreshStage::Verified => "verified",
            RefreshStage::OldRevoked => "old_revoked",
            RefreshStage::UserReloaded => "user_reloaded",
            RefreshStage::Reissued => "reissued",
            RefreshStage::Persisted => "persisted",
            RefreshStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Entry point for everything that creates, rotates or destroys tokens.
pub struct AuthService {
    jwt: Arc<JwtConfig>,
    issuer: TokenIssuer,
    ledger: SessionLedger,
    users: Arc<dyn UserStore>,
    authenticator: Authenticator,
    observer: Arc<dyn AuthObserver>,
}

impl AuthService {
    pub fn new(
        config: &AuthConfig,
        ledger: SessionLedger,
        users: Arc<dyn UserStore>,
    ) -> Result<Self> {
        let jwt = Arc::new(JwtConfig::new(
            &config.access_secret,
            &config.refresh_secret,
        )?);
        Ok(Self {
            issuer: TokenIssuer::new(jwt.clone()),
            authenticator: Authenticator::new(jwt.clone(), ledger.clone(), config.strict_sessions),
            jwt,
            ledger,
            users,
            observer: Arc::new(TracingObserver),
        })
    }

    /// Replace the default logging observer.
    pub fn with_observer(mut self, observer: Arc<dyn AuthObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    pub fn ledger(&self) -> &SessionLedger {
        &self.ledger
    }

    pub fn jwt(&self) -> &JwtConfig {
        &self.jwt
    }

    /// Check a username and password and start a session.
    /// Unknown users and wrong passwords are indistinguishable.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair> {
        let verified = match self.users.load_by_username(username).await? {
            Some(user) => {
                let valid = self.users.verify_password(&user, password).await;
                valid.then_some(user)
            }
            None => {
                self.users.verify_unknown(password).await;
                None
            }
        };
        let Some(user) = verified else {
            self.observer.on_event(&AuthEvent::LoginFailed {
                username: username.to_string(),
            });
            return Err(AuthError::InvalidCredentials);
        };

        self.start_session(&user).await
    }

    /// Issue and record a new pair for an already authenticated user.
    pub async fn start_session(&self, user: &User) -> Result<TokenPair> {
        let pair = self.issuer.issue(user)?;
        self.ledger.record_pair(&pair).await?;
        self.granted(&pair);
        Ok(pair)
    }

    /// Revoke the pair an access token belongs to. Tokens that do not
    /// verify are ignored, so repeating a logout is harmless. The token's
    /// own expiry is not enforced: an expired access token can still end
    /// its session.
    pub async fn logout(&self, access_token: &str) -> Result<()> {
        let claims = match self
            .jwt
            .access()
            .verify_ignoring_expiry(access_token)
            .and_then(AccessClaims::try_from)
        {
            Ok(claims) => claims,
            Err(e) => {
                debug!(error = %e, "Ignoring logout with unusable token");
                return Ok(());
            }
        };

        self.logout_claims(&claims).await?;
        Ok(())
    }

    /// Revoke both halves of the pair identified by verified access claims.
    pub async fn logout_claims(&self, claims: &AccessClaims) -> Result<PairRevocation> {
        let revoked = self
            .ledger
            .revoke_pair(&claims.token_id, &claims.user_id)
            .await?;
        if revoked.access || revoked.refresh {
            self.observer.on_event(&AuthEvent::TokensRevoked {
                user_id: claims.user_id.clone(),
                token_id: claims.token_id.clone(),
            });
        }
        Ok(revoked)
    }

    /// Revoke every recorded token of a user.
    pub async fn logout_all(&self, user_id: &str) -> Result<u64> {
        let count = self.ledger.revoke_all(user_id).await?;
        info!(user_id = %user_id, count, "Revoked all sessions");
        Ok(count)
    }

    /// Exchange a refresh token for a new pair. Each refresh token works at
    /// most once: it is revoked before anything new is minted, and when
    /// several callers race on the same token only the one whose revoke
    /// removed the record continues.
    ///
    /// If persisting the new pair fails the old pair stays revoked and the
    /// caller has to log in again.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let mut stage = RefreshStage::Received;
        let result = self.run_refresh(refresh_token, &mut stage).await;

        if let Err(e) = &result {
            if e.is_verification_failure() {
                debug!(stage = %stage, error = %e, "Refresh rejected");
            } else {
                warn!(stage = %stage, error = %e, "Refresh failed");
            }
        }
        result
    }

    async fn run_refresh(&self, refresh_token: &str, stage: &mut RefreshStage) -> Result<TokenPair> {
        let claims = RefreshClaims::try_from(self.jwt.refresh().verify(refresh_token)?)?;
        *stage = RefreshStage::Verified;

        if !self.ledger.revoke(&claims.token_id).await? {
            return Err(AuthError::Revoked);
        }
        if let Err(e) = self.ledger.revoke(claims.access_token_id()).await {
            warn!(user_id = %claims.user_id, error = %e, "Failed to revoke paired access token");
        }
        *stage = RefreshStage::OldRevoked;
        self.observer.on_event(&AuthEvent::TokensRevoked {
            user_id: claims.user_id.clone(),
            token_id: claims.token_id.clone(),
        });

        let user = self
            .users
            .load_by_id(&claims.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        *stage = RefreshStage::UserReloaded;

        let pair = self.issuer.reissue(&user, &claims.extra)?;
        *stage = RefreshStage::Reissued;

        self.ledger.record_pair(&pair).await?;
        *stage = RefreshStage::Persisted;

        self.granted(&pair);
        *stage = RefreshStage::Done;
        Ok(pair)
    }

    /// Request gate for protected operations.
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<AccessClaims> {
        self.authenticator.authenticate(authorization).await
    }

    /// Every stored record of a user, expired ones included.
    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionRecord>> {
        self.ledger.list_active(user_id).await
    }

    fn granted(&self, pair: &TokenPair) {
        self.observer.on_event(&AuthEvent::TokensGranted {
            user_id: pair.user_id.clone(),
            access_token_id: pair.access_token_id.clone(),
        });
    }
}
