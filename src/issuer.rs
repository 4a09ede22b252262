//! Token issuance: builds linked access/refresh pairs.
//!
//! Issuing is pure apart from the clock and the random id source. Persisting
//! the pair in the session ledger is the caller's job.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::{AuthError, Result};
use crate::jwt::{
    CLAIM_ACCESS_UUID, CLAIM_EXPIRES, CLAIM_REFRESH_UUID, CLAIM_ROLE, CLAIM_USER_ID, Claims,
    JwtConfig, is_reserved, now_secs,
};
use crate::users::User;

/// Access token lifetime: 30 minutes
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 30 * 60;

/// Refresh token lifetime: 7 days
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// Joins the access token id and the user id into the refresh token id.
pub const REFRESH_ID_SEPARATOR: &str = "++";

/// Derive the refresh token id paired with an access token id.
pub fn refresh_token_id(access_token_id: &str, user_id: &str) -> String {
    format!("{access_token_id}{REFRESH_ID_SEPARATOR}{user_id}")
}

/// Inverse of [`refresh_token_id`]. `None` if `refresh_id` was not derived
/// for `user_id`.
pub fn access_id_of_refresh<'a>(refresh_id: &'a str, user_id: &str) -> Option<&'a str> {
    if user_id.is_empty() {
        return None;
    }
    let access_id = refresh_id
        .strip_suffix(user_id)?
        .strip_suffix(REFRESH_ID_SEPARATOR)?;
    (!access_id.is_empty()).then_some(access_id)
}

/// One access token plus one refresh token, issued together.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_id: String,
    pub refresh_token_id: String,
    /// Unix seconds
    pub issued_at: u64,
    pub access_expires_at: u64,
    pub refresh_expires_at: u64,
}

#[derive(Clone)]
pub struct TokenIssuer {
    jwt: Arc<JwtConfig>,
}

impl TokenIssuer {
    pub fn new(jwt: Arc<JwtConfig>) -> Self {
        Self { jwt }
    }

    /// Issue a fresh pair for a user who just authenticated.
    pub fn issue(&self, user: &User) -> Result<TokenPair> {
        self.issue_at(user, now_secs())
    }

    pub fn issue_at(&self, user: &User, now: u64) -> Result<TokenPair> {
        if let Some((key, _)) = user.details.iter().find(|(k, _)| is_reserved(k)) {
            return Err(AuthError::SigningFailed(format!(
                "user detail '{key}' collides with a reserved claim"
            )));
        }
        self.mint(user, user.details.clone(), now)
    }

    /// Issue a pair during refresh. Extra claims from `previous` are carried
    /// into the new tokens; the role comes from the reloaded `user`.
    pub fn reissue(&self, user: &User, previous: &Claims) -> Result<TokenPair> {
        self.reissue_at(user, previous, now_secs())
    }

    pub fn reissue_at(&self, user: &User, previous: &Claims, now: u64) -> Result<TokenPair> {
        self.mint(user, previous.extras(), now)
    }

    fn mint(&self, user: &User, extras: Claims, now: u64) -> Result<TokenPair> {
        if user.id.is_empty() {
            return Err(AuthError::SigningFailed("user has no id".into()));
        }

        let access_token_id = Uuid::new_v4().to_string();
        let refresh_token_id = refresh_token_id(&access_token_id, &user.id);
        let access_expires_at = now + ACCESS_TOKEN_DURATION_SECS;
        let refresh_expires_at = now + REFRESH_TOKEN_DURATION_SECS;

        let mut access = extras.clone();
        access.insert(CLAIM_ACCESS_UUID, access_token_id.as_str());
        access.insert(CLAIM_USER_ID, user.id.as_str());
        access.insert(CLAIM_EXPIRES, to_claim_secs(access_expires_at)?);
        access.insert(CLAIM_ROLE, user.roles.as_str());

        let mut refresh = extras;
        refresh.insert(CLAIM_REFRESH_UUID, refresh_token_id.as_str());
        refresh.insert(CLAIM_USER_ID, user.id.as_str());
        refresh.insert(CLAIM_EXPIRES, to_claim_secs(refresh_expires_at)?);

        let access_token = self.jwt.access().sign(&access)?;
        let refresh_token = self.jwt.refresh().sign(&refresh)?;

        Ok(TokenPair {
            user_id: user.id.clone(),
            access_token,
            refresh_token,
            access_token_id,
            refresh_token_id,
            issued_at: now,
            access_expires_at,
            refresh_expires_at,
        })
    }
}

fn to_claim_secs(secs: u64) -> Result<i64> {
    i64::try_from(secs).map_err(|_| AuthError::SigningFailed("expiry out of range".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::{AccessClaims, RefreshClaims};

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(Arc::new(
            JwtConfig::new(b"access-secret", b"refresh-secret").unwrap(),
        ))
    }

    fn user(roles: &str) -> User {
        User {
            id: "user-1".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            roles: roles.to_string(),
            password_hash: String::new(),
            details: Claims::new(),
        }
    }

    #[test]
    fn test_refresh_id_is_derived_from_access_id() {
        let pair = issuer().issue(&user("ROLE_USER")).unwrap();

        assert_eq!(
            pair.refresh_token_id,
            format!("{}++{}", pair.access_token_id, "user-1")
        );
        assert_eq!(
            access_id_of_refresh(&pair.refresh_token_id, "user-1"),
            Some(pair.access_token_id.as_str())
        );
    }

    #[test]
    fn test_access_id_of_refresh_rejects_foreign_ids() {
        assert_eq!(access_id_of_refresh("abc++user-1", "user-2"), None);
        assert_eq!(access_id_of_refresh("++user-1", "user-1"), None);
        assert_eq!(access_id_of_refresh("abcuser-1", "user-1"), None);
        assert_eq!(access_id_of_refresh("abc++", ""), None);
    }

    #[test]
    fn test_expiries() {
        let pair = issuer().issue_at(&user("ROLE_USER"), 1_000).unwrap();

        assert_eq!(pair.issued_at, 1_000);
        assert_eq!(pair.access_expires_at - pair.issued_at, 1800);
        assert_eq!(pair.refresh_expires_at - pair.issued_at, 7 * 24 * 3600);
    }

    #[test]
    fn test_tokens_verify_with_their_own_secret() {
        let issuer = issuer();
        let pair = issuer.issue(&user("ROLE_ADMIN,ROLE_MODERATOR")).unwrap();

        let access =
            AccessClaims::try_from(issuer.jwt.access().verify(&pair.access_token).unwrap())
                .unwrap();
        assert_eq!(access.token_id, pair.access_token_id);
        assert_eq!(access.user_id, "user-1");
        assert_eq!(access.role, "ROLE_ADMIN,ROLE_MODERATOR");
        assert_eq!(access.expires_at, pair.access_expires_at);

        let refresh =
            RefreshClaims::try_from(issuer.jwt.refresh().verify(&pair.refresh_token).unwrap())
                .unwrap();
        assert_eq!(refresh.token_id, pair.refresh_token_id);
        assert_eq!(refresh.expires_at, pair.refresh_expires_at);

        assert!(issuer.jwt.refresh().verify(&pair.access_token).is_err());
        assert!(issuer.jwt.access().verify(&pair.refresh_token).is_err());
    }

    #[test]
    fn test_refresh_token_has_no_role() {
        let issuer = issuer();
        let pair = issuer.issue(&user("ROLE_ADMIN")).unwrap();
        let claims = issuer.jwt.refresh().verify(&pair.refresh_token).unwrap();

        assert!(!claims.contains_key(CLAIM_ROLE));
        assert!(!claims.contains_key(CLAIM_ACCESS_UUID));
    }

    #[test]
    fn test_user_details_are_passed_through() {
        let issuer = issuer();
        let mut alice = user("ROLE_USER");
        alice.details.insert("display_name", "Alice");
        alice.details.insert("tier", 3i64);

        let pair = issuer.issue(&alice).unwrap();
        let access =
            AccessClaims::try_from(issuer.jwt.access().verify(&pair.access_token).unwrap())
                .unwrap();

        assert_eq!(access.extra, alice.details);

        let refresh = issuer.jwt.refresh().verify(&pair.refresh_token).unwrap();
        assert_eq!(refresh.extras(), alice.details);
    }

    #[test]
    fn test_reserved_detail_is_rejected() {
        let mut alice = user("ROLE_USER");
        alice.details.insert(CLAIM_ROLE, "ROLE_ADMIN");

        assert!(matches!(
            issuer().issue(&alice),
            Err(AuthError::SigningFailed(_))
        ));
    }

    #[test]
    fn test_reissue_inherits_extras_and_reads_role_from_user() {
        let issuer = issuer();
        let mut alice = user("ROLE_USER");
        alice.details.insert("display_name", "Alice");
        let first = issuer.issue(&alice).unwrap();
        let previous = issuer.jwt.refresh().verify(&first.refresh_token).unwrap();

        let promoted = User {
            roles: "ROLE_ADMIN".to_string(),
            details: Claims::new(),
            ..alice
        };
        let second = issuer.reissue(&promoted, &previous).unwrap();
        let access =
            AccessClaims::try_from(issuer.jwt.access().verify(&second.access_token).unwrap())
                .unwrap();

        assert_ne!(second.access_token_id, first.access_token_id);
        assert_eq!(access.role, "ROLE_ADMIN");
        assert_eq!(access.extra.get_str("display_name"), Some("Alice"));
        assert_eq!(access.token_id, second.access_token_id);
    }

    #[test]
    fn test_unique_ids_per_issue() {
        let issuer = issuer();
        let alice = user("ROLE_USER");

        let first = issuer.issue(&alice).unwrap();
        let second = issuer.issue(&alice).unwrap();

        assert_ne!(first.access_token_id, second.access_token_id);
        assert_ne!(first.refresh_token_id, second.refresh_token_id);
    }
}
